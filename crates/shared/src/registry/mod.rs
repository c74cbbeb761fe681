pub mod matcher;
pub mod normalize;
pub mod phonetic;

pub use matcher::{
    DEFAULT_FUZZY_MIN_SCORE, RegistryMatch, RegistryMatchSource, RegistryMatcher,
    best_fuzzy_match, similarity_score,
};
pub use normalize::{key_tokens, normalize_product_key};
pub use phonetic::{canonicalize_key, detect_phonetic_transformation};
