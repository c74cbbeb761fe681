use std::collections::{BTreeSet, HashMap};
use std::sync::LazyLock;

/// Sound-alike spellings that transcription and models swap for one another.
/// The first member of each class is its canonical form. Extend by adding
/// rows; matching code only goes through [`phonetic_variants_of`] and
/// [`canonical_token`].
const EQUIVALENCE_CLASSES: &[&[&str]] = &[
    &["lmnt", "element", "elements", "elemnt", "elemental"],
    &["nuun", "noon tabs", "nune"],
    &["ag1", "agone", "ag one"],
    &["thorne", "thorn"],
    &["zyrtec", "zertec", "zirtec"],
    &["tylenol", "tylanol", "tylonol"],
    &["advil", "advill"],
    &["creatine", "creatin", "kreatine"],
    &["ashwagandha", "ashwaganda", "ashwagander"],
    &["electrolyte", "electrolite", "elektrolyte"],
    &["liquidiv", "liquid iv", "liquid ivy", "liquid i v"],
    &["momentous", "momentus"],
    &["magnesium", "magnesum", "magnezium"],
];

static CANONICAL_BY_TOKEN: LazyLock<HashMap<&'static str, &'static str>> = LazyLock::new(|| {
    EQUIVALENCE_CLASSES
        .iter()
        .flat_map(|class| class.iter().map(move |member| (*member, class[0])))
        .collect()
});

static CLASS_BY_CANONICAL: LazyLock<HashMap<&'static str, &'static [&'static str]>> =
    LazyLock::new(|| {
        EQUIVALENCE_CLASSES
            .iter()
            .map(|class| (class[0], *class))
            .collect()
    });

/// Every spelling equivalent to `token`, including `token` itself.
pub fn phonetic_variants_of(token: &str) -> BTreeSet<String> {
    let mut variants = BTreeSet::from([token.to_string()]);
    if let Some(class) = CANONICAL_BY_TOKEN
        .get(token)
        .and_then(|canonical| CLASS_BY_CANONICAL.get(canonical))
    {
        variants.extend(class.iter().map(|member| (*member).to_string()));
    }
    variants
}

pub fn canonical_token(token: &str) -> &str {
    CANONICAL_BY_TOKEN.get(token).copied().unwrap_or(token)
}

/// Rewrites a normalized key so each equivalence class collapses to its
/// canonical spelling. Multi-word members ("liquid iv") are matched before
/// single tokens.
pub fn canonicalize_key(key: &str) -> Vec<String> {
    let tokens: Vec<&str> = key.split(' ').filter(|token| !token.is_empty()).collect();
    let mut canonical = Vec::with_capacity(tokens.len());
    let mut index = 0;

    while index < tokens.len() {
        let mut consumed = 1;
        let mut replacement = canonical_token(tokens[index]).to_string();

        for width in (2..=3).rev() {
            if index + width > tokens.len() {
                continue;
            }
            let phrase = tokens[index..index + width].join(" ");
            if let Some(canonical_form) = CANONICAL_BY_TOKEN.get(phrase.as_str()) {
                replacement = (*canonical_form).to_string();
                consumed = width;
                break;
            }
        }

        canonical.push(replacement);
        index += consumed;
    }

    canonical
}

/// True when the model swapped one of the user's words for a different
/// spelling from the same equivalence class ("element" -> "LMNT"). Both sides
/// must already be normalized keys.
pub fn detect_phonetic_transformation(user_key: &str, model_key: &str) -> bool {
    let user_terms = surface_terms(user_key);
    let model_terms = surface_terms(model_key);

    user_terms.iter().any(|user_term| {
        let variants = phonetic_variants_of(user_term);
        if variants.len() < 2 {
            return false;
        }
        model_terms
            .iter()
            .any(|model_term| model_term != user_term && variants.contains(model_term))
    })
}

/// Tokens plus the adjacent two- and three-word phrases that appear in the table.
fn surface_terms(key: &str) -> Vec<String> {
    let tokens: Vec<&str> = key.split(' ').filter(|token| !token.is_empty()).collect();
    let mut terms: Vec<String> = tokens.iter().map(|token| (*token).to_string()).collect();

    for width in 2..=3 {
        for window in tokens.windows(width) {
            let phrase = window.join(" ");
            if CANONICAL_BY_TOKEN.contains_key(phrase.as_str()) {
                terms.push(phrase);
            }
        }
    }

    terms
}
