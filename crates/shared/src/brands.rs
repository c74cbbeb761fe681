use crate::models::EventType;
use crate::registry::normalize::normalize_product_key;
use crate::registry::phonetic::canonicalize_key;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnownBrand {
    /// Lowercase, normalized brand token as matched against item text.
    pub token: &'static str,
    pub display: &'static str,
    pub event_type: EventType,
}

const fn brand(token: &'static str, display: &'static str, event_type: EventType) -> KnownBrand {
    KnownBrand {
        token,
        display,
        event_type,
    }
}

pub const KNOWN_BRANDS: &[KnownBrand] = &[
    brand("lmnt", "LMNT", EventType::Supplement),
    brand("liquid iv", "Liquid I.V.", EventType::Supplement),
    brand("liquidiv", "Liquid I.V.", EventType::Supplement),
    brand("nuun", "Nuun", EventType::Supplement),
    brand("ag1", "AG1", EventType::Supplement),
    brand("athletic greens", "AG1", EventType::Supplement),
    brand("thorne", "Thorne", EventType::Supplement),
    brand("nature made", "Nature Made", EventType::Supplement),
    brand("now foods", "NOW Foods", EventType::Supplement),
    brand("garden of life", "Garden of Life", EventType::Supplement),
    brand("nordic naturals", "Nordic Naturals", EventType::Supplement),
    brand("pure encapsulations", "Pure Encapsulations", EventType::Supplement),
    brand("life extension", "Life Extension", EventType::Supplement),
    brand("jarrow", "Jarrow Formulas", EventType::Supplement),
    brand("momentous", "Momentous", EventType::Supplement),
    brand("optimum nutrition", "Optimum Nutrition", EventType::Supplement),
    brand("tylenol", "Tylenol", EventType::Medication),
    brand("advil", "Advil", EventType::Medication),
    brand("motrin", "Motrin", EventType::Medication),
    brand("aleve", "Aleve", EventType::Medication),
    brand("claritin", "Claritin", EventType::Medication),
    brand("zyrtec", "Zyrtec", EventType::Medication),
    brand("benadryl", "Benadryl", EventType::Medication),
    brand("pepcid", "Pepcid", EventType::Medication),
];

/// First known brand found as a case-insensitive substring of `text`.
pub fn detect_brand(text: &str) -> Option<&'static KnownBrand> {
    let haystack = text.to_lowercase();
    if haystack.trim().is_empty() {
        return None;
    }
    KNOWN_BRANDS
        .iter()
        .find(|known| haystack.contains(known.token))
}

/// First known brand whose token appears as whole words in `text`, so
/// "thorne" is found in "Thorne magnesium" but not in "hawthorne tea".
pub fn detect_brand_words(text: &str) -> Option<&'static KnownBrand> {
    let key = normalize_product_key(text);
    if key.is_empty() {
        return None;
    }
    let padded = format!(" {key} ");
    KNOWN_BRANDS
        .iter()
        .find(|known| padded.contains(&format!(" {} ", known.token)))
}

/// Like [`detect_brand_words`] but also sees through sound-alike spellings, so
/// "citrus element" resolves to LMNT.
pub fn detect_brand_phonetic(text: &str) -> Option<&'static KnownBrand> {
    detect_brand_words(text).or_else(|| {
        let canonical = canonicalize_key(&normalize_product_key(text)).join(" ");
        detect_brand_words(&canonical)
    })
}

#[cfg(test)]
mod tests {
    use super::{detect_brand, detect_brand_phonetic, detect_brand_words};
    use crate::models::EventType;

    #[test]
    fn brand_detection_is_case_insensitive_substring() {
        let found = detect_brand("Citrus Salt LMNT Drink Mix").expect("lmnt is a known brand");
        assert_eq!(found.display, "LMNT");
        assert_eq!(found.event_type, EventType::Supplement);

        assert_eq!(
            detect_brand("extra strength TYLENOL").map(|b| b.event_type),
            Some(EventType::Medication)
        );
        assert!(detect_brand("Vitamin D").is_none());
        assert!(detect_brand("").is_none());
    }

    #[test]
    fn phonetic_detection_resolves_sound_alikes() {
        assert!(detect_brand("citrus element").is_none());
        assert_eq!(
            detect_brand_phonetic("citrus element").map(|b| b.display),
            Some("LMNT")
        );
    }

    #[test]
    fn word_detection_ignores_brands_buried_inside_other_words() {
        assert_eq!(
            detect_brand_words("Thorne Magnesium Bisglycinate").map(|b| b.display),
            Some("Thorne")
        );
        assert_eq!(
            detect_brand_words("Liquid I.V. hydration multiplier").map(|b| b.display),
            Some("Liquid I.V.")
        );
        assert!(detect_brand_words("hawthorne berry tea").is_none());
        assert!(detect_brand_phonetic("hawthorne berry tea").is_none());
        assert!(detect_brand_words("kirkland rotisserie chicken").is_none());
    }
}
