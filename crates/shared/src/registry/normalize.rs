/// Canonical product key: lowercase, punctuation dropped, single spaces, trimmed.
///
/// Apostrophes vanish without leaving a gap ("trader joe's" -> "trader joes"),
/// every other punctuation mark separates words ("l-theanine" -> "l theanine").
/// Runs of two or more single letters are spelled-out acronyms and are joined
/// ("L.M.N.T." -> "lmnt").
pub fn normalize_product_key(text: &str) -> String {
    let mut cleaned = String::with_capacity(text.len());
    for ch in text.chars() {
        if ch.is_alphanumeric() {
            cleaned.extend(ch.to_lowercase());
        } else if ch == '\'' || ch == '\u{2019}' {
            continue;
        } else {
            cleaned.push(' ');
        }
    }

    let mut tokens: Vec<String> = Vec::new();
    let mut letter_run = String::new();
    for token in cleaned.split_whitespace() {
        if is_single_letter(token) {
            letter_run.push_str(token);
            continue;
        }
        flush_letter_run(&mut letter_run, &mut tokens);
        tokens.push(token.to_string());
    }
    flush_letter_run(&mut letter_run, &mut tokens);

    tokens.join(" ")
}

pub fn key_tokens(key: &str) -> Vec<&str> {
    key.split(' ').filter(|token| !token.is_empty()).collect()
}

fn is_single_letter(token: &str) -> bool {
    let mut chars = token.chars();
    matches!((chars.next(), chars.next()), (Some(ch), None) if ch.is_alphabetic())
}

fn flush_letter_run(run: &mut String, tokens: &mut Vec<String>) {
    if !run.is_empty() {
        tokens.push(std::mem::take(run));
    }
}

#[cfg(test)]
mod tests {
    use super::normalize_product_key;

    #[test]
    fn lowercases_strips_punctuation_and_collapses_whitespace() {
        assert_eq!(normalize_product_key("  Citrus   LMNT!! "), "citrus lmnt");
        assert_eq!(
            normalize_product_key("Trader Joe's\tGreek-Yogurt"),
            "trader joes greek yogurt"
        );
    }

    #[test]
    fn joins_spelled_out_acronyms_but_keeps_lone_letters() {
        assert_eq!(normalize_product_key("L.M.N.T. Citrus"), "lmnt citrus");
        assert_eq!(normalize_product_key("Vitamin D"), "vitamin d");
        assert_eq!(normalize_product_key("vitamin b-12"), "vitamin b 12");
    }

    #[test]
    fn empty_and_symbol_only_input_yield_empty_key() {
        assert_eq!(normalize_product_key(""), "");
        assert_eq!(normalize_product_key(" ?!. "), "");
    }
}
