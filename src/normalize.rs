use regex::Regex;

lazy_static! {
    static ref WORD_START: Regex = Regex::new(r"(.)([A-Z][a-z]+)").unwrap();
    static ref LOWER_UPPER: Regex = Regex::new(r"([a-z0-9])([A-Z])").unwrap();
}

/// Converts an upstream camelCase identifier into a snake_case metric name.
///
/// Runs of capitals are treated as one word whose last letter begins the next
/// word, so `consecutiveUPPERCase` becomes `consecutive_upper_case`.
pub fn camel_to_snake(identifier: &str) -> String {
    let words = WORD_START.replace_all(identifier, "${1}_${2}");
    LOWER_UPPER
        .replace_all(&words, "${1}_${2}")
        .to_lowercase()
}
