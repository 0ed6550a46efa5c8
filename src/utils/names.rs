//! Name cleaning for uploaded rows.

/// Keeps letters, whitespace, apostrophes and hyphens, collapses whitespace and title-cases.
pub fn clean_name(value: &str) -> String {
    let kept: String = value
        .chars()
        .filter(|c| c.is_ascii_alphabetic() || c.is_whitespace() || *c == '\'' || *c == '-')
        .collect();
    kept.split_whitespace()
        .map(title_case_word)
        .collect::<Vec<_>>()
        .join(" ")
}

fn title_case_word(word: &str) -> String {
    let lower = word.to_lowercase();
    let mut chars = lower.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn tokens(value: &str) -> impl Iterator<Item = &str> {
    value
        .split(|c: char| c == '-' || c.is_whitespace())
        .filter(|t| !t.is_empty())
}

/// First token of a cleaned name ("Mary-Ann Smith" -> "Mary").
pub fn first_token(value: &str) -> String {
    tokens(value).next().unwrap_or_default().to_string()
}

/// Last token of a cleaned name ("de la Cruz" -> "Cruz").
pub fn last_token(value: &str) -> String {
    tokens(value).last().unwrap_or_default().to_string()
}
