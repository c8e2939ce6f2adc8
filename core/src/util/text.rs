/// First character upper-cased, rest lower-cased.
fn title_word(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// `"Cholera outbreak"` -> `"CholeraOutbreak"`. Used to turn display
/// names into summary-tree keys.
pub fn title_camel_case(name: &str) -> String {
    name.split_whitespace().map(title_word).collect()
}

/// `"amount_requested"` -> `"amountRequested"`. Output documents use
/// camelCase field names regardless of the upstream convention.
pub fn snake_to_camel(name: &str) -> String {
    let mut parts = name.split('_');
    let mut out = String::new();
    if let Some(first) = parts.next() {
        out.push_str(first);
    }
    for part in parts {
        out.push_str(&title_word(part));
    }
    out
}

/// Document titles become file names; strip the characters that would
/// break a path and collapse runs of whitespace.
pub fn sanitize_filename(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '-',
            other => other,
        })
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}
