/// Keyword → emoji pairs. Order matters: the first keyword found in the title wins.
const EMOJI_TABLE: &[(&str, &str)] = &[
    ("bowl", "🥗"),
    ("salad", "🥗"),
    ("chicken", "🍗"),
    ("beef", "🥩"),
    ("fish", "🐟"),
    ("salmon", "🍣"),
    ("pasta", "🍝"),
    ("rice", "🍚"),
    ("quinoa", "🌾"),
    ("soup", "🍲"),
    ("stir", "🥘"),
    ("burrito", "🌯"),
    ("wrap", "🌯"),
    ("sandwich", "🥪"),
    ("pizza", "🍕"),
    ("burger", "🍔"),
    ("taco", "🌮"),
    ("curry", "🍛"),
    ("noodle", "🍜"),
    ("egg", "🥚"),
    ("avocado", "🥑"),
    ("smoothie", "🥤"),
    ("yogurt", "🥣"),
];

pub const DEFAULT_EMOJI: &str = "🍽️";

pub fn emoji_for_title(title: &str) -> &'static str {
    let lower = title.to_lowercase();
    EMOJI_TABLE
        .iter()
        .find(|(keyword, _)| lower.contains(keyword))
        .map(|(_, emoji)| *emoji)
        .unwrap_or(DEFAULT_EMOJI)
}

/// Keep a non-blank emoji the model supplied, otherwise derive one from the title.
pub fn resolve_emoji(supplied: Option<&str>, title: &str) -> String {
    match supplied.map(str::trim) {
        Some(e) if !e.is_empty() => e.to_string(),
        _ => emoji_for_title(title).to_string(),
    }
}
