//! Recipe block extraction from assistant text.
//!
//! Two passes, in priority order:
//! 1. a fenced block explicitly tagged ```` ```json ````
//! 2. the first balanced top-level `{ ... }` object
//!
//! Finding nothing is the normal case for conversational turns.

use regex::Regex;
use std::sync::OnceLock;

const FENCED_PATTERN: &str = r"(?s)```json\s*(.*?)\s*```";

static FENCED: OnceLock<Option<Regex>> = OnceLock::new();

/// Result of scanning one assistant message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extraction<'a> {
    Fenced(&'a str),
    Bare(&'a str),
    NotFound,
}

impl<'a> Extraction<'a> {
    pub fn candidate(&self) -> Option<&'a str> {
        match self {
            Extraction::Fenced(s) | Extraction::Bare(s) => Some(s),
            Extraction::NotFound => None,
        }
    }

    pub fn is_found(&self) -> bool {
        !matches!(self, Extraction::NotFound)
    }
}

pub fn extract_recipe_block(text: &str) -> Extraction<'_> {
    if let Some(block) = find_fenced_json(text) {
        return Extraction::Fenced(block);
    }
    match find_bare_object(text) {
        Some(obj) => Extraction::Bare(obj),
        None => Extraction::NotFound,
    }
}

fn find_fenced_json(text: &str) -> Option<&str> {
    let re = FENCED
        .get_or_init(|| Regex::new(FENCED_PATTERN).ok())
        .as_ref()?;
    re.captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str())
        .find(|body| !body.is_empty())
}

/// Byte range of the first balanced `{ ... }`, honouring JSON string literals so
/// braces inside strings do not count.
fn find_bare_object(text: &str) -> Option<&str> {
    let mut search_from = 0;
    while let Some(offset) = text[search_from..].find('{') {
        let start = search_from + offset;
        if let Some(end) = balanced_end(&text[start..]) {
            return Some(&text[start..start + end]);
        }
        search_from = start + 1;
    }
    None
}

fn balanced_end(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in s.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i + c.len_utf8());
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOMATO: &str = "Sure! ```json\n{\"title\":\"Tomato Soup\",\"ingredients\":[{\"name\":\"tomato\",\"amount\":\"4\"}],\"instructions\":[\"Boil\",\"Blend\"]}\n```";

    #[test]
    fn test_fenced_block_isolates_inner_object() {
        match extract_recipe_block(TOMATO) {
            Extraction::Fenced(body) => {
                assert!(body.starts_with('{'));
                assert!(body.ends_with('}'));
                assert!(body.contains("Tomato Soup"));
            }
            other => panic!("expected fenced block, got {:?}", other),
        }
    }

    #[test]
    fn test_plain_conversation_finds_nothing() {
        let result = extract_recipe_block("I think chicken and rice would be great!");
        assert_eq!(result, Extraction::NotFound);
        assert!(result.candidate().is_none());
        assert!(!result.is_found());
    }

    #[test]
    fn test_fenced_wins_over_earlier_bare_object() {
        let text = "Options: {\"title\": \"decoy\"}\n```json\n{\"title\": \"real\"}\n```\nand {\"x\": 1}";
        assert_eq!(
            extract_recipe_block(text),
            Extraction::Fenced("{\"title\": \"real\"}")
        );
    }

    #[test]
    fn test_bare_object_fallback() {
        let text = "Here you go {\"title\": \"Rice\", \"notes\": {\"text\": \"a } brace\"}} enjoy";
        assert_eq!(
            extract_recipe_block(text),
            Extraction::Bare("{\"title\": \"Rice\", \"notes\": {\"text\": \"a } brace\"}}")
        );
    }

    #[test]
    fn test_bare_object_skips_unbalanced_prefix() {
        let text = "a { stray brace then {\"ok\": true}";
        // The stray brace never closes, so the scan moves on to the next one.
        let found = extract_recipe_block(text);
        assert!(found.is_found());
        assert!(found.candidate().unwrap().ends_with("true}"));
    }

    #[test]
    fn test_untagged_fence_is_not_fenced_json() {
        let text = "```\n{\"title\": \"Plain fence\"}\n```";
        assert_eq!(
            extract_recipe_block(text),
            Extraction::Bare("{\"title\": \"Plain fence\"}")
        );
    }

    #[test]
    fn test_escaped_quote_inside_string() {
        let text = r#"{"title": "Say \"hi\" {"}"#;
        assert_eq!(extract_recipe_block(text), Extraction::Bare(text));
    }
}
