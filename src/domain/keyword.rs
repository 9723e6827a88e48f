//! Topic keyword normalization.
//!
//! A keyword is the primary key for every record the engine keeps, so two
//! spellings that only differ in surrounding or repeated whitespace must map to
//! the same topic.

use super::error::DomainError;

const MAX_KEYWORD_CHARS: usize = 200;

/// Normalize a reader-supplied topic keyword.
pub fn normalize_keyword(raw: &str) -> Result<String, DomainError> {
    let normalized = raw.split_whitespace().collect::<Vec<_>>().join(" ");

    if normalized.is_empty() {
        return Err(DomainError::validation("topic keyword must not be empty"));
    }

    if normalized.chars().count() > MAX_KEYWORD_CHARS {
        return Err(DomainError::validation(format!(
            "topic keyword exceeds {MAX_KEYWORD_CHARS} characters"
        )));
    }

    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_whitespace() {
        assert_eq!(
            normalize_keyword("  haci   murat \t").expect("valid keyword"),
            "haci murat"
        );
    }

    #[test]
    fn keeps_non_ascii_text() {
        assert_eq!(
            normalize_keyword("ekşi sözlük").expect("valid keyword"),
            "ekşi sözlük"
        );
    }

    #[test]
    fn rejects_blank_input() {
        assert!(matches!(
            normalize_keyword("   "),
            Err(DomainError::Validation { .. })
        ));
    }

    #[test]
    fn rejects_overlong_input() {
        let raw = "ş".repeat(MAX_KEYWORD_CHARS + 1);
        assert!(normalize_keyword(&raw).is_err());

        let raw = "ş".repeat(MAX_KEYWORD_CHARS);
        assert!(normalize_keyword(&raw).is_ok());
    }
}
