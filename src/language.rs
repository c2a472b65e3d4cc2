//! Language code resolution.
//!
//! Hosts often identify languages with their own upper-case tags; the engine
//! expects lower-case ISO 639-1 codes or "auto".

use crate::defaults::AUTO_LANGUAGE;

/// Host tags that do not map to a code by lower-casing.
const HOST_ALIASES: &[(&str, &str)] = &[("CN", "zh"), ("BR - PT", "pt"), ("BR-PT", "pt")];

/// Resolve a user-supplied language into an engine code.
///
/// Accepts "auto" (any case), two-letter codes in either case and the host
/// aliases above. Returns `None` for anything else.
pub fn resolve_language(input: &str) -> Option<String> {
    let trimmed = input.trim();
    if trimmed.eq_ignore_ascii_case(AUTO_LANGUAGE) {
        return Some(AUTO_LANGUAGE.to_string());
    }

    if let Some((_, code)) = HOST_ALIASES
        .iter()
        .find(|(alias, _)| alias.eq_ignore_ascii_case(trimmed))
    {
        return Some(code.to_string());
    }

    if trimmed.len() == 2 && trimmed.chars().all(|c| c.is_ascii_alphabetic()) {
        return Some(trimmed.to_ascii_lowercase());
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_codes_map_to_engine_codes() {
        let cases = [
            ("EN", "en"),
            ("RU", "ru"),
            ("CN", "zh"),
            ("IT", "it"),
            ("DE", "de"),
            ("FR", "fr"),
            ("ES", "es"),
            ("PT", "pt"),
            ("BR - PT", "pt"),
            ("PL", "pl"),
            ("TR", "tr"),
        ];
        for (input, expected) in cases {
            assert_eq!(resolve_language(input).as_deref(), Some(expected), "{input}");
        }
    }

    #[test]
    fn auto_and_lowercase_codes_pass_through() {
        assert_eq!(resolve_language("auto").as_deref(), Some("auto"));
        assert_eq!(resolve_language("AUTO").as_deref(), Some("auto"));
        assert_eq!(resolve_language("ja").as_deref(), Some("ja"));
        assert_eq!(resolve_language(" uk ").as_deref(), Some("uk"));
    }

    #[test]
    fn unknown_values_are_rejected() {
        assert_eq!(resolve_language(""), None);
        assert_eq!(resolve_language("english"), None);
        assert_eq!(resolve_language("e1"), None);
        assert_eq!(resolve_language("日本"), None);
    }
}
