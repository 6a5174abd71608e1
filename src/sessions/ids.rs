//! Merchant, session and thread identifiers.

use super::error::{Result, SessionError};
use chrono::{DateTime, Utc};
use regex::Regex;
use std::sync::OnceLock;

/// Prefix every stored merchant id carries.
pub const MERCHANT_PREFIX: &str = "mch_";

const SESSION_PREFIX: &str = "ses_";
const SESSION_SUFFIX_LEN: usize = 8;

/// Extraction patterns, most explicit first. The first match wins.
///
/// The bare `m<digits>` form must stand alone as a word, so "form1099" or
/// "premium2" are not read as merchant ids.
const MERCHANT_PATTERNS: [&str; 4] = [
    r"(?i)mch_(\d+)",
    r"(?i)merchant\s+id\s+(\d+)",
    r"(?i)merchant\s+(\d+)",
    r"(?i)\bm(\d+)\b",
];

static MERCHANT_REGEXES: OnceLock<[Regex; 4]> = OnceLock::new();

fn merchant_regexes() -> &'static [Regex; 4] {
    MERCHANT_REGEXES.get_or_init(|| {
        MERCHANT_PATTERNS
            .map(|pattern| Regex::new(pattern).expect("merchant id pattern compiles"))
    })
}

/// Prefix a merchant id with `mch_` unless it already carries the prefix.
///
/// Idempotent for every accepted input. Empty ids, ids containing
/// whitespace, and a bare `mch_` are rejected rather than repaired.
pub fn normalize_merchant_id(raw: &str) -> Result<String> {
    if raw.is_empty() {
        return Err(SessionError::invalid("merchant_id", "must not be empty"));
    }
    if raw.chars().any(char::is_whitespace) {
        return Err(SessionError::invalid(
            "merchant_id",
            format!("'{raw}' contains whitespace"),
        ));
    }
    if raw == MERCHANT_PREFIX {
        return Err(SessionError::invalid(
            "merchant_id",
            "prefix without an id",
        ));
    }

    if raw.starts_with(MERCHANT_PREFIX) {
        Ok(raw.to_string())
    } else {
        Ok(format!("{MERCHANT_PREFIX}{raw}"))
    }
}

/// Find a merchant id in free text.
///
/// Recognizes `mch_<digits>`, `merchant id <digits>`, `merchant <digits>`
/// and a standalone `m<digits>`, case-insensitively and in that priority
/// order.
pub fn extract_merchant_id(text: &str) -> Option<String> {
    merchant_regexes().iter().find_map(|re| {
        re.captures(text)
            .and_then(|caps| caps.get(1))
            .map(|digits| format!("{MERCHANT_PREFIX}{}", digits.as_str()))
    })
}

/// Generate a fresh session id: `ses_YYYYMMDD_HHMMSS_xxxxxxxx`.
pub fn generate_session_id() -> String {
    session_id_at(Utc::now())
}

/// Session id stamped with `now`; the suffix is random.
pub fn session_id_at(now: DateTime<Utc>) -> String {
    let suffix: String = uuid::Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(SESSION_SUFFIX_LEN)
        .collect();
    format!("{SESSION_PREFIX}{}_{suffix}", now.format("%Y%m%d_%H%M%S"))
}

/// Thread id correlating a session with the checkpoint store:
/// `merchant_<normalized merchant id>_YYYYMMDD_HHMMSS`.
pub fn generate_thread_id(merchant_id: &str, now: DateTime<Utc>) -> Result<String> {
    let merchant_id = normalize_merchant_id(merchant_id)?;
    Ok(format!(
        "merchant_{merchant_id}_{}",
        now.format("%Y%m%d_%H%M%S")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;
    use std::collections::HashSet;

    #[test]
    fn normalize_adds_prefix_once() {
        assert_eq!(normalize_merchant_id("789456").unwrap(), "mch_789456");
        assert_eq!(normalize_merchant_id("mch_789456").unwrap(), "mch_789456");
    }

    #[test]
    fn normalize_rejects_malformed_ids() {
        assert!(normalize_merchant_id("").is_err());
        assert!(normalize_merchant_id("mch_").is_err());
        assert!(normalize_merchant_id("78 94").is_err());
        assert!(normalize_merchant_id(" 789456").is_err());
    }

    #[test]
    fn extract_handles_all_supported_forms() {
        assert_eq!(
            extract_merchant_id("Check merchant 789456 status").as_deref(),
            Some("mch_789456")
        );
        assert_eq!(
            extract_merchant_id("mch_123 has issues").as_deref(),
            Some("mch_123")
        );
        assert_eq!(
            extract_merchant_id("merchant ID 123456").as_deref(),
            Some("mch_123456")
        );
        assert_eq!(
            extract_merchant_id("Look at m999888").as_deref(),
            Some("mch_999888")
        );
        assert_eq!(
            extract_merchant_id("MERCHANT 111222").as_deref(),
            Some("mch_111222")
        );
    }

    #[test]
    fn every_pattern_compiles_in_priority_order() {
        for pattern in MERCHANT_PATTERNS {
            assert!(Regex::new(pattern).is_ok(), "{pattern} should compile");
        }
        let compiled: Vec<&str> = merchant_regexes().iter().map(Regex::as_str).collect();
        assert_eq!(compiled, MERCHANT_PATTERNS);
    }

    #[test]
    fn bare_form_ignores_digits_inside_words() {
        assert_eq!(extract_merchant_id("Should they file a form1099 for last year?"), None);
        assert_eq!(extract_merchant_id("Is the premium2 plan a fit?"), None);
        assert_eq!(extract_merchant_id("Compare to platinum3 tier pricing"), None);
        assert_eq!(
            extract_merchant_id("Ticket about M42, please").as_deref(),
            Some("mch_42")
        );
    }

    #[test]
    fn extract_returns_none_without_a_match() {
        assert_eq!(extract_merchant_id("no merchant here"), None);
        assert_eq!(extract_merchant_id(""), None);
    }

    #[test]
    fn extract_prefers_explicit_prefix() {
        // Both forms are present; the explicit one is found first.
        assert_eq!(
            extract_merchant_id("merchant 555 vs mch_777").as_deref(),
            Some("mch_777")
        );
    }

    #[test]
    fn session_id_has_expected_shape() {
        let now = Utc.with_ymd_and_hms(2025, 1, 9, 14, 30, 22).unwrap();
        let id = session_id_at(now);
        let parts: Vec<&str> = id.split('_').collect();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0], "ses");
        assert_eq!(parts[1], "20250109");
        assert_eq!(parts[2], "143022");
        assert_eq!(parts[3].len(), 8);
    }

    #[test]
    fn session_ids_are_unique() {
        let ids: HashSet<String> = (0..1000).map(|_| generate_session_id()).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn thread_id_uses_normalized_merchant() {
        let now = Utc.with_ymd_and_hms(2025, 1, 9, 14, 30, 22).unwrap();
        assert_eq!(
            generate_thread_id("789456", now).unwrap(),
            "merchant_mch_789456_20250109_143022"
        );
        assert_eq!(
            generate_thread_id("mch_789456", now).unwrap(),
            "merchant_mch_789456_20250109_143022"
        );
        assert!(generate_thread_id("", now).is_err());
    }

    proptest! {
        #[test]
        fn normalize_is_idempotent(raw in "[A-Za-z0-9_]{1,24}") {
            if let Ok(once) = normalize_merchant_id(&raw) {
                let twice = normalize_merchant_id(&once).unwrap();
                prop_assert_eq!(once, twice);
            }
        }

        #[test]
        fn extracted_ids_are_already_normalized(digits in "[0-9]{1,12}") {
            let text = format!("please look at merchant {digits} today");
            let id = extract_merchant_id(&text).unwrap();
            prop_assert_eq!(normalize_merchant_id(&id).unwrap(), id.clone());
            prop_assert_eq!(id, format!("mch_{digits}"));
        }
    }
}
