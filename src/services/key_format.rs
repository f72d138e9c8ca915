/// Literal prefix every license key starts with
pub const KEY_PREFIX: &str = "Moon-";

/// Number of characters after the prefix
pub const KEY_BODY_LEN: usize = 8;

/// Checks that `candidate` is exactly `Moon-` followed by 8 characters from `[A-Z0-9]`.
pub fn is_valid_key(candidate: &str) -> bool {
    let Some(body) = candidate.strip_prefix(KEY_PREFIX) else {
        return false;
    };

    body.len() == KEY_BODY_LEN
        && body
            .bytes()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_well_formed_keys() {
        assert!(is_valid_key("Moon-AB12CD34"));
        assert!(is_valid_key("Moon-00000000"));
        assert!(is_valid_key("Moon-ZZZZZZZZ"));
    }

    #[test]
    fn test_rejects_wrong_case() {
        assert!(!is_valid_key("moon-ab12cd34"));
        assert!(!is_valid_key("Moon-ab12cd34"));
        assert!(!is_valid_key("MOON-AB12CD34"));
    }

    #[test]
    fn test_rejects_wrong_length() {
        assert!(!is_valid_key("Moon-AB12CD3"));
        assert!(!is_valid_key("Moon-AB12CD345"));
        assert!(!is_valid_key("Moon-"));
        assert!(!is_valid_key(""));
    }

    #[test]
    fn test_is_fully_anchored() {
        assert!(!is_valid_key(" Moon-AB12CD34"));
        assert!(!is_valid_key("Moon-AB12CD34 "));
        assert!(!is_valid_key("xMoon-AB12CD34"));
        assert!(!is_valid_key("Moon-AB12CD34\n"));
    }

    #[test]
    fn test_rejects_non_ascii_lookalikes() {
        // Fullwidth digits and letters have multi-byte encodings
        assert!(!is_valid_key("Moon-ＡB12CD3"));
        assert!(!is_valid_key("Moon-AB12CD3É"));
        assert!(!is_valid_key("Moon-AB-2CD34"));
    }
}
