//! Regex validation of miner-supplied fields (spec.md §3, §4.4, §6).

use once_cell::sync::Lazy;
use regex::Regex;

static LOGIN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^0x[0-9a-fA-F]{40}$").unwrap());
static WORKER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9a-zA-Z_-]{1,8}$").unwrap());
static NONCE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^0x[0-9a-f]{16}$").unwrap());
static HASH_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^0x[0-9a-f]{64}$").unwrap());

/// Validates and lowercases a login address; data model requires lowercase
/// 40-hex (spec.md §3).
pub fn validate_login(login: &str) -> Option<String> {
    LOGIN_RE.is_match(login).then(|| login.to_ascii_lowercase())
}

/// Sanitizes a worker id, defaulting to `"0"` when absent or invalid
/// (spec.md §4.6).
pub fn sanitize_worker(worker: Option<&str>) -> String {
    match worker {
        Some(w) if WORKER_RE.is_match(w) => w.to_string(),
        _ => "0".to_string(),
    }
}

pub fn is_valid_nonce(nonce: &str) -> bool {
    NONCE_RE.is_match(nonce)
}

pub fn is_valid_hash(hash: &str) -> bool {
    HASH_RE.is_match(hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_must_be_40_hex_and_is_lowercased() {
        assert_eq!(
            validate_login("0xABCDEF0123456789ABCDEF0123456789ABCDEF01"),
            Some("0xabcdef0123456789abcdef0123456789abcdef01".to_string())
        );
        assert!(validate_login("0xtooshort").is_none());
    }

    #[test]
    fn worker_falls_back_to_default() {
        assert_eq!(sanitize_worker(Some("rig-1")), "rig-1");
        assert_eq!(sanitize_worker(Some("has a space")), "0");
        assert_eq!(sanitize_worker(None), "0");
    }

    #[test]
    fn nonce_and_hash_formats() {
        assert!(is_valid_nonce("0x0123456789abcdef"));
        assert!(!is_valid_nonce("0x123"));
        assert!(is_valid_hash(&format!("0x{}", "a".repeat(64))));
        assert!(!is_valid_hash("0xbad"));
    }
}
