//! Small shared helpers: naming rules, id generation, passwords.

use std::sync::OnceLock;

use rand::seq::SliceRandom;
use rand::Rng;
use regex::Regex;

use crate::error::{CoreError, Result};

/// Resource-name rule: starts with a letter, continues with letters, digits
/// and hyphens, does not end with a hyphen. A single letter is valid.
pub fn check_name(name: &str) -> Result<()> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"^[a-zA-Z]([a-zA-Z0-9-]*[a-zA-Z0-9])?$").expect("name regex")
    });

    if name.is_empty() {
        return Err(CoreError::Validation("name must not be empty".into()));
    }
    if !re.is_match(name) {
        return Err(CoreError::Validation(format!(
            "name '{}' must start with a letter, contain only letters, digits and '-', and not end with '-'",
            name
        )));
    }
    Ok(())
}

/// New opaque entity uuid. Never reused; the v4 space is the guarantee.
pub fn new_uuid() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Sanitize a CSP-native name (which may carry `.`/`_`) into the local id
/// alphabet. Used for ids derived from broker catalogs, not for user input.
pub fn sanitize_id(raw: &str) -> String {
    let mut out: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect();
    while out.ends_with('-') {
        out.pop();
    }
    if out.is_empty() || !out.chars().next().is_some_and(|c| c.is_ascii_alphabetic()) {
        out = format!("r-{}", out);
    }
    out
}

/// Generate a random password with at least one character of each class.
/// Lengths below 8 are raised to 8 so the guarantee always holds.
pub fn gen_random_password(length: usize) -> String {
    const LOWER: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
    const UPPER: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
    const DIGIT: &[u8] = b"0123456789";
    const SYMBOL: &[u8] = b"!@#$%^&*-_=+";

    let length = length.max(8);
    let mut rng = rand::thread_rng();

    let mut chars: Vec<u8> = vec![
        LOWER[rng.gen_range(0..LOWER.len())],
        UPPER[rng.gen_range(0..UPPER.len())],
        DIGIT[rng.gen_range(0..DIGIT.len())],
        SYMBOL[rng.gen_range(0..SYMBOL.len())],
    ];

    let all: Vec<u8> = [LOWER, UPPER, DIGIT, SYMBOL].concat();
    while chars.len() < length {
        chars.push(all[rng.gen_range(0..all.len())]);
    }
    chars.shuffle(&mut rng);

    String::from_utf8(chars).expect("ascii password")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_name_boundaries() {
        assert!(check_name("a").is_ok());
        assert!(check_name("a--b").is_ok());
        assert!(check_name("vnet-01").is_ok());

        assert!(check_name("").is_err());
        assert!(check_name("1a").is_err());
        assert!(check_name("a-").is_err());
        assert!(check_name("a+b").is_err());
        assert!(check_name("-a").is_err());
    }

    #[test]
    fn test_sanitize_id() {
        assert_eq!(sanitize_id("t2.micro"), "t2-micro");
        assert_eq!(sanitize_id("ubuntu_22.04"), "ubuntu-22-04");
        assert_eq!(sanitize_id("9micro"), "r-9micro");
    }

    #[test]
    fn test_gen_random_password_classes() {
        for len in [0, 4, 8, 24] {
            let pw = gen_random_password(len);
            assert!(pw.len() >= 8);
            assert!(pw.chars().any(|c| c.is_ascii_lowercase()));
            assert!(pw.chars().any(|c| c.is_ascii_uppercase()));
            assert!(pw.chars().any(|c| c.is_ascii_digit()));
            assert!(pw.chars().any(|c| !c.is_ascii_alphanumeric()));
        }
    }

    #[test]
    fn test_new_uuid_is_unique() {
        assert_ne!(new_uuid(), new_uuid());
    }
}
