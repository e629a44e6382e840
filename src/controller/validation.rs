//! # Validation
//!
//! Checks a KeychainSecret at the boundary, before any command runs. The CRD
//! schema already enforces these rules at admission, so failures here mean
//! the schema was bypassed or is out of date.

use crate::crd::KEYCHAIN_NAME_PATTERN;
use regex::Regex;
use std::sync::LazyLock;
use std::time::Duration;
use thiserror::Error;

static KEYCHAIN_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(KEYCHAIN_NAME_PATTERN).expect("keychain name regex is valid"));

// Same language as TTL_PATTERN, with named groups
static TTL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<number>[0-9]+)(?P<unit>[smh])$").expect("ttl regex is valid")
});

/// Maximum length of a Keychain secret or group name
pub const MAX_KEYCHAIN_NAME_LEN: usize = 150;

/// A KeychainSecret field that does not satisfy the schema
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid ttl '{value}': {reason}")]
    InvalidTtl { value: String, reason: &'static str },
    #[error("invalid {field} '{value}': {reason}")]
    InvalidName {
        field: &'static str,
        value: String,
        reason: &'static str,
    },
    #[error("resource has no namespace")]
    MissingNamespace,
}

/// Parse a TTL such as "30s", "15m" or "24h" into a positive duration
///
/// # Errors
///
/// Returns [`ValidationError::InvalidTtl`] if the string does not match
/// `^[0-9]+[smh]$`, is zero, or overflows.
pub fn parse_ttl(ttl: &str) -> Result<Duration, ValidationError> {
    let invalid = |reason| ValidationError::InvalidTtl {
        value: ttl.to_string(),
        reason,
    };

    let captures = TTL
        .captures(ttl)
        .ok_or_else(|| invalid("expected <number><unit> with unit s, m or h"))?;
    let number: u64 = captures["number"]
        .parse()
        .map_err(|_| invalid("number is out of range"))?;
    if number == 0 {
        return Err(invalid("ttl must be greater than zero"));
    }

    let multiplier = match &captures["unit"] {
        "s" => 1,
        "m" => 60,
        _ => 3600,
    };
    number
        .checked_mul(multiplier)
        .map(Duration::from_secs)
        .ok_or_else(|| invalid("number is out of range"))
}

/// Validate a Keychain secret or group name
///
/// # Errors
///
/// Returns [`ValidationError::InvalidName`] if the name is empty, too long,
/// or contains characters outside `[A-Z0-9_]`.
pub fn validate_keychain_name(field: &'static str, value: &str) -> Result<(), ValidationError> {
    let invalid = |reason| ValidationError::InvalidName {
        field,
        value: value.to_string(),
        reason,
    };

    if value.is_empty() || value.len() > MAX_KEYCHAIN_NAME_LEN {
        return Err(invalid("length must be between 1 and 150"));
    }
    if !KEYCHAIN_NAME.is_match(value) {
        return Err(invalid("only A-Z, 0-9 and _ are allowed"));
    }
    Ok(())
}

/// Name of the Kubernetes Secret holding the Keychain secret `name`
///
/// Keychain names are upper-case with underscores, which Kubernetes object
/// names do not allow: letters are lower-cased and `_` becomes `-`.
/// The mapping is one-to-one over valid Keychain names.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidName`] if the result would start or end
/// with `-`, which Kubernetes rejects.
pub fn managed_secret_name(name: &str) -> Result<String, ValidationError> {
    let object_name: String = name
        .chars()
        .map(|c| if c == '_' { '-' } else { c.to_ascii_lowercase() })
        .collect();
    if object_name.starts_with('-') || object_name.ends_with('-') {
        return Err(ValidationError::InvalidName {
            field: "name",
            value: name.to_string(),
            reason: "must start and end with a letter or digit",
        });
    }
    Ok(object_name)
}
