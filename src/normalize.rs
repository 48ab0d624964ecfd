//! Canonical forms for attribute values, so textual variants of the same
//! fact correlate with each other.

use crate::error::StoreError;
use crate::model::AttributeType;
use regex::Regex;
use std::sync::OnceLock;

static HASH_RE: OnceLock<Regex> = OnceLock::new();
static DOMAIN_RE: OnceLock<Regex> = OnceLock::new();
static IPV4_RE: OnceLock<Regex> = OnceLock::new();
static EMAIL_RE: OnceLock<Regex> = OnceLock::new();
static MAC_RE: OnceLock<Regex> = OnceLock::new();

fn hash_re() -> &'static Regex {
    HASH_RE.get_or_init(|| Regex::new(r"^(?:[0-9a-f]{32}|[0-9a-f]{64})$").unwrap())
}

fn domain_re() -> &'static Regex {
    DOMAIN_RE.get_or_init(|| {
        Regex::new(r"^(?:[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?\.)+[a-z][a-z0-9-]{0,62}$").unwrap()
    })
}

fn ipv4_re() -> &'static Regex {
    IPV4_RE.get_or_init(|| Regex::new(r"^(?:\d{1,3}\.){3}\d{1,3}$").unwrap())
}

fn email_re() -> &'static Regex {
    EMAIL_RE.get_or_init(|| {
        Regex::new(r"^[a-z0-9._%+\-]+@(?:[a-z0-9](?:[a-z0-9-]*[a-z0-9])?\.)+[a-z]{2,}$").unwrap()
    })
}

fn mac_re() -> &'static Regex {
    MAC_RE.get_or_init(|| Regex::new(r"^[0-9a-f]{12}$").unwrap())
}

/// Normalize `value` for `attribute_type`, rejecting values that can never
/// correlate (empty, malformed digests, ...).
pub fn normalize(attribute_type: AttributeType, value: &str) -> Result<String, StoreError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(invalid(attribute_type, value, "value is empty"));
    }

    match attribute_type {
        AttributeType::Files => {
            let lower = trimmed.to_lowercase();
            if hash_re().is_match(&lower) {
                Ok(lower)
            } else {
                Err(invalid(attribute_type, value, "expected an MD5 or SHA-256 hex digest"))
            }
        }
        AttributeType::Domain => {
            let lower = trimmed.trim_end_matches('.').to_lowercase();
            if ipv4_re().is_match(&lower) {
                let octets_ok = lower.split('.').all(|o| o.parse::<u8>().is_ok());
                if octets_ok {
                    return Ok(lower);
                }
                return Err(invalid(attribute_type, value, "IPv4 octet out of range"));
            }
            if domain_re().is_match(&lower) {
                Ok(lower)
            } else {
                Err(invalid(attribute_type, value, "not a valid domain name"))
            }
        }
        AttributeType::Email => {
            let lower = trimmed.to_lowercase();
            if email_re().is_match(&lower) {
                Ok(lower)
            } else {
                Err(invalid(attribute_type, value, "not a valid email address"))
            }
        }
        AttributeType::Phone => {
            let mut out = String::with_capacity(trimmed.len());
            for (i, c) in trimmed.chars().enumerate() {
                if c.is_ascii_digit() || (c == '+' && i == 0) {
                    out.push(c);
                }
            }
            let digits = out.trim_start_matches('+').len();
            if (5..=20).contains(&digits) {
                Ok(out)
            } else {
                Err(invalid(attribute_type, value, "phone numbers need 5 to 20 digits"))
            }
        }
        AttributeType::UsbDevice => Ok(trimmed.to_lowercase()),
        AttributeType::WirelessNetwork => Ok(trimmed.to_string()),
        AttributeType::MacAddress => {
            let stripped: String = trimmed
                .chars()
                .filter(|c| !matches!(c, ':' | '-' | '.'))
                .collect::<String>()
                .to_lowercase();
            if mac_re().is_match(&stripped) {
                Ok(stripped)
            } else {
                Err(invalid(attribute_type, value, "expected 12 hex digits"))
            }
        }
        AttributeType::Imei => digits_only(attribute_type, value, trimmed, 14..=16),
        AttributeType::Imsi => digits_only(attribute_type, value, trimmed, 14..=15),
        AttributeType::Iccid => digits_only(attribute_type, value, trimmed, 18..=22),
    }
}

fn digits_only(
    attribute_type: AttributeType,
    original: &str,
    trimmed: &str,
    len: std::ops::RangeInclusive<usize>,
) -> Result<String, StoreError> {
    let digits: String = trimmed.chars().filter(|c| !matches!(c, ' ' | '-')).collect();
    if digits.chars().all(|c| c.is_ascii_digit()) && len.contains(&digits.len()) {
        Ok(digits)
    } else {
        Err(invalid(
            attribute_type,
            original,
            &format!("expected {} to {} digits", len.start(), len.end()),
        ))
    }
}

fn invalid(attribute_type: AttributeType, value: &str, reason: &str) -> StoreError {
    StoreError::InvalidValue {
        attribute_type,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}
