//! Syntactic checks for email addresses. No I/O happens here.

use once_cell::sync::Lazy;
use regex::Regex;

pub(crate) const MAX_LOCAL_PART_LEN: usize = 64;
pub(crate) const MAX_DOMAIN_LEN: usize = 255;

static EMAIL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?)+$",
    )
    .expect("Email regex pattern failed to compile. This is a bug.")
});

/// An address that passed the format stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedAddress {
    pub address: String,
    /// Lowercased domain.
    pub domain: String,
}

/// Checks `raw` against the length caps and the address grammar.
///
/// The error is the human-readable failure reason.
pub(crate) fn parse_address(raw: &str) -> Result<ParsedAddress, String> {
    let trimmed = raw.trim();
    let Some((local, domain)) = trimmed.rsplit_once('@') else {
        return Err("Invalid email format".to_string());
    };
    if local.len() > MAX_LOCAL_PART_LEN {
        return Err(format!(
            "Local part exceeds {} characters",
            MAX_LOCAL_PART_LEN
        ));
    }
    if domain.len() > MAX_DOMAIN_LEN {
        return Err(format!("Domain exceeds {} characters", MAX_DOMAIN_LEN));
    }
    if !EMAIL_REGEX.is_match(trimmed)
        || local.starts_with('.')
        || local.ends_with('.')
        || local.contains("..")
    {
        return Err("Invalid email format".to_string());
    }
    Ok(ParsedAddress {
        address: trimmed.to_string(),
        domain: domain.to_ascii_lowercase(),
    })
}
