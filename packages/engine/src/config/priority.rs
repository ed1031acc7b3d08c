//! Cipher/protocol priority strings
//!
//! The engine owns the real interpretation of a priority string. Only the
//! shape is checked at load time.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::errors::ConfigError;

static BASE_KEYWORD: Lazy<Result<Regex, regex::Error>> = Lazy::new(|| {
    Regex::new(r"^(?:NONE|NORMAL|PERFORMANCE|EXPORT|LEGACY|SECURE(?:128|192|256)?|SUITEB(?:128|192)|PFS)$")
});

static MODIFIER: Lazy<Result<Regex, regex::Error>> =
    Lazy::new(|| Regex::new(r"^(?:[+\-!][A-Z0-9][A-Z0-9._\-]*|%[A-Z0-9_]+)$"));

fn matches(pattern: &Lazy<Result<Regex, regex::Error>>, token: &str) -> bool {
    Lazy::force(pattern).as_ref().is_ok_and(|re| re.is_match(token))
}

/// Parsed, validated priority policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriorityPolicy {
    raw: String,
    base: String,
    modifiers: Vec<String>,
}

impl PriorityPolicy {
    /// Parse a colon separated priority string such as `NORMAL:-VERS-TLS1.0:%COMPAT`.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let mut tokens = raw.trim().split(':');
        let base = tokens.next().unwrap_or_default().to_ascii_uppercase();
        if !matches(&BASE_KEYWORD, &base) {
            return Err(ConfigError::PrioritySyntax(base));
        }

        let mut modifiers = Vec::new();
        for token in tokens {
            let token = token.trim().to_ascii_uppercase();
            if !matches(&MODIFIER, &token) {
                return Err(ConfigError::PrioritySyntax(token));
            }
            modifiers.push(token);
        }

        Ok(Self {
            raw: raw.trim().to_string(),
            base,
            modifiers,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn modifiers(&self) -> &[String] {
        &self.modifiers
    }
}
