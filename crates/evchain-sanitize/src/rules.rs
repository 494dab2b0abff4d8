//! Secret and PII detection rules.
//!
//! A string is *sensitive* when any rule matches anywhere inside it. The
//! built-in rule set covers:
//!
//! - credential shapes: `sk-` keys, AWS `AKIA` ids, Google `AIza` keys,
//!   GitHub and Slack tokens, PEM private-key headers, bearer tokens
//! - requests for secrets ("paste your api key", "share your .env", ...)
//! - PII: e-mail addresses, US SSNs, phone numbers, payment-card digit runs
//! - seed phrases: 12 to 24 lowercase words and nothing else
//! - high-entropy tokens mixing upper case, lower case, and digits
//!
//! Operators can add patterns through `SanitizerConfig::extra_secret_patterns`.

use regex::Regex;

use evchain_contracts::error::{EvchainError, EvchainResult};
use evchain_core::config::SanitizerConfig;

const SECRET_VALUE_PATTERNS: &[&str] = &[
    r"\bsk-[A-Za-z0-9_\-]{16,}",
    r"\bAKIA[0-9A-Z]{16}\b",
    r"\bAIza[0-9A-Za-z\-_]{20,}",
    r"-----BEGIN (?:[A-Z]+ )*PRIVATE KEY-----",
    r"-----BEGIN (?:RSA|EC|OPENSSH|DSA) KEY-----",
    r"\bgh[pousr]_[A-Za-z0-9]{36,}",
    r"\bgithub_pat_[A-Za-z0-9_]{22,}",
    r"\bxox[abprs]-[A-Za-z0-9\-]{10,}",
    r"(?i)\bbearer\s+[A-Za-z0-9\-._~+/]{20,}",
];

const SECRET_REQUEST_PATTERNS: &[&str] = &[
    r"(?i)paste\s+your\s+(?:api\s*key|token|private\s*key|seed\s*phrase)",
    r"(?i)share\s+your\s+\.env",
    r"(?i)copy\s+your\s+credentials?\s+here",
];

const PII_PATTERNS: &[&str] = &[
    r"[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}",
    r"\b\d{3}-\d{2}-\d{4}\b",
    r"(?:\+\d{1,3}[\s.\-]?)?\(?\b\d{3}\)?[\s.\-]\d{3}[\s.\-]\d{4}\b",
    r"\b\d{4}[ \-]\d{4}[ \-]\d{4}[ \-]\d{1,7}\b",
    r"\b\d{15,16}\b",
];

const SEED_PHRASE_PATTERN: &str = r"^(?:[a-z]{3,8}\s+){11,23}[a-z]{3,8}$";

/// Which rule family flagged a string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleHit {
    SecretValue,
    SecretRequest,
    Pii,
    SeedPhrase,
    HighEntropy,
    Custom,
}

/// Compiled detection rules.
#[derive(Debug)]
pub struct SecretRules {
    secret_values: Vec<Regex>,
    secret_requests: Vec<Regex>,
    pii: Vec<Regex>,
    custom: Vec<Regex>,
    seed_phrase: Regex,
    entropy_token: Regex,
    min_entropy_bits: f64,
}

impl SecretRules {
    /// Compile the built-in rules plus the configured extra patterns.
    ///
    /// Returns `EvchainError::ConfigError` naming the first extra pattern
    /// that is not a valid regular expression.
    pub fn new(config: &SanitizerConfig) -> EvchainResult<Self> {
        Ok(Self {
            secret_values: compile_all(SECRET_VALUE_PATTERNS)?,
            secret_requests: compile_all(SECRET_REQUEST_PATTERNS)?,
            pii: compile_all(PII_PATTERNS)?,
            custom: compile_all(&config.extra_secret_patterns)?,
            seed_phrase: compile(SEED_PHRASE_PATTERN)?,
            entropy_token: compile(&format!(
                "[A-Za-z0-9+/=_\\-]{{{},}}",
                config.min_entropy_token_length.max(1)
            ))?,
            min_entropy_bits: config.min_entropy_bits,
        })
    }

    /// The first rule family matching `text`, if any.
    pub fn classify(&self, text: &str) -> Option<RuleHit> {
        if any_match(&self.secret_values, text) {
            return Some(RuleHit::SecretValue);
        }
        if any_match(&self.secret_requests, text) {
            return Some(RuleHit::SecretRequest);
        }
        if any_match(&self.pii, text) {
            return Some(RuleHit::Pii);
        }
        if self.seed_phrase.is_match(text) {
            return Some(RuleHit::SeedPhrase);
        }
        if any_match(&self.custom, text) {
            return Some(RuleHit::Custom);
        }
        if self
            .entropy_token
            .find_iter(text)
            .any(|m| self.is_high_entropy(m.as_str()))
        {
            return Some(RuleHit::HighEntropy);
        }
        None
    }

    pub fn is_sensitive(&self, text: &str) -> bool {
        self.classify(text).is_some()
    }

    fn is_high_entropy(&self, token: &str) -> bool {
        let has_upper = token.chars().any(|c| c.is_ascii_uppercase());
        let has_lower = token.chars().any(|c| c.is_ascii_lowercase());
        let has_digit = token.chars().any(|c| c.is_ascii_digit());
        has_upper && has_lower && has_digit && shannon_entropy(token) >= self.min_entropy_bits
    }
}

/// Shannon entropy of `text` in bits per character.
pub fn shannon_entropy(text: &str) -> f64 {
    let mut counts = std::collections::HashMap::new();
    let mut total = 0usize;
    for ch in text.chars() {
        *counts.entry(ch).or_insert(0usize) += 1;
        total += 1;
    }
    if total == 0 {
        return 0.0;
    }
    counts
        .values()
        .map(|&n| {
            let p = n as f64 / total as f64;
            -p * p.log2()
        })
        .sum()
}

fn compile(pattern: &str) -> EvchainResult<Regex> {
    Regex::new(pattern).map_err(|e| EvchainError::ConfigError {
        reason: format!("invalid secret pattern '{}': {}", pattern, e),
    })
}

fn compile_all<S: AsRef<str>>(patterns: &[S]) -> EvchainResult<Vec<Regex>> {
    patterns.iter().map(|p| compile(p.as_ref())).collect()
}

fn any_match(rules: &[Regex], text: &str) -> bool {
    rules.iter().any(|r| r.is_match(text))
}
