//! PII Redactor - Masks identifier-shaped substrings in user input
//!
//! Provides:
//! - Resident registration number masking (keeps the 6-digit birth date)
//! - Mobile phone number masking (keeps the carrier prefix)
//! - Email address replacement
//!
//! Rules are an ordered list so deployments and tests can swap the
//! sequence without touching the matching code.

use regex_lite::Regex;

/// Warning attached to a prompt whenever any rule matched
pub const REDACTION_WARNING: &str = "⚠️ 개인정보 보호를 위해 일부 정보가 비식별화되었습니다.";

/// One masking rule: every match of `pattern` is replaced by `replacement`
/// (`$1`-style group references allowed).
#[derive(Debug, Clone)]
pub struct RedactionRule {
    pub name: &'static str,
    pub pattern: Regex,
    pub replacement: String,
}

impl RedactionRule {
    /// Build a rule from a pattern string
    pub fn new(name: &'static str, pattern: &str, replacement: &str) -> Result<Self, regex_lite::Error> {
        Ok(Self {
            name,
            pattern: Regex::new(pattern)?,
            replacement: replacement.to_string(),
        })
    }
}

/// Redacted text plus the warning raised while producing it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redaction {
    pub text: String,
    pub warning: Option<String>,
}

impl Redaction {
    pub fn was_redacted(&self) -> bool {
        self.warning.is_some()
    }
}

/// Pattern-based PII redactor
#[derive(Debug, Clone)]
pub struct Redactor {
    rules: Vec<RedactionRule>,
    warning: String,
}

impl Redactor {
    /// Create a redactor with a custom ordered rule list
    pub fn new(rules: Vec<RedactionRule>) -> Self {
        Self {
            rules,
            warning: REDACTION_WARNING.to_string(),
        }
    }

    /// Default rules for Korean identifiers
    pub fn korean() -> Self {
        Self::new(default_rules())
    }

    /// Rule names in application order
    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name).collect()
    }

    /// Apply every rule in order.
    ///
    /// The warning is set once any rule has matched; a later rule that
    /// matches nothing leaves it in place. Never fails.
    pub fn redact(&self, input: &str) -> Redaction {
        let mut text = input.to_string();
        let mut warning = None;

        for rule in &self.rules {
            if !rule.pattern.is_match(&text) {
                continue;
            }
            text = rule
                .pattern
                .replace_all(&text, rule.replacement.as_str())
                .into_owned();
            warning = Some(self.warning.clone());
            tracing::debug!(rule = rule.name, "Masked personal information");
        }

        Redaction { text, warning }
    }
}

impl Default for Redactor {
    fn default() -> Self {
        Self::korean()
    }
}

fn default_rules() -> Vec<RedactionRule> {
    // Static patterns; a failure here is a programming error caught by tests.
    [
        ("resident_id", r"\b(\d{6})-?\d{7}\b", "${1}-*******"),
        ("mobile_phone", r"\b(01[016789])-?\d{3,4}-?\d{4}\b", "${1}-****-****"),
        (
            "email",
            r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z|]{2,}\b",
            "***@***.com",
        ),
    ]
    .into_iter()
    .filter_map(|(name, pattern, replacement)| RedactionRule::new(name, pattern, replacement).ok())
    .collect()
}
