//! Serialization policies.
//!
//! A policy decides the line separator used when a message is rendered,
//! whether raw UTF-8 may appear in headers, how long a header line may grow
//! before it is folded, and whether malformed header input is rejected.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Named policies understood by [`Policy::from_name`].
pub const POLICY_NAMES: [&str; 5] = ["default", "strict", "smtp", "smtputf8", "http"];

/// The ruleset governing how one message is serialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Policy {
    /// `\n` line endings, RFC 2047 encoded non-ASCII headers.
    #[default]
    Default,
    /// Same as `Default`, but malformed header names are rejected.
    Strict,
    /// `\r\n` line endings.
    Smtp,
    /// `\r\n` line endings, raw UTF-8 allowed in headers.
    #[serde(rename = "smtputf8")]
    SmtpUtf8,
    /// `\r\n` line endings, headers are never folded.
    Http,
}

impl Policy {
    /// Resolve a policy from its name.
    ///
    /// Names are matched case-insensitively. An unrecognized name falls back
    /// to [`Policy::Default`] rather than failing; the fallback is logged.
    /// Use [`str::parse`] for a lookup that rejects unknown names.
    pub fn from_name(name: &str) -> Self {
        match name.parse() {
            Ok(policy) => policy,
            Err(_) => {
                tracing::warn!(policy = name, "Unknown policy name, using default");
                Self::Default
            }
        }
    }

    /// Canonical lowercase name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Strict => "strict",
            Self::Smtp => "smtp",
            Self::SmtpUtf8 => "smtputf8",
            Self::Http => "http",
        }
    }

    /// Line separator written between every serialized line.
    pub fn linesep(&self) -> &'static str {
        match self {
            Self::Default | Self::Strict => "\n",
            Self::Smtp | Self::SmtpUtf8 | Self::Http => "\r\n",
        }
    }

    /// Whether header values may carry raw UTF-8 instead of encoded words.
    pub fn utf8(&self) -> bool {
        matches!(self, Self::SmtpUtf8)
    }

    /// Whether malformed input is an error instead of being tolerated.
    pub fn raise_on_defect(&self) -> bool {
        matches!(self, Self::Strict)
    }

    /// Preferred maximum header line length; `None` disables folding.
    pub fn max_line_length(&self) -> Option<usize> {
        match self {
            Self::Http => None,
            _ => Some(78),
        }
    }

    /// The policy used on the wire: identical rules, CRLF line endings.
    pub fn for_wire(self) -> Policy {
        match self {
            Self::Default => Self::Smtp,
            Self::Strict => Self::Smtp,
            other => other,
        }
    }
}

/// Error returned when parsing an unknown policy name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownPolicy(pub String);

impl fmt::Display for UnknownPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown policy '{}', expected one of: {}",
            self.0,
            POLICY_NAMES.join(", ")
        )
    }
}

impl std::error::Error for UnknownPolicy {}

impl FromStr for Policy {
    type Err = UnknownPolicy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "default" => Ok(Self::Default),
            "strict" => Ok(Self::Strict),
            "smtp" => Ok(Self::Smtp),
            "smtputf8" => Ok(Self::SmtpUtf8),
            "http" => Ok(Self::Http),
            _ => Err(UnknownPolicy(s.to_string())),
        }
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_name_resolves() {
        for name in POLICY_NAMES {
            assert_eq!(Policy::from_name(name).name(), name);
        }
    }

    #[test]
    fn test_unknown_name_falls_back_to_default() {
        // Lenient on purpose: callers that need rejection use `parse`.
        assert_eq!(Policy::from_name("bogus"), Policy::Default);
        assert!("bogus".parse::<Policy>().is_err());
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("SMTPUTF8".parse::<Policy>(), Ok(Policy::SmtpUtf8));
        assert_eq!(" Http ".parse::<Policy>(), Ok(Policy::Http));
    }

    #[test]
    fn test_line_rules() {
        assert_eq!(Policy::Default.linesep(), "\n");
        assert_eq!(Policy::Smtp.linesep(), "\r\n");
        assert!(Policy::SmtpUtf8.utf8());
        assert!(!Policy::Smtp.utf8());
        assert!(Policy::Strict.raise_on_defect());
        assert_eq!(Policy::Http.max_line_length(), None);
        assert_eq!(Policy::Default.max_line_length(), Some(78));
    }

    #[test]
    fn test_serde_names() {
        #[derive(Deserialize)]
        struct Holder {
            policy: Policy,
        }
        let h: Holder = toml::from_str("policy = \"smtputf8\"").expect("parse");
        assert_eq!(h.policy, Policy::SmtpUtf8);
    }
}
