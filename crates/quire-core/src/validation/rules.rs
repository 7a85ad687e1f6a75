//! Built-in field rules.
//!
//! A rule looks at one (possibly absent) JSON value and either passes
//! (`None`) or returns a display-safe message naming the field.

use std::sync::{Arc, OnceLock};

use regex::Regex;
use serde_json::Value;

/// Signature of a caller-defined rule: `(value, field_name) -> Option<message>`.
pub type RuleFn = Arc<dyn Fn(&Value, &str) -> Option<String> + Send + Sync>;

const EMAIL_PATTERN: &str = r"^[^\s@]+@[^\s@]+\.[^\s@]+$";
const UUID_PATTERN: &str =
    r"(?i)^[0-9a-f]{8}-[0-9a-f]{4}-[1-8][0-9a-f]{3}-[89ab][0-9a-f]{3}-[0-9a-f]{12}$";

fn email_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(EMAIL_PATTERN).expect("email pattern is a valid regex"))
}

fn uuid_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(UUID_PATTERN).expect("uuid pattern is a valid regex"))
}

/// A single validation rule.
#[derive(Clone)]
pub enum Rule {
    /// Value must be present and, for strings, non-empty after trimming.
    Required,
    /// String must have at least this many characters.
    MinLength(usize),
    /// String must have at most this many characters.
    MaxLength(usize),
    /// String must look like an email address.
    Email,
    /// Value must be a JSON boolean.
    Boolean,
    /// String must be a hyphenated UUID.
    Uuid,
    /// String must match `regex`; `message` is reported verbatim otherwise.
    Pattern { regex: Regex, message: String },
    /// Arbitrary check.
    Custom(RuleFn),
}

impl std::fmt::Debug for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Required => f.write_str("Required"),
            Self::MinLength(n) => write!(f, "MinLength({n})"),
            Self::MaxLength(n) => write!(f, "MaxLength({n})"),
            Self::Email => f.write_str("Email"),
            Self::Boolean => f.write_str("Boolean"),
            Self::Uuid => f.write_str("Uuid"),
            Self::Pattern { regex, .. } => write!(f, "Pattern({})", regex.as_str()),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl Rule {
    /// Build a [`Rule::Pattern`] from a regex source.
    pub fn pattern(source: &str, message: impl Into<String>) -> Result<Self, regex::Error> {
        Ok(Self::Pattern {
            regex: Regex::new(source)?,
            message: message.into(),
        })
    }

    /// Wrap a closure as a [`Rule::Custom`].
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&Value, &str) -> Option<String> + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(f))
    }

    /// Evaluate the rule.
    ///
    /// Every rule except [`Rule::Required`] passes on an empty value, so
    /// optional fields are only checked when present.
    pub fn check(&self, value: Option<&Value>, field: &str) -> Option<String> {
        if let Self::Required = self {
            return is_empty(value).then(|| format!("{field} is required"));
        }
        let value = match value {
            Some(v) if !is_empty(Some(v)) => v,
            _ => return None,
        };

        match self {
            Self::Required => None,
            Self::MinLength(min) => match value.as_str() {
                Some(s) if s.chars().count() < *min => {
                    Some(format!("{field} must be at least {min} characters"))
                }
                Some(_) => None,
                None => Some(format!("{field} must be a string")),
            },
            Self::MaxLength(max) => match value.as_str() {
                Some(s) if s.chars().count() > *max => {
                    Some(format!("{field} must be at most {max} characters"))
                }
                Some(_) => None,
                None => Some(format!("{field} must be a string")),
            },
            Self::Email => match value.as_str() {
                Some(s) if email_regex().is_match(s.trim()) => None,
                _ => Some(format!("{field} must be a valid email address")),
            },
            Self::Boolean => {
                (!value.is_boolean()).then(|| format!("{field} must be a boolean"))
            }
            Self::Uuid => match value.as_str() {
                Some(s) if uuid_regex().is_match(s) => None,
                _ => Some(format!("{field} must be a valid UUID")),
            },
            Self::Pattern { regex, message } => match value.as_str() {
                Some(s) if regex.is_match(s) => None,
                _ => Some(message.clone()),
            },
            Self::Custom(f) => f(value, field),
        }
    }
}

/// Absent, `null`, and blank strings count as empty.
pub fn is_empty(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn required_rejects_blank_strings() {
        assert!(Rule::Required.check(Some(&json!("   ")), "login").is_some());
        assert!(Rule::Required.check(None, "login").is_some());
        assert!(Rule::Required.check(Some(&Value::Null), "login").is_some());
        assert!(Rule::Required.check(Some(&json!("x")), "login").is_none());
    }

    #[test]
    fn required_accepts_false() {
        assert!(Rule::Required.check(Some(&json!(false)), "flag").is_none());
    }

    #[test]
    fn non_required_rules_skip_empty_values() {
        let rules = [
            Rule::MinLength(3),
            Rule::Email,
            Rule::Boolean,
            Rule::Uuid,
            Rule::pattern("^a+$", "nope").unwrap(),
        ];
        for rule in &rules {
            assert!(rule.check(None, "f").is_none(), "{rule:?}");
            assert!(rule.check(Some(&json!("")), "f").is_none(), "{rule:?}");
        }
    }

    #[test]
    fn length_counts_characters_not_bytes() {
        assert!(Rule::MaxLength(3).check(Some(&json!("äöü")), "f").is_none());
        assert!(Rule::MinLength(4).check(Some(&json!("äöü")), "f").is_some());
    }

    #[test]
    fn length_rejects_non_strings() {
        let msg = Rule::MinLength(1).check(Some(&json!(12)), "age").unwrap();
        assert_eq!(msg, "age must be a string");
    }

    #[test]
    fn email_shape() {
        assert!(Rule::Email.check(Some(&json!("a@b.io")), "email").is_none());
        assert!(Rule::Email.check(Some(&json!("a@b")), "email").is_some());
        assert!(Rule::Email.check(Some(&json!("a b@c.d")), "email").is_some());
    }

    #[test]
    fn uuid_shape() {
        let id = "550e8400-e29b-41d4-a716-446655440000";
        assert!(Rule::Uuid.check(Some(&json!(id)), "id").is_none());
        assert!(Rule::Uuid.check(Some(&json!(id.to_uppercase())), "id").is_none());
        assert!(Rule::Uuid.check(Some(&json!("550e8400")), "id").is_some());
    }

    #[test]
    fn boolean_type() {
        assert!(Rule::Boolean.check(Some(&json!(true)), "b").is_none());
        assert!(Rule::Boolean.check(Some(&json!("true")), "b").is_some());
    }

    #[test]
    fn custom_rule_gets_field_name() {
        let rule = Rule::custom(|_, field| Some(format!("{field} is odd")));
        assert_eq!(rule.check(Some(&json!(1)), "n").as_deref(), Some("n is odd"));
    }
}
