//! Tag-driven field validation
//!
//! Types implement [`Validate`] by listing their fields with a rule tag:
//!
//! ```
//! use gantry_core::validation::{Validate, Validator};
//!
//! struct SignUp {
//!     email: String,
//!     name: String,
//!     age: u32,
//! }
//!
//! impl Validate for SignUp {
//!     fn validate(&self) -> gantry_core::Result<()> {
//!         Validator::new()
//!             .field("email", &self.email, "required,email")
//!             .field("name", &self.name, "required,min=2,max=32,alpha")
//!             .field("age", &self.age, "min=18,max=130")
//!             .finish()
//!     }
//! }
//! ```
//!
//! Supported rules: `required`, `min=N`, `max=N`, `len=N`, `email`, `url`,
//! `numeric`, `alpha`, `alphanum`, `oneof=a b c`. A value that is empty and
//! not `required` skips every other rule.

use crate::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::fmt;

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern is valid")
});

/// Types that can check their own fields
pub trait Validate {
    /// Return `Error::Validation` listing every failing field
    fn validate(&self) -> Result<()>;
}

/// Borrowed view of a field value
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue<'a> {
    /// Text
    Str(&'a str),
    /// Any integer
    Int(i128),
    /// Any float
    Float(f64),
    /// Collection, by element count
    Seq(usize),
    /// Absent optional value
    Missing,
}

impl FieldValue<'_> {
    fn is_empty(&self) -> bool {
        match *self {
            FieldValue::Str(s) => s.is_empty(),
            FieldValue::Int(n) => n == 0,
            FieldValue::Float(f) => f == 0.0,
            FieldValue::Seq(len) => len == 0,
            FieldValue::Missing => true,
        }
    }
}

/// Conversion into [`FieldValue`]
pub trait AsFieldValue {
    /// Borrow the value for validation
    fn as_field_value(&self) -> FieldValue<'_>;
}

impl AsFieldValue for str {
    fn as_field_value(&self) -> FieldValue<'_> {
        FieldValue::Str(self)
    }
}

impl AsFieldValue for String {
    fn as_field_value(&self) -> FieldValue<'_> {
        FieldValue::Str(self)
    }
}

impl<T: AsFieldValue + ?Sized> AsFieldValue for &T {
    fn as_field_value(&self) -> FieldValue<'_> {
        (**self).as_field_value()
    }
}

impl<T: AsFieldValue> AsFieldValue for Option<T> {
    fn as_field_value(&self) -> FieldValue<'_> {
        match self {
            Some(value) => value.as_field_value(),
            None => FieldValue::Missing,
        }
    }
}

impl<T> AsFieldValue for Vec<T> {
    fn as_field_value(&self) -> FieldValue<'_> {
        FieldValue::Seq(self.len())
    }
}

impl<T> AsFieldValue for [T] {
    fn as_field_value(&self) -> FieldValue<'_> {
        FieldValue::Seq(self.len())
    }
}

macro_rules! int_field_value {
    ($($ty:ty),*) => {
        $(
            impl AsFieldValue for $ty {
                fn as_field_value(&self) -> FieldValue<'_> {
                    FieldValue::Int(*self as i128)
                }
            }
        )*
    };
}

int_field_value!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

impl AsFieldValue for f32 {
    fn as_field_value(&self) -> FieldValue<'_> {
        FieldValue::Float(f64::from(*self))
    }
}

impl AsFieldValue for f64 {
    fn as_field_value(&self) -> FieldValue<'_> {
        FieldValue::Float(*self)
    }
}

/// A single parsed rule
#[derive(Debug, Clone, PartialEq)]
pub enum Rule {
    /// Value must be non-empty
    Required,
    /// Lower bound (length for text and collections)
    Min(f64),
    /// Upper bound (length for text and collections)
    Max(f64),
    /// Exact length, or exact value for numbers
    Len(f64),
    /// Email address shape
    Email,
    /// Absolute URL with a host
    Url,
    /// Decimal number in text form
    Numeric,
    /// ASCII letters only
    Alpha,
    /// ASCII letters and digits only
    AlphaNum,
    /// One of a fixed set of values
    OneOf(Vec<String>),
}

impl Rule {
    /// Parse a comma-separated tag such as `required,min=3`
    pub fn parse_tag(tag: &str) -> Result<Vec<Rule>> {
        tag.split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(Rule::parse)
            .collect()
    }

    fn parse(part: &str) -> Result<Rule> {
        let (name, arg) = match part.split_once('=') {
            Some((name, arg)) => (name.trim(), Some(arg.trim())),
            None => (part, None),
        };

        let number = |arg: Option<&str>| -> Result<f64> {
            arg.and_then(|a| a.parse::<f64>().ok())
                .ok_or_else(|| Error::Internal(format!("rule '{name}' needs a numeric argument")))
        };

        let rule = match name {
            "required" => Rule::Required,
            "min" => Rule::Min(number(arg)?),
            "max" => Rule::Max(number(arg)?),
            "len" => Rule::Len(number(arg)?),
            "email" => Rule::Email,
            "url" => Rule::Url,
            "numeric" => Rule::Numeric,
            "alpha" => Rule::Alpha,
            "alphanum" => Rule::AlphaNum,
            "oneof" => {
                let options: Vec<String> = arg
                    .unwrap_or_default()
                    .split_whitespace()
                    .map(str::to_string)
                    .collect();
                if options.is_empty() {
                    return Err(Error::Internal(
                        "rule 'oneof' needs at least one option".to_string(),
                    ));
                }
                Rule::OneOf(options)
            }
            other => return Err(Error::Internal(format!("unknown validation rule '{other}'"))),
        };

        Ok(rule)
    }

    fn name(&self) -> &'static str {
        match self {
            Rule::Required => "required",
            Rule::Min(_) => "min",
            Rule::Max(_) => "max",
            Rule::Len(_) => "len",
            Rule::Email => "email",
            Rule::Url => "url",
            Rule::Numeric => "numeric",
            Rule::Alpha => "alpha",
            Rule::AlphaNum => "alphanum",
            Rule::OneOf(_) => "oneof",
        }
    }

    /// Check a value; `Ok(None)` passes, `Ok(Some(msg))` fails,
    /// `Err` means the rule cannot apply to this kind of value.
    fn check(&self, field: &str, value: FieldValue<'_>) -> Result<Option<String>> {
        let failure = match (self, value) {
            (Rule::Required, v) => v.is_empty().then(|| format!("{field} is required")),

            (Rule::Min(n), v) => bound(field, v, *n, |actual, n| actual >= n, "at least"),
            (Rule::Max(n), v) => bound(field, v, *n, |actual, n| actual <= n, "at most"),
            (Rule::Len(n), v) => bound(field, v, *n, |actual, n| actual == n, "exactly"),

            (Rule::Email, FieldValue::Str(s)) => (!EMAIL_RE.is_match(s))
                .then(|| format!("{field} must be a valid email address")),
            (Rule::Url, FieldValue::Str(s)) => {
                let valid = url::Url::parse(s).map(|u| u.has_host()).unwrap_or(false);
                (!valid).then(|| format!("{field} must be a valid URL"))
            }
            (Rule::Numeric, FieldValue::Str(s)) => {
                (!is_numeric(s)).then(|| format!("{field} must be numeric"))
            }
            (Rule::Numeric, FieldValue::Int(_) | FieldValue::Float(_)) => None,
            (Rule::Alpha, FieldValue::Str(s)) => (!s.chars().all(|c| c.is_ascii_alphabetic()))
                .then(|| format!("{field} must contain only letters")),
            (Rule::AlphaNum, FieldValue::Str(s)) => (!s
                .chars()
                .all(|c| c.is_ascii_alphanumeric()))
            .then(|| format!("{field} must contain only letters and digits")),
            (Rule::OneOf(options), FieldValue::Str(s)) => (!options.iter().any(|o| o == s))
                .then(|| format!("{field} must be one of [{}]", options.join(" "))),
            (Rule::OneOf(options), FieldValue::Int(n)) => {
                let repr = n.to_string();
                (!options.iter().any(|o| *o == repr))
                    .then(|| format!("{field} must be one of [{}]", options.join(" ")))
            }

            (rule, _) => {
                return Err(Error::Internal(format!(
                    "rule '{}' cannot be applied to field '{field}'",
                    rule.name()
                )))
            }
        };

        Ok(failure)
    }
}

fn bound(
    field: &str,
    value: FieldValue<'_>,
    limit: f64,
    ok: impl Fn(f64, f64) -> bool,
    relation: &str,
) -> Option<String> {
    let (actual, unit) = match value {
        FieldValue::Str(s) => (s.chars().count() as f64, " characters"),
        FieldValue::Seq(len) => (len as f64, " items"),
        FieldValue::Int(n) => (n as f64, ""),
        FieldValue::Float(f) => (f, ""),
        FieldValue::Missing => return None,
    };

    if ok(actual, limit) {
        None
    } else if unit.is_empty() {
        Some(format!("{field} must be {relation} {limit}"))
    } else {
        Some(format!("{field} must be {relation} {limit}{unit} long"))
    }
}

fn is_numeric(s: &str) -> bool {
    let digits = s.strip_prefix(['+', '-']).unwrap_or(s);
    if digits.is_empty() {
        return false;
    }
    let mut seen_dot = false;
    let mut seen_digit = false;
    for c in digits.chars() {
        match c {
            '0'..='9' => seen_digit = true,
            '.' if !seen_dot => seen_dot = true,
            _ => return false,
        }
    }
    seen_digit
}

/// One failing field
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    /// Field name as declared
    pub field: String,
    /// Rule that failed
    pub rule: String,
    /// Human-readable message
    pub message: String,
}

/// All failing fields, in declaration order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    fields: Vec<FieldError>,
}

impl ValidationErrors {
    /// Failing fields
    pub fn fields(&self) -> &[FieldError] {
        &self.fields
    }

    /// Whether any field failed
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Errors for one field
    pub fn for_field<'a>(&'a self, field: &'a str) -> impl Iterator<Item = &'a FieldError> {
        self.fields.iter().filter(move |e| e.field == field)
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let messages: Vec<&str> = self.fields.iter().map(|e| e.message.as_str()).collect();
        write!(f, "{}", messages.join("; "))
    }
}

/// Collects field checks and produces a single result
#[derive(Debug, Default)]
pub struct Validator {
    errors: ValidationErrors,
    misuse: Option<Error>,
}

impl Validator {
    /// Create an empty validator
    pub fn new() -> Self {
        Self::default()
    }

    /// Check one field against a rule tag
    ///
    /// Only the first failing rule per field is reported.
    pub fn field<V: AsFieldValue + ?Sized>(mut self, name: &str, value: &V, tag: &str) -> Self {
        if self.misuse.is_some() {
            return self;
        }

        let rules = match Rule::parse_tag(tag) {
            Ok(rules) => rules,
            Err(e) => {
                self.misuse = Some(e);
                return self;
            }
        };

        let value = value.as_field_value();
        let required = rules.contains(&Rule::Required);
        if !required && value.is_empty() {
            return self;
        }

        for rule in &rules {
            match rule.check(name, value) {
                Ok(None) => continue,
                Ok(Some(message)) => {
                    self.errors.fields.push(FieldError {
                        field: name.to_string(),
                        rule: rule.name().to_string(),
                        message,
                    });
                    break;
                }
                Err(e) => {
                    self.misuse = Some(e);
                    break;
                }
            }
        }

        self
    }

    /// Finish, yielding `Error::Validation` if any field failed
    pub fn finish(self) -> Result<()> {
        if let Some(err) = self.misuse {
            return Err(err);
        }
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(Error::Validation(self.errors))
        }
    }
}
