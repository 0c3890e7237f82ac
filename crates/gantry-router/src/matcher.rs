//! Path matching utilities

use crate::pipeline::Endpoint;
use gantry_core::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

static PARAM_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid param name regex"));

/// Capture name used for a bare `*` segment
pub const DEFAULT_WILDCARD_NAME: &str = "wildcard";

/// Result of a successful route match
#[derive(Debug, Clone)]
pub struct Match {
    /// The matched endpoint
    pub endpoint: Endpoint,

    /// Extracted path parameters, wildcard capture included
    pub params: HashMap<String, String>,

    /// Wildcard match (if any)
    pub wildcard: Option<String>,
}

/// Path pattern matcher
#[derive(Debug, Clone)]
pub struct PathMatcher {
    /// Original pattern
    pattern: String,

    /// Compiled regex (if dynamic)
    regex: Option<Regex>,

    /// Parameter names in order
    param_names: Vec<String>,

    /// Is this a static path (no params)?
    is_static: bool,

    /// Has wildcard (*)?
    has_wildcard: bool,

    case_sensitive: bool,
}

impl PathMatcher {
    /// Create a new path matcher from a pattern
    ///
    /// Patterns:
    /// - `/users` - static path
    /// - `/users/:id` - dynamic path with parameter
    /// - `/users/:id/posts/:post_id` - multiple parameters
    /// - `/static/*filepath` - wildcard (must be at end)
    pub fn new(pattern: impl Into<String>, case_sensitive: bool) -> Result<Self> {
        let pattern = pattern.into();
        let mut param_names: Vec<String> = Vec::new();
        let mut has_wildcard = false;

        let segments: Vec<&str> = pattern.split('/').filter(|s| !s.is_empty()).collect();
        for (i, segment) in segments.iter().enumerate() {
            let name = if let Some(name) = segment.strip_prefix(':') {
                name
            } else if let Some(name) = segment.strip_prefix('*') {
                if i + 1 != segments.len() {
                    return Err(Error::Config(format!(
                        "wildcard must be the last segment: {pattern}"
                    )));
                }
                has_wildcard = true;
                if name.is_empty() {
                    DEFAULT_WILDCARD_NAME
                } else {
                    name
                }
            } else {
                continue;
            };

            if !PARAM_NAME.is_match(name) {
                return Err(Error::Config(format!(
                    "invalid parameter name '{name}' in {pattern}"
                )));
            }
            if param_names.iter().any(|n| n == name) {
                return Err(Error::Config(format!(
                    "duplicate parameter '{name}' in {pattern}"
                )));
            }
            param_names.push(name.to_string());
        }

        let is_static = param_names.is_empty();
        let regex = if is_static {
            None
        } else {
            Some(Self::pattern_to_regex(&pattern, case_sensitive)?)
        };

        Ok(Self {
            pattern,
            regex,
            param_names,
            is_static,
            has_wildcard,
            case_sensitive,
        })
    }

    /// Convert path pattern to regex
    fn pattern_to_regex(pattern: &str, case_sensitive: bool) -> Result<Regex> {
        let mut regex_str = String::from(if case_sensitive { "^" } else { "(?i)^" });

        for segment in pattern.split('/') {
            if segment.is_empty() {
                continue;
            }

            regex_str.push('/');

            if segment.starts_with(':') {
                // Named parameter - match anything except /
                regex_str.push_str("([^/]+)");
            } else if segment.starts_with('*') {
                // Wildcard - match everything including /
                regex_str.push_str("(.+)");
            } else {
                regex_str.push_str(&regex::escape(segment));
            }
        }

        if pattern.len() > 1 && pattern.ends_with('/') {
            regex_str.push('/');
        }
        regex_str.push('$');

        Regex::new(&regex_str)
            .map_err(|e| Error::Config(format!("invalid route pattern {pattern}: {e}")))
    }

    /// Match a normalized path against this pattern
    pub fn matches(&self, path: &str) -> Option<HashMap<String, String>> {
        if self.is_static {
            // Fast path for static routes
            let equal = if self.case_sensitive {
                path == self.pattern
            } else {
                path.eq_ignore_ascii_case(&self.pattern)
            };
            equal.then(HashMap::new)
        } else {
            self.regex
                .as_ref()
                .and_then(|re| re.captures(path))
                .map(|captures| {
                    self.param_names
                        .iter()
                        .enumerate()
                        .filter_map(|(i, name)| {
                            captures
                                .get(i + 1)
                                .map(|m| (name.clone(), m.as_str().to_string()))
                        })
                        .collect()
                })
        }
    }

    /// Get the pattern
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Is this a static path?
    pub fn is_static(&self) -> bool {
        self.is_static
    }

    /// Has wildcard?
    pub fn has_wildcard(&self) -> bool {
        self.has_wildcard
    }

    /// Get parameter names
    pub fn param_names(&self) -> &[String] {
        &self.param_names
    }
}
