//! Cookie parsing and `Set-Cookie` rendering

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// `SameSite` cookie attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SameSite {
    /// Only sent for same-site requests
    #[serde(alias = "strict")]
    Strict,
    /// Sent on top-level navigations
    #[default]
    #[serde(alias = "lax")]
    Lax,
    /// Always sent; requires `Secure`
    #[serde(alias = "none")]
    None,
}

impl fmt::Display for SameSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Strict => write!(f, "Strict"),
            Self::Lax => write!(f, "Lax"),
            Self::None => write!(f, "None"),
        }
    }
}

/// A response cookie
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    /// Cookie name
    pub name: String,
    /// Cookie value
    pub value: String,
    /// Path attribute
    pub path: Option<String>,
    /// Domain attribute
    pub domain: Option<String>,
    /// Max-Age attribute
    pub max_age: Option<Duration>,
    /// Secure flag
    pub secure: bool,
    /// HttpOnly flag
    pub http_only: bool,
    /// SameSite attribute
    pub same_site: Option<SameSite>,
}

impl Cookie {
    /// Create a session cookie with `Path=/`
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            path: Some("/".to_string()),
            domain: None,
            max_age: None,
            secure: false,
            http_only: false,
            same_site: None,
        }
    }

    /// A cookie that instructs the client to drop `name`
    pub fn expired(name: impl Into<String>) -> Self {
        Self {
            max_age: Some(Duration::ZERO),
            ..Self::new(name, "")
        }
    }

    /// Set the path
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Set the domain
    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    /// Set Max-Age
    pub fn max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    /// Set the Secure flag
    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Set the HttpOnly flag
    pub fn http_only(mut self, http_only: bool) -> Self {
        self.http_only = http_only;
        self
    }

    /// Set SameSite
    pub fn same_site(mut self, same_site: SameSite) -> Self {
        self.same_site = Some(same_site);
        self
    }

    /// Reject names, values and attributes that would alter the header
    ///
    /// Names must be RFC 6265 tokens. Values and attributes must not carry
    /// `;`, `,`, whitespace or control characters.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() || !self.name.bytes().all(is_token_byte) {
            return Err(Error::InvalidRequest(format!(
                "invalid cookie name '{}'",
                self.name.escape_default()
            )));
        }
        if !self.value.bytes().all(is_value_byte) {
            return Err(Error::InvalidRequest(format!(
                "invalid value for cookie '{}'",
                self.name
            )));
        }
        for attr in [&self.path, &self.domain].into_iter().flatten() {
            if !attr.bytes().all(is_value_byte) {
                return Err(Error::InvalidRequest(format!(
                    "invalid attribute for cookie '{}'",
                    self.name
                )));
            }
        }
        Ok(())
    }

    /// Render as a `Set-Cookie` header value
    pub fn to_header_value(&self) -> String {
        let mut out = format!("{}={}", self.name, self.value);
        if let Some(ref path) = self.path {
            out.push_str("; Path=");
            out.push_str(path);
        }
        if let Some(ref domain) = self.domain {
            out.push_str("; Domain=");
            out.push_str(domain);
        }
        if let Some(max_age) = self.max_age {
            out.push_str(&format!("; Max-Age={}", max_age.as_secs()));
        }
        if self.secure {
            out.push_str("; Secure");
        }
        if self.http_only {
            out.push_str("; HttpOnly");
        }
        if let Some(same_site) = self.same_site {
            out.push_str(&format!("; SameSite={same_site}"));
        }
        out
    }
}

fn is_token_byte(b: u8) -> bool {
    b.is_ascii_graphic() && !b"()<>@,;:\\\"/[]?={}".contains(&b)
}

fn is_value_byte(b: u8) -> bool {
    b.is_ascii_graphic() && !matches!(b, b';' | b',' | b'"' | b'\\')
}

/// Parse a `Cookie` request header into name/value pairs
pub fn parse_cookie_header(header: &str) -> impl Iterator<Item = (&str, &str)> {
    header.split(';').filter_map(|pair| {
        let (name, value) = pair.split_once('=')?;
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        Some((name, value.trim().trim_matches('"')))
    })
}
