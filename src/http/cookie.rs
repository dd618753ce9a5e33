//! Cookie helpers — building `Set-Cookie` headers on responses.
//!
//! Reading cookies from a request lives on [`Request::cookie`](super::Request::cookie);
//! this module covers the write side. Attribute handling follows RFC 6265:
//! a negative `Max-Age` deletes the cookie immediately.

use super::Response;

/// A cookie to be written via a `Set-Cookie` response header.
///
/// # Examples
///
/// ```
/// use rill::http::Cookie;
///
/// let cookie = Cookie::new("session", "abc123")
///     .max_age(3600)
///     .path("/")
///     .secure(true)
///     .http_only(true);
///
/// assert_eq!(
///     cookie.to_header_value(),
///     "session=abc123; Max-Age=3600; Path=/; Secure; HttpOnly"
/// );
/// ```
#[derive(Debug, Clone)]
pub struct Cookie {
    name: String,
    value: String,
    max_age: Option<i64>,
    path: Option<String>,
    domain: Option<String>,
    secure: bool,
    http_only: bool,
}

impl Cookie {
    /// Creates a cookie with the given name and value and no attributes.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            max_age: None,
            path: None,
            domain: None,
            secure: false,
            http_only: false,
        }
    }

    /// Sets `Max-Age` in seconds. A negative value deletes the cookie.
    #[must_use]
    pub fn max_age(mut self, seconds: i64) -> Self {
        self.max_age = Some(seconds);
        self
    }

    /// Sets the `Path` attribute.
    #[must_use]
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Sets the `Domain` attribute.
    #[must_use]
    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    /// Marks the cookie HTTPS-only.
    #[must_use]
    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Hides the cookie from client-side scripts.
    #[must_use]
    pub fn http_only(mut self, http_only: bool) -> Self {
        self.http_only = http_only;
        self
    }

    /// Serializes the cookie into a `Set-Cookie` header value.
    pub fn to_header_value(&self) -> String {
        let mut out = format!("{}={}", self.name, self.value);
        if let Some(max_age) = self.max_age {
            out.push_str(&format!("; Max-Age={max_age}"));
        }
        if let Some(path) = &self.path {
            out.push_str(&format!("; Path={path}"));
        }
        if let Some(domain) = &self.domain {
            out.push_str(&format!("; Domain={domain}"));
        }
        if self.secure {
            out.push_str("; Secure");
        }
        if self.http_only {
            out.push_str("; HttpOnly");
        }
        out
    }
}

impl Response {
    /// Appends a `Set-Cookie` header for the given cookie.
    #[must_use]
    pub fn set_cookie(self, cookie: Cookie) -> Self {
        self.header("Set-Cookie", cookie.to_header_value())
    }

    /// Appends a `Set-Cookie` header that deletes the named cookie by setting
    /// a negative `Max-Age`.
    #[must_use]
    pub fn delete_cookie(self, name: &str, path: &str) -> Self {
        self.set_cookie(Cookie::new(name, "").max_age(-1).path(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::StatusCode;

    #[test]
    fn bare_cookie() {
        assert_eq!(Cookie::new("k", "v").to_header_value(), "k=v");
    }

    #[test]
    fn all_attributes() {
        let c = Cookie::new("session", "tok")
            .max_age(60)
            .path("/")
            .domain("example.com")
            .secure(true)
            .http_only(true);
        assert_eq!(
            c.to_header_value(),
            "session=tok; Max-Age=60; Path=/; Domain=example.com; Secure; HttpOnly"
        );
    }

    #[test]
    fn response_set_cookie_header() {
        let r = Response::new(StatusCode::Ok).set_cookie(Cookie::new("theme", "dark"));
        assert_eq!(r.headers().get("set-cookie"), Some("theme=dark"));
    }

    #[test]
    fn delete_cookie_sets_negative_max_age() {
        let r = Response::new(StatusCode::Ok).delete_cookie("session", "/");
        assert_eq!(
            r.headers().get("set-cookie"),
            Some("session=; Max-Age=-1; Path=/")
        );
    }
}
