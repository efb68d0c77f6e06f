//! Session-owned cookie storage.
//!
//! # Design
//! `CookieJar` is installed as the transport's cookie provider, so every
//! `Set-Cookie` header seen by an `ApiSession` lands here and matching cookies
//! are sent back on later requests. The same jar is what
//! `ApiSession::cookie_for_name` scans. It is shared through an `Arc` by the
//! session and its clones instead of living in a process-wide global.
//!
//! A `Domain` attribute is only accepted when the responding host lies inside
//! it, `Secure` cookies are only sent over https, and cookies past their
//! `Max-Age` or `Expires` are neither sent nor returned by lookup.

use std::net::IpAddr;
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use reqwest::header::HeaderValue;
use url::Url;

/// One stored cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    /// Lowercase host or domain the cookie applies to, without a leading dot.
    pub domain: String,
    pub path: String,
    pub secure: bool,
    /// `None` for a session cookie.
    pub expires: Option<DateTime<Utc>>,
}

impl Cookie {
    /// Parse one `Set-Cookie` header value received from `url`.
    ///
    /// Returns the cookie and whether the header asks for its removal
    /// (`Max-Age` of zero or less, or an `Expires` date in the past).
    /// Returns `None` for a malformed header or one whose `Domain` does not
    /// cover the responding host.
    fn parse_set_cookie(header: &str, url: &Url, now: DateTime<Utc>) -> Option<(Cookie, bool)> {
        let mut parts = header.split(';');
        let (name, value) = parts.next()?.split_once('=')?;
        let name = name.trim();
        if name.is_empty() {
            return None;
        }

        let host = url.host_str()?.to_ascii_lowercase();
        let mut cookie = Cookie {
            name: name.to_string(),
            value: value.trim().trim_matches('"').to_string(),
            domain: host.clone(),
            path: default_path(url),
            secure: false,
            expires: None,
        };
        let mut max_age = None;
        let mut expires = None;

        for attribute in parts {
            let (key, val) = match attribute.split_once('=') {
                Some((key, val)) => (key.trim(), val.trim()),
                None => (attribute.trim(), ""),
            };
            if key.eq_ignore_ascii_case("domain") && !val.is_empty() {
                let domain = val.trim_start_matches('.').to_ascii_lowercase();
                if !domain_covers_host(&domain, &host) {
                    return None;
                }
                cookie.domain = domain;
            } else if key.eq_ignore_ascii_case("path") && val.starts_with('/') {
                cookie.path = val.to_string();
            } else if key.eq_ignore_ascii_case("secure") {
                cookie.secure = true;
            } else if key.eq_ignore_ascii_case("max-age") {
                if let Ok(secs) = val.parse::<i64>() {
                    max_age = Some(secs);
                }
            } else if key.eq_ignore_ascii_case("expires") {
                if let Some(date) = parse_cookie_date(val) {
                    expires = Some(date);
                }
            }
        }

        // Max-Age wins over Expires when both are present.
        cookie.expires = match max_age {
            Some(secs) if secs <= 0 => Some(DateTime::<Utc>::MIN_UTC),
            Some(secs) => TimeDelta::try_seconds(secs).and_then(|delta| now.checked_add_signed(delta)),
            None => expires,
        };
        let expired = cookie.is_expired(now);

        Some((cookie, expired))
    }

    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires.is_some_and(|at| at <= now)
    }

    fn matches(&self, url: &Url, now: DateTime<Utc>) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };
        if self.is_expired(now) || (self.secure && url.scheme() != "https") {
            return false;
        }
        let host = host.to_ascii_lowercase();
        let domain_matches = host == self.domain
            || host
                .strip_suffix(self.domain.as_str())
                .is_some_and(|prefix| prefix.ends_with('.'));

        let path = url.path();
        let path_matches = path == self.path
            || (path.starts_with(self.path.as_str())
                && (self.path.ends_with('/') || path[self.path.len()..].starts_with('/')));

        domain_matches && path_matches
    }
}

/// Whether a `Domain` attribute may be set by `host`: the host itself, or a
/// parent of it with at least two labels. IP hosts only cover themselves.
fn domain_covers_host(domain: &str, host: &str) -> bool {
    if domain == host {
        return true;
    }
    if domain.is_empty() || !domain.contains('.') || host.trim_matches(['[', ']']).parse::<IpAddr>().is_ok() {
        return false;
    }
    host.strip_suffix(domain).is_some_and(|prefix| prefix.ends_with('.'))
}

/// `Expires` values: RFC 1123 dates, plus the dashed form still sent by
/// older servers (`Thu, 01-Jan-1970 00:00:00 GMT`).
fn parse_cookie_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value)
        .map(|date| date.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(value, "%a, %d-%b-%Y %H:%M:%S GMT")
                .ok()
                .map(|date| date.and_utc())
        })
}

/// The directory of the request path, used when `Set-Cookie` names no path.
fn default_path(url: &Url) -> String {
    let path = url.path();
    match path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(idx) => path[..idx].to_string(),
    }
}

/// Thread-safe cookie storage shared by an `ApiSession` and its transport.
#[derive(Debug, Default)]
pub struct CookieJar {
    cookies: RwLock<Vec<Cookie>>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `cookie`, replacing one with the same name, domain and path.
    pub fn insert(&self, cookie: Cookie) {
        let mut cookies = self.cookies.write().unwrap_or_else(PoisonError::into_inner);
        match cookies.iter_mut().find(|c| same_identity(c, &cookie)) {
            Some(existing) => *existing = cookie,
            None => cookies.push(cookie),
        }
    }

    fn remove(&self, cookie: &Cookie) {
        self.cookies
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|c| !same_identity(c, cookie));
    }

    /// The first unexpired stored cookie called `name`, if any.
    pub fn cookie_for_name(&self, name: &str) -> Option<Cookie> {
        let now = Utc::now();
        self.cookies
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|c| c.name == name && !c.is_expired(now))
            .cloned()
    }

    /// Every unexpired cookie, in insertion order.
    pub fn all(&self) -> Vec<Cookie> {
        let now = Utc::now();
        self.cookies
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|c| !c.is_expired(now))
            .cloned()
            .collect()
    }
}

fn same_identity(a: &Cookie, b: &Cookie) -> bool {
    a.name == b.name && a.domain == b.domain && a.path == b.path
}

impl reqwest::cookie::CookieStore for CookieJar {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, url: &Url) {
        let now = Utc::now();
        for header in cookie_headers {
            let Ok(header) = header.to_str() else {
                continue;
            };
            match Cookie::parse_set_cookie(header, url, now) {
                Some((cookie, true)) => self.remove(&cookie),
                Some((cookie, false)) => {
                    tracing::debug!(name = %cookie.name, domain = %cookie.domain, "stored cookie");
                    self.insert(cookie);
                }
                None => tracing::debug!(%url, "ignored malformed or foreign Set-Cookie header"),
            }
        }
    }

    fn cookies(&self, url: &Url) -> Option<HeaderValue> {
        let now = Utc::now();
        let header = self
            .cookies
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|c| c.matches(url, now))
            .map(|c| format!("{}={}", c.name, c.value))
            .collect::<Vec<_>>()
            .join("; ");
        if header.is_empty() {
            return None;
        }
        HeaderValue::from_str(&header).ok()
    }
}

#[cfg(test)]
mod tests {
    use reqwest::cookie::CookieStore;

    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn receive(jar: &CookieJar, from: &str, headers: &[&str]) {
        let values: Vec<HeaderValue> = headers.iter().map(|h| HeaderValue::from_str(h).unwrap()).collect();
        jar.set_cookies(&mut values.iter(), &url(from));
    }

    #[test]
    fn stores_cookie_with_defaults_from_request() {
        let jar = CookieJar::new();
        receive(&jar, "https://www.udacity.com/api/session", &["XSRF-TOKEN=abc123"]);
        let cookie = jar.cookie_for_name("XSRF-TOKEN").unwrap();
        assert_eq!(cookie.value, "abc123");
        assert_eq!(cookie.domain, "www.udacity.com");
        assert_eq!(cookie.path, "/api");
    }

    #[test]
    fn honours_domain_and_path_attributes() {
        let jar = CookieJar::new();
        receive(
            &jar,
            "https://www.udacity.com/api/session",
            &["XSRF-TOKEN=abc; Domain=.Udacity.com; Path=/; Secure; HttpOnly"],
        );
        let cookie = jar.cookie_for_name("XSRF-TOKEN").unwrap();
        assert_eq!(cookie.domain, "udacity.com");
        assert_eq!(cookie.path, "/");
    }

    #[test]
    fn missing_name_returns_none() {
        let jar = CookieJar::new();
        receive(&jar, "https://www.udacity.com/", &["session=1"]);
        assert!(jar.cookie_for_name("XSRF-TOKEN").is_none());
    }

    #[test]
    fn first_match_wins_across_domains() {
        let jar = CookieJar::new();
        receive(&jar, "https://a.example.com/", &["token=first"]);
        receive(&jar, "https://b.example.com/", &["token=second"]);
        assert_eq!(jar.cookie_for_name("token").unwrap().value, "first");
        assert_eq!(jar.all().len(), 2);
    }

    #[test]
    fn same_identity_replaces_value() {
        let jar = CookieJar::new();
        receive(&jar, "https://www.udacity.com/", &["XSRF-TOKEN=old"]);
        receive(&jar, "https://www.udacity.com/", &["XSRF-TOKEN=new"]);
        assert_eq!(jar.all().len(), 1);
        assert_eq!(jar.cookie_for_name("XSRF-TOKEN").unwrap().value, "new");
    }

    #[test]
    fn zero_max_age_removes_cookie() {
        let jar = CookieJar::new();
        receive(&jar, "https://www.udacity.com/", &["XSRF-TOKEN=abc"]);
        receive(&jar, "https://www.udacity.com/", &["XSRF-TOKEN=; Max-Age=0"]);
        assert!(jar.cookie_for_name("XSRF-TOKEN").is_none());
    }

    #[test]
    fn malformed_header_is_ignored() {
        let jar = CookieJar::new();
        receive(&jar, "https://www.udacity.com/", &["no-equals-sign", "=nameless"]);
        assert!(jar.all().is_empty());
    }

    #[test]
    fn outgoing_header_filters_by_domain_and_path() {
        let jar = CookieJar::new();
        receive(&jar, "https://www.udacity.com/api/session", &["a=1; Path=/api", "b=2; Path=/other"]);
        receive(&jar, "https://parse.udacity.com/", &["c=3"]);

        let header = CookieStore::cookies(&jar, &url("https://www.udacity.com/api/users/1")).unwrap();
        assert_eq!(header.to_str().unwrap(), "a=1");
        assert!(CookieStore::cookies(&jar, &url("https://www.udacity.com/apiary")).is_none());
        assert!(CookieStore::cookies(&jar, &url("https://evil-udacity.com/api")).is_none());
    }

    #[test]
    fn parent_domain_cookie_matches_subdomain() {
        let jar = CookieJar::new();
        receive(&jar, "https://www.udacity.com/", &["s=1; Domain=udacity.com"]);
        let header = CookieStore::cookies(&jar, &url("https://parse.udacity.com/parse")).unwrap();
        assert_eq!(header.to_str().unwrap(), "s=1");
    }

    #[test]
    fn domain_outside_responding_host_is_rejected() {
        let jar = CookieJar::new();
        receive(&jar, "https://www.udacity.com/", &["XSRF-TOKEN=stolen; Domain=parse.example.com; Path=/"]);
        assert!(jar.cookie_for_name("XSRF-TOKEN").is_none());
        assert!(CookieStore::cookies(&jar, &url("https://parse.example.com/")).is_none());
    }

    #[test]
    fn top_level_domain_attribute_is_rejected() {
        let jar = CookieJar::new();
        receive(&jar, "https://www.udacity.com/", &["s=1; Domain=com"]);
        receive(&jar, "https://127.0.0.1/", &["t=1; Domain=0.0.1"]);
        assert!(jar.all().is_empty());
    }

    #[test]
    fn domain_equal_to_ip_host_is_accepted() {
        let jar = CookieJar::new();
        receive(&jar, "http://127.0.0.1:3000/", &["s=1; Domain=127.0.0.1"]);
        assert_eq!(jar.cookie_for_name("s").unwrap().domain, "127.0.0.1");
    }

    #[test]
    fn secure_cookie_is_not_sent_over_http() {
        let jar = CookieJar::new();
        receive(&jar, "https://www.udacity.com/", &["s=1; Path=/; Secure"]);
        assert!(jar.cookie_for_name("s").unwrap().secure);
        assert!(CookieStore::cookies(&jar, &url("http://www.udacity.com/api")).is_none());
        let header = CookieStore::cookies(&jar, &url("https://www.udacity.com/api")).unwrap();
        assert_eq!(header.to_str().unwrap(), "s=1");
    }

    #[test]
    fn past_expires_removes_cookie() {
        let jar = CookieJar::new();
        receive(&jar, "https://www.udacity.com/", &["XSRF-TOKEN=abc; Path=/"]);
        receive(
            &jar,
            "https://www.udacity.com/",
            &["XSRF-TOKEN=; Path=/; Expires=Thu, 01 Jan 1970 00:00:00 GMT"],
        );
        assert!(jar.cookie_for_name("XSRF-TOKEN").is_none());
    }

    #[test]
    fn dashed_expires_date_is_understood() {
        let jar = CookieJar::new();
        receive(&jar, "https://www.udacity.com/", &["a=1; Path=/; Expires=Thu, 01-Jan-1970 00:00:00 GMT"]);
        receive(&jar, "https://www.udacity.com/", &["b=2; Path=/; Expires=Fri, 01-Jan-2100 00:00:00 GMT"]);
        assert!(jar.cookie_for_name("a").is_none());
        assert!(jar.cookie_for_name("b").unwrap().expires.is_some());
    }

    #[test]
    fn max_age_takes_precedence_over_expires() {
        let jar = CookieJar::new();
        receive(
            &jar,
            "https://www.udacity.com/",
            &["s=1; Path=/; Max-Age=60; Expires=Thu, 01 Jan 1970 00:00:00 GMT"],
        );
        assert_eq!(jar.cookie_for_name("s").unwrap().value, "1");
    }

    #[test]
    fn stored_cookie_past_its_max_age_is_not_sent() {
        let jar = CookieJar::new();
        jar.insert(Cookie {
            name: "s".to_string(),
            value: "1".to_string(),
            domain: "www.udacity.com".to_string(),
            path: "/".to_string(),
            secure: false,
            expires: Some(Utc::now() - TimeDelta::seconds(1)),
        });
        assert!(jar.cookie_for_name("s").is_none());
        assert!(CookieStore::cookies(&jar, &url("https://www.udacity.com/")).is_none());
    }
}
