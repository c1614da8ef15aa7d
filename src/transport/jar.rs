//! Cookie jar.
//!
//! Stores `(domain, name) → value` records absorbed from `Set-Cookie`
//! headers and renders the `Cookie` header for a request domain.
//!
//! A record whose domain starts with `.` matches the domain itself and any
//! subdomain (`.example.com` matches `chat.example.com`); any other record
//! only matches its exact domain.

// ============================================================================
// Imports
// ============================================================================

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::trace;

// ============================================================================
// CookieRecord
// ============================================================================

/// A single stored cookie.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CookieRecord {
    /// Domain the cookie applies to; a leading `.` allows subdomains.
    pub domain: String,
    /// Cookie name.
    pub name: String,
    /// Cookie value.
    pub value: String,
}

impl CookieRecord {
    /// Creates a cookie record.
    #[must_use]
    pub fn new(
        domain: impl Into<String>,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            domain: domain.into(),
            name: name.into(),
            value: value.into(),
        }
    }

    /// Returns `true` if this cookie applies to requests for `domain`.
    #[must_use]
    pub fn matches(&self, domain: &str) -> bool {
        match self.domain.strip_prefix('.') {
            Some(suffix) => domain.ends_with(suffix),
            None => self.domain == domain,
        }
    }

    /// Parses a raw `Set-Cookie` header value received from `request_domain`.
    ///
    /// Returns `None` when the header has no `name=value` segment.
    #[must_use]
    pub fn parse(request_domain: &str, header: &str) -> Option<Self> {
        let mut segments = header.split(';').map(str::trim);
        let (name, value) = segments.next()?.split_once('=')?;
        if name.is_empty() {
            return None;
        }

        let domain = segments
            .filter_map(|segment| segment.split_once('='))
            .find(|(key, _)| key.trim().eq_ignore_ascii_case("domain"))
            .map(|(_, domain)| {
                let domain = domain.trim();
                if domain.starts_with('.') {
                    domain.to_string()
                } else {
                    format!(".{domain}")
                }
            })
            .unwrap_or_else(|| request_domain.to_string());

        Some(Self::new(domain, name, value))
    }
}

// ============================================================================
// Jar
// ============================================================================

/// Ordered set of cookies, at most one per `(domain, name)`.
///
/// All methods take `&self`; mutation is serialized by an internal lock so a
/// jar can be shared by concurrent requests.
#[derive(Debug, Default)]
pub struct Jar {
    records: Mutex<Vec<CookieRecord>>,
}

impl Jar {
    /// Creates an empty jar.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a jar pre-filled with `records`.
    #[must_use]
    pub fn from_records(records: Vec<CookieRecord>) -> Self {
        let jar = Self::new();
        jar.import_jar(records);
        jar
    }

    /// Returns the `Cookie` header value for `domain`.
    ///
    /// Matching cookies are joined as `name=value` pairs with `"; "` in the
    /// order they were first stored. Empty if nothing matches.
    #[must_use]
    pub fn get_cookies(&self, domain: &str) -> String {
        self.records
            .lock()
            .iter()
            .filter(|record| record.matches(domain))
            .map(|record| format!("{}={}", record.name, record.value))
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Absorbs a raw `Set-Cookie` header received from `domain`.
    pub fn add_cookie(&self, domain: &str, header: &str) {
        match CookieRecord::parse(domain, header) {
            Some(record) => self.upsert(record),
            None => trace!(domain, "Ignoring malformed Set-Cookie header"),
        }
    }

    /// Inserts `record`, replacing the value of an existing `(domain, name)`.
    pub fn upsert(&self, record: CookieRecord) {
        let mut records = self.records.lock();

        match records
            .iter_mut()
            .find(|existing| existing.domain == record.domain && existing.name == record.name)
        {
            Some(existing) => existing.value = record.value,
            None => records.push(record),
        }
    }

    /// Returns the number of stored cookies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Returns `true` if the jar is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Removes every cookie.
    pub fn clear(&self) {
        self.records.lock().clear();
    }

    /// Returns a snapshot of all cookies for persistence.
    #[must_use]
    pub fn export_jar(&self) -> Vec<CookieRecord> {
        self.records.lock().clone()
    }

    /// Merges a previously exported snapshot into this jar.
    pub fn import_jar(&self, records: Vec<CookieRecord>) {
        for record in records {
            self.upsert(record);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    #[test]
    fn test_wildcard_domain_matches_subdomain() {
        let jar = Jar::new();
        jar.add_cookie("a.com", "sid=1; Domain=.a.com; Path=/");

        assert_eq!(jar.get_cookies("x.a.com"), "sid=1");
        assert_eq!(jar.get_cookies("b.com"), "");
    }

    #[test]
    fn test_domain_attribute_normalized() {
        let jar = Jar::new();
        jar.add_cookie("chat.example.com", "acct=t=abc; domain=example.com; HttpOnly");

        let records = jar.export_jar();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].domain, ".example.com");
        assert_eq!(records[0].name, "acct");
        assert_eq!(records[0].value, "t=abc");
    }

    #[test]
    fn test_host_only_cookie() {
        let jar = Jar::new();
        jar.add_cookie("chat.example.com", "a=1");

        assert_eq!(jar.get_cookies("chat.example.com"), "a=1");
        assert_eq!(jar.get_cookies("other.chat.example.com"), "");
    }

    #[test]
    fn test_upsert_replaces_value_in_place() {
        let jar = Jar::new();
        jar.add_cookie("h.com", "a=1");
        jar.add_cookie("h.com", "b=2");
        jar.add_cookie("h.com", "a=3");

        assert_eq!(jar.len(), 2);
        assert_eq!(jar.get_cookies("h.com"), "a=3; b=2");
    }

    #[test]
    fn test_malformed_header_ignored() {
        let jar = Jar::new();
        jar.add_cookie("h.com", "garbage");
        jar.add_cookie("h.com", "=x");
        assert!(jar.is_empty());
    }

    #[test]
    fn test_export_import_roundtrip() {
        let jar = Jar::new();
        jar.add_cookie("h.com", "a=1");
        jar.add_cookie("h.com", "b=2; Domain=.h.com");

        let warm = Jar::from_records(jar.export_jar());
        assert_eq!(warm.get_cookies("h.com"), "a=1; b=2");

        jar.clear();
        assert!(jar.is_empty());
        assert_eq!(warm.len(), 2);
    }

    proptest! {
        #[test]
        fn prop_one_record_per_key(values in prop::collection::vec("[a-z0-9]{1,8}", 1..20)) {
            let jar = Jar::new();
            for value in &values {
                jar.add_cookie("h.com", &format!("k={value}"));
            }
            prop_assert_eq!(jar.len(), 1);
            prop_assert_eq!(jar.get_cookies("h.com"), format!("k={}", values[values.len() - 1]));
        }
    }
}
