//! Field extraction from server-rendered pages.
//!
//! The login flow and a few lookups have no JSON endpoint, so the values
//! are pulled out of HTML with anchored patterns. Every function returns
//! `None` when the markup does not match; callers decide which error that
//! becomes.
//!
//! | Function | Page | Value |
//! |----------|------|-------|
//! | [`openid_fkey`] | OpenID login form | form token |
//! | [`chat_fkey`] | chat favorites | chat form token |
//! | [`user_id`] | chat root | logged-in user id |
//! | [`room_name`] | room info | room title |
//! | [`user_profile`] | user page | name, moderator flag, creation date |

// ============================================================================
// Imports
// ============================================================================

use std::sync::LazyLock;

use regex::Regex;

use crate::identifiers::UserId;

// ============================================================================
// Patterns
// ============================================================================

static OPENID_FKEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<input type="hidden" name="fkey" value="([0-9a-z-]*)" />"#)
        .expect("openid fkey pattern is valid")
});

static CHAT_FKEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<input id="fkey" name="fkey" type="hidden" value="([0-9a-z]*)" />"#)
        .expect("chat fkey pattern is valid")
});

/// First link in the top bar menu points at the current user.
static USER_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)class="topbar-menu-links".*?<a[^>]*href="[^"]*/users/(\d+)/"#)
        .expect("user link pattern is valid")
});

static SUBHEADER_TITLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)class="subheader"[^>]*>.*?<h1[^>]*>(.*?)</h1>"#)
        .expect("subheader pattern is valid")
});

static CONTENT_SUBHEADER_TITLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)id="content".*?class="subheader"[^>]*>.*?<h1[^>]*>(.*?)</h1>"#)
        .expect("content subheader pattern is valid")
});

static USER_STATUS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)class="user-status"[^>]*>(.*?)</"#).expect("user status pattern is valid")
});

static CREATED_AT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)class="user-stats".*?<td class="user-valuecell"[^>]*>\s*(\d{4}-\d{2}-\d{2})"#)
        .expect("user stats pattern is valid")
});

static NUMERIC_ENTITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&#(?:[xX]([0-9a-fA-F]+)|([0-9]+));").expect("entity pattern is valid")
});

/// Diamond shown next to moderator names.
const MODERATOR_MARK: &str = "&#9830;";

// ============================================================================
// UserProfile
// ============================================================================

/// Public details of a chat user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserProfile {
    /// Display name, entities decoded.
    pub name: String,
    /// `true` for site moderators.
    pub is_moderator: bool,
    /// Account creation date as `YYYY-MM-DD`, when shown.
    pub created_at: Option<String>,
}

// ============================================================================
// Extractors
// ============================================================================

/// Form token of the OpenID login page.
#[must_use]
pub fn openid_fkey(html: &str) -> Option<String> {
    capture(&OPENID_FKEY, html)
}

/// Form token used by every chat action.
#[must_use]
pub fn chat_fkey(html: &str) -> Option<String> {
    capture(&CHAT_FKEY, html)
}

/// Id of the logged-in user, from the chat root page.
#[must_use]
pub fn user_id(html: &str) -> Option<UserId> {
    capture(&USER_LINK, html)?.parse().ok().map(UserId::new)
}

/// Title of the room info page.
#[must_use]
pub fn room_name(html: &str) -> Option<String> {
    capture(&SUBHEADER_TITLE, html).map(|name| decode_entities(name.trim()))
}

/// Profile details from a user page.
#[must_use]
pub fn user_profile(html: &str) -> Option<UserProfile> {
    let name = capture(&CONTENT_SUBHEADER_TITLE, html)?;
    let is_moderator = capture(&USER_STATUS, html).is_some_and(|status| status.contains(MODERATOR_MARK));

    Some(UserProfile {
        name: decode_entities(name.trim()),
        is_moderator,
        created_at: capture(&CREATED_AT, html),
    })
}

/// Decodes numeric and the common named HTML entities.
#[must_use]
pub fn decode_entities(text: &str) -> String {
    let numeric = NUMERIC_ENTITY.replace_all(text, |captures: &regex::Captures<'_>| {
        let code = match (captures.get(1), captures.get(2)) {
            (Some(hex), _) => u32::from_str_radix(hex.as_str(), 16).ok(),
            (_, Some(dec)) => dec.as_str().parse().ok(),
            _ => None,
        };
        code.and_then(char::from_u32)
            .map_or_else(|| captures[0].to_string(), String::from)
    });

    // `&amp;` last so that "&amp;lt;" stays "&lt;".
    numeric
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&nbsp;", "\u{a0}")
        .replace("&amp;", "&")
}

fn capture(pattern: &Regex, html: &str) -> Option<String> {
    pattern
        .captures(html)
        .and_then(|captures| captures.get(1))
        .map(|found| found.as_str().to_string())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fkeys() {
        let openid = r#"<form><input type="hidden" name="fkey" value="ab-12cd" /></form>"#;
        assert_eq!(openid_fkey(openid).as_deref(), Some("ab-12cd"));

        let chat = r#"<input id="fkey" name="fkey" type="hidden" value="0f9e8d" />"#;
        assert_eq!(chat_fkey(chat).as_deref(), Some("0f9e8d"));

        assert!(openid_fkey("<html></html>").is_none());
        assert!(chat_fkey(openid).is_none());
    }

    #[test]
    fn test_user_id_from_topbar() {
        let html = r#"
            <div class="topbar-links">
              <span class="topbar-menu-links">
                <a href="//chat.stackexchange.com/users/12345/someone" title="someone">someone</a>
                <a href="/faq">faq</a>
              </span>
            </div>"#;
        assert_eq!(user_id(html), Some(UserId::new(12345)));
        assert!(user_id("<a href=\"/users/1/x\">x</a>").is_none());
    }

    #[test]
    fn test_room_name() {
        let html = r#"<div class="subheader"><h1>Tavern &amp; Co</h1></div>"#;
        assert_eq!(room_name(html).as_deref(), Some("Tavern & Co"));
    }

    #[test]
    fn test_user_profile() {
        let html = r#"
            <div id="content">
              <div class="subheader"><h1>J&#246;rg</h1></div>
              <div class="user-status">&#9830; moderator</div>
              <table class="user-stats"><tbody>
                <tr><td class="user-keycell">created</td><td class="user-valuecell">2014-03-07</td></tr>
              </tbody></table>
            </div>"#;

        let profile = user_profile(html).expect("profile");
        assert_eq!(profile.name, "Jörg");
        assert!(profile.is_moderator);
        assert_eq!(profile.created_at.as_deref(), Some("2014-03-07"));

        let plain = r#"<div id="content"><div class="subheader"><h1>Ann</h1></div>
            <div class="user-status">member</div></div>"#;
        let profile = user_profile(plain).expect("profile");
        assert!(!profile.is_moderator);
        assert!(profile.created_at.is_none());
    }

    #[test]
    fn test_decode_entities() {
        assert_eq!(decode_entities("a &lt;b&gt; &#x41;&#66;"), "a <b> AB");
        assert_eq!(decode_entities("&amp;lt;"), "&lt;");
        assert_eq!(decode_entities("&#xD800;"), "&#xD800;");
    }
}
