//! Chat session.
//!
//! | Module | Description |
//! |--------|-------------|
//! | `builder` | [`ClientBuilder`], [`ClientConfig`] and [`JoinOptions`] |
//! | `core` | [`Client`]: login, rooms and actions |
//! | `credentials` | Session persistence |
//! | `queue` | Rate-limit aware [`ActionQueue`] |
//! | `scrape` | Field extraction from HTML pages |

// ============================================================================
// Submodules
// ============================================================================

/// Client configuration.
pub mod builder;

/// Session and actions.
pub mod core;

/// Credential persistence.
pub mod credentials;

/// Serialized mutating requests.
pub mod queue;

/// HTML field extraction.
pub mod scrape;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::{ClientBuilder, ClientConfig, DEFAULT_HOST, DEFAULT_OPENID_LOGIN_URL, JoinOptions};
pub use self::core::Client;
pub(crate) use self::core::ClientInner;
pub use credentials::{CredentialStore, Credentials, DEFAULT_MAX_AGE, FileCredentialStore};
pub use queue::{ActionQueue, DEFAULT_RATE_LIMIT_MARGIN, rate_limit_seconds};
pub use scrape::UserProfile;
