//! Per-request authentication.
//!
//! Every request outside the open-route allowlist must carry a bearer access
//! token and the session cookie issued by the same login, and the access
//! binding in the cache must still point at that token.

mod authenticator;
mod extractors;
mod middleware;

pub use authenticator::{RequestAuthenticator, VerifiedSession, bearer_token};
pub use middleware::{require_auth, stamp_deadline};
