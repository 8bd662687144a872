//! Bearer token authentication.
//!
//! Stateless access tokens are checked on every request by the
//! [`authenticate`] middleware; refresh tokens are rotated through the
//! single-slot refresh store by the auth service.

mod errors;
mod extractors;
mod filter;
mod header;
mod types;

pub use errors::{AuthError, ErrorBody};
pub use extractors::{AdminOnly, Authenticated};
pub use filter::{
    AuthGate, AuthenticationDone, DEFAULT_EXEMPT_PREFIXES, ExemptPaths, GateRejection, GateState,
    authenticate,
};
pub use header::{BEARER_PREFIX, resolve_bearer_token};
pub use types::{Authority, Principal};
