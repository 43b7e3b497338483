//! Router Module Index
//!
//! One router per resource. Authentication and role checks live in the
//! handlers (via the `AuthUser` extractor), so the routers only decide which
//! verbs a path accepts. Every method router falls back to a 405 envelope,
//! which is answered before any authentication work happens.

/// Unauthenticated operational endpoints.
pub mod public;

/// `/referrers` and `/referrers/search`.
pub mod referrers;

/// `/referrer-types`.
pub mod referrer_types;
