//! HTTP middleware stack for the portal.
//!
//! # Middleware Order (bottom to top in Router)
//!
//! 1. Sentry layer (capture errors)
//! 2. `TraceLayer` (request tracing)
//! 3. Request ID (add unique ID to each request)
//! 4. Security headers (CSP, no-store, etc.)
//! 5. Route guard (role-scoped page trees)
//! 6. Auth-route gate (sign-in and sign-up pages only)

pub mod guard;
pub mod request_id;
pub mod security_headers;

pub use guard::{auth_route_middleware, route_guard_middleware};
pub use request_id::{RequestId, request_id_middleware};
pub use security_headers::security_headers_middleware;
