pub mod auth;
pub mod rate_limit;

pub use auth::{authenticate, require_role, Claims};
pub use rate_limit::rate_limit_middleware;
