pub mod auth;
pub mod request_logger;

pub use auth::{bind_fixed_tenant, require_level, FixedTenant, LevelGuard};
pub use request_logger::request_logger_middleware;
