pub mod auth;
pub mod host;
pub mod response;

pub use auth::identity_middleware;
pub use host::{host_scope_middleware, require_platform_host};
pub use response::{ApiResponse, ApiResult};
