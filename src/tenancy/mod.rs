pub mod resolver;

pub use resolver::{classify_host, validate_subdomain, HostKind, HostScope, ResolveError, TenantResolver};
