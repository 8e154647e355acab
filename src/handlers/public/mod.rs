// handlers/public/mod.rs - Public handlers (no authentication required)
//
// Lead intake is addressed to a tenant host and takes its tenant from there.
// The billing webhook authenticates with a shared secret header instead of a
// session.
pub mod billing;
pub mod intake;
pub mod session;
pub mod system;
