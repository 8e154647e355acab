// handlers/elevated/mod.rs - Elevated handlers (platform operator)
//
// Served only on the platform host. The operator role is still checked per
// operation by the policy engine.
pub mod tenants;
