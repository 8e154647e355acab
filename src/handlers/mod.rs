// handlers/mod.rs - 3-Tier Handler Architecture
//
// Public (no credential) → Protected (session JWT) → Elevated (platform operator)
//
// Every tier runs behind the host middleware, so handlers that need the
// tenant read `HostScope` from the request extensions. Protected and elevated
// handlers also receive the resolved `Caller`.
pub mod public;    // Tier 1: intake, sessions, billing webhook, health
pub mod protected; // Tier 2: leads, stages, agents, audit, profile
pub mod elevated;  // Tier 3: tenant lifecycle (platform host only)
