// handlers/protected/mod.rs - Protected handlers (session JWT required)
//
// Middleware: host scope → identity (one privileged read, cached as `Caller`).
// Authorization itself happens inside the workflows through `policy::authorize`.
pub mod agents;
pub mod audit;
pub mod leads;
pub mod me;
pub mod stages;
