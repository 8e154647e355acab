pub mod agent;
pub mod audit;
pub mod identity;
pub mod lead;
pub mod stage;
pub mod tenant;

pub use agent::Agent;
pub use audit::{AuditLogEntry, NewAuditEntry};
pub use identity::{Identity, Role};
pub use lead::Lead;
pub use stage::{PipelineStage, StageDraft};
pub use tenant::{PlanTier, Tenant, TenantStatus};
