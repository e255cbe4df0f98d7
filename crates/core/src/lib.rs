pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;

pub use audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
pub use config::{AppConfig, PolicyConfig};
pub use domain::customer::{CustomerId, Tier, UserContext};
pub use domain::guardrail::{InputVerdict, OutputVerdict};
pub use domain::handoff::HandoffRecord;
pub use domain::session::{SessionId, Speaker, Turn, TurnKind};
pub use domain::specialist::{ActiveAgent, SpecialistId};
pub use errors::{ApplicationError, DomainError, InterfaceError};
