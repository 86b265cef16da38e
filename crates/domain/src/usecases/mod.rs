//! Application use cases / business logic

pub mod report;
pub mod subscribe;
pub mod update;

#[cfg(test)]
pub(crate) mod fakes;

pub use report::{DigestReport, DigestSnapshot, ReportConfig, ReportRenderer};
pub use subscribe::{SubscribeError, Subscribed, SubscriptionManager};
pub use update::{RunPhase, UpdateConfig, UpdateError, UpdateOrchestrator};
