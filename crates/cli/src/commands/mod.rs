//! Subcommand implementations

pub mod add;
pub mod config;
pub mod doctor;
pub mod status;
pub mod subscriptions;
pub mod update;
