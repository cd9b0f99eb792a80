// ABOUTME: Library root for the pull-based site sync tool
// ABOUTME: Exposes configuration, the stage building blocks and the orchestrating pipeline

pub mod command;
pub mod config;
pub mod database;
pub mod error;
pub mod lock;
pub mod logging;
pub mod permissions;
pub mod pipeline;
pub mod preflight;
pub mod remote;
pub mod service;
pub mod transfer;

pub use config::Config;
pub use error::SyncError;
pub use pipeline::{Pipeline, PipelineFailure, RunSummary, Stage};
