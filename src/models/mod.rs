//! # Data Model
//!
//! Entities owned by the orchestration engine: releases and their phase,
//! the per-stage task rows forming the execution audit trail, per-release
//! cron locks, regression cycles, the manual build-upload ledger rows, and
//! the regression schedule slots.

pub mod build_upload;
pub mod cron_lock;
pub mod regression_cycle;
pub mod regression_slot;
pub mod release;
pub mod task;

pub use build_upload::{BuildUpload, UploadConsumer, UploadSource};
pub use cron_lock::{CronLock, Lease};
pub use regression_cycle::{CycleStatus, RegressionCycle};
pub use regression_slot::RegressionSlot;
pub use release::{BuildMode, Platform, Release, ReleasePhase, Stage};
pub use task::{ReleaseTask, TaskKey, TaskType};
