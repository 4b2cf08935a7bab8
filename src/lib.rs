#![allow(clippy::doc_markdown)] // Allow technical terms like TestFlight, SHAs in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Liftoff Core
//!
//! Embeddable orchestration engine for multi-stage mobile app releases.
//!
//! ## Overview
//!
//! Liftoff drives a release train through three stages - KICKOFF, REGRESSION
//! and POST_REGRESSION - by running a cron-style tick loop over registered
//! releases. Each tick dispatches whichever tasks have their dependencies
//! satisfied, reconciles in-flight CI workflows and test runs against their
//! providers, and advances the release phase when a stage's task set is
//! complete. REGRESSION additionally runs scheduled regression cycles and a
//! human approval gate with cherry-pick verification.
//!
//! ## Architecture
//!
//! The engine owns no timers and no HTTP client configuration of its own.
//! The host supplies both halves of the boundary:
//!
//! - an external cron trigger calls [`engine::ReleaseEngine::run_tick`]
//!   (directly or through the bundled [`web`] router), and
//! - a [`providers::ProviderSet`] of async trait objects adapts the SCM,
//!   CI, test management, ticketing and notification backends.
//!
//! Everything between those seams - the per-release lease lock, the stage
//! task templates, the executor state machine, the two-pass workflow
//! reconciliation, the cycle manager and the build upload ledger - lives in
//! this crate and is exercised the same way in production and in tests.
//!
//! ## Module Organization
//!
//! - [`engine`] - assembled engine facade the host embeds
//! - [`scheduler`] - cron tick loop over active releases
//! - [`locking`] - per-release renewable TTL leases
//! - [`sequencer`] - stage task templates and dependency gating
//! - [`executor`] - task dispatch against the providers
//! - [`polling`] - two-pass reconciliation of async tasks
//! - [`cycles`] - regression cycle lifecycle and the approval gate
//! - [`uploads`] - build upload ledger with at-most-once consumption
//! - [`models`] - releases, tasks, cycles, uploads, locks, slots
//! - [`state_machine`] - task status transitions
//! - [`store`] - in-memory conditional-update store
//! - [`providers`] - async provider traits the host implements
//! - [`web`] - axum router exposing the HTTP surface
//! - [`config`] - engine configuration loading
//! - [`error`] - structured error handling

pub mod config;
pub mod cycles;
pub mod engine;
pub mod error;
pub mod executor;
pub mod locking;
pub mod logging;
pub mod models;
pub mod polling;
pub mod providers;
pub mod scheduler;
pub mod sequencer;
pub mod state_machine;
pub mod store;
pub mod uploads;
pub mod web;

pub use config::EngineConfig;
pub use engine::{NewRelease, ReleaseEngine, StageOverview, StagedBuild};
pub use error::{EngineError, Result};
pub use models::{
    BuildMode, BuildUpload, Platform, RegressionCycle, RegressionSlot, Release, ReleasePhase,
    ReleaseTask, Stage, TaskKey, TaskType,
};
pub use providers::ProviderSet;
pub use state_machine::{TaskConclusion, TaskStatus};
