//! Shared harness for the integration suites.

pub mod mocks;

use chrono::{Duration, Utc};
use liftoff_core::engine::NewRelease;
use liftoff_core::store::EngineStore;
use liftoff_core::{BuildMode, EngineConfig, Platform, Release, ReleaseEngine};
use mocks::MockProviders;
use std::sync::Arc;

/// Engine wired to fresh mocks, with the store handle exposed for direct
/// inspection.
pub struct Harness {
    pub engine: ReleaseEngine,
    pub providers: MockProviders,
    pub store: Arc<EngineStore>,
}

pub fn harness() -> Harness {
    harness_with_config(EngineConfig::default())
}

pub fn harness_with_config(config: EngineConfig) -> Harness {
    let providers = MockProviders::new();
    let store = Arc::new(EngineStore::new());
    let engine = ReleaseEngine::with_store(Arc::clone(&store), config, providers.provider_set());
    Harness {
        engine,
        providers,
        store,
    }
}

/// A two-platform release whose kickoff is already in the past so no slot or
/// date gate interferes unless a test sets one.
pub fn new_release(version: &str, build_mode: BuildMode) -> NewRelease {
    NewRelease {
        app_id: "acme-app".to_string(),
        version: version.to_string(),
        repo: "acme/mobile-app".to_string(),
        base_branch: "main".to_string(),
        kickoff_at: Utc::now() - Duration::days(1),
        target_release_at: Utc::now() + Duration::days(13),
        platforms: vec![Platform::Ios, Platform::Android],
        build_mode,
        regression_slots: vec![],
    }
}

pub fn create_release(harness: &Harness, version: &str, build_mode: BuildMode) -> Release {
    let release = harness
        .engine
        .create_release(new_release(version, build_mode))
        .expect("release creation");
    harness
        .engine
        .seed_current_stage(release.id)
        .expect("seed kickoff");
    release
}
