//! # Release Model
//!
//! The root aggregate of the pipeline. A release owns its current phase; the
//! phase is mutated only through the sequencer's stage-completion checks and
//! the regression approval gate, never directly by API callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Pipeline phase of a release. The stage graph is fixed:
/// KICKOFF → REGRESSION → POST_REGRESSION → DONE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReleasePhase {
    Kickoff,
    Regression,
    PostRegression,
    Done,
}

impl ReleasePhase {
    /// The stage whose tasks run while the release sits in this phase.
    pub fn as_stage(&self) -> Option<Stage> {
        match self {
            Self::Kickoff => Some(Stage::Kickoff),
            Self::Regression => Some(Stage::Regression),
            Self::PostRegression => Some(Stage::PostRegression),
            Self::Done => None,
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }
}

impl fmt::Display for ReleasePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Kickoff => write!(f, "KICKOFF"),
            Self::Regression => write!(f, "REGRESSION"),
            Self::PostRegression => write!(f, "POST_REGRESSION"),
            Self::Done => write!(f, "DONE"),
        }
    }
}

/// One of the three task-bearing stages of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    Kickoff,
    Regression,
    PostRegression,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Kickoff => write!(f, "KICKOFF"),
            Self::Regression => write!(f, "REGRESSION"),
            Self::PostRegression => write!(f, "POST_REGRESSION"),
        }
    }
}

impl std::str::FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "KICKOFF" => Ok(Self::Kickoff),
            "REGRESSION" => Ok(Self::Regression),
            "POST_REGRESSION" => Ok(Self::PostRegression),
            _ => Err(format!("Invalid stage: {s}")),
        }
    }
}

/// Mobile platform targeted by a release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Ios,
    Android,
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ios => write!(f, "ios"),
            Self::Android => write!(f, "android"),
        }
    }
}

impl std::str::FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ios" => Ok(Self::Ios),
            "android" => Ok(Self::Android),
            _ => Err(format!("Invalid platform: {s}")),
        }
    }
}

/// How regression builds are produced for a release: triggered through the
/// CI/CD provider, or staged manually through the upload ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildMode {
    Ci,
    ManualUpload,
}

/// A single app release moving through the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Release {
    pub id: Uuid,
    /// Tenant / app identifier the release belongs to.
    pub app_id: String,
    /// Marketing version being released, e.g. "2.14.0".
    pub version: String,
    /// SCM repository slug, e.g. "acme/mobile-app".
    pub repo: String,
    pub phase: ReleasePhase,
    /// Release branch forked at kickoff, e.g. "release/2.14.0".
    pub branch: String,
    /// Branch the release branch is forked from.
    pub base_branch: String,
    pub kickoff_at: DateTime<Utc>,
    pub target_release_at: DateTime<Utc>,
    pub platforms: Vec<Platform>,
    pub build_mode: BuildMode,
    pub created_at: DateTime<Utc>,
}

impl Release {
    pub fn new(
        app_id: impl Into<String>,
        version: impl Into<String>,
        repo: impl Into<String>,
        base_branch: impl Into<String>,
        kickoff_at: DateTime<Utc>,
        target_release_at: DateTime<Utc>,
        platforms: Vec<Platform>,
        build_mode: BuildMode,
    ) -> Self {
        let version = version.into();
        Self {
            id: Uuid::new_v4(),
            app_id: app_id.into(),
            branch: format!("release/{version}"),
            version,
            repo: repo.into(),
            phase: ReleasePhase::Kickoff,
            base_branch: base_branch.into(),
            kickoff_at,
            target_release_at,
            platforms,
            build_mode,
            created_at: Utc::now(),
        }
    }

    /// Final tag name cut at the end of the pipeline.
    pub fn release_tag(&self) -> String {
        format!("v{}", self.version)
    }

    /// Tag cut for the nth regression cycle (1-based).
    pub fn cycle_tag(&self, cycle_number: usize) -> String {
        format!("v{}-rc.{cycle_number}", self.version)
    }

    pub fn targets(&self, platform: Platform) -> bool {
        self.platforms.contains(&platform)
    }
}
