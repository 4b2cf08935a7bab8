//! # Regression Slot
//!
//! Schedule entry feeding regression-cycle creation: either an absolute
//! `(date, time)` or an offset in days from kickoff plus a time of day. The
//! two forms are interconvertible given the release's kickoff timestamp, and
//! a valid slot falls strictly between the kickoff and target-release
//! timestamps.

use crate::error::{EngineError, Result};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RegressionSlot {
    Absolute { date: NaiveDate, time: NaiveTime },
    Offset { days_from_kickoff: i64, time: NaiveTime },
}

impl RegressionSlot {
    /// Resolve the slot to an absolute UTC timestamp.
    pub fn to_absolute(&self, kickoff: DateTime<Utc>) -> DateTime<Utc> {
        match *self {
            Self::Absolute { date, time } => date.and_time(time).and_utc(),
            Self::Offset {
                days_from_kickoff,
                time,
            } => (kickoff.date_naive() + chrono::Duration::days(days_from_kickoff))
                .and_time(time)
                .and_utc(),
        }
    }

    /// Express the slot as an offset from kickoff.
    pub fn to_offset(&self, kickoff: DateTime<Utc>) -> RegressionSlot {
        match *self {
            Self::Offset { .. } => *self,
            Self::Absolute { date, time } => Self::Offset {
                days_from_kickoff: (date - kickoff.date_naive()).num_days(),
                time,
            },
        }
    }

    /// A slot must fall strictly between kickoff and the target release.
    pub fn validate(
        &self,
        kickoff: DateTime<Utc>,
        target_release: DateTime<Utc>,
    ) -> Result<()> {
        let at = self.to_absolute(kickoff);
        if at <= kickoff || at >= target_release {
            return Err(EngineError::validation(format!(
                "regression slot {at} must fall strictly between kickoff {kickoff} and target release {target_release}"
            )));
        }
        Ok(())
    }

    pub fn is_due(&self, kickoff: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        self.to_absolute(kickoff) <= now
    }
}
