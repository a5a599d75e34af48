use crate::foundation::ElectorError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_PING_INTERVAL_MS: u64 = 1_000;
pub const DEFAULT_PING_WAIT_TIME_MS: u64 = 1_000;
pub const DEFAULT_PING_BACK_OFF_MS: u64 = 1_000;
pub const DEFAULT_ELECTION_WAIT_TIME_MS: u64 = 2_000;
pub const DEFAULT_BULLY_WAIT_TIME_MS: u64 = 25_000;

/// Timing knobs for one elector instance. The host constructs this and
/// hands it to `BullyElector::new`; the crate reads no files and no
/// environment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ElectorConfig {
    /// Gap between consecutive PINGs from a follower.
    pub ping_interval_ms: u64,
    /// Window to receive a PONG, and the window a fresh election waits
    /// for the first ALIVE reply.
    pub ping_wait_time_ms: u64,
    /// Pause before retrying an election attempt that did not converge.
    pub ping_back_off_ms: u64,
    /// Wait for a COORDINATOR broadcast after standing down on ALIVE.
    pub election_wait_time_ms: u64,
    /// Total budget for one `coordinator` call.
    pub bully_wait_time_ms: u64,
    /// Consecutive PONG misses tolerated before re-election.
    pub ping_miss_threshold: u32,
}

impl Default for ElectorConfig {
    fn default() -> Self {
        Self {
            ping_interval_ms: DEFAULT_PING_INTERVAL_MS,
            ping_wait_time_ms: DEFAULT_PING_WAIT_TIME_MS,
            ping_back_off_ms: DEFAULT_PING_BACK_OFF_MS,
            election_wait_time_ms: DEFAULT_ELECTION_WAIT_TIME_MS,
            bully_wait_time_ms: DEFAULT_BULLY_WAIT_TIME_MS,
            ping_miss_threshold: 1,
        }
    }
}

impl ElectorConfig {
    /// Enforces `ping_wait_time < election_wait_time < bully_wait_time`
    /// and a usable miss threshold.
    pub fn validate(&self) -> Result<(), ElectorError> {
        if self.ping_wait_time_ms >= self.election_wait_time_ms {
            return Err(ElectorError::Config(format!(
                "ping_wait_time_ms ({}) must be below election_wait_time_ms ({})",
                self.ping_wait_time_ms, self.election_wait_time_ms
            )));
        }
        if self.election_wait_time_ms >= self.bully_wait_time_ms {
            return Err(ElectorError::Config(format!(
                "election_wait_time_ms ({}) must be below bully_wait_time_ms ({})",
                self.election_wait_time_ms, self.bully_wait_time_ms
            )));
        }
        if self.ping_interval_ms == 0 {
            return Err(ElectorError::Config("ping_interval_ms must be > 0".to_string()));
        }
        if self.ping_miss_threshold == 0 {
            return Err(ElectorError::Config("ping_miss_threshold must be >= 1".to_string()));
        }
        Ok(())
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }

    pub fn ping_wait_time(&self) -> Duration {
        Duration::from_millis(self.ping_wait_time_ms)
    }

    pub fn ping_back_off(&self) -> Duration {
        Duration::from_millis(self.ping_back_off_ms)
    }

    pub fn election_wait_time(&self) -> Duration {
        Duration::from_millis(self.election_wait_time_ms)
    }

    pub fn bully_wait_time(&self) -> Duration {
        Duration::from_millis(self.bully_wait_time_ms)
    }
}
