//! Runtime sizing parameters.
//!
//! Compile-time limits for every fixed-capacity table in the runtime,
//! plus the per-process `RuntimeConfig` validated at launch. The message
//! geometry constants match the NoC transport: a mailbox frame carries
//! exactly [`MAILBOX_MESSAGE_SIZE`] payload bytes, a portal moves bulk
//! data in [`PORTAL_MESSAGE_DATA_SIZE`]-byte pieces.

use crate::error::{Error, Result};

/// Maximum number of user threads the runtime tracks.
/// Also sizes each flow pool: one in-flight flow per user thread.
pub const THREAD_MAX: usize = 16;

/// Maximum number of dispatcher cores.
pub const CORES_MAX: usize = 4;

/// Maximum number of live tasks.
///
/// The flow pools permanently hold `2 * 2 * THREAD_MAX` tasks
/// (config/wait pair per slot, dispatcher and user pools); the rest is
/// headroom for application graphs.
pub const TASK_MAX: usize = 128;

/// Outgoing edges per task.
pub const TASK_CHILDREN_MAX: usize = 8;

/// Incoming edges per task.
pub const TASK_PARENTS_MAX: usize = 8;

/// Depth of one per-core ready queue.
pub const READY_QUEUE_DEPTH: usize = 64;

/// Flow slots per pool (dispatcher pool and user pool).
pub const FLOWS_MAX: usize = THREAD_MAX;

/// Number of mailbox ids.
pub const MAILBOX_MAX: usize = 64;

/// Number of portal ids.
pub const PORTAL_MAX: usize = 64;

/// Payload bytes in one mailbox message.
pub const MAILBOX_MESSAGE_SIZE: usize = 120;

/// Ports per node for mailbox multiplexing.
pub const MAILBOX_PORT_NR: i32 = 16;

/// Ports per node for portal multiplexing.
pub const PORTAL_PORT_NR: i32 = 16;

/// Payload bytes in one portal piece; larger transfers are chunked.
pub const PORTAL_MESSAGE_DATA_SIZE: usize = 1024;

/// Largest single portal read/write.
pub const PORTAL_MAX_SIZE: usize = 1024 * 1024;

/// Per-process runtime configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Number of dispatcher cores to run (1..=CORES_MAX).
    pub cores: usize,
    /// Microseconds a dispatcher parks for when its queue is idle.
    /// One idle park advances the periodic tick.
    pub idle_park_us: u64,
}

impl RuntimeConfig {
    /// Validate a configuration. Out-of-range values are rejected, not
    /// clamped, so a bad deployment fails loudly at launch.
    pub fn validate(&self) -> Result<()> {
        if self.cores == 0 || self.cores > CORES_MAX {
            return Err(Error::Inval);
        }
        if self.idle_park_us == 0 {
            return Err(Error::Inval);
        }
        Ok(())
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            cores: 1,
            idle_park_us: 200,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(RuntimeConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_cores_rejected() {
        let cfg = RuntimeConfig {
            cores: 0,
            ..RuntimeConfig::default()
        };
        assert_eq!(cfg.validate(), Err(Error::Inval));
    }

    #[test]
    fn too_many_cores_rejected() {
        let cfg = RuntimeConfig {
            cores: CORES_MAX + 1,
            ..RuntimeConfig::default()
        };
        assert_eq!(cfg.validate(), Err(Error::Inval));
    }
}
