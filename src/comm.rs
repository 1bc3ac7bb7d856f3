//! Communicator bookkeeping.
//!
//! One table per communicator kind (mailboxes, portals). Each tracks
//! process-wide operation counters, which ids are user-visible (and
//! whether they came from `create` or `open`), and the allowed remote
//! recorded by `allow`/`SET_REMOTE`. Everything is guarded by one
//! spinlock per table; counters advance only on success and only under
//! that lock.

use crate::error::{Error, Result};

/// Ids per communicator kind. Mailboxes and portals size their tables
/// identically.
pub const COMM_IDS_MAX: usize = 64;

/// Process-wide operation counters for one communicator kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counters {
    pub ncreates: u64,
    pub nunlinks: u64,
    pub nopens: u64,
    pub ncloses: u64,
    pub nreads: u64,
    pub nwrites: u64,
}

/// Read-only measurement and counter requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommIoctl {
    /// Bytes transferred so far (hardware-measured).
    GetVolume,
    /// Accumulated transfer latency in NoC cycles (hardware-measured).
    GetLatency,
    GetNCreates,
    GetNUnlinks,
    GetNOpens,
    GetNCloses,
    GetNReads,
    GetNWrites,
}

impl CommIoctl {
    /// Resolve a counter request against a table snapshot; `None` for
    /// the hardware-measured requests.
    pub(crate) fn from_counters(self, c: &Counters) -> Option<u64> {
        match self {
            Self::GetVolume | Self::GetLatency => None,
            Self::GetNCreates => Some(c.ncreates),
            Self::GetNUnlinks => Some(c.nunlinks),
            Self::GetNOpens => Some(c.nopens),
            Self::GetNCloses => Some(c.ncloses),
            Self::GetNReads => Some(c.nreads),
            Self::GetNWrites => Some(c.nwrites),
        }
    }
}

/// How a user-visible id came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Origin {
    #[default]
    Free,
    Created,
    Opened,
}

struct CommState {
    counters: Counters,
    origins: [Origin; COMM_IDS_MAX],
    allows: [Option<(i32, i32)>; COMM_IDS_MAX],
}

impl Default for CommState {
    fn default() -> Self {
        Self {
            counters: Counters::default(),
            origins: [Origin::Free; COMM_IDS_MAX],
            allows: [None; COMM_IDS_MAX],
        }
    }
}

/// Per-kind communicator table.
pub struct CommTable {
    name: &'static str,
    state: spin::Mutex<CommState>,
}

impl CommTable {
    pub fn new(name: &'static str) -> Self {
        log::info!("{}: table initialized ({} ids)", name, COMM_IDS_MAX);
        Self {
            name,
            state: spin::Mutex::new(CommState::default()),
        }
    }

    // ── Lifecycle counters ────────────────────────────────────

    pub fn note_create(&self, id: i32) {
        let mut st = self.state.lock();
        st.counters.ncreates += 1;
        st.origins[id as usize] = Origin::Created;
        st.allows[id as usize] = None;
    }

    pub fn note_open(&self, id: i32) {
        let mut st = self.state.lock();
        st.counters.nopens += 1;
        st.origins[id as usize] = Origin::Opened;
    }

    pub fn note_unlink(&self, id: i32) {
        let mut st = self.state.lock();
        st.counters.nunlinks += 1;
        st.origins[id as usize] = Origin::Free;
        st.allows[id as usize] = None;
    }

    pub fn note_close(&self, id: i32) {
        let mut st = self.state.lock();
        st.counters.ncloses += 1;
        st.origins[id as usize] = Origin::Free;
    }

    /// Count a completed read. Only user-visible ids are counted, so
    /// internal traffic does not inflate the numbers.
    pub fn note_read(&self, id: i32) {
        let mut st = self.state.lock();
        if st.origins[id as usize] != Origin::Free {
            st.counters.nreads += 1;
        }
    }

    pub fn note_write(&self, id: i32) {
        let mut st = self.state.lock();
        if st.origins[id as usize] != Origin::Free {
            st.counters.nwrites += 1;
        }
    }

    pub fn counters(&self) -> Counters {
        self.state.lock().counters
    }

    // ── Allow records ─────────────────────────────────────────

    /// Record the remote a future read accepts. `Busy` if an allow is
    /// already pending on this id.
    pub fn set_allow(&self, id: i32, remote: i32, port: i32) -> Result<()> {
        let mut st = self.state.lock();
        if st.allows[id as usize].is_some() {
            log::warn!("{}: allow already pending on id {}", self.name, id);
            return Err(Error::Busy);
        }
        st.allows[id as usize] = Some((remote, port));
        Ok(())
    }

    /// Overwrite the allow record unconditionally (internal re-allow
    /// between chunks).
    pub fn record_allow(&self, id: i32, remote: i32, port: i32) {
        self.state.lock().allows[id as usize] = Some((remote, port));
    }

    /// The pending allow, if any.
    pub fn allow(&self, id: i32) -> Option<(i32, i32)> {
        self.state.lock().allows[id as usize]
    }

    /// A successful read consumes the allow record.
    pub fn clear_allow(&self, id: i32) {
        self.state.lock().allows[id as usize] = None;
    }
}
