//! NoCLink: asynchronous inter-kernel communication runtime.
//!
//! User-space runtime for manycore NoC targets. Nodes exchange
//! fixed-size control messages (mailboxes) and variable-size bulk data
//! (portals); every read/write is decomposed into a `config → wait`
//! task pair scheduled by per-core dispatcher threads, so a user call
//! never blocks on raw hardware — it suspends on a completion gate and
//! resumes when the dispatcher has driven the transfer to its end.
//!
//! All hardware access is confined to the [`sys`] gate; the bundled
//! [`sys::sim`] fabric stands in for the kernel and the NoC on host
//! builds, which keeps the entire runtime testable off-target.

#![deny(unused_must_use)]

pub mod barrier;
pub mod comm;
pub mod config;
pub mod flow;
pub mod mailbox;
pub mod portal;
pub mod runtime;
pub mod sync;
pub mod sys;
pub mod task;
pub mod thread;

mod error;

pub use barrier::Barrier;
pub use config::RuntimeConfig;
pub use error::{Error, Result};
pub use comm::CommIoctl;
pub use runtime::Runtime;
pub use sync::SyncType;
pub use task::{Dependency, Management, TaskExit, TaskId, TaskRun, TaskState, Trigger};
