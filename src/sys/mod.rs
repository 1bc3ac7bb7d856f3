//! Kernel-call gate: the boundary between the runtime and the microkernel.
//!
//! ```text
//!   mailbox/portal/sync API ──▶ typed wrappers (calls) ──▶ KernelGate
//!                                                             │
//!                                              target: svc gate│  host: sim
//!                                                             ▼
//!                                                        microkernel / fabric
//! ```
//!
//! Everything above this module speaks `Result`; everything below speaks
//! signed machine words with negative errno-style codes. On hardware a
//! `KernelGate` implementation issues supervisor calls; on the host the
//! bundled [`sim`] fabric stands in for the kernel and the NoC.

pub mod calls;
pub mod gate;
pub mod nr;
pub mod sim;

pub use gate::{KernelGate, Word};
