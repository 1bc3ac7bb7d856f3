//! The word-based kernel-call gate trait.
//!
//! The gate is the single seam between the runtime and its environment:
//! arity-typed entry points taking machine words and returning a signed
//! word (negative errno-style code on failure). Keeping the seam at word
//! granularity means a test double can intercept any individual call by
//! number — the transient-retry tests stub exactly one opcode — and a
//! hardware port is a four-function trampoline into the svc gate.

use super::nr::CallNr;

/// Machine word crossing the gate.
pub type Word = usize;

/// Supervisor-call gate.
///
/// Implementations must be callable from any thread; `*_wait` calls may
/// suspend the caller until the underlying communication completes.
pub trait KernelGate: Send + Sync {
    /// Zero-argument call.
    fn call0(&self, nr: CallNr) -> isize;

    /// One-argument call.
    fn call1(&self, nr: CallNr, a: Word) -> isize;

    /// Two-argument call.
    fn call2(&self, nr: CallNr, a: Word, b: Word) -> isize;

    /// Three-argument call.
    fn call3(&self, nr: CallNr, a: Word, b: Word, c: Word) -> isize;
}
