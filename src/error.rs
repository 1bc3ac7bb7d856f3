//! Unified error type for the IKC runtime.
//!
//! Every fallible operation funnels into a single `Error` enum so the
//! user-facing API stays uniform. All variants are `Copy` so they can be
//! carried through task return values and flow slots without allocation.
//!
//! The enum mirrors the POSIX-style codes spoken on the kernel-call gate:
//! `code()` produces the negative word the gate returns, `from_code()`
//! decodes one. The transient subset — the conditions the flow engine
//! silently retries instead of surfacing — is a first-class predicate
//! here rather than ad-hoc checks at every call site.

use core::fmt;

/// Every fallible operation in the runtime funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Argument out of range, malformed id, or invalid graph operation.
    Inval,
    /// Resource exhausted: no free slot, full edge table, busy channel.
    Busy,
    /// Operation would block; retry later.
    Again,
    /// Peer has not granted access yet (portal allow pending).
    Acces,
    /// No message of the requested kind is available.
    NoMsg,
    /// The underlying transfer timed out.
    TimedOut,
    /// Protocol misuse, e.g. a blocking wait on a dispatcher thread.
    Proto,
    /// Caller does not own the resource it is releasing.
    Perm,
    /// Re-lock of an error-checking mutex by its owner.
    Deadlk,
    /// Stale or foreign communicator id.
    Badf,
    /// Request not supported by this communicator kind.
    NotSup,
    /// Bad buffer handed across the gate.
    Fault,
}

impl Error {
    /// Negative errno-style code used on the word-based gate ABI.
    pub const fn code(self) -> i32 {
        match self {
            Self::Inval => -22,
            Self::Busy => -16,
            Self::Again => -11,
            Self::Acces => -13,
            Self::NoMsg => -42,
            Self::TimedOut => -110,
            Self::Proto => -71,
            Self::Perm => -1,
            Self::Deadlk => -35,
            Self::Badf => -9,
            Self::NotSup => -95,
            Self::Fault => -14,
        }
    }

    /// Decode a raw gate return. `None` for non-negative words and for
    /// codes the runtime never produces.
    pub const fn from_code(raw: i32) -> Option<Self> {
        match raw {
            -22 => Some(Self::Inval),
            -16 => Some(Self::Busy),
            -11 => Some(Self::Again),
            -13 => Some(Self::Acces),
            -42 => Some(Self::NoMsg),
            -110 => Some(Self::TimedOut),
            -71 => Some(Self::Proto),
            -1 => Some(Self::Perm),
            -35 => Some(Self::Deadlk),
            -9 => Some(Self::Badf),
            -95 => Some(Self::NotSup),
            -14 => Some(Self::Fault),
            _ => None,
        }
    }

    /// Whether the flow engine should retry instead of surfacing this.
    ///
    /// Transient conditions: channel busy, would-block, access not yet
    /// granted, no message, and timeout.
    pub const fn is_transient(self) -> bool {
        matches!(
            self,
            Self::Busy | Self::Again | Self::Acces | Self::NoMsg | Self::TimedOut
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inval => write!(f, "invalid argument"),
            Self::Busy => write!(f, "resource busy"),
            Self::Again => write!(f, "try again"),
            Self::Acces => write!(f, "access not granted"),
            Self::NoMsg => write!(f, "no message available"),
            Self::TimedOut => write!(f, "timed out"),
            Self::Proto => write!(f, "protocol violation"),
            Self::Perm => write!(f, "operation not permitted"),
            Self::Deadlk => write!(f, "deadlock avoided"),
            Self::Badf => write!(f, "bad communicator id"),
            Self::NotSup => write!(f, "request not supported"),
            Self::Fault => write!(f, "bad buffer"),
        }
    }
}

/// Runtime-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;

/// Fold a raw gate word into a `Result`, keeping non-negative values.
pub(crate) fn word_to_result(raw: isize) -> Result<isize> {
    if raw >= 0 {
        return Ok(raw);
    }
    Err(Error::from_code(raw as i32).unwrap_or(Error::Inval))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_round_trip() {
        let all = [
            Error::Inval,
            Error::Busy,
            Error::Again,
            Error::Acces,
            Error::NoMsg,
            Error::TimedOut,
            Error::Proto,
            Error::Perm,
            Error::Deadlk,
            Error::Badf,
            Error::NotSup,
            Error::Fault,
        ];
        for e in all {
            assert!(e.code() < 0);
            assert_eq!(Error::from_code(e.code()), Some(e));
        }
    }

    #[test]
    fn transient_set_is_exactly_the_retry_set() {
        assert!(Error::Busy.is_transient());
        assert!(Error::Again.is_transient());
        assert!(Error::Acces.is_transient());
        assert!(Error::NoMsg.is_transient());
        assert!(Error::TimedOut.is_transient());

        assert!(!Error::Inval.is_transient());
        assert!(!Error::Proto.is_transient());
        assert!(!Error::Badf.is_transient());
    }

    #[test]
    fn positive_words_are_not_errors() {
        assert_eq!(Error::from_code(0), None);
        assert_eq!(Error::from_code(120), None);
    }
}
