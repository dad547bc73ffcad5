//! Crate-wide error type.
//!
//! Every fallible operation in the protocol core returns `Result<_, SmcError>`.
//! All of these are fatal: a participant that hits one aborts its own
//! session rather than retrying (see spec §7 — a failed session cannot be
//! safely resumed without compromising the privacy guarantee).

use thiserror::Error;

/// The error kinds a protocol session can raise.
#[derive(Error, Debug)]
pub enum SmcError {
    /// Arithmetic was attempted between operands that are not both field
    /// elements of the same field, or a non-`Op` node was treated as one.
    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    /// A `Secret` was reached during evaluation for which the participant
    /// has neither a local value nor a deliverable private share.
    #[error("unbound secret: no owner claims node {0:#010x}")]
    UnboundSecret(u32),

    /// Beaver triplet retrieval from the trusted dealer failed.
    #[error("dealer failure: {0}")]
    DealerFailure(String),

    /// A read or write on the message bus failed.
    #[error("bus failure: {0}")]
    BusFailure(String),

    /// Participants disagree on the protocol specification (participant
    /// list or expression identities diverge between parties).
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// A share count outside the valid range `1..=q` was requested.
    #[error("invalid share count {n} for modulus {modulus}")]
    InvalidShareCount {
        /// Requested number of shares.
        n: i64,
        /// Field modulus q.
        modulus: u64,
    },
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SmcError>;
