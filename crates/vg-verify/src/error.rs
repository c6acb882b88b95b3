use thiserror::Error;
use vg_core::{OpKind, OrderKey};

/// Fatal engine errors. A consistency violation is NOT one of these; it is
/// reported through the verdict.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VerifyError {
    /// A record arrived at or below the last applied ordering key.
    #[error("record released out of order: {got} after {last}")]
    OutOfOrder { last: OrderKey, got: OrderKey },

    #[error("successful {kind} record {id} carries no key")]
    MissingKey { id: u64, kind: OpKind },
}
