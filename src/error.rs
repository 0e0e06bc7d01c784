use std::time::Duration;
use thiserror::Error;
use crate::uid::HolderId;

/// Errors reported by holders.
///
/// A panic inside a user-supplied transform is not represented here: it unwinds out of the
/// `set` call which triggered the propagation, after any followers notified before it already ran.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HolderError {
    /// A not-null holder was given an absent payload. The holder and its followers are untouched.
    #[error("holder {holder} does not accept absent values")]
    InvalidValue { holder: HolderId },
    /// A bounded wait elapsed before the holder received its first value.
    #[error("holder {holder} received no value within {waited:?}")]
    Timeout { holder: HolderId, waited: Duration },
}

pub type Result<T, E = HolderError> = std::result::Result<T, E>;
