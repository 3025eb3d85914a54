//! The error type shared by every fallible operation on [`EVE`](crate::EVE).

use crate::commands::waiter::WaiterError;
use crate::retry::RetryError;

/// A general error type for errors from the main [`EVE`](crate::EVE) type.
///
/// The wrapped type `E` is the error type of whichever
/// [`Interface`](crate::interface::Interface) implementation is in use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error<E> {
    /// Errors encountered when sending or receiving data from the chip.
    Interface(E),

    /// A poll loop used up all of its attempts. The device may just be slow,
    /// so the operation can be retried.
    Timeout,

    /// The coprocessor reported a fault by leaving its read pointer
    /// misaligned.
    ///
    /// The coprocessor runs asynchronously from the host, so this may be
    /// reported by a later call than the one which caused it. The fault stays
    /// latched until [`EVE::reset_coprocessor`](crate::EVE::reset_coprocessor)
    /// succeeds, and
    /// [`EVE::coprocessor_fault_msg`](crate::EVE::coprocessor_fault_msg)
    /// can retrieve the chip's explanation.
    Fault,

    /// After a coprocessor reset the command pointers did not read back as
    /// zero, meaning the reset didn't take effect.
    VerificationFailed,

    /// The chip identified itself as a different model than expected. Only
    /// returned when boot was asked to be strict about this.
    ChipIdMismatch { found: u32, expected: u32 },

    /// The caller's wait hook asked for a boot poll loop to stop.
    Cancelled,
}

impl<E> Error<E> {
    /// Returns true for the conditions that may clear up if the operation
    /// is tried again, possibly after a coprocessor reset.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Timeout | Error::Fault)
    }
}

impl<E: core::fmt::Debug> core::fmt::Display for Error<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::Interface(err) => write!(f, "interface error: {:?}", err),
            Error::Timeout => write!(f, "timed out waiting for the device"),
            Error::Fault => write!(f, "coprocessor fault"),
            Error::VerificationFailed => {
                write!(f, "command pointers did not clear after coprocessor reset")
            }
            Error::ChipIdMismatch { found, expected } => write!(
                f,
                "unexpected chip id {:#07x} (expected {:#07x})",
                found, expected
            ),
            Error::Cancelled => write!(f, "cancelled while waiting for the device"),
        }
    }
}

impl<E> From<WaiterError<E>> for Error<E> {
    fn from(err: WaiterError<E>) -> Self {
        match err {
            WaiterError::Comm(err) => Error::Interface(err),
            WaiterError::Fault => Error::Fault,
            WaiterError::Timeout => Error::Timeout,
        }
    }
}

impl<E> From<RetryError<Error<E>>> for Error<E> {
    fn from(err: RetryError<Error<E>>) -> Self {
        match err {
            RetryError::Exhausted { .. } => Error::Timeout,
            RetryError::Aborted(err) => err,
        }
    }
}

/// Wraps a transport result into the crate's error type.
pub(crate) fn interface_result<T, E>(result: core::result::Result<T, E>) -> Result<T, E> {
    result.map_err(Error::Interface)
}

/// The result type for operations on [`EVE`](crate::EVE), where `E` is the
/// transport's error type.
pub type Result<T, E> = core::result::Result<T, Error<E>>;
