//! Helpers for waiting until the coprocessor has freed enough ring buffer
//! space for a forthcoming command, or has consumed everything written so
//! far.
//!
//! [`Waiter`](Waiter) is a trait implemented by types that are able to block
//! until there's either a particular amount of buffer space available or
//! until the coprocessor reports a fault.
//!
//! [`PollingWaiter`](PollingWaiter) is a simple built-in implementation of
//! `Waiter` which polls the coprocessor registers, sleeping between polls,
//! and gives up after the number of attempts it is given.
//!
//! If you are working with this library on a platform where you are able to
//! listen for and respond to interrupt signals from the chip then you could
//! improve power consumption by implementing a new `Waiter` which can put
//! the host processor to sleep while waiting.

use crate::interface::Interface;
use crate::low_level::LowLevel;
use crate::models::Model;
use crate::registers::Register;
use crate::retry::{Retry, RetryError};

/// Knows how to block until the coprocessor ring buffer is at least empty
/// enough to receive a forthcoming message, or entirely drained.
///
/// Both methods receive the [`Retry`](Retry) budget configured on the
/// device, and must give up with [`WaiterError::Timeout`] once it is spent
/// rather than blocking forever.
///
/// Both must also report [`WaiterError::Fault`] as soon as they observe
/// the coprocessor's fault signature: a misaligned free space count or
/// read pointer.
pub trait Waiter<M: Model, I: Interface> {
    /// Blocks until `REG_CMDB_SPACE` reports at least `need` bytes free,
    /// returning the reported amount.
    fn wait_for_space(
        &mut self,
        ll: &mut LowLevel<M, I>,
        need: u16,
        retry: Retry,
    ) -> core::result::Result<u16, WaiterError<I::Error>>;

    /// Blocks until `REG_CMD_READ` equals `wp`.
    fn wait_for_read_ptr(
        &mut self,
        ll: &mut LowLevel<M, I>,
        wp: u16,
        retry: Retry,
    ) -> core::result::Result<(), WaiterError<I::Error>>;
}

/// Error type returned by a waiter, which distinguishes between communication
/// transport errors, explicit coprocessor faults and running out of time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaiterError<E: Sized> {
    Comm(E),
    Fault,
    Timeout,
}

impl<E> From<RetryError<WaiterError<E>>> for WaiterError<E> {
    fn from(err: RetryError<WaiterError<E>>) -> Self {
        match err {
            RetryError::Exhausted { .. } => WaiterError::Timeout,
            RetryError::Aborted(err) => err,
        }
    }
}

fn waiter_comm_result<R, E: Sized>(
    result: core::result::Result<R, E>,
) -> core::result::Result<R, WaiterError<E>> {
    match result {
        Ok(v) => Ok(v),
        Err(err) => Err(WaiterError::Comm(err)),
    }
}

/// Reports whether a free space count or read pointer carries the fault
/// signature.
#[inline]
pub fn is_fault(v: u16) -> bool {
    (v & 0x3) != 0
}

/// The default [`Waiter`](Waiter) implementation, which polls the
/// coprocessor registers until the condition holds or the retry budget
/// runs out.
pub struct PollingWaiter<M: Model, I: Interface> {
    _ei: core::marker::PhantomData<I>,
    _m: core::marker::PhantomData<M>,
}

impl<M: Model, I: Interface> PollingWaiter<M, I> {
    pub fn new() -> Self {
        Self {
            _ei: core::marker::PhantomData,
            _m: core::marker::PhantomData,
        }
    }
}

impl<M: Model, I: Interface> Default for PollingWaiter<M, I> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: Model, I: Interface> Waiter<M, I> for PollingWaiter<M, I> {
    fn wait_for_space(
        &mut self,
        ll: &mut LowLevel<M, I>,
        need: u16,
        retry: Retry,
    ) -> core::result::Result<u16, WaiterError<I::Error>> {
        let space = retry.run(ll, |ll, attempt| {
            let space = waiter_comm_result(ll.rd16(M::reg_ptr(Register::CMDB_SPACE)))?;
            if is_fault(space) {
                // An unaligned amount of space indicates a coprocessor fault.
                return Err(WaiterError::Fault);
            }
            if space >= need {
                Ok(Some(space))
            } else {
                log::trace!("poll {}: {} bytes free, want {}", attempt, space, need);
                Ok(None)
            }
        })?;
        Ok(space)
    }

    fn wait_for_read_ptr(
        &mut self,
        ll: &mut LowLevel<M, I>,
        wp: u16,
        retry: Retry,
    ) -> core::result::Result<(), WaiterError<I::Error>> {
        retry.run(ll, |ll, attempt| {
            let rp = waiter_comm_result(ll.rd16(M::reg_ptr(Register::CMD_READ)))?;
            if is_fault(rp) {
                return Err(WaiterError::Fault);
            }
            if rp == wp {
                Ok(Some(()))
            } else {
                log::trace!("poll {}: read pointer {:#x}, want {:#x}", attempt, rp, wp);
                Ok(None)
            }
        })?;
        Ok(())
    }
}
