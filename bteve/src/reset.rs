//! Recovering the coprocessor after a fault.

use crate::commands::opcodes;
use crate::commands::waiter::{is_fault, Waiter};
use crate::error::{interface_result, Error, Result};
use crate::hooks::Hooks;
use crate::interface::Interface;
use crate::memory::{ErrReportMem, MemoryRegion};
use crate::models::Model;
use crate::registers::{cpureset, Register};
use crate::{DeviceState, EVE};

/// The bitmap handle the coprocessor is left using as scratch space after
/// a reset.
pub const DEFAULT_SCRATCH_HANDLE: u8 = 15;

// How long the coprocessor is given to settle after entering and after
// leaving reset.
const RESET_SETTLE_MS: u32 = 100;

/// Represents a coprocessor fault message retrieved from the chip.
#[derive(Debug, Clone)]
pub struct FaultMessage<R: ErrReportMem>(R::RawMessage);

impl<R: ErrReportMem> FaultMessage<R> {
    fn new(raw: R::RawMessage) -> Self {
        Self(raw)
    }

    /// The message bytes, up to but not including the NUL terminator.
    pub fn as_bytes<'a>(&'a self) -> &'a [u8] {
        self.0.as_bytes()
    }

    /// The message as text, if it's valid UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        core::str::from_utf8(self.as_bytes()).ok()
    }
}

#[doc(hidden)]
pub trait FaultMessageRaw {
    fn new() -> Self;
    fn as_bytes<'a>(&'a self) -> &'a [u8];
    fn as_storage_bytes<'a>(&'a mut self) -> &'a mut [u8];
}

impl FaultMessageRaw for [u8; 128] {
    fn new() -> Self {
        [0; 128]
    }

    fn as_bytes<'a>(&'a self) -> &'a [u8] {
        // There should be a null terminator somewhere in the raw buffer,
        // which marks how long our returned slice ought to be. If not, the
        // whole buffer is the message.
        match self.iter().position(|b| *b == 0) {
            Some(i) => &self[..i],
            None => &self[..],
        }
    }

    fn as_storage_bytes<'a>(&'a mut self) -> &'a mut [u8] {
        &mut self[..]
    }
}

impl<M, I, W, H> EVE<M, I, W, H>
where
    M: Model,
    I: Interface,
    W: Waiter<M, I>,
    H: Hooks,
{
    /// Resets the coprocessor and rewinds the command FIFO, clearing a
    /// latched fault.
    ///
    /// Returns [`Error::VerificationFailed`] if the FIFO pointers don't
    /// read back as zero afterwards, which means the chip ignored the reset.
    /// The hook's `coprocessor_reset` callback is told whether the
    /// coprocessor settled afterwards.
    pub fn reset_coprocessor(&mut self) -> Result<(), I::Error> {
        reset_coprocessor(self)
    }

    /// Deliberately puts the coprocessor into the fault state, with `msg`
    /// as the fault message. This is for exercising fault recovery.
    ///
    /// Does nothing if the coprocessor is already faulted. Otherwise the
    /// result is the [`Error::Fault`] that the fault produces.
    pub fn force_fault(&mut self, msg: &[u8]) -> Result<(), I::Error> {
        force_fault(self, msg)
    }

    /// Returns the fault message currently held in the chip's error report
    /// area.
    ///
    /// It's only meaningful to call this immediately after another method
    /// returns [`Error::Fault`], before resetting the coprocessor.
    ///
    /// The format of the returned message is determined entirely by the
    /// chip, though it is typically an ASCII string.
    pub fn coprocessor_fault_msg(&mut self) -> Result<FaultMessage<M::ErrReportMem>, I::Error> {
        let mut raw = <M::ErrReportMem as ErrReportMem>::RawMessage::new();
        {
            let into = raw.as_storage_bytes();
            let addr = <M::ErrReportMem as MemoryRegion>::ptr(0);
            interface_result(self.ll.rd8s(addr, into))?;
        }
        Ok(FaultMessage::new(raw))
    }
}

pub(crate) fn reset_coprocessor<M, I, W, H>(eve: &mut EVE<M, I, W, H>) -> Result<(), I::Error>
where
    M: Model,
    I: Interface,
    W: Waiter<M, I>,
    H: Hooks,
{
    log::debug!("resetting coprocessor");
    let prior = eve.state;
    eve.state = DeviceState::ResettingCoprocessor;

    {
        let ll = &mut eve.ll;
        interface_result(ll.wr8(M::reg_ptr(Register::CPURESET), cpureset::COPROCESSOR))?;
        interface_result(ll.flush())?;
        ll.delay_ms(RESET_SETTLE_MS);

        // Rewinding the pointers is only possible while the coprocessor is
        // held in reset.
        interface_result(ll.wr16(M::reg_ptr(Register::CMD_READ), 0))?;
        interface_result(ll.wr16(M::reg_ptr(Register::CMD_WRITE), 0))?;
        interface_result(ll.wr16(M::reg_ptr(Register::CMD_DL), 0))?;

        // A video with sound might have been playing.
        interface_result(ll.wr8(M::reg_ptr(Register::PLAYBACK_PLAY), 0))?;
    }

    eve.cmd.fault = false;

    {
        let ll = &mut eve.ll;
        interface_result(ll.wr8(M::reg_ptr(Register::CPURESET), 0))?;
        interface_result(ll.flush())?;
        ll.delay_ms(RESET_SETTLE_MS);

        let wp = interface_result(ll.rd16(M::reg_ptr(Register::CMD_WRITE)))?;
        let rp = interface_result(ll.rd16(M::reg_ptr(Register::CMD_READ)))?;
        if wp != 0 || rp != 0 {
            log::warn!("coprocessor didn't reset: wp={:#x} rp={:#x}", wp, rp);
            if is_fault(rp) {
                eve.cmd.fault = true;
                eve.state = DeviceState::FaultDetected;
            } else {
                eve.state = prior;
            }
            return Err(Error::VerificationFailed);
        }
    }

    eve.cmd.rewind::<M>();
    eve.wait_flush()?;

    // Cold start puts the coprocessor's own state back to defaults, and a
    // reset drops the flash attachment. These go straight into the FIFO so
    // that the command hook can't intercept them.
    eve.write32(opcodes::DLSTART)?;
    eve.write32(opcodes::COLDSTART)?;
    eve.write32(opcodes::FLASHATTACH)?;

    let result = eve.wait_flush();
    eve.hooks.coprocessor_reset(result.is_err());
    eve.scratch_handle = DEFAULT_SCRATCH_HANDLE;
    match result {
        Ok(()) => {
            eve.state = DeviceState::Ready;
            log::debug!("coprocessor reset complete");
            Ok(())
        }
        Err(err) => {
            log::warn!("coprocessor not ready after reset: {:?}", err);
            Err(err)
        }
    }
}

pub(crate) fn force_fault<M, I, W, H>(eve: &mut EVE<M, I, W, H>, msg: &[u8]) -> Result<(), I::Error>
where
    M: Model,
    I: Interface,
    W: Waiter<M, I>,
    H: Hooks,
{
    // If we're already in the fault state then there's nothing to do.
    if let Err(err) = eve.wait_space(0) {
        return match err {
            Error::Interface(_) => Err(err),
            _ => Ok(()),
        };
    }

    log::debug!("forcing coprocessor fault");
    {
        // Holding the coprocessor in reset with misaligned pointers looks
        // exactly like a fault from the host's side.
        let ll = &mut eve.ll;
        interface_result(ll.wr8(M::reg_ptr(Register::CPURESET), cpureset::COPROCESSOR))?;
        interface_result(ll.flush())?;
        ll.delay_ms(RESET_SETTLE_MS);
        interface_result(ll.wr16(M::reg_ptr(Register::CMD_READ), 0xfff))?;
        interface_result(ll.wr16(M::reg_ptr(Register::CMD_WRITE), 0xfff))?;
        interface_result(ll.flush())?;
    }

    let rp = interface_result(eve.ll.rd16(M::reg_ptr(Register::CMD_READ)))?;
    if is_fault(rp) {
        let len = <M::ErrReportMem as MemoryRegion>::LENGTH as usize;
        let mut report = <M::ErrReportMem as ErrReportMem>::RawMessage::new();
        {
            let storage = report.as_storage_bytes();
            let n = core::cmp::min(msg.len(), len - 1);
            storage[..n].copy_from_slice(&msg[..n]);
        }
        let addr = <M::ErrReportMem as MemoryRegion>::ptr(0);
        interface_result(eve.ll.wr8s(addr, report.as_storage_bytes()))?;
    }

    eve.wait_flush()
}
