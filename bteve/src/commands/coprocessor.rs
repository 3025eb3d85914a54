//! The host side of the coprocessor command FIFO.
//!
//! Commands go into the ring buffer through the chip's append port, so the
//! host never addresses the ring directly when writing. It does still keep
//! a mirror of the write pointer, because result-producing commands need
//! to know where in the ring their output will land.

use super::command_word::{command_words_for_bytes, command_words_for_str, CommandWord};
use super::waiter::{is_fault, Waiter, WaiterError};
use crate::error::{interface_result, Error, Result};
use crate::hooks::Hooks;
use crate::interface::Interface;
use crate::low_level::accumulator::ByteAccumulator;
use crate::memory::MemoryRegion;
use crate::models::Model;
use crate::registers::Register;
use crate::{DeviceState, EVE};

// Bulk payloads are staged through a buffer of this many bytes, so that
// each transfer to the append port is reasonably large without needing
// an allocator.
const CHUNK_SIZE: usize = 256;

/// The host's record of the command FIFO.
pub(crate) struct CommandState {
    // Byte offset where the next byte will land, modulo the ring size.
    pub(crate) wp: u16,

    // `known_space` tracks the amount of free ring space (in bytes) that we
    // most recently knew about. The coprocessor asynchronously consumes
    // commands, so there might actually be _more_ space than this, but
    // never less because we decrease it as we write.
    pub(crate) known_space: u16,

    // Latched when a wait observes the fault signature. Only a coprocessor
    // reset clears it.
    pub(crate) fault: bool,

    pub(crate) in_func: bool,

    // Half-words from `write16` waiting for their partner. Keyed by ring
    // offset so that a lone half-word can be told apart.
    half: ByteAccumulator,
}

impl CommandState {
    pub(crate) fn new() -> Self {
        Self {
            wp: 0,
            known_space: 0,
            fault: false,
            in_func: false,
            half: ByteAccumulator::new(),
        }
    }

    /// Forgets everything about the ring except that it's empty.
    pub(crate) fn rewind<M: Model>(&mut self) {
        *self = Self::new();
        self.known_space = M::space_when_empty();
    }

    fn advance<M: Model>(&mut self, len: u16) {
        let size = <M::CommandMem as MemoryRegion>::LENGTH;
        self.wp = ((self.wp as u32 + len as u32) % size) as u16;
        self.known_space = self.known_space.saturating_sub(len);
    }
}

/// The raw FIFO writer.
///
/// These methods don't block for the coprocessor to actually execute
/// anything. They block only if there isn't enough ring space for what's
/// being written, and [`wait_flush`](EVE::wait_flush) is the one way to
/// wait for the coprocessor to catch up.
impl<M, I, W, H> EVE<M, I, W, H>
where
    M: Model,
    I: Interface,
    W: Waiter<M, I>,
    H: Hooks,
{
    /// Appends one word to the command FIFO.
    pub fn write32(&mut self, v: u32) -> Result<(), I::Error> {
        self.flush_pending()?;
        self.write_chunk(&v.to_le_bytes())
    }

    /// Appends a half-word to the command FIFO.
    ///
    /// The device accepts only whole words, so the half-word is held back
    /// until a second one completes the word or until some other FIFO
    /// operation pads it out with zeroes.
    pub fn write16(&mut self, v: u16) -> Result<(), I::Error> {
        if self.cmd.fault {
            return Err(Error::Fault);
        }
        for b in v.to_le_bytes().iter() {
            let addr = self.cmd.wp as u32 + self.cmd.half.len() as u32;
            let (evicted, completed) = self.cmd.half.push(addr, *b);
            for word in evicted.iter().chain(completed.iter()) {
                self.write_chunk(&word.to_le_bytes())?;
            }
        }
        Ok(())
    }

    /// Appends a block of bytes to the FIFO, padded with zeroes to a whole
    /// number of words.
    ///
    /// The data is written in chunks, waiting for ring space between them
    /// as needed, so it may be longer than the ring itself.
    pub fn write_prog_mem(&mut self, data: &[u8]) -> Result<(), I::Error> {
        self.flush_pending()?;
        self.write_words(command_words_for_bytes(data))
    }

    /// Appends a string to the FIFO with its NUL terminator, padded with
    /// zeroes to a whole number of words.
    pub fn write_string(&mut self, s: &[u8]) -> Result<(), I::Error> {
        self.flush_pending()?;
        self.write_words(command_words_for_str(s))
    }

    /// Begins a multi-word command of `len` bytes, waiting first until the
    /// ring has room for all of it so that the command arrives whole.
    ///
    /// Every `start_func` must be matched by an [`end_func`](EVE::end_func)
    /// before waiting for a flush.
    pub fn start_func(&mut self, len: u16) -> Result<(), I::Error> {
        debug_assert!(!self.cmd.in_func, "command brackets don't nest");
        self.flush_pending()?;
        self.ensure_space(len)?;
        self.cmd.in_func = true;
        Ok(())
    }

    pub fn end_func(&mut self) -> Result<(), I::Error> {
        self.flush_pending()?;
        self.cmd.in_func = false;
        Ok(())
    }

    /// Reserves `len` bytes of the FIFO for the coprocessor to write a
    /// result into, returning the ring offset where the reserved space
    /// begins.
    ///
    /// The reservation is filled with zero words, which the coprocessor
    /// overwrites as it executes the command.
    pub fn move_wp(&mut self, len: u16) -> Result<u16, I::Error> {
        debug_assert!(len % 4 == 0, "reservations are whole words");
        self.flush_pending()?;
        let offset = self.cmd.wp;
        let words = core::iter::repeat(CommandWord::from(0u32)).take((len / 4) as usize);
        self.write_words(words)?;
        Ok(offset)
    }

    /// Waits until the coprocessor reports at least `need` bytes of free
    /// ring space, returning the amount it reported.
    ///
    /// Unlike the internal fast path this always asks the device.
    pub fn wait_space(&mut self, need: u16) -> Result<u16, I::Error> {
        if self.cmd.fault {
            return Err(Error::Fault);
        }
        interface_result(self.ll.flush())?;
        let retry = self.timeouts.space;
        match self.wait.wait_for_space(&mut self.ll, need, retry) {
            Ok(space) => {
                self.cmd.known_space = space;
                Ok(space)
            }
            Err(err) => Err(self.waiter_failed(err)),
        }
    }

    /// Waits until the coprocessor has consumed everything written so far.
    ///
    /// Returns [`Error::Fault`] if the coprocessor faults, either now or at
    /// some earlier point that hasn't been cleared by a reset. The write
    /// pointer mirror is left as it was.
    pub fn wait_flush(&mut self) -> Result<(), I::Error> {
        debug_assert!(!self.cmd.in_func, "wait_flush inside a command bracket");
        if self.cmd.fault {
            return Err(Error::Fault);
        }
        self.flush_pending()?;
        interface_result(self.ll.flush())?;
        let (wp, retry) = (self.cmd.wp, self.timeouts.flush);
        match self.wait.wait_for_read_ptr(&mut self.ll, wp, retry) {
            Ok(()) => {
                self.cmd.known_space = M::space_when_empty();
                Ok(())
            }
            Err(err) => Err(self.waiter_failed(err)),
        }
    }

    /// The host's mirror of the FIFO write pointer.
    pub fn wp(&self) -> u16 {
        self.cmd.wp
    }

    /// The free ring space the host currently knows about. The device may
    /// have freed more since it was last asked.
    pub fn space(&self) -> u16 {
        self.cmd.known_space
    }

    /// Reports whether a coprocessor fault has been observed and not yet
    /// cleared by [`reset_coprocessor`](EVE::reset_coprocessor).
    pub fn is_faulted(&self) -> bool {
        self.cmd.fault
    }

    /// Sends a whole command given as its opcode followed by argument
    /// words, consulting the command hook first.
    ///
    /// Returns `false` if the hook took over the command, in which case
    /// nothing was written.
    pub fn co_cmd(&mut self, words: &[u32]) -> Result<bool, I::Error> {
        if let Some((&opcode, args)) = words.split_first() {
            if self.hooks.command_hook(opcode, args) {
                log::trace!("command {:#010x} handled by hook", opcode);
                return Ok(false);
            }
        }
        self.start_func((words.len() * 4) as u16)?;
        for &word in words {
            self.write32(word)?;
        }
        self.end_func()?;
        Ok(true)
    }

    /// Reloads the FIFO pointers and free space from the device, returning
    /// the write and read pointers it reported.
    ///
    /// The read pointer is returned as-is, so the caller can see whether it
    /// carries the fault signature.
    pub(crate) fn refresh_fifo(&mut self) -> Result<(u16, u16), I::Error> {
        interface_result(self.ll.flush())?;
        let wp = interface_result(self.ll.rd16(M::reg_ptr(Register::CMD_WRITE)))?;
        let rp = interface_result(self.ll.rd16(M::reg_ptr(Register::CMD_READ)))?;
        let space = interface_result(self.ll.rd16(M::reg_ptr(Register::CMDB_SPACE)))?;
        let size = <M::CommandMem as MemoryRegion>::LENGTH;
        self.cmd.wp = (wp as u32 % size) as u16;
        self.cmd.known_space = if is_fault(space) { 0 } else { space };
        log::trace!("fifo wp={:#x} rp={:#x} space={}", wp, rp, space);
        Ok((wp, rp))
    }

    // Update our internal records to match the state of the remote chip.
    pub(crate) fn synchronize(&mut self) -> Result<(), I::Error> {
        self.refresh_fifo().map(|_| ())
    }

    /// Pads out and writes any held-back half-word. While faulted the
    /// half-word is dropped instead, since the ring will be rewound anyway.
    pub(crate) fn flush_pending(&mut self) -> Result<(), I::Error> {
        match self.cmd.half.take() {
            Some(_) if self.cmd.fault => Ok(()),
            Some(word) => self.write_chunk(&word.to_le_bytes()),
            None => Ok(()),
        }
    }

    // Block using our waiter until there's at least `need` bytes of free
    // space in the ring buffer, unless we already know there is.
    fn ensure_space(&mut self, need: u16) -> Result<(), I::Error> {
        if self.cmd.fault {
            return Err(Error::Fault);
        }
        if self.cmd.known_space >= need {
            return Ok(());
        }
        self.wait_space(need).map(|_| ())
    }

    fn write_words<It: Iterator<Item = CommandWord>>(&mut self, words: It) -> Result<(), I::Error> {
        let mut buf = [0u8; CHUNK_SIZE];
        let mut n = 0;
        for word in words {
            buf[n..n + 4].copy_from_slice(&word.to_le_bytes());
            n += 4;
            if n == CHUNK_SIZE {
                self.write_chunk(&buf[..n])?;
                n = 0;
            }
        }
        if n > 0 {
            self.write_chunk(&buf[..n])?;
        }
        Ok(())
    }

    fn write_chunk(&mut self, data: &[u8]) -> Result<(), I::Error> {
        self.ensure_space(data.len() as u16)?;
        let result = self
            .ll
            .stream_write(<M::CommandAppendMem as MemoryRegion>::ptr(0), data);

        // We assume we consumed the space even if there was an error,
        // because we can't tell how much of it reached the device. A low
        // estimate just means we ask the device again sooner.
        self.cmd.advance::<M>(data.len() as u16);
        interface_result(result)
    }

    fn waiter_failed(&mut self, err: WaiterError<I::Error>) -> Error<I::Error> {
        // We don't know how much space we have, so we'll set it to zero to
        // force asking the device again next time.
        self.cmd.known_space = 0;
        if let WaiterError::Fault = err {
            log::warn!("coprocessor fault detected (wp={:#x})", self.cmd.wp);
            self.cmd.fault = true;
            self.state = DeviceState::FaultDetected;
        }
        err.into()
    }
}
