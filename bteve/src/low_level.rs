pub mod accumulator;
pub mod host_commands;

use crate::interface::{Interface, SpiChannels};
use crate::memory::{HostAccessible, MemoryRegion, Ptr};
use crate::models::Model;
use crate::registers::Register;
use accumulator::{ByteAccumulator, PendingWord};
use host_commands::HostMessage;

/// The state of the link's single transfer session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransferStatus {
    /// No transaction is open.
    Idle,
    /// A read transaction is open, started at the given address.
    Reading(u32),
    /// A write transaction is open, started at the given address.
    Writing(u32),
    /// The last transaction failed part way. The next access starts afresh.
    Error,
}

/// `LowLevel` is a low-level interface to BT82x chips which matches the
/// primitive memory operations used in the programmers guides.
///
/// This is slightly higher-level than the `Interface` trait, providing
/// size-specific memory accesses. It owns the one transfer session the
/// link allows: every access closes whatever session was open before it,
/// except that consecutive [`stream_write`](LowLevel::stream_write) calls to
/// the same address share a session so that command words can be burst
/// into the FIFO.
///
/// Sub-word writes (`wr8`, `wr16`, `write_byte`) are coalesced by a
/// [`ByteAccumulator`] because the chip only accepts whole-word register
/// writes. Pending bytes go out as soon as anything else touches the link,
/// or on an explicit [`flush`](LowLevel::flush).
pub struct LowLevel<M: Model, I: Interface> {
    raw: I,
    status: TransferStatus,
    acc: ByteAccumulator,
    _model: core::marker::PhantomData<M>,
}

impl<M: Model, I: Interface> LowLevel<M, I> {
    pub fn new(interface: I) -> Self {
        Self {
            raw: interface,
            status: TransferStatus::Idle,
            acc: ByteAccumulator::new(),
            _model: core::marker::PhantomData,
        }
    }

    pub fn status(&self) -> TransferStatus {
        self.status
    }

    /// Number of bytes waiting in the accumulator.
    pub fn pending_bytes(&self) -> u8 {
        self.acc.len()
    }

    /// Gives temporary direct access to the underlying interface.
    ///
    /// Call [`flush`](LowLevel::flush) first if there might be pending
    /// bytes or an open session.
    pub fn borrow_interface<'a>(&'a mut self) -> &'a mut I {
        &mut self.raw
    }

    pub fn take_interface(self) -> I {
        self.raw
    }

    pub fn reg_ptr(&self, reg: Register) -> Ptr<M::RegisterMem> {
        M::reg_ptr(reg)
    }

    /// Writes out any pending accumulated bytes and closes any open
    /// transfer session.
    pub fn flush(&mut self) -> Result<(), I::Error> {
        self.drain()?;
        self.end_transfer()
    }

    /// Closes the open transfer session, if any, without touching the
    /// accumulator.
    pub fn end_transfer(&mut self) -> Result<(), I::Error> {
        let status = core::mem::replace(&mut self.status, TransferStatus::Idle);
        match status {
            TransferStatus::Reading(_) => self.raw.end_read(),
            TransferStatus::Writing(_) => self.raw.end_write(),
            TransferStatus::Idle | TransferStatus::Error => Ok(()),
        }
    }

    /// Queues one byte for `addr`, writing out whole words as they
    /// complete. Bytes to consecutive addresses share a single write.
    pub fn write_byte(&mut self, addr: u32, v: u8) -> Result<(), I::Error> {
        let (evicted, completed) = self.acc.push(addr, v);
        if let Some(word) = evicted {
            self.write_pending(word)?;
        }
        if let Some(word) = completed {
            self.write_pending(word)?;
        }
        Ok(())
    }

    pub fn wr8<R: MemoryRegion + HostAccessible>(
        &mut self,
        ptr: Ptr<R>,
        v: u8,
    ) -> Result<(), I::Error> {
        self.write_byte(ptr.to_raw(), v)
    }

    pub fn wr16<R: MemoryRegion + HostAccessible>(
        &mut self,
        ptr: Ptr<R>,
        v: u16,
    ) -> Result<(), I::Error> {
        let addr = ptr.to_raw();
        self.write_byte(addr, v as u8)?;
        self.write_byte(addr + 1, (v >> 8) as u8)
    }

    pub fn wr32<R: MemoryRegion + HostAccessible>(
        &mut self,
        ptr: Ptr<R>,
        v: u32,
    ) -> Result<(), I::Error> {
        self.wr8s(ptr, &v.to_le_bytes())
    }

    pub fn wr8s<R: MemoryRegion + HostAccessible>(
        &mut self,
        ptr: Ptr<R>,
        v: &[u8],
    ) -> Result<(), I::Error> {
        self.prepare()?;
        self.write_raw(ptr.to_raw(), v)
    }

    pub fn rd8<R: MemoryRegion + HostAccessible>(&mut self, ptr: Ptr<R>) -> Result<u8, I::Error> {
        let mut data: [u8; 1] = [0; 1];
        self.rd8s(ptr, &mut data)?;
        Ok(data[0])
    }

    pub fn rd16<R: MemoryRegion + HostAccessible>(
        &mut self,
        ptr: Ptr<R>,
    ) -> Result<u16, I::Error> {
        let mut data: [u8; 2] = [0; 2];
        self.rd8s(ptr, &mut data)?;
        Ok(u16::from_le_bytes(data))
    }

    pub fn rd32<R: MemoryRegion + HostAccessible>(
        &mut self,
        ptr: Ptr<R>,
    ) -> Result<u32, I::Error> {
        let mut data: [u8; 4] = [0; 4];
        self.rd8s(ptr, &mut data)?;
        Ok(u32::from_le_bytes(data))
    }

    pub fn rd8s<R: MemoryRegion + HostAccessible>(
        &mut self,
        ptr: Ptr<R>,
        into: &mut [u8],
    ) -> Result<(), I::Error> {
        self.prepare()?;
        let addr = ptr.to_raw();
        let result = self.raw.begin_read(addr);
        self.track(result)?;
        self.status = TransferStatus::Reading(addr);
        let result = self.raw.continue_read(into);
        self.track(result)?;
        self.end_transfer()
    }

    /// Appends bytes to a write session at `ptr`, opening one if the
    /// current session is anything else. The session stays open afterwards
    /// so that the next call to the same address continues it.
    pub fn stream_write<R: MemoryRegion + HostAccessible>(
        &mut self,
        ptr: Ptr<R>,
        data: &[u8],
    ) -> Result<(), I::Error> {
        let addr = ptr.to_raw();
        self.drain()?;
        if self.status != TransferStatus::Writing(addr) {
            self.end_transfer()?;
            let result = self.raw.begin_write(addr);
            self.track(result)?;
            self.status = TransferStatus::Writing(addr);
        }
        let result = self.raw.continue_write(data);
        self.track(result)
    }

    pub fn host_command(&mut self, msg: HostMessage) -> Result<(), I::Error> {
        self.prepare()?;
        log::trace!("host command {:02x?}", msg.as_bytes());
        self.raw.host_cmd(msg)
    }

    pub fn power_cycle(&mut self, up: bool) -> Result<(), I::Error> {
        self.prepare()?;
        self.raw.power_cycle(up)
    }

    pub fn set_spi_channels(
        &mut self,
        channels: SpiChannels,
        dummy_bytes: u8,
    ) -> Result<SpiChannels, I::Error> {
        self.prepare()?;
        self.raw.set_spi_channels(channels, dummy_bytes)
    }

    pub fn delay_ms(&mut self, ms: u32) {
        self.raw.delay_ms(ms)
    }

    // Gets the link ready for an access that isn't a coalesced byte write.
    fn prepare(&mut self) -> Result<(), I::Error> {
        self.flush()
    }

    fn drain(&mut self) -> Result<(), I::Error> {
        match self.acc.take() {
            Some(word) => self.write_pending(word),
            None => Ok(()),
        }
    }

    fn write_pending(&mut self, word: PendingWord) -> Result<(), I::Error> {
        self.end_transfer()?;
        self.write_raw(word.addr, &word.to_le_bytes())
    }

    fn write_raw(&mut self, addr: u32, v: &[u8]) -> Result<(), I::Error> {
        let result = self.raw.begin_write(addr);
        self.track(result)?;
        self.status = TransferStatus::Writing(addr);
        let result = self.raw.continue_write(v);
        self.track(result)?;
        self.end_transfer()
    }

    // Records a failed transfer so that the session isn't reused. We try to
    // close the session too, but the original error is the one reported.
    fn track<T>(&mut self, result: Result<T, I::Error>) -> Result<T, I::Error> {
        if result.is_err() {
            let _ = self.end_transfer();
            self.status = TransferStatus::Error;
        }
        result
    }
}

impl<M: Model, I: Interface> crate::retry::Sleep for LowLevel<M, I> {
    fn sleep_ms(&mut self, ms: u32) {
        self.raw.delay_ms(ms)
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use crate::interface::testing::{MockInterface, MockInterfaceCall};
    use crate::models::bt820::BT820;
    use std::vec;

    fn test_obj() -> LowLevel<BT820, MockInterface> {
        LowLevel::new(MockInterface::new())
    }

    #[test]
    fn test_register_bytes_go_out_as_words() {
        let mut ll = test_obj();
        ll.wr8(BT820::reg_ptr(Register::CPURESET), 1).unwrap();
        assert_eq!(ll.pending_bytes(), 1);
        ll.flush().unwrap();
        ll.wr16(BT820::reg_ptr(Register::CMD_READ), 0xfff).unwrap();
        ll.wr16(BT820::reg_ptr(Register::CMD_WRITE), 0xfff).unwrap();
        ll.flush().unwrap();

        let got = ll.take_interface().calls();
        let want = vec![
            MockInterfaceCall::Write(0x7f006088, vec![0x01, 0x00, 0x00, 0x00]),
            // Moving on to a non-adjacent register pushes out the previous
            // one as a whole word.
            MockInterfaceCall::Write(0x7f00614c, vec![0xff, 0x0f, 0x00, 0x00]),
            MockInterfaceCall::Write(0x7f006150, vec![0xff, 0x0f, 0x00, 0x00]),
        ];
        debug_assert_eq!(&got[..], &want[..]);
    }

    #[test]
    fn test_reads_flush_pending_bytes_first() {
        let mut ll = test_obj();
        ll.wr8(BT820::reg_ptr(Register::PCLK_POL), 1).unwrap();
        let v = ll.rd8(BT820::reg_ptr(Register::PCLK_POL)).unwrap();
        assert_eq!(v, 1);
        assert_eq!(ll.status(), TransferStatus::Idle);

        let got = ll.take_interface().calls();
        let want = vec![
            MockInterfaceCall::Write(0x7f0060b8, vec![0x01, 0x00, 0x00, 0x00]),
            MockInterfaceCall::Read(0x7f0060b8, 1),
        ];
        debug_assert_eq!(&got[..], &want[..]);
    }

    #[test]
    fn test_stream_stays_open() {
        use crate::memory::MemoryRegion;
        type Append = <BT820 as Model>::CommandAppendMem;

        let mut ll = test_obj();
        ll.stream_write(Append::ptr(0), &[1, 2, 3, 4]).unwrap();
        ll.stream_write(Append::ptr(0), &[5, 6, 7, 8]).unwrap();
        assert_eq!(ll.status(), TransferStatus::Writing(0x7f010000));
        // Any other access ends the stream before it starts.
        let _ = ll.rd16(BT820::reg_ptr(Register::CMDB_SPACE)).unwrap();
        assert_eq!(ll.status(), TransferStatus::Idle);
        ll.stream_write(Append::ptr(0), &[9, 9, 9, 9]).unwrap();
        ll.flush().unwrap();
        assert_eq!(ll.status(), TransferStatus::Idle);

        let got = ll.take_interface().calls();
        let want = vec![
            MockInterfaceCall::Write(0x7f010000, vec![1, 2, 3, 4]),
            MockInterfaceCall::Write(0x7f010004, vec![5, 6, 7, 8]),
            MockInterfaceCall::Read(0x7f006594, 2),
            MockInterfaceCall::Write(0x7f010000, vec![9, 9, 9, 9]),
        ];
        debug_assert_eq!(&got[..], &want[..]);
    }

    #[test]
    fn test_write_byte_burst() {
        let mut ll = test_obj();
        for (i, b) in b"hello".iter().enumerate() {
            ll.write_byte(0x1000 + i as u32, *b).unwrap();
        }
        ll.flush().unwrap();

        let got = ll.take_interface().calls();
        let want = vec![
            MockInterfaceCall::Write(0x1000, b"hell".to_vec()),
            MockInterfaceCall::Write(0x1004, vec![b'o', 0, 0, 0]),
        ];
        debug_assert_eq!(&got[..], &want[..]);
    }
}
