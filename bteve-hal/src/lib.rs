#![no_std]

use bteve::interface::{Interface, SpiChannels};
use bteve::low_level::host_commands::HostMessage;
use embedded_hal::blocking::delay::DelayMs;
use embedded_hal::blocking::spi::{Transfer, Write};
use embedded_hal::digital::v2::OutputPin;

// Writes are gathered into a buffer of this size and sent in one SPI
// write when it fills or the transaction ends.
const WRITE_BUFFER_SIZE: usize = 64;

// How many bytes a read may clock in looking for the ready marker before
// giving up.
const READ_MARKER_POLLS: u32 = 64;

// The chip sends this once the data for a read is ready to follow.
const READ_MARKER: u8 = 0x01;

// Settling time for each edge of a power cycle.
const POWER_SETTLE_MS: u32 = 20;

/// `BTEVEHALSPIInterface` is an implementation of `bteve::Interface` that
/// communicates over SPI using the `embedded-hal` SPI, GPIO (for "chip
/// select" and "power down") and delay traits.
///
/// Only single-channel SPI is supported, so
/// [`set_spi_channels`](Interface::set_spi_channels) always reports
/// [`SpiChannels::Single`].
pub struct BTEVEHALSPIInterface<SPI, CS, PD, DELAY>
where
    SPI: Transfer<u8> + Write<u8>,
    CS: OutputPin,
    PD: OutputPin,
    DELAY: DelayMs<u32>,
{
    spi: SPI,
    cs: CS,
    pd: PD,
    delay: DELAY,
    buf: [u8; WRITE_BUFFER_SIZE],
    buf_len: usize,
    dummy_bytes: u8,
    // Set by begin_read until the ready marker has been seen.
    awaiting_marker: bool,
}

impl<SPI, CS, PD, DELAY> BTEVEHALSPIInterface<SPI, CS, PD, DELAY>
where
    SPI: Transfer<u8> + Write<u8>,
    CS: OutputPin,
    PD: OutputPin,
    DELAY: DelayMs<u32>,
{
    /// Create a new BT82x interface in terms of the given SPI bus, pins
    /// and delay provider.
    ///
    /// The CS pin will be set low to assert chip select and high to
    /// unassert it. The PD pin will be set low to hold the chip powered
    /// down and high to let it run, reflecting the physical characteristics
    /// of those pins on BT82x packages.
    pub fn new(spi: SPI, cs: CS, pd: PD, delay: DELAY) -> Self {
        Self {
            spi: spi,
            cs: cs,
            pd: pd,
            delay: delay,
            buf: [0; WRITE_BUFFER_SIZE],
            buf_len: 0,
            dummy_bytes: 1,
            awaiting_marker: false,
        }
    }

    /// Consumes the interface and returns the peripherals it was using.
    pub fn release(self) -> (SPI, CS, PD, DELAY) {
        (self.spi, self.cs, self.pd, self.delay)
    }

    fn spi_select(&mut self) -> Result<(), HALError<SPI, CS, PD>> {
        HALError::<SPI, CS, PD>::cs_result(self.cs.set_low())
    }

    fn spi_unselect(&mut self) -> Result<(), HALError<SPI, CS, PD>> {
        HALError::<SPI, CS, PD>::cs_result(self.cs.set_high())
    }

    fn spi_write(&mut self, words: &[u8]) -> Result<(), HALError<SPI, CS, PD>> {
        let r = self.spi.write(words);
        HALError::<SPI, CS, PD>::spi_write_result(r)
    }

    fn spi_transfer(&mut self, words: &mut [u8]) -> Result<(), HALError<SPI, CS, PD>> {
        let r = self.spi.transfer(words).map(|_| ());
        HALError::<SPI, CS, PD>::spi_transfer_result(r)
    }

    fn buffered_write(&mut self, mut v: &[u8]) -> Result<(), HALError<SPI, CS, PD>> {
        while !v.is_empty() {
            if self.buf_len == WRITE_BUFFER_SIZE {
                self.send_buffer()?;
            }
            let n = core::cmp::min(v.len(), WRITE_BUFFER_SIZE - self.buf_len);
            self.buf[self.buf_len..self.buf_len + n].copy_from_slice(&v[..n]);
            self.buf_len += n;
            v = &v[n..];
        }
        Ok(())
    }

    fn send_buffer(&mut self) -> Result<(), HALError<SPI, CS, PD>> {
        if self.buf_len == 0 {
            return Ok(());
        }
        let n = self.buf_len;
        self.buf_len = 0;
        let r = self.spi.write(&self.buf[..n]);
        HALError::<SPI, CS, PD>::spi_write_result(r)
    }

    // Skips the dummy bytes after a read header and then the filler bytes
    // before the ready marker.
    fn await_marker(&mut self) -> Result<(), HALError<SPI, CS, PD>> {
        let mut b = [0u8; 1];
        for _ in 0..self.dummy_bytes {
            self.spi_transfer(&mut b)?;
        }
        for _ in 0..READ_MARKER_POLLS {
            b[0] = 0;
            self.spi_transfer(&mut b)?;
            if b[0] == READ_MARKER {
                return Ok(());
            }
        }
        Err(BTEVEHALSPIError::NoReadMarker)
    }

    fn pd_result(&self, r: Result<(), PD::Error>) -> Result<(), HALError<SPI, CS, PD>> {
        match r {
            Ok(v) => Ok(v),
            Err(e) => Err(BTEVEHALSPIError::PD(e)),
        }
    }
}

impl<SPI, CS, PD, DELAY> Interface for BTEVEHALSPIInterface<SPI, CS, PD, DELAY>
where
    SPI: Transfer<u8> + Write<u8>,
    CS: OutputPin,
    PD: OutputPin,
    DELAY: DelayMs<u32>,
    <SPI as Write<u8>>::Error: core::fmt::Debug,
    <SPI as Transfer<u8>>::Error: core::fmt::Debug,
    CS::Error: core::fmt::Debug,
    PD::Error: core::fmt::Debug,
{
    type Error = HALError<SPI, CS, PD>;

    fn begin_write(&mut self, addr: u32) -> Result<(), Self::Error> {
        self.spi_select()?;
        let mut header: [u8; 4] = [0; 4];
        self.build_write_header(addr, &mut header);
        self.buffered_write(&header)
    }

    fn continue_write(&mut self, v: &[u8]) -> Result<(), Self::Error> {
        self.buffered_write(v)
    }

    fn end_write(&mut self) -> Result<(), Self::Error> {
        let result = self.send_buffer();
        self.spi_unselect()?;
        result
    }

    fn begin_read(&mut self, addr: u32) -> Result<(), Self::Error> {
        self.spi_select()?;
        let mut header: [u8; 4] = [0; 4];
        self.build_read_header(addr, &mut header);
        self.awaiting_marker = true;
        self.spi_write(&header)
    }

    fn continue_read(&mut self, into: &mut [u8]) -> Result<(), Self::Error> {
        if self.awaiting_marker {
            self.await_marker()?;
            self.awaiting_marker = false;
        }
        for b in into.iter_mut() {
            *b = 0;
        }
        self.spi_transfer(into)
    }

    fn end_read(&mut self) -> Result<(), Self::Error> {
        self.awaiting_marker = false;
        self.spi_unselect()
    }

    fn host_cmd(&mut self, msg: HostMessage) -> Result<(), Self::Error> {
        self.spi_select()?;
        let result = self.spi_write(msg.as_bytes());
        self.spi_unselect()?;
        result
    }

    fn power_cycle(&mut self, up: bool) -> Result<(), Self::Error> {
        let r = self.pd.set_low();
        self.pd_result(r)?;
        self.delay.delay_ms(POWER_SETTLE_MS);
        if up {
            self.dummy_bytes = 1;
            self.delay.delay_ms(POWER_SETTLE_MS);
            let r = self.pd.set_high();
            self.pd_result(r)?;
            self.delay.delay_ms(POWER_SETTLE_MS);
        }
        Ok(())
    }

    fn set_spi_channels(
        &mut self,
        _channels: SpiChannels,
        dummy_bytes: u8,
    ) -> Result<SpiChannels, Self::Error> {
        self.dummy_bytes = dummy_bytes;
        Ok(SpiChannels::Single)
    }

    fn delay_ms(&mut self, ms: u32) {
        self.delay.delay_ms(ms)
    }
}

type HALError<SPI, CS, PD> = BTEVEHALSPIError<
    <SPI as Write<u8>>::Error,
    <SPI as Transfer<u8>>::Error,
    <CS as OutputPin>::Error,
    <PD as OutputPin>::Error,
>;

#[derive(Debug)]
pub enum BTEVEHALSPIError<SPIWriteError, SPITransferError, CSError, PDError> {
    SPIWrite(SPIWriteError),
    SPITransfer(SPITransferError),
    CS(CSError),
    PD(PDError),
    /// The chip never signalled that read data was ready.
    NoReadMarker,
}

impl<SPIWriteError, SPITransferError, CSError, PDError>
    BTEVEHALSPIError<SPIWriteError, SPITransferError, CSError, PDError>
{
    fn spi_write_result<T>(r: Result<T, SPIWriteError>) -> Result<T, Self> {
        match r {
            Ok(v) => Ok(v),
            Err(e) => Err(Self::SPIWrite(e)),
        }
    }

    fn spi_transfer_result<T>(r: Result<T, SPITransferError>) -> Result<T, Self> {
        match r {
            Ok(v) => Ok(v),
            Err(e) => Err(Self::SPITransfer(e)),
        }
    }

    fn cs_result<T>(r: Result<T, CSError>) -> Result<T, Self> {
        match r {
            Ok(v) => Ok(v),
            Err(e) => Err(Self::CS(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use core::convert::Infallible;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::vec::Vec;

    #[derive(Debug, PartialEq, Eq, Clone)]
    enum Event {
        Cs(bool),
        Pd(bool),
        Write(Vec<u8>),
        Transfer(usize),
        Delay(u32),
    }

    type Log = Rc<RefCell<Vec<Event>>>;

    struct Spi {
        log: Log,
        // Bytes returned by successive transfers, one per clocked byte.
        miso: Vec<u8>,
    }

    impl Write<u8> for Spi {
        type Error = Infallible;
        fn write(&mut self, words: &[u8]) -> Result<(), Infallible> {
            self.log.borrow_mut().push(Event::Write(words.to_vec()));
            Ok(())
        }
    }

    impl Transfer<u8> for Spi {
        type Error = Infallible;
        fn transfer<'w>(&mut self, words: &'w mut [u8]) -> Result<&'w [u8], Infallible> {
            self.log.borrow_mut().push(Event::Transfer(words.len()));
            for w in words.iter_mut() {
                *w = if self.miso.is_empty() {
                    0
                } else {
                    self.miso.remove(0)
                };
            }
            Ok(words)
        }
    }

    struct Pin {
        log: Log,
        pd: bool,
    }

    impl OutputPin for Pin {
        type Error = Infallible;
        fn set_low(&mut self) -> Result<(), Infallible> {
            let ev = if self.pd { Event::Pd(false) } else { Event::Cs(false) };
            self.log.borrow_mut().push(ev);
            Ok(())
        }
        fn set_high(&mut self) -> Result<(), Infallible> {
            let ev = if self.pd { Event::Pd(true) } else { Event::Cs(true) };
            self.log.borrow_mut().push(ev);
            Ok(())
        }
    }

    struct Delay(Log);

    impl DelayMs<u32> for Delay {
        fn delay_ms(&mut self, ms: u32) {
            self.0.borrow_mut().push(Event::Delay(ms));
        }
    }

    fn test_obj(miso: &[u8]) -> (BTEVEHALSPIInterface<Spi, Pin, Pin, Delay>, Log) {
        let log: Log = Rc::new(RefCell::new(Vec::new()));
        let ei = BTEVEHALSPIInterface::new(
            Spi {
                log: log.clone(),
                miso: miso.to_vec(),
            },
            Pin {
                log: log.clone(),
                pd: false,
            },
            Pin {
                log: log.clone(),
                pd: true,
            },
            Delay(log.clone()),
        );
        (ei, log)
    }

    #[test]
    fn test_write_is_buffered() {
        let (mut ei, log) = test_obj(&[]);
        ei.begin_write(0x7f006150).unwrap();
        ei.continue_write(&[1, 2]).unwrap();
        ei.continue_write(&[3, 4]).unwrap();
        ei.end_write().unwrap();
        assert_eq!(
            *log.borrow(),
            std::vec![
                Event::Cs(false),
                Event::Write(std::vec![0xff, 0x00, 0x61, 0x50, 1, 2, 3, 4]),
                Event::Cs(true),
            ]
        );
    }

    #[test]
    fn test_long_write_splits() {
        let (mut ei, log) = test_obj(&[]);
        ei.write(0x1000, &[0xaa; 100]).unwrap();
        let writes: Vec<usize> = log
            .borrow()
            .iter()
            .filter_map(|e| match e {
                Event::Write(v) => Some(v.len()),
                _ => None,
            })
            .collect();
        assert_eq!(writes, std::vec![64, 40]);
    }

    #[test]
    fn test_read_waits_for_marker() {
        // One dummy byte, two filler bytes, the marker, then data.
        let (mut ei, _) = test_obj(&[0xee, 0x00, 0x00, 0x01, 0x34, 0x12]);
        let mut buf = [0u8; 2];
        ei.read(0x7f006594, &mut buf).unwrap();
        assert_eq!(buf, [0x34, 0x12]);
    }

    #[test]
    fn test_read_without_marker() {
        let (mut ei, _) = test_obj(&[]);
        let mut buf = [0u8; 2];
        ei.begin_read(0x7f006594).unwrap();
        match ei.continue_read(&mut buf) {
            Err(BTEVEHALSPIError::NoReadMarker) => {}
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn test_host_cmd() {
        let (mut ei, log) = test_obj(&[]);
        ei.host_cmd(HostMessage([0xff, 0xf0, 0, 0, 0])).unwrap();
        assert_eq!(
            *log.borrow(),
            std::vec![
                Event::Cs(false),
                Event::Write(std::vec![0xff, 0xf0, 0, 0, 0]),
                Event::Cs(true),
            ]
        );
    }

    #[test]
    fn test_power_cycle() {
        let (mut ei, log) = test_obj(&[]);
        ei.power_cycle(true).unwrap();
        assert_eq!(
            *log.borrow(),
            std::vec![
                Event::Pd(false),
                Event::Delay(20),
                Event::Delay(20),
                Event::Pd(true),
                Event::Delay(20),
            ]
        );
        assert_eq!(
            ei.set_spi_channels(SpiChannels::Quad, 2).unwrap(),
            SpiChannels::Single
        );
    }
}
