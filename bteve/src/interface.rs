//! The boundary between this library and the physical link to the chip.

pub mod fake;

use crate::low_level::host_commands::HostMessage;

/// Implementations of `Interface` serve as adapters between the interface
/// this library expects and a specific physical implementation of that
/// interface, such as a SPI bus.
///
/// The main library contains no hardware implementations of this trait, in
/// order to make the library portable across systems big and small. Other
/// crates, including some with the name prefix `bteve`, take on additional
/// dependencies in order to bind this library to specific systems/hardware.
///
/// Memory access is framed as a transaction: `begin_write` or `begin_read`
/// opens it at an absolute address, any number of `continue_*` calls move
/// data at consecutive addresses, and `end_write` or `end_read` closes it.
/// The library never opens a second transaction before closing the first.
pub trait Interface {
    type Error: core::fmt::Debug;

    fn begin_write(&mut self, addr: u32) -> Result<(), Self::Error>;
    fn continue_write(&mut self, v: &[u8]) -> Result<(), Self::Error>;
    fn end_write(&mut self) -> Result<(), Self::Error>;

    fn begin_read(&mut self, addr: u32) -> Result<(), Self::Error>;
    fn continue_read(&mut self, into: &mut [u8]) -> Result<(), Self::Error>;
    fn end_read(&mut self) -> Result<(), Self::Error>;

    /// Sends a five-byte host command, framed by its own chip select cycle.
    fn host_cmd(&mut self, msg: HostMessage) -> Result<(), Self::Error>;

    /// Drives the power-down line. When `up` is true the chip is taken
    /// through a full power cycle and left powered; otherwise it is left
    /// powered down. Either way the link drops back to single-channel SPI,
    /// which is what the chip expects after power-on.
    fn power_cycle(&mut self, up: bool) -> Result<(), Self::Error>;

    /// Switches the host side of the link to the given number of data
    /// lines, with `dummy_bytes` bytes clocked out after each read header
    /// before the interface starts looking for the chip's ready marker.
    ///
    /// Returns the mode actually in effect, which may be narrower than
    /// requested if the host hardware can't do it.
    fn set_spi_channels(
        &mut self,
        channels: SpiChannels,
        dummy_bytes: u8,
    ) -> Result<SpiChannels, Self::Error>;

    /// Blocks for at least the given number of milliseconds.
    fn delay_ms(&mut self, ms: u32);

    fn write(&mut self, addr: u32, v: &[u8]) -> Result<(), Self::Error> {
        self.begin_write(addr)?;
        self.continue_write(v)?;
        self.end_write()
    }

    fn read(&mut self, addr: u32, into: &mut [u8]) -> Result<(), Self::Error> {
        self.begin_read(addr)?;
        self.continue_read(into)?;
        self.end_read()
    }

    /// Write the four bytes needed to form a "write memory" header
    /// for the given address into the given bytes.
    fn build_write_header(&self, addr: u32, into: &mut [u8; 4]) {
        crate::memory::build_spi_write_header(addr, into)
    }

    /// Write the four bytes needed to form a "read memory" header
    /// for the given address into the given bytes.
    fn build_read_header(&self, addr: u32, into: &mut [u8; 4]) {
        crate::memory::build_spi_read_header(addr, into)
    }
}

/// The number of SPI data lines in use.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SpiChannels {
    Single,
    Dual,
    Quad,
}

impl SpiChannels {
    pub const fn lines(self) -> u8 {
        match self {
            Self::Single => 1,
            Self::Dual => 2,
            Self::Quad => 4,
        }
    }
}

impl Default for SpiChannels {
    fn default() -> Self {
        Self::Single
    }
}

// We use std in test mode only, so we can do dynamic allocation in the mock
// code.
#[cfg(test)]
pub(crate) mod testing {
    extern crate std;

    use super::{HostMessage, Interface, SpiChannels};
    use std::collections::{HashMap, VecDeque};
    use std::vec::Vec;

    /// A test double for `trait Interface` which records every call and
    /// remembers written bytes in a sparse memory.
    pub struct MockInterface {
        // mem is a sparse representation of the memory space which
        // remembers what was written into it and returns 0 if asked for an
        // address that wasn't previously written.
        mem: HashMap<u32, u8>,
        // Values that successive reads starting at a given address will
        // see, one per read. The last one stays in memory afterwards.
        scripted: HashMap<u32, VecDeque<Vec<u8>>>,
        calls: Vec<MockInterfaceCall>,
        write_addr: Option<u32>,
        read_addr: Option<u32>,
        pub slept_ms: u32,
    }

    #[derive(Clone, Debug, PartialEq, Eq)]
    pub enum MockInterfaceCall {
        Write(u32, Vec<u8>),
        Read(u32, usize),
        HostCmd([u8; 5]),
        PowerCycle(bool),
        SetSpi(SpiChannels, u8),
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct MockError(pub &'static str);

    impl MockInterface {
        pub fn new() -> Self {
            Self {
                mem: HashMap::new(),
                scripted: HashMap::new(),
                calls: Vec::new(),
                write_addr: None,
                read_addr: None,
                slept_ms: 0,
            }
        }

        /// Consumes the mock and returns all of the calls it logged
        /// during its life.
        pub fn calls(self) -> Vec<MockInterfaceCall> {
            self.calls
        }

        // Copies some data into the fake memory without considering it
        // to be a logged operation.
        pub fn setup_mem(&mut self, addr: u32, buf: &[u8]) {
            for (i, v) in buf.iter().enumerate() {
                self.mem.insert(addr + i as u32, *v);
            }
        }

        /// Arranges for successive reads of the 16-bit value at `addr` to
        /// see each of `values` in turn.
        pub fn script_u16(&mut self, addr: u32, values: &[u16]) {
            let queue = values.iter().map(|v| v.to_le_bytes().to_vec()).collect();
            self.scripted.insert(addr, queue);
        }

        pub fn script_u8(&mut self, addr: u32, values: &[u8]) {
            let queue = values.iter().map(|v| std::vec![*v]).collect();
            self.scripted.insert(addr, queue);
        }

        pub fn script_u32(&mut self, addr: u32, values: &[u32]) {
            let queue = values.iter().map(|v| v.to_le_bytes().to_vec()).collect();
            self.scripted.insert(addr, queue);
        }
    }

    impl Interface for MockInterface {
        type Error = MockError;

        fn begin_write(&mut self, addr: u32) -> Result<(), MockError> {
            if self.write_addr.is_some() || self.read_addr.is_some() {
                return Err(MockError("begin_write while a transaction is open"));
            }
            self.write_addr = Some(addr);
            Ok(())
        }

        fn continue_write(&mut self, v: &[u8]) -> Result<(), MockError> {
            match self.write_addr {
                Some(addr) => {
                    self.calls.push(MockInterfaceCall::Write(addr, v.to_vec()));
                    self.setup_mem(addr, v);
                    self.write_addr = Some(addr + v.len() as u32);
                    Ok(())
                }
                None => Err(MockError("continue_write without an active write")),
            }
        }

        fn end_write(&mut self) -> Result<(), MockError> {
            match self.write_addr.take() {
                Some(_) => Ok(()),
                None => Err(MockError("end_write without an active write")),
            }
        }

        fn begin_read(&mut self, addr: u32) -> Result<(), MockError> {
            if self.write_addr.is_some() || self.read_addr.is_some() {
                return Err(MockError("begin_read while a transaction is open"));
            }
            self.read_addr = Some(addr);
            Ok(())
        }

        fn continue_read(&mut self, into: &mut [u8]) -> Result<(), MockError> {
            match self.read_addr {
                Some(addr) => {
                    self.calls.push(MockInterfaceCall::Read(addr, into.len()));
                    let next = self.scripted.get_mut(&addr).and_then(|q| q.pop_front());
                    if let Some(v) = next {
                        self.setup_mem(addr, &v);
                    }
                    for (i, v) in into.iter_mut().enumerate() {
                        *v = *self.mem.get(&(addr + i as u32)).unwrap_or(&0);
                    }
                    self.read_addr = Some(addr + into.len() as u32);
                    Ok(())
                }
                None => Err(MockError("continue_read without an active read")),
            }
        }

        fn end_read(&mut self) -> Result<(), MockError> {
            match self.read_addr.take() {
                Some(_) => Ok(()),
                None => Err(MockError("end_read without an active read")),
            }
        }

        fn host_cmd(&mut self, msg: HostMessage) -> Result<(), MockError> {
            self.calls.push(MockInterfaceCall::HostCmd(msg.0));
            Ok(())
        }

        fn power_cycle(&mut self, up: bool) -> Result<(), MockError> {
            self.calls.push(MockInterfaceCall::PowerCycle(up));
            Ok(())
        }

        fn set_spi_channels(
            &mut self,
            channels: SpiChannels,
            dummy_bytes: u8,
        ) -> Result<SpiChannels, MockError> {
            self.calls.push(MockInterfaceCall::SetSpi(channels, dummy_bytes));
            Ok(channels)
        }

        fn delay_ms(&mut self, ms: u32) {
            self.slept_ms += ms;
        }
    }
}
