//! A simulated BT82x, for tests and for trying the driver without hardware.

use core::convert::TryFrom;

use crate::commands::opcodes;
use crate::commands::waiter::is_fault;
use crate::low_level::host_commands::{HostCmd, HostMessage};
use crate::memory::MemoryRegion;
use crate::models::Model;
use crate::interface::SpiChannels;
use crate::registers::{cpureset, flash_status, Register, SystemRegister};

const REGISTER_COUNT: usize = 1024;

// Reading a faulted pointer or free space count gives this.
const FAULT_SIGNATURE: u16 = 0xfff;

/// How the simulated chip behaves while it boots. Each `*_polls` field is
/// the number of reads that see the "not yet" value before the real one
/// appears.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BootScript {
    pub boot_status_polls: u32,
    /// The raw value of `REG_CHIP_ID` once it becomes valid.
    pub chip_id: u32,
    pub chip_id_polls: u32,
    pub id_polls: u32,
    /// Reads of `REG_CPURESET` that still see every engine busy.
    pub engine_busy_polls: u32,
    pub frequency: u32,
    pub ram_size_mib: u32,
}

impl Default for BootScript {
    fn default() -> Self {
        Self {
            boot_status_polls: 0,
            chip_id: 0x0820_0100,
            chip_id_polls: 0,
            id_polls: 0,
            engine_busy_polls: 0,
            frequency: 72_000_000,
            ram_size_mib: 1024,
        }
    }
}

/// An implementation of [`Interface`](super::Interface) which simulates
/// just enough of a BT82x for the driver to boot it, configure it and run
/// commands through its FIFO.
///
/// Memory is backed by caller-provided slices, which may be shorter than
/// the real regions: accesses beyond the end of a slice fail with
/// [`Error::OutOfBounds`]. The command memory slice should be the full 16
/// KiB for the ring to wrap as it does on the chip.
///
/// Appended commands are executed the next time the FIFO is polled, or
/// after a configurable number of polls, and only a handful of commands
/// are understood: `DLSTART`, `SWAP`, `COLDSTART`, `NOP`, the flash
/// attach commands, `MEMCRC`, `REGREAD`, `REGWRITE`, `GETPTR`,
/// `GETPROPS`, the memory write commands, `APPEND` and display list
/// words. Anything else faults the coprocessor.
pub struct Interface<'a, M: Model> {
    main_ram: &'a mut [u8],
    display_list_ram: &'a mut [u8],
    cmd_ram: &'a mut [u8],
    regs: [u32; REGISTER_COUNT],
    err_report: [u8; 128],

    write_addr: Option<u32>,
    read_addr: Option<u32>,

    script: BootScript,
    boot_wait: u32,
    chip_id_wait: u32,
    id_wait: u32,
    engine_wait: u32,

    powered: bool,
    active: bool,
    spi_channels: SpiChannels,

    consume_delay: u32,
    consume_wait: u32,
    fault_opcode: Option<(u32, &'static [u8])>,
    ignore_reset: bool,
    last_image: (u32, u32, u32, u32),

    polls: u32,
    elapsed_ms: u32,
    executed: u32,

    _model: core::marker::PhantomData<M>,
}

/// Errors the simulated link can report. None of these happen with correct
/// driver behaviour, so tests can treat any of them as a driver bug.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    IncorrectSequence,
    UnmappedAddr(u32),
    OutOfBounds { region: &'static str, offset: u32 },
    Unaligned(u32),
    /// Memory was accessed while the chip was powered down, or before the
    /// `ACTIVE` host command.
    NotActive,
    /// More was appended to the command FIFO than it had room for.
    Overflow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OffsetAddr {
    Main(u32),
    DisplayList(u32),
    Registers(u32),
    SystemRegisters(u32),
    Command(u32),
    CommandAppend,
    ErrReport(u32),
    Unknown,
}

impl<'a, M: Model> Interface<'a, M> {
    pub fn new(_model: M) -> Self {
        Self {
            main_ram: &mut [],
            display_list_ram: &mut [],
            cmd_ram: &mut [],
            regs: [0; REGISTER_COUNT],
            err_report: [0; 128],
            write_addr: None,
            read_addr: None,
            script: BootScript::default(),
            boot_wait: 0,
            chip_id_wait: 0,
            id_wait: 0,
            engine_wait: 0,
            powered: false,
            active: false,
            spi_channels: SpiChannels::Single,
            consume_delay: 0,
            consume_wait: 0,
            fault_opcode: None,
            ignore_reset: false,
            last_image: (0, 0, 0, 0),
            polls: 0,
            elapsed_ms: 0,
            executed: 0,
            _model: core::marker::PhantomData,
        }
    }

    pub fn with_main_ram(self, buf: &'a mut [u8]) -> Self {
        Self {
            main_ram: buf,
            ..self
        }
    }

    pub fn with_display_list_ram(self, buf: &'a mut [u8]) -> Self {
        Self {
            display_list_ram: buf,
            ..self
        }
    }

    pub fn with_cmd_ram(self, buf: &'a mut [u8]) -> Self {
        Self {
            cmd_ram: buf,
            ..self
        }
    }

    pub fn with_boot_script(self, script: BootScript) -> Self {
        Self { script, ..self }
    }

    /// Makes the coprocessor leave newly appended commands alone for
    /// `polls` polls of the FIFO before executing them.
    pub fn with_consume_delay(self, polls: u32) -> Self {
        Self {
            consume_delay: polls,
            ..self
        }
    }

    /// Makes the coprocessor fault when it reaches `opcode`, leaving `msg`
    /// in the error report.
    pub fn with_fault_on(self, opcode: u32, msg: &'static [u8]) -> Self {
        Self {
            fault_opcode: Some((opcode, msg)),
            ..self
        }
    }

    /// Makes the chip ignore coprocessor resets: the FIFO pointers keep
    /// whatever values they had.
    pub fn with_stuck_reset(self) -> Self {
        Self {
            ignore_reset: true,
            ..self
        }
    }

    /// Sets what `GETPROPS` and `GETPTR` report: the address, size and end
    /// of the last image the coprocessor loaded.
    pub fn set_last_image(&mut self, ptr: u32, width: u32, height: u32, end: u32) {
        self.last_image = (ptr, width, height, end);
    }

    /// Stops faulting on the opcode given to
    /// [`with_fault_on`](Interface::with_fault_on).
    pub fn clear_fault_trigger(&mut self) {
        self.fault_opcode = None;
    }

    /// Reads a register without any of the side effects a read over the
    /// link would have.
    pub fn register(&self, reg: Register) -> u32 {
        self.regs[reg.index()]
    }

    pub fn rp(&self) -> u16 {
        self.regs[Register::CMD_READ.index()] as u16
    }

    pub fn wp(&self) -> u16 {
        self.regs[Register::CMD_WRITE.index()] as u16
    }

    pub fn is_faulted(&self) -> bool {
        is_fault(self.rp())
    }

    pub fn err_report(&self) -> &[u8; 128] {
        &self.err_report
    }

    /// How many times the FIFO read pointer or free space has been read.
    pub fn polls(&self) -> u32 {
        self.polls
    }

    /// Total time the driver has asked to sleep for.
    pub fn elapsed_ms(&self) -> u32 {
        self.elapsed_ms
    }

    /// Number of commands, display list words included, the coprocessor
    /// has executed.
    pub fn executed(&self) -> u32 {
        self.executed
    }

    pub fn is_powered(&self) -> bool {
        self.powered
    }

    pub fn spi_channels(&self) -> SpiChannels {
        self.spi_channels
    }

    fn offset_addr(addr: u32) -> OffsetAddr {
        // The error report lies inside main memory, so it comes first.
        if M::ErrReportMem::contains_addr(addr) {
            return OffsetAddr::ErrReport(addr - M::ErrReportMem::BASE_ADDR);
        }
        if M::MainMem::contains_addr(addr) {
            return OffsetAddr::Main(addr - M::MainMem::BASE_ADDR);
        }
        if M::DisplayListMem::contains_addr(addr) {
            return OffsetAddr::DisplayList(addr - M::DisplayListMem::BASE_ADDR);
        }
        if M::RegisterMem::contains_addr(addr) {
            return OffsetAddr::Registers(addr - M::RegisterMem::BASE_ADDR);
        }
        if M::SystemRegisterMem::contains_addr(addr) {
            return OffsetAddr::SystemRegisters(addr - M::SystemRegisterMem::BASE_ADDR);
        }
        if M::CommandMem::contains_addr(addr) {
            return OffsetAddr::Command(addr - M::CommandMem::BASE_ADDR);
        }
        if M::CommandAppendMem::contains_addr(addr) {
            return OffsetAddr::CommandAppend;
        }
        OffsetAddr::Unknown
    }

    fn ring_size() -> u32 {
        M::CommandMem::LENGTH
    }

    fn power_up(&mut self) {
        self.regs = [0; REGISTER_COUNT];
        self.regs[Register::FREQUENCY.index()] = self.script.frequency;
        self.regs[Register::RAM_SIZE.index()] = self.script.ram_size_mib;
        self.regs[Register::FLASH_STATUS.index()] = flash_status::BASIC;
        self.regs[Register::ID.index()] = M::ID_SENTINEL as u32;
        self.err_report = [0; 128];
        self.boot_wait = self.script.boot_status_polls;
        self.chip_id_wait = self.script.chip_id_polls;
        self.id_wait = self.script.id_polls;
        self.engine_wait = self.script.engine_busy_polls;
        self.consume_wait = 0;
        self.powered = true;
        self.active = false;
    }

    fn check_active(&self) -> Result<(), Error> {
        if self.active {
            Ok(())
        } else {
            Err(Error::NotActive)
        }
    }

    fn space(&self) -> u16 {
        let (rp, wp) = (self.rp() as u32, self.wp() as u32);
        if is_fault(rp as u16) {
            return FAULT_SIGNATURE;
        }
        let size = Self::ring_size();
        let used = (wp + size - rp) % size;
        (size - 4 - used) as u16
    }

    fn append(&mut self, data: &[u8]) -> Result<(), Error> {
        if data.len() as u32 > self.space() as u32 {
            return Err(Error::Overflow);
        }
        let size = Self::ring_size();
        let wp = self.wp() as u32;
        for (i, v) in data.iter().enumerate() {
            let offset = (wp + i as u32) % size;
            match self.cmd_ram.get_mut(offset as usize) {
                Some(b) => *b = *v,
                None => {
                    return Err(Error::OutOfBounds {
                        region: "CommandMem",
                        offset,
                    })
                }
            }
        }
        self.regs[Register::CMD_WRITE.index()] = (wp + data.len() as u32) % size;
        if self.consume_wait == 0 {
            self.consume_wait = self.consume_delay;
        }
        Ok(())
    }

    // One poll of the FIFO registers gives the coprocessor a chance to
    // catch up.
    fn poll_fifo(&mut self) {
        self.polls += 1;
        if self.rp() == self.wp() || self.is_faulted() || self.in_reset() {
            return;
        }
        if self.consume_wait > 0 {
            self.consume_wait -= 1;
            return;
        }
        self.run();
    }

    fn in_reset(&self) -> bool {
        self.regs[Register::CPURESET.index()] as u8 & cpureset::COPROCESSOR != 0
    }

    fn ring_word(&self, offset: u32) -> Option<u32> {
        let size = Self::ring_size();
        let mut bytes = [0u8; 4];
        for (i, b) in bytes.iter_mut().enumerate() {
            *b = *self.cmd_ram.get(((offset + i as u32) % size) as usize)?;
        }
        Some(u32::from_le_bytes(bytes))
    }

    fn set_ring_word(&mut self, offset: u32, v: u32) {
        let size = Self::ring_size();
        for (i, b) in v.to_le_bytes().iter().enumerate() {
            if let Some(dst) = self.cmd_ram.get_mut(((offset + i as u32) % size) as usize) {
                *dst = *b;
            }
        }
    }

    // The length in bytes of the command at `rp`, or None if it hasn't all
    // arrived yet.
    fn command_len(&self, rp: u32, avail: u32) -> Option<u32> {
        use opcodes::*;
        let op = self.ring_word(rp)?;
        let len = match op {
            GETPTR | FLASHFAST | FLASHSOURCE => 8,
            REGREAD | REGWRITE | MEMZERO | APPEND => 12,
            MEMCRC | MEMSET | MEMCPY | FLASHREAD | GETPROPS => 16,
            MEMWRITE => {
                if avail < 12 {
                    return None;
                }
                let num = self.ring_word(rp + 8)?;
                12 + ((num + 3) & !3)
            }
            _ => 4,
        };
        if len <= avail {
            Some(len)
        } else {
            None
        }
    }

    // Executes every complete command between the pointers.
    fn run(&mut self) {
        let size = Self::ring_size();
        loop {
            let (rp, wp) = (self.rp() as u32, self.wp() as u32);
            if rp == wp || is_fault(rp as u16) {
                return;
            }
            let avail = (wp + size - rp) % size;
            let len = match self.command_len(rp, avail) {
                Some(len) => len,
                None => {
                    if self.ring_word(rp).is_none() {
                        self.fault(b"command memory missing");
                    }
                    return;
                }
            };
            let op = self.ring_word(rp).unwrap_or(0);
            if let Some((trigger, msg)) = self.fault_opcode {
                if trigger == op {
                    self.fault(msg);
                    return;
                }
            }
            if let Err(msg) = self.execute(op, rp) {
                self.fault(msg);
                return;
            }
            self.executed += 1;
            self.regs[Register::CMD_READ.index()] = (rp + len) % size;
        }
    }

    fn arg(&self, rp: u32, n: u32) -> Result<u32, &'static [u8]> {
        self.ring_word(rp + 4 * n).ok_or(b"command memory missing".as_ref())
    }

    fn execute(&mut self, op: u32, rp: u32) -> Result<(), &'static [u8]> {
        use opcodes::*;
        if !opcodes::is_coprocessor_command(op) {
            return self.dl_write(&op.to_le_bytes());
        }
        match op {
            DLSTART => self.regs[Register::CMD_DL.index()] = 0,
            SWAP | NOP | FLASHERASE | FLASHREAD | FLASHSOURCE => {}
            COLDSTART => self.regs[Register::CMD_DL.index()] = 0,
            FLASHDETACH => self.regs[Register::FLASH_STATUS.index()] = flash_status::DETACHED,
            FLASHATTACH => self.regs[Register::FLASH_STATUS.index()] = flash_status::BASIC,
            FLASHFAST => {
                if self.regs[Register::FLASH_STATUS.index()] < flash_status::BASIC {
                    self.set_ring_word(rp + 4, 0xe001);
                } else {
                    self.regs[Register::FLASH_STATUS.index()] = flash_status::FULL;
                    self.set_ring_word(rp + 4, 0);
                }
            }
            MEMCRC => {
                let (ptr, num) = (self.arg(rp, 1)?, self.arg(rp, 2)?);
                let data = self.main_slice(ptr, num)?;
                let crc = crc32(data);
                self.set_ring_word(rp + 12, crc);
            }
            REGREAD => {
                let addr = self.arg(rp, 1)?;
                let v = match Self::offset_addr(addr) {
                    OffsetAddr::Registers(offset) => self.regs[(offset / 4) as usize],
                    _ => return Err(b"REGREAD of a non-register"),
                };
                self.set_ring_word(rp + 8, v);
            }
            REGWRITE => {
                let (addr, v) = (self.arg(rp, 1)?, self.arg(rp, 2)?);
                match Self::offset_addr(addr) {
                    OffsetAddr::Registers(offset) => self.regs[(offset / 4) as usize] = v,
                    _ => return Err(b"REGWRITE of a non-register"),
                }
            }
            GETPTR => {
                let end = self.last_image.3;
                self.set_ring_word(rp + 4, end);
            }
            GETPROPS => {
                let (ptr, width, height, _) = self.last_image;
                self.set_ring_word(rp + 4, ptr);
                self.set_ring_word(rp + 8, width);
                self.set_ring_word(rp + 12, height);
            }
            MEMWRITE => {
                let (ptr, num) = (self.arg(rp, 1)?, self.arg(rp, 2)?);
                for i in 0..num {
                    let word = self.arg(rp, 3 + i / 4)?;
                    let b = word.to_le_bytes()[(i % 4) as usize];
                    self.main_slice_mut(ptr + i, 1)?[0] = b;
                }
            }
            MEMSET => {
                let (ptr, v, num) = (self.arg(rp, 1)?, self.arg(rp, 2)?, self.arg(rp, 3)?);
                for b in self.main_slice_mut(ptr, num)?.iter_mut() {
                    *b = v as u8;
                }
            }
            MEMZERO => {
                let (ptr, num) = (self.arg(rp, 1)?, self.arg(rp, 2)?);
                for b in self.main_slice_mut(ptr, num)?.iter_mut() {
                    *b = 0;
                }
            }
            MEMCPY => {
                let (dst, src, num) = (self.arg(rp, 1)?, self.arg(rp, 2)?, self.arg(rp, 3)?);
                self.main_slice(src, num)?;
                self.main_slice(dst, num)?;
                self.main_ram
                    .copy_within(src as usize..(src + num) as usize, dst as usize);
            }
            APPEND => {
                let (ptr, num) = (self.arg(rp, 1)?, self.arg(rp, 2)?);
                let mut word = [0u8; 4];
                for i in (0..num).step_by(4) {
                    let n = core::cmp::min(4, num - i) as usize;
                    word[..n].copy_from_slice(self.main_slice(ptr + i, n as u32)?);
                    self.dl_write(&word)?;
                }
            }
            _ => return Err(b"unsupported command"),
        }
        Ok(())
    }

    fn main_slice(&self, ptr: u32, num: u32) -> Result<&[u8], &'static [u8]> {
        self.main_ram
            .get(ptr as usize..(ptr as usize + num as usize))
            .ok_or(b"main memory out of range".as_ref())
    }

    fn main_slice_mut(&mut self, ptr: u32, num: u32) -> Result<&mut [u8], &'static [u8]> {
        self.main_ram
            .get_mut(ptr as usize..(ptr as usize + num as usize))
            .ok_or(b"main memory out of range".as_ref())
    }

    fn dl_write(&mut self, word: &[u8]) -> Result<(), &'static [u8]> {
        let idx = Register::CMD_DL.index();
        let offset = self.regs[idx];
        if offset + 4 > M::DisplayListMem::LENGTH {
            return Err(b"display list overflow");
        }
        if let Some(dst) = self
            .display_list_ram
            .get_mut(offset as usize..offset as usize + word.len())
        {
            dst.copy_from_slice(word);
        }
        self.regs[idx] = offset + 4;
        Ok(())
    }

    fn fault(&mut self, msg: &[u8]) {
        self.regs[Register::CMD_READ.index()] = FAULT_SIGNATURE as u32;
        self.err_report = [0; 128];
        let n = core::cmp::min(msg.len(), self.err_report.len() - 1);
        self.err_report[..n].copy_from_slice(&msg[..n]);
    }

    fn read_register(&mut self, index: usize) -> u32 {
        let reg = match Register::try_from((index * 4) as u16) {
            Ok(reg) => reg,
            Err(_) => return self.regs[index],
        };
        match reg {
            Register::CMD_READ => {
                self.poll_fifo();
                self.regs[index]
            }
            Register::CMDB_SPACE => {
                self.poll_fifo();
                self.space() as u32
            }
            Register::ID if self.id_wait > 0 => {
                self.id_wait -= 1;
                0
            }
            Register::CPURESET if self.engine_wait > 0 => {
                self.engine_wait -= 1;
                (cpureset::COPROCESSOR | cpureset::TOUCH | cpureset::AUDIO) as u32
            }
            _ => self.regs[index],
        }
    }

    fn write_register(&mut self, index: usize, v: u32) {
        let reg = match Register::try_from((index * 4) as u16) {
            Ok(reg) => reg,
            Err(_) => {
                self.regs[index] = v;
                return;
            }
        };
        match reg {
            // The pointers can only be moved while the coprocessor is held
            // in reset.
            Register::CMD_READ | Register::CMD_WRITE | Register::CMD_DL => {
                if self.in_reset() && !self.ignore_reset {
                    self.regs[index] = v;
                }
            }
            Register::CPURESET => {
                let releasing = self.in_reset() && (v as u8 & cpureset::COPROCESSOR == 0);
                self.regs[index] = v;
                if releasing {
                    self.consume_wait = 0;
                }
            }
            Register::CMDB_SPACE | Register::ID => {}
            _ => self.regs[index] = v,
        }
    }

    fn read_system_register(&mut self, offset: u32) -> u32 {
        if offset == SystemRegister::BOOT_STATUS.offset() {
            if self.boot_wait > 0 {
                self.boot_wait -= 1;
                return 0;
            }
            return M::BOOT_READY;
        }
        if offset == SystemRegister::CHIP_ID.offset() {
            if self.chip_id_wait > 0 {
                self.chip_id_wait -= 1;
                return 0;
            }
            return self.script.chip_id;
        }
        0
    }

    fn mem_read(&mut self, addr: u32, into: &mut [u8]) -> Result<(), Error> {
        use OffsetAddr::*;
        match Self::offset_addr(addr) {
            Main(offset) => copy_out("MainMem", self.main_ram, offset, into),
            DisplayList(offset) => {
                copy_out("DisplayListMem", self.display_list_ram, offset, into)
            }
            Command(offset) => copy_out("CommandMem", self.cmd_ram, offset, into),
            ErrReport(offset) => copy_out("ErrReportMem", &self.err_report, offset, into),
            Registers(offset) => {
                if offset % 4 != 0 {
                    return Err(Error::Unaligned(addr));
                }
                for (i, chunk) in into.chunks_mut(4).enumerate() {
                    let index = (offset / 4) as usize + i;
                    if index >= REGISTER_COUNT {
                        return Err(Error::OutOfBounds {
                            region: "RegisterMem",
                            offset: offset + i as u32 * 4,
                        });
                    }
                    let v = self.read_register(index).to_le_bytes();
                    chunk.copy_from_slice(&v[..chunk.len()]);
                }
                Ok(())
            }
            SystemRegisters(offset) => {
                if offset % 4 != 0 {
                    return Err(Error::Unaligned(addr));
                }
                let v = self.read_system_register(offset).to_le_bytes();
                let n = core::cmp::min(into.len(), 4);
                into[..n].copy_from_slice(&v[..n]);
                Ok(())
            }
            CommandAppend | Unknown => Err(Error::UnmappedAddr(addr)),
        }
    }

    fn mem_write(&mut self, addr: u32, data: &[u8]) -> Result<(), Error> {
        use OffsetAddr::*;
        match Self::offset_addr(addr) {
            Main(offset) => copy_in("MainMem", self.main_ram, offset, data),
            DisplayList(offset) => copy_in("DisplayListMem", self.display_list_ram, offset, data),
            Command(offset) => copy_in("CommandMem", self.cmd_ram, offset, data),
            ErrReport(offset) => copy_in("ErrReportMem", &mut self.err_report, offset, data),
            CommandAppend => self.append(data),
            Registers(offset) => {
                if offset % 4 != 0 {
                    return Err(Error::Unaligned(addr));
                }
                for (i, chunk) in data.chunks(4).enumerate() {
                    let index = (offset / 4) as usize + i;
                    if index >= REGISTER_COUNT {
                        return Err(Error::OutOfBounds {
                            region: "RegisterMem",
                            offset: offset + i as u32 * 4,
                        });
                    }
                    // Shorter writes only replace the bytes they cover.
                    let mut v = self.regs[index].to_le_bytes();
                    v[..chunk.len()].copy_from_slice(chunk);
                    self.write_register(index, u32::from_le_bytes(v));
                }
                Ok(())
            }
            SystemRegisters(_) => Ok(()),
            Unknown => Err(Error::UnmappedAddr(addr)),
        }
    }
}

impl<'a, M: Model> super::Interface for Interface<'a, M> {
    type Error = Error;

    fn begin_write(&mut self, addr: u32) -> Result<(), Error> {
        if self.write_addr.is_some() || self.read_addr.is_some() {
            return Err(Error::IncorrectSequence);
        }
        self.check_active()?;
        self.write_addr = Some(addr);
        Ok(())
    }

    fn continue_write(&mut self, data: &[u8]) -> Result<(), Error> {
        let addr = self.write_addr.ok_or(Error::IncorrectSequence)?;
        self.mem_write(addr, data)?;
        // Everything sent to the append port lands in the ring, however
        // long the transaction.
        if Self::offset_addr(addr) != OffsetAddr::CommandAppend {
            self.write_addr = Some(addr + data.len() as u32);
        }
        Ok(())
    }

    fn end_write(&mut self) -> Result<(), Error> {
        match self.write_addr.take() {
            Some(_) => Ok(()),
            None => Err(Error::IncorrectSequence),
        }
    }

    fn begin_read(&mut self, addr: u32) -> Result<(), Error> {
        if self.write_addr.is_some() || self.read_addr.is_some() {
            return Err(Error::IncorrectSequence);
        }
        self.check_active()?;
        self.read_addr = Some(addr);
        Ok(())
    }

    fn continue_read(&mut self, into: &mut [u8]) -> Result<(), Error> {
        let addr = self.read_addr.ok_or(Error::IncorrectSequence)?;
        self.mem_read(addr, into)?;
        self.read_addr = Some(addr + into.len() as u32);
        Ok(())
    }

    fn end_read(&mut self) -> Result<(), Error> {
        match self.read_addr.take() {
            Some(_) => Ok(()),
            None => Err(Error::IncorrectSequence),
        }
    }

    fn host_cmd(&mut self, msg: HostMessage) -> Result<(), Error> {
        if !self.powered {
            return Err(Error::NotActive);
        }
        match msg.command() {
            Some(HostCmd::ACTIVE) => self.active = true,
            Some(HostCmd::STANDBY) | Some(HostCmd::SLEEP) | Some(HostCmd::PWRDOWN) => {
                self.active = false
            }
            _ => {}
        }
        Ok(())
    }

    fn power_cycle(&mut self, up: bool) -> Result<(), Error> {
        self.spi_channels = SpiChannels::Single;
        if up {
            self.power_up();
        } else {
            self.powered = false;
            self.active = false;
        }
        Ok(())
    }

    fn set_spi_channels(&mut self, channels: SpiChannels, _dummy_bytes: u8) -> Result<SpiChannels, Error> {
        self.spi_channels = channels;
        Ok(channels)
    }

    fn delay_ms(&mut self, ms: u32) {
        self.elapsed_ms += ms;
    }
}

fn copy_out(region: &'static str, src: &[u8], offset: u32, into: &mut [u8]) -> Result<(), Error> {
    let start = offset as usize;
    match src.get(start..start + into.len()) {
        Some(data) => {
            into.copy_from_slice(data);
            Ok(())
        }
        None => Err(Error::OutOfBounds { region, offset }),
    }
}

fn copy_in(region: &'static str, dst: &mut [u8], offset: u32, data: &[u8]) -> Result<(), Error> {
    let start = offset as usize;
    match dst.get_mut(start..start + data.len()) {
        Some(dst) => {
            dst.copy_from_slice(data);
            Ok(())
        }
        None => Err(Error::OutOfBounds { region, offset }),
    }
}

/// CRC-32 as `MEMCRC` computes it: reflected, polynomial 0xEDB88320.
pub fn crc32(data: &[u8]) -> u32 {
    let mut crc = 0xffffffffu32;
    for b in data {
        crc ^= *b as u32;
        for _ in 0..8 {
            let mask = (crc & 1).wrapping_neg();
            crc = (crc >> 1) ^ (0xedb88320 & mask);
        }
    }
    !crc
}
