//! Coprocessor commands, including the ones that produce a result.
//!
//! A result-producing command is only issued once the FIFO has drained, so
//! that the ring offset reserved for its output is known. The host then
//! waits for the FIFO to drain again and reads the output back from the
//! reserved words in `RAM_CMD`.

use super::opcodes;
use super::options;
use super::waiter::Waiter;
use crate::error::{interface_result, Error, Result};
use crate::hooks::Hooks;
use crate::interface::Interface;
use crate::memory::{MemoryRegion, Ptr, Slice};
use crate::models::Model;
use crate::registers::{flash_status, Register};
use crate::EVE;

/// Where the chip leaves the format of the most recent `CMD_LOADIMAGE`.
const IMAGE_FORMAT_ADDR: u32 = 0x3097e8;

/// The result of `CMD_GETPROPS`: where the last loaded image went and its
/// dimensions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ImageProps {
    pub ptr: u32,
    pub width: u32,
    pub height: u32,
}

/// The result of `CMD_GETIMAGE`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ImageInfo {
    pub source: u32,
    pub format: u32,
    pub width: u32,
    pub height: u32,
    pub palette: u32,
}

/// The outcome of [`EVE::flash_fast`](EVE::flash_fast).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FlashFast {
    /// Zero on success. `0xE000` if the coprocessor wasn't ready and
    /// `0xE001` if the flash wasn't attached. Other values are the
    /// coprocessor's own error codes.
    pub result: u32,

    /// `REG_FLASH_STATUS` after the attempt.
    pub status: u32,
}

impl FlashFast {
    pub const NOT_READY: u32 = 0xe000;
    pub const NOT_ATTACHED: u32 = 0xe001;

    pub fn is_full_speed(&self) -> bool {
        self.result == 0 && self.status == flash_status::FULL
    }
}

/// Commands that compute something and return it.
///
/// If the command hook takes over one of these commands then its result is
/// reported as zero.
impl<M, I, W, H> EVE<M, I, W, H>
where
    M: Model,
    I: Interface,
    W: Waiter<M, I>,
    H: Hooks,
{
    /// Computes the CRC-32 of a block of main memory.
    pub fn mem_crc<S: Into<Slice<M::MainMem>>>(&mut self, slice: S) -> Result<u32, I::Error> {
        let slice: Slice<M::MainMem> = slice.into();
        let mut out = [0; 1];
        self.fetch(
            &[opcodes::MEMCRC, slice.start().to_raw(), slice.len()],
            None,
            &mut out,
        )?;
        Ok(out[0])
    }

    /// Reads a register by way of the coprocessor, so that the value is
    /// ordered with respect to the commands before it.
    pub fn reg_read(&mut self, reg: Register) -> Result<u32, I::Error> {
        let mut out = [0; 1];
        self.fetch(&[opcodes::REGREAD, M::reg_ptr(reg).to_raw()], None, &mut out)?;
        Ok(out[0])
    }

    /// Returns the first free address in main memory after the data most
    /// recently decompressed or loaded by the coprocessor.
    pub fn get_ptr(&mut self) -> Result<Ptr<M::MainMem>, I::Error> {
        let mut out = [0; 1];
        self.fetch(&[opcodes::GETPTR], None, &mut out)?;
        Ok(<M::MainMem as MemoryRegion>::ptr(out[0]))
    }

    pub fn get_props(&mut self) -> Result<ImageProps, I::Error> {
        let mut out = [0; 3];
        self.fetch(&[opcodes::GETPROPS], None, &mut out)?;
        Ok(ImageProps {
            ptr: out[0],
            width: out[1],
            height: out[2],
        })
    }

    pub fn get_image(&mut self) -> Result<ImageInfo, I::Error> {
        let mut out = [0; 5];
        self.fetch(&[opcodes::GETIMAGE], None, &mut out)?;
        Ok(ImageInfo {
            source: out[0],
            format: out[1],
            width: out[2],
            height: out[3],
            palette: out[4],
        })
    }

    /// Returns the size of a file on the SD card.
    pub fn fs_size(&mut self, name: &[u8]) -> Result<u32, I::Error> {
        let mut out = [0; 1];
        self.fetch(&[opcodes::FSSIZE], Some(name), &mut out)?;
        Ok(out[0])
    }

    /// Copies a file from the SD card into main memory, returning the
    /// coprocessor's status code (zero on success).
    pub fn fs_read(&mut self, dst: Ptr<M::MainMem>, name: &[u8]) -> Result<u32, I::Error> {
        let mut out = [0; 1];
        self.fetch(&[opcodes::FSREAD, dst.to_raw()], Some(name), &mut out)?;
        Ok(out[0])
    }

    /// Selects a file on the SD card as the source for following commands
    /// that take the file system option.
    pub fn fs_source(&mut self, name: &[u8]) -> Result<u32, I::Error> {
        let mut out = [0; 1];
        self.fetch(&[opcodes::FSSOURCE], Some(name), &mut out)?;
        Ok(out[0])
    }

    pub fn sd_attach(&mut self, options: u32) -> Result<u32, I::Error> {
        let mut out = [0; 1];
        self.fetch(&[opcodes::SDATTACH, options], None, &mut out)?;
        Ok(out[0])
    }

    /// Switches the attached flash into full speed mode, if it isn't
    /// already.
    pub fn flash_fast(&mut self) -> Result<FlashFast, I::Error> {
        if let Err(err) = self.wait_flush() {
            if let Error::Interface(_) = err {
                return Err(err);
            }
            return Ok(FlashFast {
                result: FlashFast::NOT_READY,
                status: self.flash_status()?,
            });
        }
        let status = self.flash_status()?;
        if status < flash_status::BASIC {
            return Ok(FlashFast {
                result: FlashFast::NOT_ATTACHED,
                status: status,
            });
        }
        if status > flash_status::BASIC {
            return Ok(FlashFast {
                result: 0,
                status: status,
            });
        }

        let mut out = [0; 1];
        if !self.fetch(&[opcodes::FLASHFAST], None, &mut out)? {
            return Ok(FlashFast {
                result: 0,
                status: status,
            });
        }
        Ok(FlashFast {
            result: out[0],
            status: self.flash_status()?,
        })
    }

    /// Attaches the flash if it's currently detached, returning
    /// `REG_FLASH_STATUS` afterwards.
    pub fn flash_attach(&mut self) -> Result<u32, I::Error> {
        if let Err(err) = self.wait_flush() {
            if let Error::Interface(_) = err {
                return Err(err);
            }
            return self.flash_status();
        }
        let status = self.flash_status()?;
        if status != flash_status::DETACHED {
            return Ok(status);
        }
        self.co_cmd(&[opcodes::FLASHATTACH])?;
        self.wait_flush()?;
        self.flash_status()
    }

    /// Decodes a PNG or JPEG image from host memory into main memory at
    /// `dst`, returning the bitmap format the coprocessor chose.
    pub fn load_image(
        &mut self,
        dst: Ptr<M::MainMem>,
        opts: options::LoadImage,
        data: &[u8],
    ) -> Result<u32, I::Error> {
        if self.hooks.command_hook(opcodes::LOADIMAGE, &[dst.to_raw()]) {
            return Ok(0);
        }
        self.wait_flush()?;
        self.start_func(12)?;
        self.write32(opcodes::LOADIMAGE)?;
        self.write32(dst.to_raw())?;
        self.write32(opts.to_raw())?;
        self.write_prog_mem(data)?;
        self.end_func()?;
        self.wait_flush()?;
        interface_result(
            self.ll
                .rd32(<M::MainMem as MemoryRegion>::ptr(IMAGE_FORMAT_ADDR)),
        )
    }

    /// Decompresses zlib data from host memory into main memory at `dst`.
    pub fn inflate(
        &mut self,
        dst: Ptr<M::MainMem>,
        opts: options::Inflate,
        data: &[u8],
    ) -> Result<(), I::Error> {
        if self.hooks.command_hook(opcodes::INFLATE, &[dst.to_raw()]) {
            return Ok(());
        }
        self.wait_flush()?;
        self.start_func(12)?;
        self.write32(opcodes::INFLATE)?;
        self.write32(dst.to_raw())?;
        self.write32(opts.to_raw())?;
        self.write_prog_mem(data)?;
        self.end_func()?;
        self.wait_flush()
    }

    fn flash_status(&mut self) -> Result<u32, I::Error> {
        interface_result(self.ll.rd32(M::reg_ptr(Register::FLASH_STATUS)))
    }

    // The whole result-fetch exchange: `words` is the opcode and leading
    // arguments, `string` an optional string argument after them, and `out`
    // receives the result words. Returns false if the hook took over.
    fn fetch(
        &mut self,
        words: &[u32],
        string: Option<&[u8]>,
        out: &mut [u32],
    ) -> Result<bool, I::Error> {
        for v in out.iter_mut() {
            *v = 0;
        }
        if let Some((&opcode, args)) = words.split_first() {
            if self.hooks.command_hook(opcode, args) {
                log::trace!("command {:#010x} handled by hook", opcode);
                return Ok(false);
            }
        }

        self.wait_flush()?;
        let string_len = string.map_or(0, |s| (s.len() / 4 + 1) * 4);
        let len = words.len() * 4 + string_len + out.len() * 4;
        let len = core::cmp::min(len, M::space_when_empty() as usize);
        self.start_func(len as u16)?;
        for &word in words {
            self.write32(word)?;
        }
        if let Some(s) = string {
            self.write_string(s)?;
        }
        let offset = self.move_wp((out.len() * 4) as u16)?;
        self.end_func()?;
        self.wait_flush()?;

        for (i, v) in out.iter_mut().enumerate() {
            let ptr = <M::CommandMem as MemoryRegion>::ptr(offset as u32 + (i as u32) * 4);
            *v = interface_result(self.ll.rd32(ptr))?;
        }
        Ok(true)
    }
}

/// Commands that only have side effects on the chip.
///
/// These don't wait for the coprocessor to run them. Use
/// [`wait_flush`](EVE::wait_flush) when that matters.
impl<M, I, W, H> EVE<M, I, W, H>
where
    M: Model,
    I: Interface,
    W: Waiter<M, I>,
    H: Hooks,
{
    /// Starts a new display list, resetting the display list write
    /// position back to the beginning of `RAM_DL`.
    pub fn dl_start(&mut self) -> Result<(), I::Error> {
        self.co_cmd(&[opcodes::DLSTART]).map(|_| ())
    }

    /// Swaps the display list built since [`dl_start`](EVE::dl_start) onto
    /// the screen.
    pub fn swap(&mut self) -> Result<(), I::Error> {
        self.co_cmd(&[opcodes::SWAP]).map(|_| ())
    }

    /// Resets the coprocessor's state to the boot-time defaults before
    /// continuing with later commands.
    pub fn cold_start(&mut self) -> Result<(), I::Error> {
        self.co_cmd(&[opcodes::COLDSTART]).map(|_| ())
    }

    pub fn nop(&mut self) -> Result<(), I::Error> {
        self.co_cmd(&[opcodes::NOP]).map(|_| ())
    }

    /// Appends display list commands stored in main memory to the display
    /// list being built.
    pub fn append<S: Into<Slice<M::MainMem>>>(&mut self, slice: S) -> Result<(), I::Error> {
        let slice: Slice<M::MainMem> = slice.into();
        self.co_cmd(&[opcodes::APPEND, slice.start().to_raw(), slice.len()])
            .map(|_| ())
    }

    /// Has the coprocessor write `data` into main memory at `dst`.
    pub fn mem_write(&mut self, dst: Ptr<M::MainMem>, data: &[u8]) -> Result<(), I::Error> {
        let args = [dst.to_raw(), data.len() as u32];
        if self.hooks.command_hook(opcodes::MEMWRITE, &args) {
            return Ok(());
        }
        self.start_func(12)?;
        self.write32(opcodes::MEMWRITE)?;
        self.write32(args[0])?;
        self.write32(args[1])?;
        self.write_prog_mem(data)?;
        self.end_func()
    }

    pub fn mem_set<S: Into<Slice<M::MainMem>>>(&mut self, slice: S, v: u8) -> Result<(), I::Error> {
        let slice: Slice<M::MainMem> = slice.into();
        self.co_cmd(&[
            opcodes::MEMSET,
            slice.start().to_raw(),
            v as u32,
            slice.len(),
        ])
        .map(|_| ())
    }

    pub fn mem_zero<S: Into<Slice<M::MainMem>>>(&mut self, slice: S) -> Result<(), I::Error> {
        let slice: Slice<M::MainMem> = slice.into();
        self.co_cmd(&[opcodes::MEMZERO, slice.start().to_raw(), slice.len()])
            .map(|_| ())
    }

    pub fn mem_cpy(
        &mut self,
        dst: Ptr<M::MainMem>,
        src: Ptr<M::MainMem>,
        len: u32,
    ) -> Result<(), I::Error> {
        self.co_cmd(&[opcodes::MEMCPY, dst.to_raw(), src.to_raw(), len])
            .map(|_| ())
    }

    /// Writes a register by way of the coprocessor, so that the write is
    /// ordered with respect to the commands around it.
    pub fn reg_write(&mut self, reg: Register, v: u32) -> Result<(), I::Error> {
        self.co_cmd(&[opcodes::REGWRITE, M::reg_ptr(reg).to_raw(), v])
            .map(|_| ())
    }

    pub fn flash_erase(&mut self) -> Result<(), I::Error> {
        self.co_cmd(&[opcodes::FLASHERASE]).map(|_| ())
    }

    /// Copies `len` bytes from flash offset `src` into main memory.
    pub fn flash_read(&mut self, dst: Ptr<M::MainMem>, src: u32, len: u32) -> Result<(), I::Error> {
        self.co_cmd(&[opcodes::FLASHREAD, dst.to_raw(), src, len])
            .map(|_| ())
    }

    pub fn flash_detach(&mut self) -> Result<(), I::Error> {
        self.co_cmd(&[opcodes::FLASHDETACH]).map(|_| ())
    }

    /// Selects a flash offset as the source for following commands that
    /// take the flash option.
    pub fn flash_source(&mut self, src: u32) -> Result<(), I::Error> {
        self.co_cmd(&[opcodes::FLASHSOURCE, src]).map(|_| ())
    }
}
