//! Types for representing BT82x memory regions at compile time.

use super::ptr::Ptr;
use crate::models::Model;
use core::marker::PhantomData;

/// A trait implemented by all memory regions that [`Ptr`](Ptr) instances can
/// refer to.
///
/// It doesn't make sense to implement this trait outside of the `bteve`
/// crate. It is implemented by model-specific types elsewhere in this
/// crate.
///
/// Memory regions exist only at compile time, as a facility to have the
/// Rust type system help ensure valid use of pointers. At runtime we
/// deal only in absolute addresses represented as u32.
pub trait MemoryRegion: core::marker::Sized + core::fmt::Debug + core::marker::Copy {
    type Model: Model;

    const BASE_ADDR: u32;
    const LENGTH: u32;
    const DEBUG_NAME: &'static str;

    /// Creates a pointer in the selected memory region.
    ///
    /// The given value is interpreted as an offset into the memory region,
    /// modulo the size of the region. The command FIFO relies on this to
    /// wrap its offsets.
    #[inline]
    fn ptr(raw: u32) -> Ptr<Self> {
        Ptr {
            addr: Self::BASE_ADDR.wrapping_add(raw % Self::LENGTH),
            _region: PhantomData,
        }
    }

    /// Returns true if the given absolute address falls inside this region.
    #[inline]
    fn contains_addr(addr: u32) -> bool {
        addr >= Self::BASE_ADDR && (addr - Self::BASE_ADDR) < Self::LENGTH
    }
}

pub trait MainMem: MemoryRegion + HostAccessible {}

pub trait DisplayListMem: MemoryRegion + HostAccessible {}

pub trait RegisterMem: MemoryRegion + HostAccessible {}

/// The system register block, which holds the chip identification and boot
/// status words that are readable before the coprocessor is running.
pub trait SystemRegisterMem: MemoryRegion + HostAccessible {}

/// The command FIFO ring buffer. Offsets into it wrap at its length.
pub trait CommandMem: MemoryRegion + HostAccessible {}

/// The write-only port which appends bytes to the command FIFO at the
/// current device-side write pointer.
pub trait CommandAppendMem: MemoryRegion + HostAccessible {}

pub trait ErrReportMem: MemoryRegion + HostAccessible {
    type RawMessage: crate::reset::FaultMessageRaw;
}

/// Implemented by memory regions that can be directly read or written by
/// the host controller over the SPI link.
pub trait HostAccessible: MemoryRegion {}
