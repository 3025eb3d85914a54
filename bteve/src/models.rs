pub mod bt820;

use crate::memory;

/// Implemented by types that represent the characteristics of different
/// specific models of the BT82x family.
///
/// Although the Rust compiler would allow implementations of this elsewhere,
/// this trait is intended only for implementation inside this crate and its
/// requirements are subject to change in future, even in minor releases.
///
/// Models are a compile-time-only construct: they carry the memory map and
/// the identification constants the boot sequence checks against.
pub trait Model: Sized {
    type MainMem: memory::MainMem;
    type DisplayListMem: memory::DisplayListMem;
    type RegisterMem: memory::RegisterMem;
    type SystemRegisterMem: memory::SystemRegisterMem;
    type CommandMem: memory::CommandMem;
    type CommandAppendMem: memory::CommandAppendMem;
    type ErrReportMem: memory::ErrReportMem;

    /// The identifier boot expects to derive from `REG_CHIP_ID`, in the
    /// extended form such as `0x50820` for the BT820.
    const CHIP_ID: u32;

    /// The value `REG_BOOT_STATUS` settles at once the boot ROM has
    /// finished and the firmware is running.
    const BOOT_READY: u32 = 0x522e2e2e;

    /// The value `REG_ID` reports once the firmware is present.
    const ID_SENTINEL: u8 = 0x7c;

    /// The default system clock, used when boot parameters don't override
    /// it.
    const DEFAULT_SYSTEM_CLOCK_HZ: u32 = 72_000_000;

    /// The free space the coprocessor reports when its FIFO is empty. One
    /// word is always kept unused so that a full ring can be told apart
    /// from an empty one.
    fn space_when_empty() -> u16 {
        (<Self::CommandMem as memory::MemoryRegion>::LENGTH - 4) as u16
    }

    fn reg_ptr(reg: crate::registers::Register) -> memory::Ptr<Self::RegisterMem> {
        reg.ptr::<Self>()
    }

    fn sys_reg_ptr(
        reg: crate::registers::SystemRegister,
    ) -> memory::Ptr<Self::SystemRegisterMem> {
        reg.ptr::<Self>()
    }
}

