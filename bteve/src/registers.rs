use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Represents a register within the RAM_REG region of a BT82x device.
#[derive(TryFromPrimitive, IntoPrimitive, Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u16)]
#[allow(non_camel_case_types)]
pub enum Register {
    ID = 0x00,
    FRAMES = 0x04,
    CLOCK = 0x08,
    FREQUENCY = 0x0c,
    CPURESET = 0x88,
    HCYCLE = 0x8c,
    HOFFSET = 0x90,
    HSIZE = 0x94,
    HSYNC0 = 0x98,
    HSYNC1 = 0x9c,
    VCYCLE = 0xa0,
    VOFFSET = 0xa4,
    VSIZE = 0xa8,
    VSYNC0 = 0xac,
    VSYNC1 = 0xb0,
    DLSWAP = 0xb4,
    PCLK_POL = 0xb8,
    TAG = 0xc4,
    SOUND = 0xd4,
    PLAY = 0xd8,
    GPIO_DIR = 0xdc,
    GPIO = 0xe0,
    DISP = 0xe4,
    INT_FLAGS = 0x100,
    INT_EN = 0x104,
    INT_MASK = 0x108,
    PLAYBACK_PLAY = 0x124,
    PWM_HZ = 0x128,
    PWM_DUTY = 0x12c,
    MACRO_0 = 0x130,
    CMD_READ = 0x14c,
    CMD_WRITE = 0x150,
    CMD_DL = 0x154,
    TOUCH_MODE = 0x158,
    CMDB_SPACE = 0x594,
    FLASH_STATUS = 0x5d4,
    FREQUENCY_A = 0x71c,
    RAM_SIZE = 0x78c,
}

impl Register {
    pub fn ptr<M: crate::models::Model>(self) -> crate::memory::Ptr<M::RegisterMem> {
        use crate::memory::MemoryRegion;
        M::RegisterMem::ptr(self as u32)
    }

    /// Returns the offset of the register address within the register memory.
    pub fn offset(self) -> u32 {
        self as u32
    }

    /// Returns the index of the register within the register file, as if the
    /// register file were an array of `u32`.
    pub fn index(self) -> usize {
        self as usize / 4
    }
}

/// Registers in the system block, outside of RAM_REG. These stay readable
/// while the main register file is still coming up during boot.
#[derive(TryFromPrimitive, IntoPrimitive, Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u16)]
#[allow(non_camel_case_types)]
pub enum SystemRegister {
    DDR_PD_CFG = 0x404,
    CHIP_ID = 0x448,
    BOOT_STATUS = 0x44c,
    DDR_TYPE = 0x454,
    SYS_GPREG = 0x45c,
}

impl SystemRegister {
    pub fn ptr<M: crate::models::Model>(self) -> crate::memory::Ptr<M::SystemRegisterMem> {
        use crate::memory::MemoryRegion;
        M::SystemRegisterMem::ptr(self as u32)
    }

    pub fn offset(self) -> u32 {
        self as u32
    }
}

/// Values for `REG_FLASH_STATUS`.
pub mod flash_status {
    pub const INIT: u32 = 0;
    pub const DETACHED: u32 = 1;
    pub const BASIC: u32 = 2;
    pub const FULL: u32 = 3;
}

/// Bits of `REG_CPURESET`. A set bit holds the corresponding engine in
/// reset, and during boot a set bit means the engine isn't ready yet.
pub mod cpureset {
    pub const COPROCESSOR: u8 = 0b001;
    pub const TOUCH: u8 = 0b010;
    pub const AUDIO: u8 = 0b100;
}

/// `REG_DLSWAP` value requesting a swap at the next frame boundary.
pub const DLSWAP_FRAME: u8 = 2;
