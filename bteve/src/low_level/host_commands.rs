//! The five-byte SPI host commands which configure a BT82x before its
//! firmware starts.

/// Represents a "host command".
///
/// Host commands are a low-level mechanism for controlling the basic
/// functionality of the chip, such as boot configuration and the system
/// clock. This is not the same thing as a coprocessor command; those go
/// through the command FIFO.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u8)]
#[allow(non_camel_case_types)]
pub enum HostCmd {
    SYS_CLK_DIV = 0xe6,
    BOOT_CFG = 0xe8,
    BOOT_CFG_EN = 0xe9,
    DDR_TYPE = 0xeb,
    GPREG = 0xec,
    ACTIVE = 0xf0,
    STANDBY = 0xf1,
    SLEEP = 0xf2,
    PWRDOWN = 0xf3,
}

impl HostCmd {
    pub const fn from_raw(raw: u8) -> Option<Self> {
        use HostCmd::*;
        match raw {
            0xe6 => Some(SYS_CLK_DIV),
            0xe8 => Some(BOOT_CFG),
            0xe9 => Some(BOOT_CFG_EN),
            0xeb => Some(DDR_TYPE),
            0xec => Some(GPREG),
            0xf0 => Some(ACTIVE),
            0xf1 => Some(STANDBY),
            0xf2 => Some(SLEEP),
            0xf3 => Some(PWRDOWN),
            _ => None,
        }
    }

    pub const fn to_raw(self) -> u8 {
        self as u8
    }

    /// Builds the full five-byte message for this command with the given
    /// argument bytes.
    pub const fn message(self, a0: u8, a1: u8, a2: u8) -> HostMessage {
        HostMessage([0xff, self as u8, a0, a1, a2])
    }
}

/// A complete host command as sent on the wire.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct HostMessage(pub [u8; 5]);

impl HostMessage {
    pub fn command(&self) -> Option<HostCmd> {
        HostCmd::from_raw(self.0[1])
    }

    pub fn as_bytes(&self) -> &[u8; 5] {
        &self.0
    }
}

/// Selects which of the boot settings the following host commands may
/// override. `enable` opens or closes the override window as a whole.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct BootConfigEnable {
    pub boot: bool,
    pub ddr_type: bool,
    pub gpreg: bool,
    pub enable: bool,
}

impl BootConfigEnable {
    pub const fn message(self) -> HostMessage {
        let sel = (self.boot as u8) | (self.ddr_type as u8) << 1 | (self.gpreg as u8) << 2;
        HostCmd::BOOT_CFG_EN.message(sel, self.enable as u8, 0)
    }
}

/// The boot control word: which engines start and where the firmware
/// comes from.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct BootConfig {
    pub ddr: bool,
    pub jt: bool,
    pub audio: bool,
    pub watchdog: bool,
    pub source: u8,
}

impl BootConfig {
    pub const fn message(self) -> HostMessage {
        let v = (self.ddr as u8) << 7
            | (self.jt as u8) << 6
            | (self.audio as u8) << 5
            | (self.watchdog as u8) << 4
            | (self.source & 0x3);
        HostCmd::BOOT_CFG.message(v, 0, 0)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct DdrType {
    pub speed: u8,
    pub kind: u8,
    pub size: u8,
}

impl DdrType {
    pub const fn message(self) -> HostMessage {
        HostCmd::DDR_TYPE.message(self.speed, (self.kind & 0xf) << 4 | (self.size & 0xf), 0)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct GpReg {
    pub mode: u8,
}

impl GpReg {
    pub const fn message(self) -> HostMessage {
        HostCmd::GPREG.message(self.mode, 0, 0)
    }
}

/// The system clock divider. `freq` is the divider from the 576MHz system
/// PLL, minus one.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct SysClkDiv {
    pub syspll_cps: u8,
    pub freq: u8,
}

impl SysClkDiv {
    pub const SYSPLL_HZ: u32 = 576_000_000;

    /// Chooses the divider nearest to the given target system clock.
    pub const fn for_frequency(hz: u32) -> Self {
        // round(SYSPLL / hz) - 1, in integers
        let div = (Self::SYSPLL_HZ + hz / 2) / hz;
        Self {
            syspll_cps: 1,
            freq: (div - 1) as u8,
        }
    }

    pub const fn message(self) -> HostMessage {
        HostCmd::SYS_CLK_DIV.message((self.syspll_cps & 0x7) << 4 | (self.freq & 0xf), 0, 0)
    }
}
