//! Bringing a BT82x from power-on to the point where its display can be
//! configured.
//!
//! The types in this module are used as arguments for
//! [`EVE::boot`](crate::EVE::boot).

use crate::commands::waiter::Waiter;
use crate::error::{interface_result, Error, Result};
use crate::hooks::Hooks;
use crate::interface::{Interface, SpiChannels};
use crate::low_level::host_commands::{
    BootConfig, BootConfigEnable, DdrType, GpReg, HostCmd, SysClkDiv,
};
use crate::low_level::LowLevel;
use crate::models::Model;
use crate::registers::{cpureset, Register, SystemRegister};
use crate::retry::{Retry, RetryError};
use crate::{DeviceState, EVE};

// Settle time after switching the chip to its active power state.
const ACTIVE_SETTLE_MS: u32 = 40;

// Pause between the firmware answering and checking the engines.
const ENGINE_SETTLE_MS: u32 = 100;

/// Selects the system clock the chip should run at once booted.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SystemClock {
    /// Leave the clock at the model's default.
    Default,
    Mhz24,
    Mhz36,
    Mhz48,
    Mhz60,
    Mhz72,
    Mhz84,
}

impl SystemClock {
    /// The requested frequency, or `None` for [`SystemClock::Default`].
    pub const fn hz(self) -> Option<u32> {
        let mult = match self {
            Self::Default => return None,
            Self::Mhz24 => 2,
            Self::Mhz36 => 3,
            Self::Mhz48 => 4,
            Self::Mhz60 => 5,
            Self::Mhz72 => 6,
            Self::Mhz84 => 7,
        };
        Some(mult * 12_000_000)
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::Default
    }
}

/// Host-side settings for [`EVE::boot`](crate::EVE::boot).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct BootParameters {
    pub system_clock: SystemClock,

    /// Whether the board clocks the chip from an external oscillator.
    /// BT82x parts always boot from their own PLL, so this is carried for
    /// boards that share configuration with older chips and is otherwise
    /// ignored.
    pub external_osc: bool,

    /// The link width to switch to once the chip is running.
    pub spi_channels: SpiChannels,

    /// Dummy bytes the interface clocks out after each read header.
    pub dummy_bytes: u8,

    /// Fail the boot with [`Error::ChipIdMismatch`] rather than just
    /// logging a warning when the chip isn't the expected model.
    pub strict_chip_id: bool,
}

impl Default for BootParameters {
    fn default() -> Self {
        Self {
            system_clock: SystemClock::Default,
            external_osc: false,
            spi_channels: SpiChannels::Single,
            dummy_bytes: 1,
            strict_chip_id: false,
        }
    }
}

/// Derives the extended chip identifier, such as `0x50820`, from the raw
/// value of `REG_CHIP_ID`. Returns `None` while the register doesn't yet
/// hold a BT82x identifier, which is normal just after wake-up.
pub fn extract_chip_id(raw: u32) -> Option<u32> {
    let short = (raw >> 16) & 0xffff;
    if short & 0xff00 == 0x0800 {
        Some(0x50000 | short)
    } else {
        None
    }
}

pub(crate) fn boot<M, I, W, H>(
    eve: &mut EVE<M, I, W, H>,
    params: &BootParameters,
) -> Result<(), I::Error>
where
    M: Model,
    I: Interface,
    W: Waiter<M, I>,
    H: Hooks,
{
    log::debug!("booting with {:?}", params);
    eve.state = DeviceState::Booting;
    eve.display = None;
    eve.chip_id = 0;

    {
        let ll = &mut eve.ll;
        interface_result(ll.power_cycle(true))?;

        // Boot settings can only be overridden while the window is open.
        interface_result(ll.host_command(
            BootConfigEnable {
                boot: true,
                ddr_type: true,
                gpreg: false,
                enable: true,
            }
            .message(),
        ))?;
        interface_result(ll.host_command(
            BootConfig {
                ddr: true,
                jt: true,
                audio: true,
                watchdog: true,
                source: 0,
            }
            .message(),
        ))?;
        interface_result(ll.host_command(
            DdrType {
                speed: 0,
                kind: 1,
                size: 2,
            }
            .message(),
        ))?;
        // SPI master slow mode.
        interface_result(ll.host_command(GpReg { mode: 0 }.message()))?;
        interface_result(ll.host_command(
            BootConfigEnable {
                boot: true,
                ddr_type: true,
                gpreg: false,
                enable: false,
            }
            .message(),
        ))?;

        // The divider only reaches the model default exactly; any other
        // clock is selected through REG_FREQUENCY once the firmware runs.
        interface_result(
            ll.host_command(SysClkDiv::for_frequency(M::DEFAULT_SYSTEM_CLOCK_HZ).message()),
        )?;
        interface_result(ll.host_command(HostCmd::ACTIVE.message(0, 0, 0)))?;
        ll.delay_ms(ACTIVE_SETTLE_MS);
    }
    eve.state = DeviceState::ClockConfigured;

    let boot_status = M::sys_reg_ptr(SystemRegister::BOOT_STATUS);
    let retry = eve.timeouts.boot_status;
    poll_until(eve, retry, "boot status", |ll| {
        let v = ll.rd32(boot_status)?;
        if v == M::BOOT_READY {
            Ok(Some(()))
        } else {
            log::trace!("boot status {:#010x}", v);
            Ok(None)
        }
    })?;

    let chip_id_ptr = M::sys_reg_ptr(SystemRegister::CHIP_ID);
    let retry = eve.timeouts.chip_id;
    let (raw, chip_id) = poll_until(eve, retry, "chip id", |ll| {
        let raw = ll.rd32(chip_id_ptr)?;
        match extract_chip_id(raw) {
            Some(id) => Ok(Some((raw, id))),
            None => {
                log::trace!("chip id after wake up {:#010x}", raw);
                Ok(None)
            }
        }
    })?;
    log::debug!(
        "chip id {:#x} revision {:x}.{:x} (raw {:#010x})",
        chip_id & 0xffff,
        (raw >> 8) & 0xff,
        raw & 0xff,
        raw
    );
    if chip_id != M::CHIP_ID {
        if params.strict_chip_id {
            return Err(Error::ChipIdMismatch {
                found: chip_id,
                expected: M::CHIP_ID,
            });
        }
        log::warn!(
            "mismatching chip id {:#x}, expected {:#x}",
            chip_id,
            M::CHIP_ID
        );
    }
    eve.chip_id = chip_id;
    eve.state = DeviceState::EngineWait;

    let retry = eve.timeouts.engine;
    poll_until(eve, retry, "register ID", |ll| {
        let id = ll.rd8(M::reg_ptr(Register::ID))?;
        if id == M::ID_SENTINEL {
            Ok(Some(()))
        } else {
            log::trace!("register ID after wake up {:#04x}", id);
            Ok(None)
        }
    })?;

    eve.ll.delay_ms(ENGINE_SETTLE_MS);

    poll_until(eve, retry, "engines", |ll| {
        let status = ll.rd8(M::reg_ptr(Register::CPURESET))?;
        if status == 0 {
            return Ok(Some(()));
        }
        if status & cpureset::COPROCESSOR != 0 {
            log::debug!("coprocessor engine is not ready");
        }
        if status & cpureset::TOUCH != 0 {
            log::debug!("touch engine is not ready");
        }
        if status & cpureset::AUDIO != 0 {
            log::debug!("audio engine is not ready");
        }
        Ok(None)
    })?;
    log::debug!("all engines are ready");

    let ll = &mut eve.ll;
    match params.system_clock.hz() {
        Some(hz) => {
            interface_result(ll.wr32(M::reg_ptr(Register::FREQUENCY), hz))?;
            interface_result(ll.flush())?;
            log::debug!("clock frequency set to {} MHz", hz / 1_000_000);
        }
        None => {
            let hz = interface_result(ll.rd32(M::reg_ptr(Register::FREQUENCY)))?;
            log::debug!("default clock is {} MHz", hz / 1_000_000);
        }
    }

    let channels = interface_result(ll.set_spi_channels(params.spi_channels, params.dummy_bytes))?;
    if channels == params.spi_channels {
        log::debug!("{:?} channel SPI", channels);
    } else {
        log::debug!(
            "{:?} channel SPI ({:?} unsupported)",
            channels,
            params.spi_channels
        );
    }

    interface_result(ll.wr32(M::reg_ptr(Register::GPIO_DIR), 0xffffffff))?;
    interface_result(ll.wr32(M::reg_ptr(Register::GPIO), 0xffffffff))?;
    interface_result(ll.flush())?;

    log::info!("chip {:#x} booted", chip_id);
    Ok(())
}

// Runs one of the boot poll loops. The hook gets a say before every poll,
// and running out of attempts is a timeout.
fn poll_until<M, I, W, H, T, F>(
    eve: &mut EVE<M, I, W, H>,
    retry: Retry,
    what: &'static str,
    mut poll: F,
) -> Result<T, I::Error>
where
    M: Model,
    I: Interface,
    W: Waiter<M, I>,
    H: Hooks,
    F: FnMut(&mut LowLevel<M, I>) -> core::result::Result<Option<T>, I::Error>,
{
    let hooks = &mut eve.hooks;
    let result = retry.run(&mut eve.ll, |ll, _| {
        if !hooks.keep_waiting() {
            return Err(Error::Cancelled);
        }
        interface_result(poll(ll))
    });
    match result {
        Ok(v) => Ok(v),
        Err(RetryError::Exhausted { attempts }) => {
            log::warn!("gave up waiting for {} after {} polls", what, attempts);
            Err(Error::Timeout)
        }
        Err(RetryError::Aborted(err)) => {
            if let Error::Cancelled = err {
                log::debug!("cancelled while waiting for {}", what);
            }
            Err(err)
        }
    }
}
