//! Display timing configuration.
//!
//! The types in this module are used as arguments for
//! [`EVE::configure`](crate::EVE::configure) and
//! [`EVE::boot_and_configure`](crate::EVE::boot_and_configure).

use crate::commands::opcodes;
use crate::commands::waiter::{is_fault, Waiter};
use crate::display_list::{DLCmd, RGB};
use crate::error::{interface_result, Result};
use crate::hooks::Hooks;
use crate::init::BootParameters;
use crate::interface::Interface;
use crate::memory::MemoryRegion;
use crate::models::Model;
use crate::registers::{Register, DLSWAP_FRAME};
use crate::reset::{self, DEFAULT_SCRATCH_HANDLE};
use crate::vertex::VertexFormat;
use crate::{DeviceState, EVE};

/// The largest width or height the scanout line buffer supports.
pub const MAX_DIMENSION: u16 = 2047;

/// Represents the timing parameters for video output.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DisplayConfig {
    pub width: u16,
    pub height: u16,
    /// Pixel clock divider from the system clock.
    pub pclk: u8,
    /// Pixel clock polarity: 0 samples on the rising edge, 1 on the falling
    /// edge.
    pub pclk_pol: u8,
    pub horiz: TimingDimension,
    pub vert: TimingDimension,
}

/// Represents the period transition cycles for one dimension (horizontal or
/// vertical) of the video raster.
///
/// For horizontal parameters, the values are in pixel clocks. For vertical
/// parameters, the values are in lines.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimingDimension {
    /// Total length of the period, visible part included.
    pub cycle: u16,
    /// Where the visible part begins.
    pub offset: u16,
    /// Where the sync pulse begins.
    pub sync0: u16,
    /// Where the sync pulse ends.
    pub sync1: u16,
}

/// Displays with known-good timings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DisplayPreset {
    /// 1920x1080 at 60Hz.
    FHD,
    /// 1920x1200 at 60Hz.
    WUXGA,
}

impl DisplayPreset {
    pub const fn resolution(self) -> (u16, u16, u32) {
        match self {
            Self::FHD => (1920, 1080, 60),
            Self::WUXGA => (1920, 1200, 60),
        }
    }

    /// Returns the timings to use for this display with the system clock at
    /// `freq` Hz.
    pub fn config(self, freq: u32) -> DisplayConfig {
        let (width, height, refresh) = self.resolution();
        let computed = DisplayConfig::compute(width as u32, height as u32, refresh, freq);
        match self {
            Self::FHD => computed,
            Self::WUXGA if freq == WUXGA_KNOWN_FREQ => DisplayConfig::WUXGA_72MHZ,
            Self::WUXGA => DisplayConfig {
                pclk_pol: 0,
                ..computed
            },
        }
    }
}

// The clock the known WUXGA panel timings were measured at.
const WUXGA_KNOWN_FREQ: u32 = 72_000_000;

impl DisplayConfig {
    /// Timings measured on a 1920x1200 panel driven from a 72MHz system
    /// clock.
    pub const WUXGA_72MHZ: Self = Self {
        width: 1920,
        height: 1200,
        pclk: 1,
        pclk_pol: 0,
        horiz: TimingDimension {
            cycle: 2100,
            offset: 80,
            sync0: 64,
            sync1: 74,
        },
        vert: TimingDimension {
            cycle: 1245,
            offset: 25,
            sync0: 20,
            sync1: 23,
        },
    };

    /// Approximates reasonable timings for a display of the given size and
    /// refresh rate, driven from a system clock of `freq` Hz.
    ///
    /// Sizes beyond [`MAX_DIMENSION`] are trimmed to it and a zero size is
    /// taken as one. If the clock is
    /// too slow for the refresh rate then the refresh rate is lowered to
    /// the fastest one the clock allows, with no pixel clock division.
    pub fn compute(width: u32, height: u32, refresh: u32, freq: u32) -> Self {
        let max = MAX_DIMENSION as u32;
        if width > max {
            log::debug!("line buffer width {} is too large", width);
        }
        if height > max {
            log::debug!("screen height {} is too large", height);
        }
        let width = width.clamp(1, max);
        let height = height.clamp(1, max);
        let pixels = width * height;
        let mut refresh = core::cmp::max(refresh, 1);

        // Blanking of a quarter of the visible area if the clock allows,
        // otherwise an eighth.
        let mut min_cycles = pixels + (pixels >> 2);
        let mut max_rate = freq / min_cycles;
        if refresh > max_rate {
            min_cycles = pixels + (pixels >> 3);
            max_rate = freq / min_cycles;
        }

        let pclk = if max_rate < refresh {
            log::debug!("frame rate limited to {}", max_rate);
            refresh = core::cmp::max(max_rate, 1);
            1
        } else {
            // REG_PCLK is a single byte.
            core::cmp::min(max_rate / refresh, u8::MAX as u32)
        };

        let cycles = freq / (refresh * pclk);
        let vcycle = (height as u64 * cycles as u64 / pixels as u64) as u32;
        let vcycle = (vcycle + ((vcycle + height) >> 1) + height + height) >> 2;
        // A clock too slow for the size still gets the least blanking the
        // timing checks accept, at whatever frame rate that leaves.
        let vcycle = core::cmp::max(vcycle, min_cycle(height));
        let hcycle = core::cmp::max(cycles / vcycle, min_cycle(width));
        let hoffset = (hcycle - width) >> 1;
        let voffset = (vcycle - height) >> 1;
        let hsync1 = hoffset >> 1;
        let vsync1 = voffset >> 1;

        let config = Self {
            width: width as u16,
            height: height as u16,
            pclk: pclk as u8,
            pclk_pol: 1,
            horiz: TimingDimension {
                cycle: hcycle as u16,
                offset: (hoffset + hsync1) as u16,
                sync0: 0,
                sync1: hsync1 as u16,
            },
            vert: TimingDimension {
                cycle: vcycle as u16,
                offset: (voffset + vsync1) as u16,
                sync0: 0,
                sync1: vsync1 as u16,
            },
        };
        config.check();
        config
    }

    /// Asserts the relationships the scanout hardware depends on, in each
    /// dimension: the sync pulse is non-empty, the visible part begins
    /// after the sync pulse ends, the period is longer than the visible
    /// part and the blanking interval is longer than the offset.
    ///
    /// # Panics
    ///
    /// Panics if any of them don't hold, or if either size exceeds
    /// [`MAX_DIMENSION`]. Such a configuration is a programming error.
    pub fn check(&self) {
        assert!(self.width <= MAX_DIMENSION, "width {} too large", self.width);
        assert!(self.height <= MAX_DIMENSION, "height {} too large", self.height);
        self.horiz.check("horizontal", self.width);
        self.vert.check("vertical", self.height);
    }

    /// The frame rate these timings give with the system clock at `freq`
    /// Hz.
    pub fn refresh_rate(&self, freq: u32) -> u32 {
        let per_frame =
            self.horiz.cycle as u32 * self.vert.cycle as u32 * core::cmp::max(self.pclk, 1) as u32;
        freq / per_frame
    }
}

// The shortest cycle whose blanking still leaves a non-zero sync pulse.
fn min_cycle(size: u32) -> u32 {
    size + 4
}

impl TimingDimension {
    fn check(&self, which: &str, size: u16) {
        assert!(self.sync1 != 0, "{} sync end is zero", which);
        assert!(
            self.offset > self.sync1,
            "{} offset {} not beyond sync end {}",
            which,
            self.offset,
            self.sync1
        );
        assert!(
            self.cycle > size,
            "{} cycle {} not longer than size {}",
            which,
            self.cycle,
            size
        );
        assert!(
            self.cycle - size > self.offset,
            "{} blanking {} not longer than offset {}",
            which,
            self.cycle - size,
            self.offset
        );
    }
}

pub(crate) fn configure<M, I, W, H>(
    eve: &mut EVE<M, I, W, H>,
    config: &DisplayConfig,
) -> Result<(), I::Error>
where
    M: Model,
    I: Interface,
    W: Waiter<M, I>,
    H: Hooks,
{
    config.check();

    let reconfigure = eve.display.is_some();
    if reconfigure {
        // Quiet the FIFO first. A fault here shows up in the read pointer
        // below.
        log::debug!("reconfiguring");
        if let Err(err) = eve.wait_flush() {
            log::warn!("FIFO didn't drain before reconfiguring: {}", err);
        }
    }
    eve.display = None;
    log::debug!("display timings {:?}", config);

    {
        use Register::*;
        let ll = &mut eve.ll;
        interface_result(ll.wr16(M::reg_ptr(HCYCLE), config.horiz.cycle))?;
        interface_result(ll.wr16(M::reg_ptr(HOFFSET), config.horiz.offset))?;
        interface_result(ll.wr16(M::reg_ptr(HSYNC0), config.horiz.sync0))?;
        interface_result(ll.wr16(M::reg_ptr(HSYNC1), config.horiz.sync1))?;
        interface_result(ll.wr16(M::reg_ptr(VCYCLE), config.vert.cycle))?;
        interface_result(ll.wr16(M::reg_ptr(VOFFSET), config.vert.offset))?;
        interface_result(ll.wr16(M::reg_ptr(VSYNC0), config.vert.sync0))?;
        interface_result(ll.wr16(M::reg_ptr(VSYNC1), config.vert.sync1))?;
        interface_result(ll.wr8(M::reg_ptr(PCLK_POL), config.pclk_pol))?;
        interface_result(ll.wr16(M::reg_ptr(HSIZE), config.width))?;
        interface_result(ll.wr16(M::reg_ptr(VSIZE), config.height))?;
        interface_result(ll.wr32(M::reg_ptr(DISP), 1))?;
        interface_result(ll.wr32(M::reg_ptr(PWM_DUTY), 128))?;

        let mib = interface_result(ll.rd32(M::reg_ptr(RAM_SIZE)))?;
        eve.ram_size = mib.saturating_mul(1024 * 1024);
        log::debug!("RAM size {} bytes", eve.ram_size);

        clear_screen::<M, I>(ll)?;
    }

    let (wp, rp) = eve.refresh_fifo()?;
    let needs_reset = if reconfigure {
        is_fault(rp)
    } else {
        wp != 0 || rp != 0
    };
    if needs_reset {
        // After a power cycle this means the power down didn't work.
        log::debug!("coprocessor FIFO not empty: wp={:#x} rp={:#x}", wp, rp);
        reset::reset_coprocessor(eve)?;
    } else {
        log::debug!("setting coprocessor defaults");
        // Reattach flash to avoid an inconsistent state. Written directly
        // so that the command hook doesn't see them.
        eve.write32(opcodes::FLASHDETACH)?;
        eve.write32(opcodes::FLASHATTACH)?;
        eve.scratch_handle = DEFAULT_SCRATCH_HANDLE;
    }

    interface_result(eve.ll.flush())?;
    eve.wait_flush()?;

    eve.state = DeviceState::Ready;
    eve.vertex_format = VertexFormat::for_width(config.width as u32);
    eve.display = Some(*config);
    log::info!(
        "display configured at {}x{}",
        config.width,
        config.height
    );
    Ok(())
}

// Shows a black screen until the application draws something.
fn clear_screen<M: Model, I: Interface>(
    ll: &mut crate::low_level::LowLevel<M, I>,
) -> Result<(), I::Error> {
    let words = [
        DLCmd::clear_color_rgb(RGB::new(0, 0, 0)),
        DLCmd::CLEAR_ALL,
        DLCmd::display(),
    ];
    let mut bytes = [0u8; 12];
    for (chunk, cmd) in bytes.chunks_mut(4).zip(words.iter()) {
        chunk.copy_from_slice(&cmd.as_raw().to_le_bytes());
    }
    interface_result(ll.wr8s(M::DisplayListMem::ptr(0), &bytes))?;
    interface_result(ll.wr8(M::reg_ptr(Register::DLSWAP), DLSWAP_FRAME))
}

pub(crate) fn shutdown<M, I, W, H>(eve: &mut EVE<M, I, W, H>) -> Result<(), I::Error>
where
    M: Model,
    I: Interface,
    W: Waiter<M, I>,
    H: Hooks,
{
    log::debug!("shutting down");
    let ll = &mut eve.ll;
    interface_result(ll.wr32(M::reg_ptr(Register::GPIO_DIR), 0xffff))?;
    interface_result(ll.wr32(M::reg_ptr(Register::GPIO), 0))?;
    interface_result(ll.flush())?;
    interface_result(ll.power_cycle(false))?;
    eve.state = DeviceState::PoweredOff;
    eve.display = None;
    Ok(())
}

pub(crate) fn boot_and_configure<M, I, W, H>(
    eve: &mut EVE<M, I, W, H>,
    params: &BootParameters,
    preset: DisplayPreset,
) -> Result<(), I::Error>
where
    M: Model,
    I: Interface,
    W: Waiter<M, I>,
    H: Hooks,
{
    eve.boot(params)?;

    let result = interface_result(eve.ll.rd32(M::reg_ptr(Register::FREQUENCY)))
        .and_then(|freq| {
            let config = preset.config(freq);
            log::debug!(
                "{:?} refresh rate {} Hz at {} MHz",
                preset,
                config.refresh_rate(freq),
                freq / 1_000_000
            );
            eve.configure(&config)
        });
    if let Err(err) = result {
        log::warn!("configuration failed: {:?}", err);
        let _ = eve.shutdown();
        return Err(err);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use crate::interface::testing::{MockInterface, MockInterfaceCall};
    use crate::models::bt820::BT820;
    use crate::retry::{Retry, Timeouts};
    use crate::Error;
    use std::vec::Vec;

    const FREQ: u32 = 72_000_000;

    fn test_obj(ei: MockInterface) -> EVE<BT820, MockInterface> {
        let mut eve = EVE::new(ei);
        eve.set_timeouts(Timeouts {
            flush: Retry::new(3, 1),
            space: Retry::new(3, 1),
            ..Timeouts::default()
        });
        eve
    }

    fn reg(r: Register) -> u32 {
        BT820::reg_ptr(r).to_raw()
    }

    fn last_write(calls: &[MockInterfaceCall], addr: u32) -> Option<Vec<u8>> {
        calls.iter().rev().find_map(|c| match c {
            MockInterfaceCall::Write(a, data) if *a == addr => Some(data.clone()),
            _ => None,
        })
    }

    #[test]
    fn test_compute_wuxga() {
        let c = DisplayConfig::compute(1920, 1200, 60, FREQ);
        // 72MHz can't manage 60Hz at this size, so the pixel clock isn't
        // divided at all.
        assert_eq!(c.pclk, 1);
        assert_eq!(c.pclk_pol, 1);
        assert_eq!((c.width, c.height), (1920, 1200));
        assert_eq!(
            c.horiz,
            TimingDimension {
                cycle: 2099,
                offset: 133,
                sync0: 0,
                sync1: 44
            }
        );
        assert_eq!(
            c.vert,
            TimingDimension {
                cycle: 1270,
                offset: 52,
                sync0: 0,
                sync1: 17
            }
        );
        assert_eq!(c.refresh_rate(FREQ), 27);
    }

    #[test]
    fn test_compute_divides_pclk() {
        let c = DisplayConfig::compute(800, 480, 60, FREQ);
        // 72MHz / (800*480*1.25) is 150 frames, so two and a half times
        // too fast for 60Hz; the divider takes the whole part.
        assert_eq!(c.pclk, 2);
        assert!(c.refresh_rate(FREQ) >= 60);
    }

    #[test]
    fn test_compute_trims_oversize() {
        let c = DisplayConfig::compute(3840, 2160, 30, FREQ);
        assert_eq!((c.width, c.height), (2047, 2047));
        c.check();
    }

    #[test]
    fn test_compute_degenerate_sizes() {
        let c = DisplayConfig::compute(0, 480, 60, FREQ);
        assert_eq!(c.width, 1);
        c.check();
        let c = DisplayConfig::compute(640, 0, 60, FREQ);
        assert_eq!(c.height, 1);
        c.check();
        let c = DisplayConfig::compute(1, 1, 60, FREQ);
        assert_eq!(c.pclk, 255);
        c.check();
        DisplayConfig::compute(0, 0, 0, 0).check();
    }

    #[test]
    fn test_compute_slow_clock() {
        // Not even one frame a second: the timings still hold, only the
        // frame rate suffers.
        let c = DisplayConfig::compute(1920, 1200, 60, 1_000_000);
        assert_eq!(c.pclk, 1);
        assert_eq!(c.refresh_rate(1_000_000), 0);
        c.check();
    }

    #[test]
    fn test_compute_holds_invariants() {
        for &(w, h) in [(320, 240), (480, 272), (800, 480), (1024, 600), (1280, 720)].iter() {
            for &refresh in [30, 50, 60, 75].iter() {
                for &freq in [24_000_000, 48_000_000, 72_000_000, 84_000_000].iter() {
                    let c = DisplayConfig::compute(w, h, refresh, freq);
                    c.check();
                    assert!(c.pclk >= 1);
                }
            }
        }
    }

    #[test]
    fn test_presets() {
        assert_eq!(DisplayPreset::WUXGA.config(FREQ), DisplayConfig::WUXGA_72MHZ);
        DisplayConfig::WUXGA_72MHZ.check();
        let slow = DisplayPreset::WUXGA.config(48_000_000);
        assert_eq!(slow.pclk_pol, 0);
        assert_eq!(slow.height, 1200);
        let fhd = DisplayPreset::FHD.config(FREQ);
        assert_eq!((fhd.width, fhd.height), (1920, 1080));
        assert_eq!(fhd.horiz.cycle, 2099);
        assert_eq!(fhd.vert.cycle, 1143);
    }

    #[test]
    #[should_panic(expected = "horizontal blanking")]
    fn test_check_rejects_short_blanking() {
        let mut c = DisplayConfig::WUXGA_72MHZ;
        c.horiz.offset = 180;
        c.horiz.sync1 = 10;
        c.check();
    }

    #[test]
    #[should_panic(expected = "vertical sync end is zero")]
    fn test_check_rejects_empty_sync() {
        let mut c = DisplayConfig::WUXGA_72MHZ;
        c.vert.sync1 = 0;
        c.check();
    }

    #[test]
    #[should_panic(expected = "not longer than size")]
    fn test_configure_asserts_before_writing() {
        let mut c = DisplayConfig::WUXGA_72MHZ;
        c.horiz.cycle = 1900;
        let mut eve = test_obj(MockInterface::new());
        let _ = eve.configure(&c);
    }

    fn configurable_mock() -> MockInterface {
        let mut ei = MockInterface::new();
        ei.setup_mem(reg(Register::RAM_SIZE), &1024u32.to_le_bytes());
        ei.setup_mem(reg(Register::CMDB_SPACE), &0x3ffcu16.to_le_bytes());
        // Read once while deciding on a reset, then once for the flush
        // after the two flash commands.
        ei.script_u16(reg(Register::CMD_READ), &[0, 8]);
        ei
    }

    #[test]
    fn test_configure() {
        let mut eve = test_obj(configurable_mock());
        let c = DisplayConfig::WUXGA_72MHZ;
        eve.configure(&c).unwrap();
        assert_eq!(eve.state(), DeviceState::Ready);
        assert_eq!(eve.ram_size(), 1024 * 1024 * 1024);
        assert_eq!(eve.display_config(), Some(&c));
        assert_eq!(eve.vertex_format, VertexFormat::Frac3);
        assert_eq!(eve.wp(), 8);

        let calls = eve.take_interface().unwrap().calls();
        assert_eq!(last_write(&calls, reg(Register::HCYCLE)), Some(std::vec![0x34, 0x08, 0, 0]));
        assert_eq!(last_write(&calls, reg(Register::HSYNC0)), Some(std::vec![64, 0, 0, 0]));
        assert_eq!(last_write(&calls, reg(Register::VCYCLE)), Some(std::vec![0xdd, 0x04, 0, 0]));
        assert_eq!(last_write(&calls, reg(Register::PCLK_POL)), Some(std::vec![0, 0, 0, 0]));
        assert_eq!(last_write(&calls, reg(Register::HSIZE)), Some(std::vec![0x80, 0x07, 0, 0]));
        assert_eq!(last_write(&calls, reg(Register::DISP)), Some(std::vec![1, 0, 0, 0]));
        assert_eq!(last_write(&calls, reg(Register::PWM_DUTY)), Some(std::vec![128, 0, 0, 0]));
        assert_eq!(last_write(&calls, reg(Register::DLSWAP)), Some(std::vec![2, 0, 0, 0]));
        assert_eq!(
            last_write(&calls, 0x7f008000),
            Some(std::vec![0, 0, 0, 0x02, 7, 0, 0, 0x26, 0, 0, 0, 0])
        );

        let appended: Vec<Vec<u8>> = calls
            .iter()
            .filter_map(|c| match c {
                MockInterfaceCall::Write(addr, data) if *addr >= 0x7f010000 => Some(data.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(
            appended,
            std::vec![std::vec![0x42, 0xff, 0xff, 0xff], std::vec![0x43, 0xff, 0xff, 0xff]]
        );
    }

    #[test]
    fn test_configure_resets_dirty_fifo() {
        let mut ei = configurable_mock();
        // A FIFO left part way through by an earlier session.
        ei.setup_mem(reg(Register::CMD_WRITE), &0x40u16.to_le_bytes());
        // Zeroed by the reset, then the write pointer of the three reset
        // commands.
        ei.script_u16(reg(Register::CMD_READ), &[0x40, 0, 0, 12]);
        let mut eve = test_obj(ei);
        eve.configure(&DisplayConfig::WUXGA_72MHZ).unwrap();
        assert_eq!(eve.state(), DeviceState::Ready);
        assert_eq!(eve.wp(), 12);

        let calls = eve.take_interface().unwrap().calls();
        assert!(calls.contains(&MockInterfaceCall::Write(
            reg(Register::CPURESET),
            std::vec![1, 0, 0, 0]
        )));
        assert!(calls.contains(&MockInterfaceCall::Write(
            0x7f010004,
            std::vec![0x2e, 0xff, 0xff, 0xff]
        )));
    }

    #[test]
    fn test_configure_times_out() {
        let mut ei = configurable_mock();
        ei.script_u16(reg(Register::CMD_READ), &[0]);
        let mut eve = test_obj(ei);
        assert_eq!(eve.configure(&DisplayConfig::WUXGA_72MHZ), Err(Error::Timeout));
        assert_eq!(eve.display_config(), None);
    }

    #[test]
    fn test_shutdown() {
        let mut eve = test_obj(MockInterface::new());
        eve.shutdown().unwrap();
        assert_eq!(eve.state(), DeviceState::PoweredOff);
        let calls = eve.take_interface().unwrap().calls();
        let want = std::vec![
            MockInterfaceCall::Write(reg(Register::GPIO_DIR), std::vec![0xff, 0xff, 0, 0]),
            MockInterfaceCall::Write(reg(Register::GPIO), std::vec![0, 0, 0, 0]),
            MockInterfaceCall::PowerCycle(false),
        ];
        debug_assert_eq!(&calls[..], &want[..]);
    }
}
