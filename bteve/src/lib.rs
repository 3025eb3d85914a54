//! A driver for the command and transfer layer of BT82x series graphics
//! coprocessor chips.
//!
//! The main type is [`EVE`](EVE), which owns the link to one chip and keeps
//! the host's view of the coprocessor's command FIFO. It knows how to boot
//! the chip, configure its display timings, queue coprocessor commands, wait
//! for them to complete, fetch their results and recover the coprocessor
//! after a fault.
//!
//! The crate is `no_std` and doesn't talk to any hardware itself. An
//! [`Interface`](interface::Interface) implementation provides the physical
//! link, such as the one in the `bteve-hal` crate for `embedded-hal` SPI
//! buses, or the simulated chip in [`interface::fake`].

#![no_std]

pub mod commands;
pub mod config;
pub mod display_list;
pub mod error;
pub mod hooks;
pub mod init;
pub mod interface;
pub mod low_level;
pub mod memory;
pub mod models;
pub mod registers;
pub mod reset;
pub mod retry;
pub mod vertex;

pub use config::{DisplayConfig, DisplayPreset};
pub use error::{Error, Result};
pub use hooks::{Callbacks, Hooks, NoHooks};
pub use init::{BootParameters, SystemClock};
pub use interface::{Interface, SpiChannels};
pub use retry::{Retry, Timeouts};

use commands::coprocessor::CommandState;
use commands::waiter::{PollingWaiter, Waiter};
use low_level::LowLevel;
use models::Model;
use vertex::VertexFormat;

/// Where the chip is in its lifecycle, as far as the driver knows.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceState {
    PoweredOff,
    Booting,
    ClockConfigured,
    EngineWait,
    Ready,
    FaultDetected,
    ResettingCoprocessor,
}

/// The main type for this crate, providing a high-level API to a BT82x chip
/// in terms of a low-level [`Interface`](Interface).
///
/// An `EVE` is the only thing that talks to its chip: it consumes the
/// interface, and everything the coprocessor protocol depends on (the
/// write pointer mirror, the known free space, the fault latch and the
/// single open transfer) lives here. Sharing one between threads needs a
/// lock around each whole enqueue and flush cycle.
///
/// `W` decides how the driver blocks while waiting for the coprocessor
/// and `H` receives the optional callbacks described in
/// [`Hooks`](Hooks). Most applications can use the defaults.
pub struct EVE<M, I, W = PollingWaiter<M, I>, H = NoHooks>
where
    M: Model,
    I: Interface,
    W: Waiter<M, I>,
    H: Hooks,
{
    pub(crate) ll: LowLevel<M, I>,
    pub(crate) wait: W,
    pub(crate) hooks: H,
    pub(crate) timeouts: Timeouts,
    pub(crate) cmd: CommandState,
    pub(crate) state: DeviceState,
    pub(crate) chip_id: u32,
    pub(crate) ram_size: u32,
    pub(crate) display: Option<DisplayConfig>,
    pub(crate) scratch_handle: u8,
    pub(crate) vertex_format: VertexFormat,
}

impl<M: Model, I: Interface> EVE<M, I> {
    /// Consumes the given interface and returns a driver that busy-polls
    /// while waiting and has no hooks installed.
    pub fn new(ei: I) -> Self {
        Self::new_with(ei, PollingWaiter::new(), NoHooks)
    }
}

impl<M, I, W, H> EVE<M, I, W, H>
where
    M: Model,
    I: Interface,
    W: Waiter<M, I>,
    H: Hooks,
{
    pub fn new_with(ei: I, wait: W, hooks: H) -> Self {
        Self {
            ll: LowLevel::new(ei),
            wait: wait,
            hooks: hooks,
            timeouts: Timeouts::default(),
            cmd: CommandState::new(),
            state: DeviceState::PoweredOff,
            chip_id: 0,
            ram_size: 0,
            display: None,
            scratch_handle: reset::DEFAULT_SCRATCH_HANDLE,
            vertex_format: VertexFormat::default(),
        }
    }

    /// Consumes the current object and returns one that's the same except
    /// that it has a different set of hooks.
    pub fn with_hooks<H2: Hooks>(self, hooks: H2) -> EVE<M, I, W, H2> {
        EVE {
            ll: self.ll,
            wait: self.wait,
            hooks: hooks,
            timeouts: self.timeouts,
            cmd: self.cmd,
            state: self.state,
            chip_id: self.chip_id,
            ram_size: self.ram_size,
            display: self.display,
            scratch_handle: self.scratch_handle,
            vertex_format: self.vertex_format,
        }
    }

    /// Consumes the current object and then returns a new one that's the
    /// same except that it has a new waiter, which is possibly derived from
    /// the previous one.
    ///
    /// The main goal here is to allow replacing the waiter with a wrapper
    /// implementation that does additional logging or tracking of waiting,
    /// if needed for debugging or development, without needing to first
    /// determine what kind of waiter the object previously had.
    pub fn with_new_waiter<W2, F>(self, f: F) -> EVE<M, I, W2, H>
    where
        W2: Waiter<M, I>,
        F: FnOnce(W) -> W2,
    {
        EVE {
            ll: self.ll,
            wait: f(self.wait),
            hooks: self.hooks,
            timeouts: self.timeouts,
            cmd: self.cmd,
            state: self.state,
            chip_id: self.chip_id,
            ram_size: self.ram_size,
            display: self.display,
            scratch_handle: self.scratch_handle,
            vertex_format: self.vertex_format,
        }
    }

    pub fn timeouts(&self) -> Timeouts {
        self.timeouts
    }

    pub fn set_timeouts(&mut self, timeouts: Timeouts) {
        self.timeouts = timeouts;
    }

    pub fn hooks_mut(&mut self) -> &mut H {
        &mut self.hooks
    }

    pub fn state(&self) -> DeviceState {
        self.state
    }

    /// The chip identifier derived during boot, or zero before boot.
    pub fn chip_id(&self) -> u32 {
        self.chip_id
    }

    /// The size of the chip's main memory in bytes, as discovered by
    /// [`configure`](EVE::configure). Zero before then.
    pub fn ram_size(&self) -> u32 {
        self.ram_size
    }

    /// The display configuration most recently applied, if any.
    pub fn display_config(&self) -> Option<&DisplayConfig> {
        self.display.as_ref()
    }

    /// The bitmap handle the coprocessor uses as scratch space.
    pub fn scratch_handle(&self) -> u8 {
        self.scratch_handle
    }

    /// Powers up the chip and runs it through its boot sequence, leaving it
    /// ready for [`configure`](EVE::configure).
    ///
    /// A successful boot stops at [`DeviceState::EngineWait`]: the engines
    /// are running but the display and coprocessor aren't set up yet. Only
    /// `configure` moves the state on to [`DeviceState::Ready`]. Use
    /// [`boot_and_configure`](EVE::boot_and_configure) to do both.
    pub fn boot(&mut self, params: &BootParameters) -> Result<(), I::Error> {
        init::boot(self, params)
    }

    /// Programs the display timings, turns the display on and brings the
    /// coprocessor into a known state.
    ///
    /// # Panics
    ///
    /// Panics if `config` violates the timing relationships described in
    /// [`DisplayConfig::check`](DisplayConfig::check).
    pub fn configure(&mut self, config: &DisplayConfig) -> Result<(), I::Error> {
        config::configure(self, config)
    }

    /// Boots the chip, then configures it for `preset` using timings
    /// derived from the chip's actual clock. If configuration fails the
    /// chip is shut down again before the error is returned.
    pub fn boot_and_configure(
        &mut self,
        params: &BootParameters,
        preset: DisplayPreset,
    ) -> Result<(), I::Error> {
        config::boot_and_configure(self, params, preset)
    }

    /// Parks the GPIOs and powers the chip down.
    pub fn shutdown(&mut self) -> Result<(), I::Error> {
        config::shutdown(self)
    }

    /// Gives direct access to the memory-level interface, for registers
    /// and memory this crate has no dedicated API for.
    ///
    /// Writes made here bypass the command FIFO bookkeeping. Don't write
    /// the command FIFO registers this way.
    pub fn low_level(&mut self) -> &mut LowLevel<M, I> {
        &mut self.ll
    }

    /// `take_interface` flushes anything pending, then consumes the object
    /// and returns its underlying `Interface`.
    pub fn take_interface(mut self) -> Result<I, I::Error> {
        self.flush_pending()?;
        error::interface_result(self.ll.flush())?;
        Ok(self.ll.take_interface())
    }

    /// `with_interface` runs your given closure with access to the object's
    /// underlying `Interface`, temporarily pausing command FIFO management
    /// so the closure can make use of other chip functionality.
    pub fn with_interface<R, F: FnOnce(&mut I) -> R>(&mut self, f: F) -> Result<R, I::Error> {
        self.flush_pending()?;
        error::interface_result(self.ll.flush())?;
        let result = f(self.ll.borrow_interface());
        // The closure could've messed with the registers we depend on, so
        // we'll resynchronize before going on.
        self.synchronize()?;
        Ok(result)
    }
}

impl<M, I, W, H> display_list::Builder for EVE<M, I, W, H>
where
    M: Model,
    I: Interface,
    W: Waiter<M, I>,
    H: Hooks,
{
    type Error = Error<I::Error>;

    fn append_raw_command(&mut self, raw: u32) -> core::result::Result<(), Self::Error> {
        self.write32(raw)
    }
}
