//! Optional callbacks that let the application observe or steer the
//! driver at a few fixed protocol points.

/// Callbacks invoked by [`EVE`](crate::EVE) at well-defined points.
///
/// Every method has a default that does nothing, so implementors override
/// only the ones they need. [`NoHooks`](NoHooks) is the implementation used
/// when the application doesn't supply one.
pub trait Hooks {
    /// Called at the start of each coprocessor command with its opcode and
    /// argument words. Returning true means the hook has handled the
    /// command itself and nothing is written into the FIFO.
    ///
    /// Commands that produce a result then report a result of zero.
    fn command_hook(&mut self, _opcode: u32, _args: &[u32]) -> bool {
        false
    }

    /// Called once per poll while boot is waiting for the chip. Returning
    /// false abandons the boot with [`Error::Cancelled`](crate::Error::Cancelled).
    fn keep_waiting(&mut self) -> bool {
        true
    }

    /// Called at the end of every coprocessor reset. `failed` is true if
    /// the coprocessor didn't settle afterwards.
    fn coprocessor_reset(&mut self, _failed: bool) {}
}

/// A [`Hooks`](Hooks) implementation with no callbacks at all.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoHooks;

impl Hooks for NoHooks {}

/// A [`Hooks`](Hooks) implementation assembled from optional closures,
/// for applications that would rather not define a type.
#[derive(Default)]
pub struct Callbacks<'a> {
    pub command: Option<&'a mut dyn FnMut(u32, &[u32]) -> bool>,
    pub keep_waiting: Option<&'a mut dyn FnMut() -> bool>,
    pub coprocessor_reset: Option<&'a mut dyn FnMut(bool)>,
}

impl<'a> Hooks for Callbacks<'a> {
    fn command_hook(&mut self, opcode: u32, args: &[u32]) -> bool {
        match self.command {
            Some(ref mut f) => f(opcode, args),
            None => false,
        }
    }

    fn keep_waiting(&mut self) -> bool {
        match self.keep_waiting {
            Some(ref mut f) => f(),
            None => true,
        }
    }

    fn coprocessor_reset(&mut self, failed: bool) {
        if let Some(ref mut f) = self.coprocessor_reset {
            f(failed)
        }
    }
}
