//! A bounded poll loop shared by every place that waits on the chip.

/// Something that can block the caller for a while between polls.
pub trait Sleep {
    fn sleep_ms(&mut self, ms: u32);
}

/// A finite polling policy: poll up to `attempts` times, sleeping
/// `interval_ms` between consecutive polls.
///
/// The first poll happens immediately, so a condition that already holds
/// costs no sleep at all. The worst case wall-clock bound is therefore
/// `(attempts - 1) * interval_ms` plus the time spent polling.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Retry {
    pub attempts: u32,
    pub interval_ms: u32,
}

/// The ways a bounded poll can end without a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryError<E> {
    /// Every attempt was used up without the condition being met.
    Exhausted { attempts: u32 },

    /// A poll reported an error, which ends the loop immediately.
    Aborted(E),
}

impl Retry {
    pub const fn new(attempts: u32, interval_ms: u32) -> Self {
        Self {
            attempts,
            interval_ms,
        }
    }

    /// Calls `poll` until it returns `Ok(Some(_))`, returns an error or the
    /// attempts run out.
    ///
    /// `poll` receives the same context that is used for sleeping, so that
    /// it can talk to the device between sleeps.
    pub fn run<C, T, E, F>(&self, ctx: &mut C, mut poll: F) -> Result<T, RetryError<E>>
    where
        C: Sleep,
        F: FnMut(&mut C, u32) -> Result<Option<T>, E>,
    {
        let mut attempt = 0;
        while attempt < self.attempts {
            if attempt > 0 {
                ctx.sleep_ms(self.interval_ms);
            }
            match poll(ctx, attempt) {
                Ok(Some(v)) => return Ok(v),
                Ok(None) => {}
                Err(err) => return Err(RetryError::Aborted(err)),
            }
            attempt += 1;
        }
        log::trace!("gave up after {} polls", self.attempts);
        Err(RetryError::Exhausted {
            attempts: self.attempts,
        })
    }
}

/// Poll ceilings for each of the places the driver waits on the chip.
///
/// Every one of these is finite: a chip that never answers produces
/// [`Error::Timeout`](crate::Error::Timeout) rather than a hang.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timeouts {
    /// Waiting for `REG_BOOT_STATUS` to report the running firmware.
    pub boot_status: Retry,
    /// Waiting for `REG_CHIP_ID` to become valid after wake-up.
    pub chip_id: Retry,
    /// Waiting for `REG_ID` and then for the engines to leave reset.
    pub engine: Retry,
    /// Waiting for the coprocessor to drain the command FIFO.
    pub flush: Retry,
    /// Waiting for free space in the command FIFO.
    pub space: Retry,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            boot_status: Retry::new(300, 10),
            chip_id: Retry::new(50, 20),
            engine: Retry::new(250, 20),
            // Long commands such as a flash erase or a big inflate can keep
            // the coprocessor busy for seconds.
            flush: Retry::new(500, 10),
            space: Retry::new(500, 10),
        }
    }
}
