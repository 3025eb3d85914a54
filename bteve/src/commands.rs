//! The coprocessor command FIFO.
//!
//! Coprocessor commands are appended to a ring buffer in the chip's
//! `RAM_CMD`, which the coprocessor consumes asynchronously. The methods for
//! writing into that buffer, waiting on it and fetching results from it are
//! all defined on [`EVE`](crate::EVE) in the submodules here.

pub(crate) mod command_word;
pub mod coprocessor;
pub mod options;
pub mod results;
pub mod waiter;

/// The first word of each coprocessor command the driver knows how to
/// issue.
pub mod opcodes {
    pub const DLSTART: u32 = 0xffffff00;
    pub const SWAP: u32 = 0xffffff01;
    pub const MEMCRC: u32 = 0xffffff16;
    pub const REGREAD: u32 = 0xffffff17;
    pub const MEMWRITE: u32 = 0xffffff18;
    pub const MEMSET: u32 = 0xffffff19;
    pub const MEMZERO: u32 = 0xffffff1a;
    pub const MEMCPY: u32 = 0xffffff1b;
    pub const APPEND: u32 = 0xffffff1c;
    pub const GETPTR: u32 = 0xffffff20;
    pub const LOADIMAGE: u32 = 0xffffff21;
    pub const GETPROPS: u32 = 0xffffff22;
    pub const COLDSTART: u32 = 0xffffff2e;
    pub const FLASHERASE: u32 = 0xffffff3e;
    pub const FLASHREAD: u32 = 0xffffff40;
    pub const FLASHDETACH: u32 = 0xffffff42;
    pub const FLASHATTACH: u32 = 0xffffff43;
    pub const FLASHFAST: u32 = 0xffffff44;
    pub const FLASHSOURCE: u32 = 0xffffff48;
    pub const INFLATE: u32 = 0xffffff4a;
    pub const NOP: u32 = 0xffffff53;
    pub const GETIMAGE: u32 = 0xffffff58;
    pub const SDATTACH: u32 = 0xffffff6e;
    pub const FSREAD: u32 = 0xffffff71;
    pub const FSSOURCE: u32 = 0xffffff7f;
    pub const FSSIZE: u32 = 0xffffff80;
    pub const REGWRITE: u32 = 0xffffff86;
    pub const FSWRITE: u32 = 0xffffff93;
    pub const FSFILE: u32 = 0xffffff94;

    /// Reports whether a word looks like a coprocessor command rather than
    /// a display list command.
    pub const fn is_coprocessor_command(word: u32) -> bool {
        (word & 0xffffff00) == 0xffffff00
    }
}
