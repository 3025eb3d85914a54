//! Representations of the display list commands the driver emits itself.

use core::fmt::Debug;

/// Represents a display list command.
#[derive(Copy, Clone, PartialEq)]
pub struct DLCmd(u32);

impl DLCmd {
    // The length of a display list command as stored in the device's
    // display list RAM.
    pub const LENGTH: u32 = 4;

    pub const DISPLAY: Self = OpCode::DISPLAY.build(0);
    pub const CLEAR_ALL: Self = Self::clear(true, true, true);

    /// Creates a command from the raw command word given as a `u32`. It's
    /// the caller's responsibility to ensure that it's a valid encoding of
    /// a real display list command.
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn as_raw(&self) -> u32 {
        self.0
    }

    pub const fn clear(color: bool, stencil: bool, tag: bool) -> Self {
        OpCode::CLEAR.build(
            if color { 0b100 } else { 0b000 }
                | if stencil { 0b010 } else { 0b000 }
                | if tag { 0b001 } else { 0b000 },
        )
    }

    pub const fn clear_color_rgb(color: RGB) -> Self {
        OpCode::CLEAR_COLOR_RGB
            .build((color.r as u32) << 16 | (color.g as u32) << 8 | (color.b as u32) << 0)
    }

    pub const fn display() -> Self {
        Self::DISPLAY
    }

    /// Sets the point radius, in 1/16 pixel units.
    pub const fn point_size(size: u16) -> Self {
        const MASK: u32 = 0b0001111111111111;
        OpCode::POINT_SIZE.build(size as u32 & MASK)
    }

    /// Places a vertex at coordinates already scaled to the active vertex
    /// format.
    pub const fn vertex_2f(x: i16, y: i16) -> Self {
        const MASK: u32 = 0b0111111111111111;
        OpCode::VERTEX2F.build((x as u16 as u32 & MASK) << 15 | (y as u16 as u32 & MASK))
    }

    pub const fn vertex_format(frac: u8) -> Self {
        OpCode::VERTEX_FORMAT.build(frac as u32 & 0b111)
    }
}

/// A 24-bit color.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RGB {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl RGB {
    pub const BLACK: Self = Self::new(0, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

impl From<(u8, u8, u8)> for RGB {
    fn from(v: (u8, u8, u8)) -> Self {
        Self::new(v.0, v.1, v.2)
    }
}

/// Trait implemented by objects that can append display list commands to
/// a display list.
///
/// Implementers usually implement only `append_raw_command`, and take the
/// default implementations of all of the other methods.
pub trait Builder {
    type Error;

    fn append_raw_command(&mut self, raw: u32) -> Result<(), Self::Error>;

    fn append_command(&mut self, cmd: DLCmd) -> Result<(), Self::Error> {
        self.append_raw_command(cmd.as_raw())
    }

    fn clear(&mut self, color: bool, stencil: bool, tag: bool) -> Result<(), Self::Error> {
        self.append_command(DLCmd::clear(color, stencil, tag))
    }

    fn clear_all(&mut self) -> Result<(), Self::Error> {
        self.append_command(DLCmd::CLEAR_ALL)
    }

    fn clear_color_rgb(&mut self, color: RGB) -> Result<(), Self::Error> {
        self.append_command(DLCmd::clear_color_rgb(color))
    }

    fn display(&mut self) -> Result<(), Self::Error> {
        self.append_command(DLCmd::DISPLAY)
    }
}

/// Each command is encoded as a four-byte value. Converting to `u32` returns
/// the raw encoding of the command, as it would be written into display
/// list memory (endianness notwithstanding).
impl From<DLCmd> for u32 {
    fn from(cmd: DLCmd) -> u32 {
        cmd.0
    }
}

impl Debug for DLCmd {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "DLCmd({:#010x})", self.0)
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
#[allow(non_camel_case_types)]
enum OpCode {
    CLEAR = 0x26,
    CLEAR_COLOR_RGB = 0x02,
    DISPLAY = 0x00,
    POINT_SIZE = 0x0d,
    VERTEX_FORMAT = 0x27,
    VERTEX2F = 0b01000000, // This opcode is packed into the two MSB
}

impl OpCode {
    const fn shift(self) -> u32 {
        (self as u32) << 24
    }

    const fn build(self, v: u32) -> DLCmd {
        DLCmd::from_raw(self.shift() | v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dlcmd() {
        assert_eq!(DLCmd::display(), DLCmd::from_raw(0x00000000));
        assert_eq!(DLCmd::CLEAR_ALL, DLCmd::from_raw(0x26000007));
        assert_eq!(
            DLCmd::clear(true, false, false),
            DLCmd::from_raw(0x26000004)
        );
        assert_eq!(
            DLCmd::clear_color_rgb(RGB::new(0x12, 0x34, 0x56)),
            DLCmd::from_raw(0x02123456)
        );
        assert_eq!(DLCmd::point_size(16), DLCmd::from_raw(0x0d000010));
        assert_eq!(DLCmd::vertex_format(4), DLCmd::from_raw(0x27000004));
        assert_eq!(DLCmd::vertex_2f(1, 2), DLCmd::from_raw(0x40008002));
        // Negative coordinates are truncated to 15-bit two's complement.
        assert_eq!(DLCmd::vertex_2f(-1, 0), DLCmd::from_raw(0x7fff8000));
    }
}
