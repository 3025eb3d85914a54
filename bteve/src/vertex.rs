//! Fixed-point precision for vertex coordinates.
//!
//! `VERTEX2F` carries 15-bit coordinates whose unit is chosen by
//! `VERTEX_FORMAT`. Finer units give sub-pixel precision but shrink the
//! addressable range, so the driver picks the finest format that still
//! covers the configured screen width, once, when the display is
//! configured. Callers then give coordinates in whole pixels and the
//! selected format scales them.

use crate::commands::waiter::Waiter;
use crate::display_list::{Builder, DLCmd};
use crate::error::Result;
use crate::hooks::Hooks;
use crate::interface::Interface;
use crate::models::Model;
use crate::EVE;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VertexFormat {
    /// Whole pixels, range -16384 to 16383.
    Frac0,
    /// 1/2 pixel, range -8192 to 8191.
    Frac1,
    /// 1/4 pixel, range -4096 to 4095.
    Frac2,
    /// 1/8 pixel, range -2048 to 2047.
    Frac3,
    /// 1/16 pixel, range -1024 to 1023. This is the chip's reset default.
    Frac4,
}

impl VertexFormat {
    /// The finest format whose range covers `width` pixels.
    pub const fn for_width(width: u32) -> Self {
        if width <= 1024 {
            Self::Frac4
        } else if width <= 2048 {
            Self::Frac3
        } else if width <= 4096 {
            Self::Frac2
        } else if width <= 8192 {
            Self::Frac1
        } else {
            Self::Frac0
        }
    }

    /// The value of the `VERTEX_FORMAT` command's fraction field.
    pub const fn frac_bits(self) -> u8 {
        match self {
            Self::Frac0 => 0,
            Self::Frac1 => 1,
            Self::Frac2 => 2,
            Self::Frac3 => 3,
            Self::Frac4 => 4,
        }
    }

    /// The `VERTEX_FORMAT` command that selects this format on the chip.
    pub const fn command(self) -> DLCmd {
        DLCmd::vertex_format(self.frac_bits())
    }

    /// Whether a vertex given in whole pixels fits the signed 15-bit
    /// fields of `VERTEX2F` at this precision.
    pub const fn contains(self, x: i16, y: i16) -> bool {
        let shift = self.frac_bits() as u32;
        let (min, max) = (-16384 >> shift, 16383 >> shift);
        (x as i32) >= min && (x as i32) <= max && (y as i32) >= min && (y as i32) <= max
    }

    /// Encodes a vertex given in whole pixels.
    ///
    /// Coordinates outside [`contains`](VertexFormat::contains) wrap
    /// within the field width, as the hardware would see them.
    pub const fn vertex_2f(self, x: i16, y: i16) -> DLCmd {
        let shift = self.frac_bits() as u32;
        DLCmd::vertex_2f(
            ((x as i32) << shift) as i16,
            ((y as i32) << shift) as i16,
        )
    }

    /// Encodes a point size given in whole pixels. `POINT_SIZE` is always
    /// in 1/16 pixel units regardless of the vertex format.
    pub const fn point_size(self, pixels: u16) -> DLCmd {
        DLCmd::point_size(pixels.wrapping_mul(16))
    }
}

impl Default for VertexFormat {
    fn default() -> Self {
        Self::Frac4
    }
}

/// Drawing in whole pixels at the precision chosen for the configured
/// display.
impl<M, I, W, H> EVE<M, I, W, H>
where
    M: Model,
    I: Interface,
    W: Waiter<M, I>,
    H: Hooks,
{
    pub fn vertex_format(&self) -> VertexFormat {
        self.vertex_format
    }

    /// Appends the `VERTEX_FORMAT` command for the current precision. A
    /// display list that uses [`vertex_2f`](EVE::vertex_2f) must start
    /// with this, because the coprocessor resets the format on each
    /// `DLSTART`.
    pub fn set_vertex_format(&mut self) -> Result<(), I::Error> {
        let cmd = self.vertex_format.command();
        self.append_command(cmd)
    }

    pub fn vertex_2f(&mut self, x: i16, y: i16) -> Result<(), I::Error> {
        debug_assert!(
            self.vertex_format.contains(x, y),
            "vertex ({}, {}) out of range for {:?}",
            x,
            y,
            self.vertex_format
        );
        let cmd = self.vertex_format.vertex_2f(x, y);
        self.append_command(cmd)
    }

    pub fn point_size(&mut self, pixels: u16) -> Result<(), I::Error> {
        let cmd = self.vertex_format.point_size(pixels);
        self.append_command(cmd)
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use crate::interface::testing::{MockInterface, MockInterfaceCall};
    use crate::models::bt820::BT820;

    #[test]
    fn test_for_width() {
        assert_eq!(VertexFormat::for_width(800), VertexFormat::Frac4);
        assert_eq!(VertexFormat::for_width(1024), VertexFormat::Frac4);
        assert_eq!(VertexFormat::for_width(1920), VertexFormat::Frac3);
        assert_eq!(VertexFormat::for_width(2048), VertexFormat::Frac3);
        assert_eq!(VertexFormat::for_width(3840), VertexFormat::Frac2);
        assert_eq!(VertexFormat::for_width(8192), VertexFormat::Frac1);
        assert_eq!(VertexFormat::for_width(10000), VertexFormat::Frac0);
    }

    #[test]
    fn test_scaling() {
        assert_eq!(
            VertexFormat::Frac3.vertex_2f(10, 20),
            DLCmd::vertex_2f(80, 160)
        );
        assert_eq!(VertexFormat::Frac0.vertex_2f(10, 20), DLCmd::vertex_2f(10, 20));
        assert_eq!(
            VertexFormat::Frac4.vertex_2f(-2, 3),
            DLCmd::vertex_2f(-32, 48)
        );
        assert_eq!(VertexFormat::Frac1.point_size(5), DLCmd::point_size(80));
        assert_eq!(VertexFormat::Frac3.command(), DLCmd::from_raw(0x27000003));
    }

    #[test]
    fn test_contains() {
        assert!(VertexFormat::Frac4.contains(1023, -1024));
        assert!(!VertexFormat::Frac4.contains(1024, 0));
        assert!(!VertexFormat::Frac4.contains(0, -1025));
        assert!(VertexFormat::Frac3.contains(2047, 2047));
        assert!(!VertexFormat::Frac3.contains(2048, 0));
        assert!(VertexFormat::Frac0.contains(16383, -16384));
        assert!(!VertexFormat::Frac0.contains(i16::MAX, 0));
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "out of range")]
    fn test_eve_rejects_vertex_out_of_range() {
        let mut mock = MockInterface::new();
        mock.setup_mem(0x7f006594, &0x3ffcu16.to_le_bytes());
        let mut eve: EVE<BT820, MockInterface> = EVE::new(mock);
        eve.vertex_format = VertexFormat::Frac4;
        let _ = eve.vertex_2f(1024, 0);
    }

    #[test]
    fn test_eve_scales_vertices() {
        let mut mock = MockInterface::new();
        mock.setup_mem(0x7f006594, &0x3ffcu16.to_le_bytes());
        let mut eve: EVE<BT820, MockInterface> = EVE::new(mock);
        eve.vertex_format = VertexFormat::for_width(1920);
        eve.set_vertex_format().unwrap();
        eve.point_size(2).unwrap();
        eve.vertex_2f(3, 4).unwrap();

        let calls = eve.take_interface().unwrap().calls();
        let words: std::vec::Vec<u32> = calls
            .iter()
            .filter_map(|c| match c {
                MockInterfaceCall::Write(addr, data) if *addr >= 0x7f010000 => {
                    Some(u32::from_le_bytes([data[0], data[1], data[2], data[3]]))
                }
                _ => None,
            })
            .collect();
        assert_eq!(
            words,
            std::vec![
                0x27000003,
                DLCmd::point_size(32).as_raw(),
                DLCmd::vertex_2f(24, 32).as_raw()
            ]
        );
    }
}
