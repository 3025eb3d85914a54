//! Pointers in the BT82x memory space.

pub mod region;

mod ptr;
mod slice;

#[doc(inline)]
pub use ptr::{build_spi_read_header, build_spi_write_header, Ptr};

#[doc(inline)]
pub use slice::Slice;

pub(crate) use region::*;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::bt820::BT820;
    use crate::models::Model;

    type Cmd = <BT820 as Model>::CommandMem;
    type Main = <BT820 as Model>::MainMem;
    type Dl = <BT820 as Model>::DisplayListMem;

    #[test]
    fn test_ptr_eq() {
        assert_eq!(Main::ptr(1), Main::ptr(1));
        assert_ne!(Main::ptr(1), Main::ptr(2));
        // Regions within one model don't overlap, so the same offset in two
        // regions is never the same pointer.
        assert_ne!(Main::ptr(1), Dl::ptr(1));
    }

    #[test]
    fn test_ptr_cmp() {
        assert!(Main::ptr(1) < Main::ptr(2));
        assert!(Main::ptr(2) >= Main::ptr(2));
        assert!(Main::ptr(1) < Dl::ptr(1));
    }

    #[test]
    fn test_command_ptr_wraps() {
        assert_eq!(Cmd::ptr(0x4000).to_raw(), 0x7f000000);
        assert_eq!((Cmd::ptr(0x3ffc) + 8).to_raw_offset(), 4);
        assert_eq!((Cmd::ptr(4) - 8).to_raw_offset(), 0x3ffc);
        assert_eq!((Cmd::ptr(0) - 0).to_raw_offset(), 0);
    }

    #[test]
    fn test_spi_headers() {
        let mut hdr = [0u8; 4];
        Cmd::ptr(0x150).build_spi_write_header(&mut hdr);
        assert_eq!(hdr, [0xff, 0x00, 0x01, 0x50]);
        Cmd::ptr(0x150).build_spi_read_header(&mut hdr);
        assert_eq!(hdr, [0x7f, 0x00, 0x01, 0x50]);
        Main::ptr(0x309800).build_spi_write_header(&mut hdr);
        assert_eq!(hdr, [0x80, 0x30, 0x98, 0x00]);
    }

    #[test]
    fn test_slice_contains() {
        let s = Slice::new(Main::ptr(0x100), 0x10);
        assert!(s.contains(Main::ptr(0x100)));
        assert!(s.contains(Main::ptr(0x10f)));
        assert!(!s.contains(Main::ptr(0x110)));
        assert!(!s.contains(Main::ptr(0xff)));
        let r: Slice<Main> = (Main::ptr(8)..Main::ptr(24)).into();
        assert_eq!(r.len(), 16);
    }
}
