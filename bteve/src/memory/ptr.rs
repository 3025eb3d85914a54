use super::region::*;
use core::marker::PhantomData;

/// A pointer to a memory address within a particular memory region identified
/// by type parameter `R`.
///
/// Pointers are parameterized by memory region so that other parts of this
/// library which consume pointers can statically constrain what memory regions
/// they are able to refer to.
#[derive(Copy, Clone)]
pub struct Ptr<R: MemoryRegion> {
    pub(crate) addr: u32,
    pub(crate) _region: PhantomData<R>,
}

impl<R: MemoryRegion> Ptr<R> {
    /// Constructs a new pointer from the given offset into the region
    /// selected by type inference, modulo the region length. See
    /// [`MemoryRegion::ptr`](MemoryRegion::ptr).
    #[inline]
    pub fn new(offset: u32) -> Self {
        R::ptr(offset)
    }

    /// Returns the absolute address of the pointer.
    #[inline]
    pub fn to_raw(self) -> u32 {
        self.addr
    }

    /// Returns the offset of the pointer relative to its containing memory
    /// region.
    #[inline]
    pub fn to_raw_offset(self) -> u32 {
        self.addr - R::BASE_ADDR
    }
}

impl<R: MemoryRegion + HostAccessible> Ptr<R> {
    /// Write the four bytes needed to form a "write memory" header
    /// for the address into the given bytes. This is a helper for
    /// physical implementations that need to construct a message
    /// buffer to transmit to the real chip, e.g. via SPI.
    pub fn build_spi_write_header(self, into: &mut [u8; 4]) {
        build_spi_write_header(self.addr, into)
    }

    /// Write the four bytes needed to form a "read memory" header
    /// for the address into the given bytes.
    ///
    /// Unlike the earlier EVE generations there is no dummy byte here:
    /// the BT82x instead answers with filler bytes until it sends 0x01,
    /// after which the requested data follows.
    pub fn build_spi_read_header(self, into: &mut [u8; 4]) {
        build_spi_read_header(self.addr, into)
    }
}

/// Raw form of [`Ptr::build_spi_write_header`], for interface
/// implementations that only see absolute addresses.
pub fn build_spi_write_header(addr: u32, into: &mut [u8; 4]) {
    into[0] = ((addr >> 24) as u8) | 0x80;
    into[1] = (addr >> 16) as u8;
    into[2] = (addr >> 8) as u8;
    into[3] = addr as u8;
}

/// Raw form of [`Ptr::build_spi_read_header`].
pub fn build_spi_read_header(addr: u32, into: &mut [u8; 4]) {
    into[0] = ((addr >> 24) as u8) & 0x7f;
    into[1] = (addr >> 16) as u8;
    into[2] = (addr >> 8) as u8;
    into[3] = addr as u8;
}

impl<R1: MemoryRegion, R2: MemoryRegion<Model = R1::Model>> core::cmp::PartialEq<Ptr<R2>>
    for Ptr<R1>
{
    fn eq(&self, other: &Ptr<R2>) -> bool {
        self.addr == other.addr
    }
}

impl<R: MemoryRegion> core::cmp::Eq for Ptr<R> {}

impl<R1: MemoryRegion, R2: MemoryRegion<Model = R1::Model>> core::cmp::PartialOrd<Ptr<R2>>
    for Ptr<R1>
{
    fn partial_cmp(&self, other: &Ptr<R2>) -> core::option::Option<core::cmp::Ordering> {
        Some(self.addr.cmp(&other.addr))
    }
}

impl<R: MemoryRegion> core::cmp::Ord for Ptr<R> {
    fn cmp(&self, other: &Ptr<R>) -> core::cmp::Ordering {
        self.addr.cmp(&other.addr)
    }
}

// Arithmetic is done on the region offset so that the result wraps inside
// the region rather than spilling into whatever follows it.
impl<R: MemoryRegion> core::ops::Add<u32> for Ptr<R> {
    type Output = Self;

    fn add(self, offset: u32) -> Self {
        R::ptr(self.to_raw_offset().wrapping_add(offset))
    }
}

impl<R: MemoryRegion> core::ops::AddAssign<u32> for Ptr<R> {
    fn add_assign(&mut self, offset: u32) {
        *self = *self + offset
    }
}

impl<R: MemoryRegion> core::ops::Sub<u32> for Ptr<R> {
    type Output = Self;

    fn sub(self, offset: u32) -> Self {
        let offset = offset % R::LENGTH;
        R::ptr(self.to_raw_offset() + R::LENGTH - offset)
    }
}

impl<R: MemoryRegion> core::ops::SubAssign<u32> for Ptr<R> {
    fn sub_assign(&mut self, offset: u32) {
        *self = *self - offset
    }
}

impl<R: MemoryRegion> core::fmt::Debug for Ptr<R> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "Ptr {{ addr: {:#010x?} /*{}*/ }}",
            self.addr,
            R::DEBUG_NAME
        )
    }
}

impl<R: MemoryRegion> core::fmt::Display for Ptr<R> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:#010x?}", self.addr)
    }
}
