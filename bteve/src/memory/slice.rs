use super::ptr::Ptr;
use super::region::MemoryRegion;

/// A consecutive sequence of memory addresses in a particular region.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Slice<R: MemoryRegion> {
    start_: Ptr<R>, // inclusive
    len_: u32,
}

impl<R: MemoryRegion> Slice<R> {
    pub fn new(start: Ptr<R>, len: u32) -> Self {
        Self {
            start_: start,
            len_: len,
        }
    }

    pub fn start(&self) -> Ptr<R> {
        self.start_
    }

    pub fn len(&self) -> u32 {
        self.len_
    }

    pub fn is_empty(&self) -> bool {
        self.len_ == 0
    }

    pub fn contains(&self, ptr: Ptr<R>) -> bool {
        ptr >= self.start_ && (ptr.to_raw() - self.start_.to_raw()) < self.len_
    }
}

impl<R: MemoryRegion> core::convert::From<core::ops::Range<Ptr<R>>> for Slice<R> {
    fn from(range: core::ops::Range<Ptr<R>>) -> Self {
        Self {
            start_: range.start,
            len_: range.end.to_raw() - range.start.to_raw(),
        }
    }
}
