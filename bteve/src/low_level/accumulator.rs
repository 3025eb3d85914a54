//! Coalescing of single-byte writes into whole 32-bit words.
//!
//! The BT82x only accepts register writes of a full word, and every SPI
//! transaction costs a chip-select cycle plus a four-byte address header,
//! so bytes destined for consecutive addresses are gathered here and
//! emitted as one word write.

/// A word which is ready to be written to the device.
///
/// `len` is the number of bytes that were actually accumulated. The bytes
/// above `len` in `value` are always zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PendingWord {
    pub addr: u32,
    pub value: u32,
    pub len: u8,
}

impl PendingWord {
    /// The little-endian bytes of the word, as they appear on the wire.
    pub fn to_le_bytes(self) -> [u8; 4] {
        self.value.to_le_bytes()
    }
}

/// State for coalescing bytes written to consecutive addresses.
///
/// This is a pure state machine: it never talks to the device itself.
/// Instead `push` and `take` return the words that the caller must write,
/// in the order they must be written.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ByteAccumulator {
    base: u32,
    count: u8,
    acc: u32,
}

impl ByteAccumulator {
    pub const fn new() -> Self {
        Self {
            base: 0,
            count: 0,
            acc: 0,
        }
    }

    /// Number of bytes currently held, between 0 and 3.
    pub fn len(&self) -> u8 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// The address the next contiguous byte would be written to, if there
    /// are bytes pending.
    pub fn next_addr(&self) -> Option<u32> {
        if self.count == 0 {
            None
        } else {
            Some(self.base.wrapping_add(self.count as u32))
        }
    }

    /// Adds one byte destined for `addr`.
    ///
    /// Returns up to two words that must be written before anything else:
    /// the previous partial word if `addr` didn't continue it, and then the
    /// new word if this byte completed it.
    pub fn push(&mut self, addr: u32, value: u8) -> (Option<PendingWord>, Option<PendingWord>) {
        let evicted = match self.next_addr() {
            Some(next) if next != addr => self.take(),
            _ => None,
        };

        if self.count == 0 {
            self.base = addr;
        }
        self.acc |= (value as u32) << (8 * self.count as u32);
        self.count += 1;

        let completed = if self.count == 4 { self.take() } else { None };
        (evicted, completed)
    }

    /// Removes and returns whatever is pending, leaving the accumulator
    /// empty.
    pub fn take(&mut self) -> Option<PendingWord> {
        if self.count == 0 {
            return None;
        }
        let ret = PendingWord {
            addr: self.base,
            value: self.acc,
            len: self.count,
        };
        self.count = 0;
        self.acc = 0;
        Some(ret)
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use std::collections::BTreeMap;
    use std::vec;
    use std::vec::Vec;

    fn push_all(acc: &mut ByteAccumulator, writes: &[(u32, u8)]) -> Vec<PendingWord> {
        let mut out = Vec::new();
        for (addr, v) in writes.iter() {
            let (a, b) = acc.push(*addr, *v);
            out.extend(a);
            out.extend(b);
        }
        out
    }

    #[test]
    fn test_four_bytes_make_one_word() {
        let mut acc = ByteAccumulator::new();
        let got = push_all(&mut acc, &[(0x100, 0x11), (0x101, 0x22), (0x102, 0x33)]);
        assert!(got.is_empty());
        assert_eq!(acc.len(), 3);

        let got = push_all(&mut acc, &[(0x103, 0x44)]);
        let want = vec![PendingWord {
            addr: 0x100,
            value: 0x44332211,
            len: 4,
        }];
        assert_eq!(&got[..], &want[..]);
        assert!(acc.is_empty());
    }

    #[test]
    fn test_flush_on_discontinuity() {
        let mut acc = ByteAccumulator::new();
        let got = push_all(&mut acc, &[(0x200, 0xaa), (0x201, 0xbb), (0x300, 0xcc)]);
        let want = vec![
            // The two bytes at 0x200 go out as one word before the byte
            // for 0x300 starts a new accumulation.
            PendingWord {
                addr: 0x200,
                value: 0x0000bbaa,
                len: 2,
            },
        ];
        assert_eq!(&got[..], &want[..]);
        assert_eq!(acc.next_addr(), Some(0x301));
        assert_eq!(
            acc.take(),
            Some(PendingWord {
                addr: 0x300,
                value: 0xcc,
                len: 1,
            })
        );
        assert_eq!(acc.take(), None);
    }

    #[test]
    fn test_replay_reconstructs_stream() {
        // Replaying the emitted words into a byte-addressed memory must give
        // back exactly the bytes that were pushed, for every starting
        // alignment and every stream length up to a few words.
        for start in 0x1000u32..0x1004 {
            for len in 0usize..13 {
                let bytes: Vec<u8> = (0..len).map(|i| (i as u8).wrapping_mul(37) ^ 0x5a).collect();
                let mut acc = ByteAccumulator::new();
                let mut words = Vec::new();
                for (i, b) in bytes.iter().enumerate() {
                    let (a, c) = acc.push(start + i as u32, *b);
                    words.extend(a);
                    words.extend(c);
                }
                words.extend(acc.take());

                let mut mem: BTreeMap<u32, u8> = BTreeMap::new();
                for w in words.iter() {
                    for (i, b) in w.to_le_bytes().iter().enumerate() {
                        mem.insert(w.addr + i as u32, *b);
                    }
                }
                for (i, b) in bytes.iter().enumerate() {
                    assert_eq!(mem.get(&(start + i as u32)), Some(b), "start {:#x} len {}", start, len);
                }
                assert_eq!(words.len(), (len + 3) / 4);
            }
        }
    }
}
