/// One little-endian 32-bit word of the command stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct CommandWord(u32);

impl CommandWord {
    pub const fn to_raw(&self) -> u32 {
        self.0
    }

    pub const fn to_le_bytes(&self) -> [u8; 4] {
        self.0.to_le_bytes()
    }
}

impl From<u32> for CommandWord {
    #[inline]
    fn from(v: u32) -> Self {
        CommandWord(v)
    }
}

impl From<i32> for CommandWord {
    #[inline]
    fn from(v: i32) -> Self {
        CommandWord(v as u32)
    }
}

impl From<(u16, u16)> for CommandWord {
    #[inline]
    fn from(v: (u16, u16)) -> Self {
        CommandWord((v.0 as u32) | (v.1 as u32) << 16)
    }
}

impl From<(i16, i16)> for CommandWord {
    #[inline]
    fn from(v: (i16, i16)) -> Self {
        let a = v.0 as u16;
        let b = v.1 as u16;
        CommandWord((a as u32) | (b as u32) << 16)
    }
}

/// Packs bytes into command words, zero-padding the last one.
pub(crate) fn command_words_for_bytes(bytes: &[u8]) -> ByteToCommandIter<'_> {
    ByteToCommandIter {
        wrapped: bytes.iter(),
        terminate: false,
        done: false,
    }
}

/// Packs a string into command words with a NUL terminator, zero-padding
/// the last word. The empty string still produces one word.
pub(crate) fn command_words_for_str(s: &[u8]) -> ByteToCommandIter<'_> {
    ByteToCommandIter {
        wrapped: s.iter(),
        terminate: true,
        done: false,
    }
}

pub(crate) struct ByteToCommandIter<'a> {
    wrapped: core::slice::Iter<'a, u8>,
    terminate: bool,
    done: bool,
}

impl<'a> Iterator for ByteToCommandIter<'a> {
    type Item = CommandWord;

    fn next(&mut self) -> Option<Self::Item> {
        const SIZE: usize = core::mem::size_of::<u32>();

        if self.done {
            return None;
        }

        let mut raw: u32 = 0;
        for i in 0..SIZE {
            match self.wrapped.next() {
                Some(byte) => {
                    raw = raw | ((*byte as u32) << (i * 8));
                }
                None => {
                    self.done = true;
                    // With a terminator, the NUL has to fit somewhere, so
                    // an exactly-full final word needs one more.
                    if i == 0 && !self.terminate {
                        return None;
                    }
                    break;
                }
            }
        }
        Some(CommandWord(raw))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let len = self.len();
        (len, Some(len))
    }
}

impl<'a> ExactSizeIterator for ByteToCommandIter<'a> {
    fn len(&self) -> usize {
        const SIZE: usize = core::mem::size_of::<u32>();

        if self.done {
            return 0;
        }
        let bytes = self.wrapped.len() + if self.terminate { 1 } else { 0 };
        // This is ceil(len / 4), accounting for us rounding up to include
        // alignment bytes.
        (bytes + (SIZE - 1)) / SIZE
    }
}

impl<'a> core::iter::FusedIterator for ByteToCommandIter<'a> {}
