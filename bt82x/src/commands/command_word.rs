use crate::memory::{HostAccessible, MemoryRegion, Ptr};

/// A single little-endian word in the coprocessor command stream.
pub(crate) struct CommandWord(u32);

impl CommandWord {
    pub const fn to_raw(&self) -> u32 {
        self.0
    }
}

impl From<u32> for CommandWord {
    #[inline]
    fn from(v: u32) -> Self {
        CommandWord(v)
    }
}

impl From<bool> for CommandWord {
    #[inline]
    fn from(v: bool) -> Self {
        CommandWord(v as u32)
    }
}

/// Pointers the host can reach are sent as their absolute address. Flash
/// addresses are offsets and must be converted explicitly.
impl<R: MemoryRegion + HostAccessible> From<Ptr<R>> for CommandWord {
    #[inline]
    fn from(v: Ptr<R>) -> Self {
        CommandWord(v.to_raw())
    }
}

pub(crate) fn command_words_for_bytes_iter<'a, Iter>(iter: Iter) -> ByteToCommandIter<'a, Iter>
where
    Iter: core::iter::Iterator<Item = &'a u8> + core::iter::ExactSizeIterator,
{
    ByteToCommandIter { wrapped: iter }
}

pub(crate) fn command_words_for_bytes<'a>(
    bytes: &'a [u8],
) -> ByteToCommandIter<'a, core::slice::Iter<'a, u8>> {
    command_words_for_bytes_iter(bytes.iter())
}

/// Packs bytes into command words, zero-padding the final word.
pub(crate) struct ByteToCommandIter<'a, I>
where
    I: core::iter::Iterator<Item = &'a u8> + core::iter::ExactSizeIterator,
{
    wrapped: I,
}

impl<'a, I> Iterator for ByteToCommandIter<'a, I>
where
    I: core::iter::Iterator<Item = &'a u8> + core::iter::ExactSizeIterator,
{
    type Item = CommandWord;

    fn next(&mut self) -> core::option::Option<Self::Item> {
        const SIZE: usize = core::mem::size_of::<u32>();

        let mut raw: u32 = 0;
        for i in 0..SIZE {
            match self.wrapped.next() {
                Some(byte) => {
                    raw |= (*byte as u32) << (i * 8);
                }
                None => {
                    if i == 0 {
                        return None;
                    } else {
                        break;
                    }
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

impl<'a, I> ExactSizeIterator for ByteToCommandIter<'a, I>
where
    I: core::iter::Iterator<Item = &'a u8> + core::iter::ExactSizeIterator,
{
    fn len(&self) -> usize {
        const SIZE: usize = core::mem::size_of::<u32>();

        // ceil(len / 4), counting the padding bytes.
        (self.wrapped.len() + (SIZE - 1)) / SIZE
    }
}

impl<'a, I> core::iter::FusedIterator for ByteToCommandIter<'a, I> where
    I: core::iter::Iterator<Item = &'a u8>
        + core::iter::ExactSizeIterator
        + core::iter::FusedIterator
{
}

/// Rounds a byte count up to a whole number of command words.
#[inline]
pub(crate) const fn padded_len(len: u32) -> u32 {
    (len + 3) & !3
}
