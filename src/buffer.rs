//! Fixed-capacity UTF-16 buffer shared by the worker and the caller.

/// Default request buffer capacity in UTF-16 units (2048 bytes).
pub const REQUEST_BUFFER_UNITS: usize = 1024;

/// A single allocation of UTF-16 units plus a write cursor.
///
/// Writes never advance the cursor past the capacity; whatever does not fit
/// is reported back to the writer instead of being stored. The storage is
/// allocated once and reused in place; it is released when the owning
/// request is dropped.
#[derive(Debug, Clone)]
pub struct RequestBuffer {
    data: Box<[u16]>,
    cursor: usize,
}

impl RequestBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0u16; capacity].into_boxed_slice(),
            cursor: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Units written so far.
    pub fn len(&self) -> usize {
        self.cursor
    }

    pub fn is_empty(&self) -> bool {
        self.cursor == 0
    }

    /// Room left before the writer has to hand the buffer to the consumer.
    pub fn remaining(&self) -> usize {
        self.capacity() - self.cursor
    }

    pub fn is_full(&self) -> bool {
        self.remaining() == 0
    }

    /// Append as much of `units` as fits; returns how many were stored.
    pub fn write(&mut self, units: &[u16]) -> usize {
        let n = units.len().min(self.remaining());
        self.data[self.cursor..self.cursor + n].copy_from_slice(&units[..n]);
        self.cursor += n;
        n
    }

    /// The valid part of the buffer.
    pub fn as_slice(&self) -> &[u16] {
        &self.data[..self.cursor]
    }

    /// Move the cursor back to the start.
    pub fn reset(&mut self) {
        self.cursor = 0;
    }

    /// Shorten the valid part to `len` units. Longer values are ignored.
    pub fn truncate(&mut self, len: usize) {
        if len < self.cursor {
            self.cursor = len;
        }
    }

    /// Discard the first `n` units and shift the rest down.
    pub fn consume(&mut self, n: usize) {
        let n = n.min(self.cursor);
        self.data.copy_within(n..self.cursor, 0);
        self.cursor -= n;
    }

    /// Replace the content with `units`, truncated to the capacity.
    pub fn replace(&mut self, units: &[u16]) -> usize {
        self.reset();
        self.write(units)
    }

    /// Copy the valid part into `dest` as a NUL-terminated string and
    /// consume what was copied. Returns the number of units copied,
    /// not counting the terminator.
    pub fn drain_into(&mut self, dest: &mut [u16]) -> usize {
        let Some(room) = dest.len().checked_sub(1) else {
            return 0;
        };
        let n = room.min(self.cursor);
        dest[..n].copy_from_slice(&self.data[..n]);
        dest[n] = 0;
        self.consume(n);
        n
    }
}

impl Default for RequestBuffer {
    fn default() -> Self {
        Self::new(REQUEST_BUFFER_UNITS)
    }
}

/// Convert extracted text to UTF-16, dropping NUL, backspace and form feed
/// (the page break marker).
pub(crate) fn encode_filtered(text: &str) -> Vec<u16> {
    text.chars()
        .filter(|c| !matches!(c, '\0' | '\u{8}' | '\u{c}'))
        .collect::<String>()
        .encode_utf16()
        .collect()
}

/// Copy `src` into `dest` NUL-terminated, truncating if needed.
pub(crate) fn copy_terminated(src: &[u16], dest: &mut [u16]) -> usize {
    let Some(room) = dest.len().checked_sub(1) else {
        return 0;
    };
    let n = room.min(src.len());
    dest[..n].copy_from_slice(&src[..n]);
    dest[n] = 0;
    n
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utf16(s: &str) -> Vec<u16> {
        s.encode_utf16().collect()
    }

    #[test]
    fn write_stops_at_capacity() {
        let mut buf = RequestBuffer::new(4);
        assert_eq!(buf.write(&utf16("abc")), 3);
        assert_eq!(buf.remaining(), 1);
        assert_eq!(buf.write(&utf16("defg")), 1);
        assert!(buf.is_full());
        assert_eq!(buf.write(&utf16("h")), 0);
        assert_eq!(buf.as_slice(), utf16("abcd").as_slice());
    }

    #[test]
    fn cursor_never_exceeds_capacity() {
        let mut buf = RequestBuffer::new(7);
        for chunk in ["ab", "", "cdefgh", "ijklmnop", "q"] {
            buf.write(&utf16(chunk));
            assert!(buf.len() <= buf.capacity());
            buf.consume(1);
            assert!(buf.len() <= buf.capacity());
        }
    }

    #[test]
    fn drain_shifts_the_rest_down() {
        let mut buf = RequestBuffer::new(16);
        buf.write(&utf16("hello world"));
        let mut dest = [0u16; 6];
        assert_eq!(buf.drain_into(&mut dest), 5);
        assert_eq!(&dest[..5], utf16("hello").as_slice());
        assert_eq!(dest[5], 0);
        assert_eq!(buf.as_slice(), utf16(" world").as_slice());
        assert_eq!(buf.remaining(), 10);
    }

    #[test]
    fn drain_into_empty_destination_copies_nothing() {
        let mut buf = RequestBuffer::new(4);
        buf.write(&utf16("ab"));
        assert_eq!(buf.drain_into(&mut []), 0);
        assert_eq!(buf.len(), 2);
    }

    #[test]
    fn encoding_filters_control_characters() {
        assert_eq!(encode_filtered("a\u{c}b\u{8}c\0d"), utf16("abcd"));
        assert_eq!(encode_filtered("\u{1F600}").len(), 2);
    }

    #[test]
    fn truncate_and_replace() {
        let mut buf = RequestBuffer::new(8);
        buf.write(&utf16("abcdef"));
        buf.truncate(2);
        assert_eq!(buf.as_slice(), utf16("ab").as_slice());
        buf.truncate(10);
        assert_eq!(buf.len(), 2);
        assert_eq!(buf.replace(&utf16("0123456789")), 8);
        assert!(buf.is_full());
    }
}
