//! Wire format for ring serialization.
//!
//! A ring is one header line followed by an optional item block:
//!
//! ```text
//! R;<max_id>;<use_id_map 0|1>;<use_name_map 0|1>;<name_len>;<name>
//! D;
//! C;<id>;<name_len>;<name>;I;<payload>;
//! C;<id>;<name_len>;<name>;I;<payload>;
//! ```
//!
//! `R`, `D`, `C` and `I` are fixed single-byte markers. `name_len` is the
//! byte length of the following name field *including* a trailing
//! terminator, so the writer emits `name.len() + 1` and the reader takes
//! `name_len - 1` bytes plus the terminator byte. Payload bytes are produced
//! by the payload's `Display` impl and consumed by its `FromStr` impl; the
//! ring does not interpret them.

use crate::error::{Result, RingError};
use std::io::BufRead;

/// Marker byte opening a ring header.
pub(crate) const RING_START: u8 = b'R';
/// Marker byte opening the item block of a non-empty ring.
pub(crate) const RING_DATA: u8 = b'D';
/// Marker byte opening one serialized item.
pub(crate) const ITEM_START: u8 = b'C';
/// Marker byte separating an item's keys from its payload bytes.
pub(crate) const ITEM_DATA: u8 = b'I';

/// Field separator.
pub(crate) const SEP: u8 = b';';

/// Upper bound accepted for a serialized name length. Anything larger is
/// treated as a corrupt length field rather than an allocation request.
const MAX_NAME_LEN: usize = 1 << 20;

/// Peeks at the next byte without consuming it, skipping any line breaks
/// first. Returns `None` at end of input.
pub(crate) fn peek_marker<R: BufRead>(input: &mut R) -> Result<Option<u8>> {
    loop {
        let buf = input.fill_buf()?;
        if buf.is_empty() {
            return Ok(None);
        }
        match buf[0] {
            b'\n' | b'\r' | b' ' | b'\t' => input.consume(1),
            byte => return Ok(Some(byte)),
        }
    }
}

/// Consumes one expected marker byte plus its separator.
pub(crate) fn expect_marker<R: BufRead>(
    input: &mut R,
    marker: u8,
    reason: &'static str,
) -> Result<()> {
    match peek_marker(input)? {
        Some(byte) if byte == marker => {
            input.consume(1);
            expect_sep(input, reason)
        }
        _ => Err(RingError::LoadFailed { reason }),
    }
}

/// Consumes a single separator byte.
pub(crate) fn expect_sep<R: BufRead>(input: &mut R, reason: &'static str) -> Result<()> {
    let buf = input.fill_buf()?;
    if buf.first() == Some(&SEP) {
        input.consume(1);
        Ok(())
    } else {
        Err(RingError::LoadFailed { reason })
    }
}

/// Skips bytes until a marker byte has been consumed together with its
/// separator. Used by searching loads to find the next ring start in a
/// stream that may carry foreign bytes between rings.
pub(crate) fn forward_to<R: BufRead>(input: &mut R, marker: u8) -> Result<bool> {
    loop {
        let buf = input.fill_buf()?;
        if buf.is_empty() {
            return Ok(false);
        }
        match buf.iter().position(|&b| b == marker) {
            Some(pos) => {
                input.consume(pos + 1);
                expect_sep(input, "marker without separator")?;
                return Ok(true);
            }
            None => {
                let len = buf.len();
                input.consume(len);
            }
        }
    }
}

/// Reads one `;`-terminated field as raw text. The separator is consumed
/// but not included.
pub(crate) fn read_field<R: BufRead>(input: &mut R, reason: &'static str) -> Result<String> {
    let mut raw = Vec::new();
    let n = input.read_until(SEP, &mut raw)?;
    if n == 0 || raw.last() != Some(&SEP) {
        return Err(RingError::LoadFailed { reason });
    }
    raw.pop();
    String::from_utf8(raw).map_err(|_| RingError::LoadFailed { reason })
}

/// Reads and parses one numeric field.
pub(crate) fn read_number<R: BufRead, N: std::str::FromStr>(
    input: &mut R,
    reason: &'static str,
) -> Result<N> {
    read_field(input, reason)?
        .trim()
        .parse()
        .map_err(|_| RingError::LoadFailed { reason })
}

/// Reads one `0`/`1` flag field.
pub(crate) fn read_flag<R: BufRead>(input: &mut R, reason: &'static str) -> Result<bool> {
    match read_field(input, reason)?.trim() {
        "0" => Ok(false),
        "1" => Ok(true),
        _ => Err(RingError::LoadFailed { reason }),
    }
}

/// Reads a length-prefixed name: `len - 1` raw bytes followed by the given
/// terminator byte, which is consumed.
pub(crate) fn read_name<R: BufRead>(
    input: &mut R,
    len: usize,
    terminator: u8,
    reason: &'static str,
) -> Result<String> {
    if len == 0 || len > MAX_NAME_LEN {
        return Err(RingError::AllocFailed);
    }
    let mut raw = vec![0u8; len - 1];
    input
        .read_exact(&mut raw)
        .map_err(|_| RingError::LoadFailed { reason })?;
    let mut term = [0u8; 1];
    input
        .read_exact(&mut term)
        .map_err(|_| RingError::LoadFailed { reason })?;
    if term[0] != terminator {
        return Err(RingError::LoadFailed { reason });
    }
    String::from_utf8(raw).map_err(|_| RingError::LoadFailed { reason })
}

/// Consumes a trailing line break (`\n` or `\r\n`), tolerating its absence
/// at end of input.
pub(crate) fn skip_line_break<R: BufRead>(input: &mut R) -> Result<()> {
    loop {
        let buf = input.fill_buf()?;
        match buf.first() {
            Some(b'\r' | b'\n') => input.consume(1),
            _ => return Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_read_field_and_number() {
        let mut input = Cursor::new(&b"42;hello;1;"[..]);
        assert_eq!(read_number::<_, u32>(&mut input, "n").unwrap(), 42);
        assert_eq!(read_field(&mut input, "s").unwrap(), "hello");
        assert!(read_flag(&mut input, "f").unwrap());
    }

    #[test]
    fn test_read_field_truncated() {
        let mut input = Cursor::new(&b"no-separator"[..]);
        assert!(matches!(
            read_field(&mut input, "field"),
            Err(RingError::LoadFailed { .. })
        ));
    }

    #[test]
    fn test_read_name_with_terminator() {
        // "abc" stored with len 4 = 3 bytes + terminator
        let mut input = Cursor::new(&b"abc;rest"[..]);
        assert_eq!(read_name(&mut input, 4, SEP, "name").unwrap(), "abc");

        let mut input = Cursor::new(&b"abc\nrest"[..]);
        assert_eq!(read_name(&mut input, 4, b'\n', "name").unwrap(), "abc");
    }

    #[test]
    fn test_read_name_rejects_absurd_length() {
        let mut input = Cursor::new(&b"abc;"[..]);
        assert!(matches!(
            read_name(&mut input, usize::MAX, SEP, "name"),
            Err(RingError::AllocFailed)
        ));
    }

    #[test]
    fn test_forward_to_ring_start() {
        let mut input = Cursor::new(&b"garbage bytes R;payload"[..]);
        assert!(forward_to(&mut input, RING_START).unwrap());
        assert_eq!(read_field(&mut input, "f").unwrap_err().to_string(), {
            // no further separator; the remaining bytes are not a field
            "load failed: f".to_string()
        });
    }

    #[test]
    fn test_peek_marker_skips_line_breaks() {
        let mut input = Cursor::new(&b"\r\n\nC;rest"[..]);
        assert_eq!(peek_marker(&mut input).unwrap(), Some(ITEM_START));
        // Peeking does not consume the marker itself.
        expect_marker(&mut input, ITEM_START, "item start").unwrap();
    }
}
