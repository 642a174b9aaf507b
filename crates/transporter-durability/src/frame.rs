//! Length-prefixed, CRC-32C checked record framing shared by the commit log
//! and error log: `[u32 length][u32 crc32][payload]`.
//!
//! Framing must allow partial-write detection so a crash mid-append leaves
//! the log recoverable: a trailing record that can't be read in full, or
//! whose checksum doesn't match, is discarded rather than surfaced as an
//! error.

use std::io::{self, Read, Write};

/// Write one length+checksum-framed record. Callers are responsible for
/// calling `sync_data` on the underlying file at the appropriate batch
/// boundary; fsync no later than every batch keeps recovery bounded.
pub fn write_frame<W: Write>(w: &mut W, payload: &[u8]) -> io::Result<()> {
    let len = payload.len() as u32;
    let checksum = crc32c::crc32c(payload);
    w.write_all(&len.to_le_bytes())?;
    w.write_all(&checksum.to_le_bytes())?;
    w.write_all(payload)?;
    Ok(())
}

/// Read one frame. Returns `Ok(None)` at a clean end of stream (no bytes
/// left) or when the remaining bytes don't amount to a full, checksum-valid
/// frame — both cases are treated as "nothing more to recover," which is
/// what lets a half-written tail record simply disappear.
pub fn read_frame<R: Read>(r: &mut R) -> io::Result<Option<Vec<u8>>> {
    let mut header = [0u8; 8];
    match read_exact_or_eof(r, &mut header)? {
        false => return Ok(None),
        true => {}
    }
    let len = u32::from_le_bytes(header[0..4].try_into().unwrap()) as usize;
    let expected_checksum = u32::from_le_bytes(header[4..8].try_into().unwrap());

    let mut payload = vec![0u8; len];
    if !read_exact_or_eof(r, &mut payload)? {
        // Trailing partial record: header was written but the payload
        // wasn't fully flushed before the crash. Discard it.
        return Ok(None);
    }

    if crc32c::crc32c(&payload) != expected_checksum {
        // Corrupt or torn write. Treat exactly like a partial record: stop
        // reading here rather than propagating an error that would make
        // the whole log unrecoverable.
        return Ok(None);
    }

    Ok(Some(payload))
}

/// Like `Read::read_exact`, but returns `Ok(false)` instead of erroring when
/// the reader is exhausted before any bytes of `buf` are filled, and
/// `Ok(false)` as well for a short read partway through (both mean "nothing
/// usable remains").
fn read_exact_or_eof<R: Read>(r: &mut R, buf: &mut [u8]) -> io::Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        match r.read(&mut buf[filled..]) {
            Ok(0) => return Ok(filled == buf.len()),
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn round_trips_a_frame() {
        let mut buf = Vec::new();
        write_frame(&mut buf, b"hello").unwrap();
        let mut cursor = Cursor::new(buf);
        let got = read_frame(&mut cursor).unwrap().unwrap();
        assert_eq!(got, b"hello");
        assert!(read_frame(&mut cursor).unwrap().is_none());
    }

    #[test]
    fn discards_truncated_trailing_frame() {
        let mut buf = Vec::new();
        write_frame(&mut buf, b"complete").unwrap();
        write_frame(&mut buf, b"torn-payload").unwrap();
        // Simulate a crash mid-write of the second record's payload.
        buf.truncate(buf.len() - 5);

        let mut cursor = Cursor::new(buf);
        assert_eq!(read_frame(&mut cursor).unwrap().unwrap(), b"complete");
        assert!(read_frame(&mut cursor).unwrap().is_none());
    }

    #[test]
    fn discards_frame_with_bad_checksum() {
        let mut buf = Vec::new();
        write_frame(&mut buf, b"hello").unwrap();
        let last = buf.len() - 1;
        buf[last] ^= 0xff; // corrupt one payload byte without changing length
        let mut cursor = Cursor::new(buf);
        assert!(read_frame(&mut cursor).unwrap().is_none());
    }
}
