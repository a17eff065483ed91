// src/io/wire.rs
//! Segment framing: a 15 character zero-padded ASCII decimal length header
//! followed by exactly that many payload bytes. No checksum, no delimiter.

use std::fs::File;
use std::io::{ErrorKind, Read, Write};
use std::path::Path;

use crate::core::error::{WireError, WireResult};

pub const HEADER_LEN: usize = 15;
/// Largest payload length that fits the header (10^15 - 1).
pub const MAX_PAYLOAD: u64 = 999_999_999_999_999;

const CHUNK: usize = 64 * 1024;

pub fn encode_header(len: u64) -> WireResult<[u8; HEADER_LEN]> {
    if len > MAX_PAYLOAD {
        return Err(WireError::PayloadTooLarge { len });
    }
    let text = format!("{:015}", len);
    let mut header = [0u8; HEADER_LEN];
    header.copy_from_slice(text.as_bytes());
    Ok(header)
}

pub fn decode_header(header: &[u8]) -> WireResult<u64> {
    let invalid = || WireError::InvalidHeader {
        header: String::from_utf8_lossy(header).into_owned(),
    };
    if header.len() != HEADER_LEN || !header.iter().all(u8::is_ascii_digit) {
        return Err(invalid());
    }
    std::str::from_utf8(header)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .ok_or_else(invalid)
}

/// Writes one frame from an in-memory payload.
pub fn write_frame<W: Write>(w: &mut W, payload: &[u8]) -> WireResult<()> {
    w.write_all(&encode_header(payload.len() as u64)?)?;
    w.write_all(payload)?;
    Ok(())
}

/// Writes one frame whose payload is the content of the file at `path`.
/// Returns the payload length.
pub fn send_file<W: Write>(w: &mut W, path: &Path) -> WireResult<u64> {
    let mut file = File::open(path)?;
    let len = file.metadata()?.len();
    w.write_all(&encode_header(len)?)?;

    let copied = std::io::copy(&mut (&mut file).take(len), w)?;
    if copied != len {
        return Err(WireError::Io(std::io::Error::new(
            ErrorKind::UnexpectedEof,
            format!("{} shrank while sending ({} of {} bytes)", path.display(), copied, len),
        )));
    }
    w.flush()?;
    Ok(len)
}

/// Fills `buf` completely, tolerating short reads. A zero-byte read or a
/// connection-level error before the buffer is full is reported as
/// [`WireError::DroppedConnection`].
fn read_full<R: Read>(r: &mut R, buf: &mut [u8], peer: &str, already: u64, total: u64) -> WireResult<()> {
    let mut filled = 0;
    while filled < buf.len() {
        match r.read(&mut buf[filled..]) {
            Ok(0) => {
                return Err(WireError::DroppedConnection {
                    peer: peer.to_string(),
                    expected: total,
                    received: already + filled as u64,
                });
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) if is_connection_error(&e) => {
                log::debug!("[wire] read error from {}: {}", peer, e);
                return Err(WireError::DroppedConnection {
                    peer: peer.to_string(),
                    expected: total,
                    received: already + filled as u64,
                });
            }
            Err(e) => return Err(WireError::Io(e)),
        }
    }
    Ok(())
}

fn is_connection_error(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            | ErrorKind::UnexpectedEof
            | ErrorKind::NotConnected
    )
}

pub fn read_header<R: Read>(r: &mut R, peer: &str) -> WireResult<u64> {
    let mut header = [0u8; HEADER_LEN];
    read_full(r, &mut header, peer, 0, HEADER_LEN as u64)?;
    decode_header(&header)
}

/// Reads one frame and streams its payload into `sink`. Returns the payload
/// length. The payload is never buffered as a whole.
pub fn read_frame<R: Read, W: Write>(r: &mut R, peer: &str, sink: &mut W) -> WireResult<u64> {
    let len = read_header(r, peer)?;
    let mut buf = vec![0u8; CHUNK.min(len as usize).max(1)];
    let mut received = 0u64;

    while received < len {
        let want = (len - received).min(buf.len() as u64) as usize;
        read_full(r, &mut buf[..want], peer, received, len)?;
        sink.write_all(&buf[..want])?;
        received += want as u64;
    }
    sink.flush()?;
    Ok(len)
}

pub fn read_frame_to_vec<R: Read>(r: &mut R, peer: &str) -> WireResult<Vec<u8>> {
    let mut out = Vec::new();
    read_frame(r, peer, &mut out)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Hands out at most `step` bytes per read.
    struct Trickle {
        inner: Cursor<Vec<u8>>,
        step: usize,
    }

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let n = buf.len().min(self.step);
            self.inner.read(&mut buf[..n])
        }
    }

    fn trickle(bytes: Vec<u8>, step: usize) -> Trickle {
        Trickle {
            inner: Cursor::new(bytes),
            step,
        }
    }

    #[test]
    fn test_header_is_zero_padded() {
        assert_eq!(&encode_header(1000).expect("header"), b"000000000001000");
        assert_eq!(&encode_header(0).expect("header"), b"000000000000000");
        assert_eq!(decode_header(b"000000000002048").expect("decode"), 2048);
    }

    #[test]
    fn test_header_rejects_garbage() {
        assert!(matches!(
            decode_header(b"00000000000x048"),
            Err(WireError::InvalidHeader { .. })
        ));
        assert!(matches!(
            decode_header(b"          12345"),
            Err(WireError::InvalidHeader { .. })
        ));
        assert!(matches!(
            encode_header(MAX_PAYLOAD + 1),
            Err(WireError::PayloadTooLarge { .. })
        ));
    }

    #[test]
    fn test_frame_survives_tiny_reads() {
        let payload: Vec<u8> = (0..5000u32).map(|i| (i % 251) as u8).collect();
        let mut wire = Vec::new();
        write_frame(&mut wire, &payload).expect("encode");
        assert_eq!(wire.len(), HEADER_LEN + payload.len());

        for step in [1, 2, 7, 4096] {
            let mut r = trickle(wire.clone(), step);
            assert_eq!(read_frame_to_vec(&mut r, "test").expect("decode"), payload);
        }
    }

    #[test]
    fn test_consecutive_frames() {
        let mut wire = Vec::new();
        write_frame(&mut wire, b"first").expect("encode");
        write_frame(&mut wire, b"").expect("encode");
        write_frame(&mut wire, b"third").expect("encode");

        let mut r = trickle(wire, 3);
        assert_eq!(read_frame_to_vec(&mut r, "test").expect("1"), b"first");
        assert_eq!(read_frame_to_vec(&mut r, "test").expect("2"), b"");
        assert_eq!(read_frame_to_vec(&mut r, "test").expect("3"), b"third");
    }

    #[test]
    fn test_close_before_header() {
        let mut r = Cursor::new(Vec::new());
        match read_frame_to_vec(&mut r, "peer:1") {
            Err(WireError::DroppedConnection {
                peer,
                expected,
                received,
            }) => {
                assert_eq!(peer, "peer:1");
                assert_eq!(expected, 15);
                assert_eq!(received, 0);
            }
            other => panic!("expected dropped connection, got {:?}", other),
        }
    }

    #[test]
    fn test_close_inside_header() {
        let mut r = trickle(b"0000000".to_vec(), 2);
        let err = read_frame_to_vec(&mut r, "peer").expect_err("short header");
        assert!(err.is_dropped_connection());
    }

    #[test]
    fn test_truncated_payload() {
        let mut wire = Vec::new();
        write_frame(&mut wire, &[9u8; 100]).expect("encode");
        wire.truncate(HEADER_LEN + 60);

        let mut r = trickle(wire, 8);
        match read_frame_to_vec(&mut r, "peer") {
            Err(WireError::DroppedConnection {
                expected, received, ..
            }) => {
                assert_eq!(expected, 100);
                assert_eq!(received, 60);
            }
            other => panic!("expected dropped connection, got {:?}", other),
        }
    }

    #[test]
    fn test_send_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("raw_0.h264");
        std::fs::write(&path, vec![3u8; 2048]).expect("write");

        let mut wire = Vec::new();
        assert_eq!(send_file(&mut wire, &path).expect("send"), 2048);
        assert_eq!(&wire[..HEADER_LEN], b"000000000002048");

        let mut r = Cursor::new(wire);
        assert_eq!(read_frame_to_vec(&mut r, "t").expect("decode"), vec![3u8; 2048]);
    }
}
