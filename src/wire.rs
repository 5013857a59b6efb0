//! # FRAMING CODEC
//!
//! A *frame* is an ordered list of *framelets*: a 16-bit type tag followed by a
//! 32-bit length followed by that many opaque bytes. A frame on the wire is just
//! a count of framelets followed by the framelets themselves — there is no
//! overall frame length, so [`read_frame`] keeps reading until it has consumed
//! `framelet_count` of them.
//!
//! Everything here is little-endian, including the framelet count, to match
//! [Frame Layout].
//!
//! [Frame Layout]: crate

use std::io::{self, Read, Write};

/// ## FRAMELET TYPE
///
/// The five wire-exact framelet tags. `Other` preserves an unrecognized tag value
/// so the classifier (not the codec) is the layer that decides an unknown tag is
/// a protocol violation — decoding itself never rejects a frame on tag alone.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FrameletType {
    EpoxyHeaders,
    LayerData,
    PayloadData,
    EpoxyConfig,
    ProtocolError,
    Other(u16),
}

impl FrameletType {
    const TAG_HEADERS: u16 = 0x454D;
    const TAG_LAYER_DATA: u16 = 0x4C59;
    const TAG_PAYLOAD_DATA: u16 = 0x5044;
    const TAG_CONFIG: u16 = 0x434F;
    const TAG_PROTOCOL_ERROR: u16 = 0x4550;

    pub fn tag(self) -> u16 {
        match self {
            FrameletType::EpoxyHeaders => Self::TAG_HEADERS,
            FrameletType::LayerData => Self::TAG_LAYER_DATA,
            FrameletType::PayloadData => Self::TAG_PAYLOAD_DATA,
            FrameletType::EpoxyConfig => Self::TAG_CONFIG,
            FrameletType::ProtocolError => Self::TAG_PROTOCOL_ERROR,
            FrameletType::Other(tag) => tag,
        }
    }
}

impl From<u16> for FrameletType {
    fn from(tag: u16) -> Self {
        match tag {
            Self::TAG_HEADERS => FrameletType::EpoxyHeaders,
            Self::TAG_LAYER_DATA => FrameletType::LayerData,
            Self::TAG_PAYLOAD_DATA => FrameletType::PayloadData,
            Self::TAG_CONFIG => FrameletType::EpoxyConfig,
            Self::TAG_PROTOCOL_ERROR => FrameletType::ProtocolError,
            other => FrameletType::Other(other),
        }
    }
}

/// ## FRAMELET
///
/// A single typed, length-prefixed byte blob. A [`Frame`] is a `Vec` of these.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Framelet {
    pub kind: FrameletType,
    pub body: Vec<u8>,
}

impl Framelet {
    pub fn new(kind: FrameletType, body: Vec<u8>) -> Self {
        Self { kind, body }
    }
}

/// A decoded frame: an ordered sequence of framelets.
pub type Frame = Vec<Framelet>;

/// Default cap on an individual framelet's body length, chosen generously above
/// any legitimate header/payload size while still bounding allocation from a
/// corrupt or hostile length field.
pub const DEFAULT_MAX_FRAMELET_LEN: u32 = 16 * 1024 * 1024;

/// ## FRAMING ERROR
///
/// Distinguishes I/O failure (peer closed, read/write error) from a protocol
/// violation detected while decoding (malformed count/length). `read_frame`
/// returns `Ok(None)` rather than an error for a clean peer hang-up.
#[derive(Debug, thiserror::Error)]
pub enum FramingError {
    #[error("transport I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("frame truncated after {bytes_read} bytes of a {expected}-byte read")]
    Truncated { bytes_read: usize, expected: usize },
    #[error("framelet length {length} exceeds the {max} byte cap")]
    FrameletTooLarge { length: u32, max: u32 },
}

/// ### ENCODE FRAME
///
/// Serializes a [`Frame`] into its wire representation: `u16` framelet count,
/// then each framelet as `u16 tag, u32 length, bytes`.
pub fn encode(frame: &[Framelet]) -> Vec<u8> {
    let mut out = Vec::with_capacity(2 + frame.iter().map(|f| 6 + f.body.len()).sum::<usize>());
    out.extend_from_slice(&(frame.len() as u16).to_le_bytes());
    for framelet in frame {
        out.extend_from_slice(&framelet.kind.tag().to_le_bytes());
        out.extend_from_slice(&(framelet.body.len() as u32).to_le_bytes());
        out.extend_from_slice(&framelet.body);
    }
    out
}

/// ### WRITE FRAME
///
/// Encodes and writes a frame to `stream`, then flushes. Callers are expected to
/// hold the socket adapter's write lock around this call.
pub fn write_frame(stream: &mut impl Write, frame: &[Framelet]) -> io::Result<()> {
    let bytes = encode(frame);
    stream.write_all(&bytes)?;
    stream.flush()
}

/// ### READ FRAME
///
/// Reads one frame from `stream`. A read of zero bytes on the count header is
/// reported as `Ok(None)` (peer hang-up); any other short read, or a framelet
/// length over `max_framelet_len`, is a [`FramingError`].
pub fn read_frame(
    stream: &mut impl Read,
    max_framelet_len: u32,
) -> Result<Option<Frame>, FramingError> {
    let mut count_buf = [0u8; 2];
    let bytes_read = read_fill(stream, &mut count_buf)?;
    if bytes_read == 0 {
        return Ok(None);
    }
    if bytes_read != count_buf.len() {
        return Err(FramingError::Truncated {
            bytes_read,
            expected: count_buf.len(),
        });
    }
    let count = u16::from_le_bytes(count_buf);
    let mut frame = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let mut tag_buf = [0u8; 2];
        require_full_read(stream, &mut tag_buf)?;
        let tag = u16::from_le_bytes(tag_buf);

        let mut len_buf = [0u8; 4];
        require_full_read(stream, &mut len_buf)?;
        let length = u32::from_le_bytes(len_buf);
        if length > max_framelet_len {
            return Err(FramingError::FrameletTooLarge {
                length,
                max: max_framelet_len,
            });
        }

        let mut body = vec![0u8; length as usize];
        require_full_read(stream, &mut body)?;
        frame.push(Framelet::new(FrameletType::from(tag), body));
    }
    Ok(Some(frame))
}

/// Reads until `buf` is full or the stream hits EOF, returning the number of
/// bytes actually read (so the caller can distinguish "nothing at all" from
/// "a short, truncated read").
fn read_fill(stream: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match stream.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(total)
}

fn require_full_read(stream: &mut impl Read, buf: &mut [u8]) -> Result<(), FramingError> {
    let bytes_read = read_fill(stream, buf)?;
    if bytes_read != buf.len() {
        return Err(FramingError::Truncated {
            bytes_read,
            expected: buf.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_frame() -> Frame {
        vec![
            Framelet::new(FrameletType::EpoxyHeaders, vec![1, 2, 3]),
            Framelet::new(FrameletType::LayerData, vec![]),
            Framelet::new(FrameletType::PayloadData, vec![9; 300]),
        ]
    }

    #[test]
    fn round_trip() {
        let frame = sample_frame();
        let bytes = encode(&frame);
        let mut cursor = io::Cursor::new(bytes);
        let decoded = read_frame(&mut cursor, DEFAULT_MAX_FRAMELET_LEN)
            .unwrap()
            .unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn empty_read_is_eof() {
        let mut cursor = io::Cursor::new(Vec::<u8>::new());
        let decoded = read_frame(&mut cursor, DEFAULT_MAX_FRAMELET_LEN).unwrap();
        assert!(decoded.is_none());
    }

    #[test]
    fn partial_count_is_truncated() {
        let mut cursor = io::Cursor::new(vec![0x01]);
        let err = read_frame(&mut cursor, DEFAULT_MAX_FRAMELET_LEN).unwrap_err();
        assert!(matches!(err, FramingError::Truncated { .. }));
    }

    #[test]
    fn partial_framelet_is_truncated() {
        // count = 1, tag = 2 bytes, then nothing else.
        let mut bytes = 1u16.to_le_bytes().to_vec();
        bytes.extend_from_slice(&FrameletType::EpoxyConfig.tag().to_le_bytes());
        let mut cursor = io::Cursor::new(bytes);
        let err = read_frame(&mut cursor, DEFAULT_MAX_FRAMELET_LEN).unwrap_err();
        assert!(matches!(err, FramingError::Truncated { .. }));
    }

    #[test]
    fn oversized_length_is_rejected_without_allocating() {
        let mut bytes = 1u16.to_le_bytes().to_vec();
        bytes.extend_from_slice(&FrameletType::PayloadData.tag().to_le_bytes());
        bytes.extend_from_slice(&u32::MAX.to_le_bytes());
        let mut cursor = io::Cursor::new(bytes);
        let err = read_frame(&mut cursor, DEFAULT_MAX_FRAMELET_LEN).unwrap_err();
        assert!(matches!(err, FramingError::FrameletTooLarge { .. }));
    }

    #[test]
    fn unknown_tag_round_trips_as_other() {
        let frame = vec![Framelet::new(FrameletType::Other(0xBEEF), vec![7])];
        let bytes = encode(&frame);
        let mut cursor = io::Cursor::new(bytes);
        let decoded = read_frame(&mut cursor, DEFAULT_MAX_FRAMELET_LEN)
            .unwrap()
            .unwrap();
        assert_eq!(decoded, frame);
    }
}
