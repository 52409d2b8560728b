use std::fmt;

use bytes::{Buf, Bytes, BytesMut};

/// The prompt the monitor prints after every reply.
pub const PROMPT_MARKER: &[u8] = b"(qemu) ";

/// Default maximum number of bytes buffered while waiting for a prompt: 16 MiB.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// One complete monitor reply, with the trailing prompt removed.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    payload: Bytes,
}

impl Frame {
    /// Create a frame from raw reply bytes.
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
        }
    }

    /// Raw reply bytes.
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Reply text. Invalid UTF-8 is replaced, monitors emit ASCII in practice.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Frame")
            .field(&String::from_utf8_lossy(&self.payload))
            .finish()
    }
}

/// Split the next frame off the front of `src`.
///
/// - prompt found at offset `k`: returns bytes `[0, k)` and consumes the prompt.
/// - no prompt and `at_eof`: returns the remaining bytes, or `None` if nothing remains.
/// - no prompt otherwise: returns `None` and leaves `src` untouched.
pub fn split_frame(src: &mut BytesMut, at_eof: bool) -> Option<Frame> {
    let mut scan_from = 0;
    split_frame_from(src, at_eof, &mut scan_from)
}

/// [`split_frame`] that skips bytes an earlier call already searched.
///
/// `scan_from` is the first offset where a prompt could still start. It is
/// advanced when no prompt is found and reset to zero when a frame is split.
pub(crate) fn split_frame_from(
    src: &mut BytesMut,
    at_eof: bool,
    scan_from: &mut usize,
) -> Option<Frame> {
    if let Some(index) = find_marker(&src[..], *scan_from) {
        let payload = src.split_to(index).freeze();
        src.advance(PROMPT_MARKER.len());
        *scan_from = 0;
        return Some(Frame { payload });
    }

    if at_eof && !src.is_empty() {
        let payload = src.split().freeze();
        *scan_from = 0;
        return Some(Frame { payload });
    }

    // A prompt straddling the end of `src` starts after the last full window.
    *scan_from = (src.len() + 1).saturating_sub(PROMPT_MARKER.len());
    None
}

fn find_marker(haystack: &[u8], from: usize) -> Option<usize> {
    haystack
        .get(from..)?
        .windows(PROMPT_MARKER.len())
        .position(|window| window == PROMPT_MARKER)
        .map(|offset| from + offset)
}

/// Configuration for the frame reader and command writer.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum bytes buffered without a prompt. Default: 16 MiB.
    pub max_frame_size: usize,
    /// Read timeout for blocking operations.
    pub read_timeout: Option<std::time::Duration>,
    /// Write timeout for blocking operations.
    pub write_timeout: Option<std::time::Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            read_timeout: None,
            write_timeout: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(src: &mut BytesMut, at_eof: bool) -> Vec<String> {
        let mut out = Vec::new();
        while let Some(frame) = split_frame(src, at_eof) {
            out.push(frame.text());
        }
        out
    }

    #[test]
    fn splits_on_prompt_and_suppresses_empty_tail() {
        let mut buf = BytesMut::from(&b"a\r\n(qemu) b\r\n(qemu) "[..]);
        assert_eq!(drain(&mut buf, true), vec!["a\r\n", "b\r\n"]);
        assert!(buf.is_empty());
    }

    #[test]
    fn waits_for_more_data_without_prompt() {
        let mut buf = BytesMut::from(&b"VM status: run"[..]);
        assert!(split_frame(&mut buf, false).is_none());
        assert_eq!(buf.as_ref(), b"VM status: run");
    }

    #[test]
    fn partial_prompt_is_not_a_frame() {
        let mut buf = BytesMut::from(&b"reply\r\n(qem"[..]);
        assert!(split_frame(&mut buf, false).is_none());

        buf.extend_from_slice(b"u) ");
        let frame = split_frame(&mut buf, false).unwrap();
        assert_eq!(frame.payload().as_ref(), b"reply\r\n");
        assert!(buf.is_empty());
    }

    #[test]
    fn eof_flushes_trailing_bytes() {
        let mut buf = BytesMut::from(&b"(qemu) trailing"[..]);
        assert_eq!(drain(&mut buf, true), vec!["", "trailing"]);
    }

    #[test]
    fn empty_buffer_at_eof_yields_nothing() {
        let mut buf = BytesMut::new();
        assert!(split_frame(&mut buf, true).is_none());
    }

    #[test]
    fn back_to_back_prompts_yield_empty_frames() {
        let mut buf = BytesMut::from(&b"(qemu) (qemu) x(qemu) "[..]);
        assert_eq!(drain(&mut buf, false), vec!["", "", "x"]);
    }

    #[test]
    fn resumed_scan_finds_prompt_split_across_reads() {
        let mut buf = BytesMut::from(&b"reply\r\n(qem"[..]);
        let mut scan_from = 0;
        assert!(split_frame_from(&mut buf, false, &mut scan_from).is_none());
        assert_eq!(scan_from, 6);

        buf.extend_from_slice(b"u) next");
        let frame = split_frame_from(&mut buf, false, &mut scan_from).unwrap();
        assert_eq!(frame.payload().as_ref(), b"reply\r\n");
        assert_eq!(scan_from, 0);
        assert_eq!(buf.as_ref(), b"next");
    }

    #[test]
    fn resumed_scan_skips_searched_bytes() {
        let mut buf = BytesMut::from(&vec![b'x'; 4096][..]);
        let mut scan_from = 0;
        assert!(split_frame_from(&mut buf, false, &mut scan_from).is_none());
        assert_eq!(scan_from, 4096 - PROMPT_MARKER.len() + 1);

        buf.extend_from_slice(b"(qemu) ");
        let frame = split_frame_from(&mut buf, false, &mut scan_from).unwrap();
        assert_eq!(frame.len(), 4096);
    }

    #[test]
    fn short_buffer_scan_starts_at_zero() {
        let mut buf = BytesMut::from(&b"(q"[..]);
        let mut scan_from = 0;
        assert!(split_frame_from(&mut buf, false, &mut scan_from).is_none());
        assert_eq!(scan_from, 0);
    }

    #[test]
    fn debug_shows_text() {
        let frame = Frame::new(Bytes::from_static(b"ok"));
        assert_eq!(format!("{frame:?}"), "Frame(\"ok\")");
        assert_eq!(frame.len(), 2);
        assert!(!frame.is_empty());
    }
}
