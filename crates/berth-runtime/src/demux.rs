//! Decoder for the engine's multiplexed exec output.
//!
//! Every frame is an 8-byte header followed by a payload:
//!
//! ```text
//! [tag, 0, 0, 0, len (u32, big-endian)] [len bytes]
//! tag: 0 = stdin, 1 = stdout, 2 = stderr, 3 = engine system error
//! ```
//!
//! Frames arrive split across reads at arbitrary boundaries. The decoder
//! keeps an explicit state (waiting for header bytes, or waiting for payload
//! bytes) so that any fragmentation yields the same output.

use std::io::{self, Read, Write};

use berth_common::constants::FRAME_HEADER_LEN;
use berth_common::error::DemuxError;

/// Origin of a frame's payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOrigin {
    /// Echoed standard input.
    Stdin,
    /// Standard output.
    Stdout,
    /// Standard error.
    Stderr,
    /// Error text injected by the engine itself.
    System,
}

impl StreamOrigin {
    /// Maps a header tag to its origin.
    #[must_use]
    pub const fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::Stdin),
            1 => Some(Self::Stdout),
            2 => Some(Self::Stderr),
            3 => Some(Self::System),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum DecodeState {
    Header {
        buf: [u8; FRAME_HEADER_LEN],
        filled: usize,
    },
    Payload {
        origin: StreamOrigin,
        remaining: usize,
    },
}

impl DecodeState {
    const fn header() -> Self {
        Self::Header {
            buf: [0; FRAME_HEADER_LEN],
            filled: 0,
        }
    }
}

/// Incremental frame decoder.
#[derive(Debug)]
pub struct FrameDecoder {
    state: DecodeState,
    system: Vec<u8>,
    frames: u64,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    /// Creates a decoder waiting for the first header.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: DecodeState::header(),
            system: Vec::new(),
            frames: 0,
        }
    }

    /// Number of complete frames decoded so far.
    #[must_use]
    pub const fn frames(&self) -> u64 {
        self.frames
    }

    /// Feeds bytes into the decoder, passing payload slices to `emit` as
    /// soon as they are available.
    ///
    /// # Errors
    ///
    /// Returns an error on an unknown stream tag, a completed system-error
    /// frame, or if `emit` fails.
    pub fn feed<F>(&mut self, mut input: &[u8], mut emit: F) -> Result<(), DemuxError>
    where
        F: FnMut(StreamOrigin, &[u8]) -> io::Result<()>,
    {
        while !input.is_empty() {
            match &mut self.state {
                DecodeState::Header { buf, filled } => {
                    let take = (FRAME_HEADER_LEN - *filled).min(input.len());
                    buf[*filled..*filled + take].copy_from_slice(&input[..take]);
                    *filled += take;
                    input = &input[take..];
                    if *filled == FRAME_HEADER_LEN {
                        let header = *buf;
                        self.begin_frame(header)?;
                    }
                }
                DecodeState::Payload { origin, remaining } => {
                    let origin = *origin;
                    let take = (*remaining).min(input.len());
                    *remaining -= take;
                    let done = *remaining == 0;
                    let (chunk, rest) = input.split_at(take);
                    input = rest;
                    if origin == StreamOrigin::System {
                        self.system.extend_from_slice(chunk);
                    } else {
                        emit(origin, chunk)?;
                    }
                    if done {
                        self.end_frame(origin)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Checks that the stream did not stop part-way through a frame.
    ///
    /// # Errors
    ///
    /// Returns `DemuxError::Truncated` with the number of missing bytes.
    pub fn finish(&self) -> Result<(), DemuxError> {
        match self.state {
            DecodeState::Header { filled: 0, .. } => Ok(()),
            DecodeState::Header { filled, .. } => Err(DemuxError::Truncated {
                missing: FRAME_HEADER_LEN - filled,
            }),
            DecodeState::Payload { remaining, .. } => Err(DemuxError::Truncated { missing: remaining }),
        }
    }

    fn begin_frame(&mut self, header: [u8; FRAME_HEADER_LEN]) -> Result<(), DemuxError> {
        let origin = StreamOrigin::from_tag(header[0]).ok_or(DemuxError::UnknownStream(header[0]))?;
        let len = u32::from_be_bytes([header[4], header[5], header[6], header[7]]) as usize;
        if len == 0 {
            self.state = DecodeState::header();
            return self.end_frame(origin);
        }
        self.state = DecodeState::Payload {
            origin,
            remaining: len,
        };
        Ok(())
    }

    fn end_frame(&mut self, origin: StreamOrigin) -> Result<(), DemuxError> {
        self.frames += 1;
        self.state = DecodeState::header();
        if origin == StreamOrigin::System {
            let message = String::from_utf8_lossy(&self.system).trim().to_string();
            self.system.clear();
            return Err(DemuxError::System(message));
        }
        Ok(())
    }
}

/// Reads `reader` to the end, copying stdout payloads (and echoed stdin)
/// into `stdout` and stderr payloads into `stderr`. Returns the number of
/// frames decoded.
///
/// # Errors
///
/// Returns an error if reading or writing fails, the stream carries an
/// unknown tag or a system-error frame, or it ends mid-frame.
pub fn demux<R, O, E>(reader: &mut R, stdout: &mut O, stderr: &mut E) -> Result<u64, DemuxError>
where
    R: Read + ?Sized,
    O: Write + ?Sized,
    E: Write + ?Sized,
{
    let mut decoder = FrameDecoder::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(DemuxError::Io(e)),
        };
        decoder.feed(&buf[..n], |origin, bytes| match origin {
            StreamOrigin::Stdin | StreamOrigin::Stdout => stdout.write_all(bytes),
            StreamOrigin::Stderr => stderr.write_all(bytes),
            StreamOrigin::System => Ok(()),
        })?;
    }
    decoder.finish()?;
    Ok(decoder.frames())
}

#[cfg(test)]
mod tests {
    use berth_core::testing::encode_frame;

    use super::*;

    /// Reader that returns the data in a fixed sequence of read sizes.
    struct Fragmented {
        data: Vec<u8>,
        pos: usize,
        sizes: Vec<usize>,
        call: usize,
    }

    impl Read for Fragmented {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let want = self.sizes[self.call % self.sizes.len()].max(1);
            self.call += 1;
            let n = want.min(buf.len()).min(self.data.len() - self.pos);
            buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    fn sample_stream() -> Vec<u8> {
        let mut data = Vec::new();
        data.extend(encode_frame(1, b"hello "));
        data.extend(encode_frame(2, b"warning: slow\n"));
        data.extend(encode_frame(1, b""));
        data.extend(encode_frame(1, b"world\n"));
        data.extend(encode_frame(2, &[0xff, 0x00, 0x7f]));
        data.extend(encode_frame(1, &vec![b'x'; 10_000]));
        data
    }

    fn run(data: Vec<u8>, sizes: Vec<usize>) -> (Result<u64, DemuxError>, Vec<u8>, Vec<u8>) {
        let mut reader = Fragmented {
            data,
            pos: 0,
            sizes,
            call: 0,
        };
        let mut out = Vec::new();
        let mut err = Vec::new();
        let result = demux(&mut reader, &mut out, &mut err);
        (result, out, err)
    }

    #[test]
    fn demux_separates_streams() {
        let (result, out, err) = run(sample_stream(), vec![usize::MAX]);
        assert_eq!(result.expect("demux"), 6);
        let mut expected_out = b"hello world\n".to_vec();
        expected_out.extend(vec![b'x'; 10_000]);
        assert_eq!(out, expected_out);
        let mut expected_err = b"warning: slow\n".to_vec();
        expected_err.extend([0xff, 0x00, 0x7f]);
        assert_eq!(err, expected_err);
    }

    #[test]
    fn any_fragmentation_yields_identical_buffers() {
        let (_, want_out, want_err) = run(sample_stream(), vec![usize::MAX]);
        for size in 1..=17 {
            let (result, out, err) = run(sample_stream(), vec![size]);
            assert!(result.is_ok(), "chunk size {size}");
            assert_eq!(out, want_out, "chunk size {size}");
            assert_eq!(err, want_err, "chunk size {size}");
        }
        let (result, out, err) = run(sample_stream(), vec![3, 1, 7, 2, 8, 5, 13]);
        assert!(result.is_ok());
        assert_eq!(out, want_out);
        assert_eq!(err, want_err);
    }

    #[test]
    fn stdin_frames_go_to_stdout() {
        let (result, out, err) = run(encode_frame(0, b"echo"), vec![2]);
        assert!(result.is_ok());
        assert_eq!(out, b"echo");
        assert!(err.is_empty());
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let (result, _, _) = run(encode_frame(9, b"??"), vec![64]);
        assert!(matches!(result, Err(DemuxError::UnknownStream(9))));
    }

    #[test]
    fn system_frame_aborts_with_message() {
        let mut data = encode_frame(1, b"partial");
        data.extend(encode_frame(3, b"exec process died\n"));
        let (result, out, _) = run(data, vec![4]);
        assert!(
            matches!(&result, Err(DemuxError::System(message)) if message == "exec process died"),
            "unexpected result: {result:?}"
        );
        assert_eq!(out, b"partial");
    }

    #[test]
    fn truncated_header_is_reported() {
        let (result, _, _) = run(vec![1, 0, 0], vec![64]);
        assert!(matches!(result, Err(DemuxError::Truncated { missing: 5 })));
    }

    #[test]
    fn truncated_payload_is_reported() {
        let mut data = encode_frame(1, b"0123456789");
        data.truncate(data.len() - 4);
        let (result, out, _) = run(data, vec![64]);
        assert!(matches!(result, Err(DemuxError::Truncated { missing: 4 })));
        assert_eq!(out, b"012345");
    }

    #[test]
    fn empty_stream_is_fine() {
        let (result, out, err) = run(Vec::new(), vec![1]);
        assert_eq!(result.expect("empty"), 0);
        assert!(out.is_empty() && err.is_empty());
    }
}
