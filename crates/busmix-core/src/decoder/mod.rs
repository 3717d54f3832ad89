//! Decoder adapters
//!
//! Every source owns exactly one [`Decoder`], chosen by sniffing the encoded
//! bytes when the source is created:
//!
//! - `"WAVE"` at byte offset 8 selects the PCM adapter ([`pcm`], via `hound`)
//! - `"OggS"` at byte offset 0 selects the streaming adapter ([`stream`], via
//!   `symphonia`)
//!
//! Both adapters expose the same ring-oriented contract: decode `count`
//! stereo frames into a pair of ring buffers starting at some ring offset,
//! looping the underlying stream as often as needed.

pub mod pcm;
pub mod stream;

use basedrop::Shared;
use std::fmt;
use std::io;
use std::path::Path;

use crate::engine::gc::gc_handle;
use crate::error::{DecodeError, FormatError};
use crate::types::RING_MASK;

pub use pcm::PcmDecoder;
pub use stream::StreamingDecoder;

// ────────────────────────────────────────────────────────────────────────────
// Encoded bytes
// ────────────────────────────────────────────────────────────────────────────

/// Read-only encoded audio shared between the caller and its decoders
///
/// Cloning is cheap. The bytes are reclaimed on the GC thread when the last
/// reference goes away, which may be inside the audio callback.
#[derive(Clone)]
pub struct SampleData(Shared<Vec<u8>>);

impl SampleData {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(Shared::new(&gc_handle(), bytes))
    }

    /// Read a whole file into memory
    pub fn from_file(path: impl AsRef<Path>) -> io::Result<Self> {
        std::fs::read(path).map(Self::new)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_slice()
    }
}

impl AsRef<[u8]> for SampleData {
    fn as_ref(&self) -> &[u8] {
        self.0.as_slice()
    }
}

impl From<Vec<u8>> for SampleData {
    fn from(bytes: Vec<u8>) -> Self {
        Self::new(bytes)
    }
}

impl fmt::Debug for SampleData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SampleData").field("len", &self.len()).finish()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Format sniffing
// ────────────────────────────────────────────────────────────────────────────

/// Container recognized from the leading bytes of the data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerFormat {
    Wave,
    Ogg,
}

impl ContainerFormat {
    /// Identify the container, testing for WAVE first
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.len() > 12 && &bytes[8..12] == b"WAVE" {
            Some(ContainerFormat::Wave)
        } else if bytes.len() > 4 && &bytes[0..4] == b"OggS" {
            Some(ContainerFormat::Ogg)
        } else {
            None
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Ring filling
// ────────────────────────────────────────────────────────────────────────────

/// A finite stream of stereo frames that can restart from the beginning
pub(crate) trait FrameStream {
    /// Write up to `max` frames into the ring starting at `offset`
    ///
    /// Returns the number of frames written; 0 means end of stream.
    fn read(
        &mut self,
        left: &mut [i16],
        right: &mut [i16],
        offset: usize,
        max: usize,
    ) -> Result<usize, DecodeError>;

    /// Restart the stream from its first frame
    fn seek_start(&mut self) -> Result<(), DecodeError>;
}

/// Fill exactly `count` frames, wrapping to the start of the stream at its end
pub(crate) fn fill_looping<S: FrameStream + ?Sized>(
    stream: &mut S,
    left: &mut [i16],
    right: &mut [i16],
    offset: usize,
    count: usize,
) -> Result<(), DecodeError> {
    let mut written = 0;
    let mut just_rewound = false;

    while written < count {
        let n = stream.read(left, right, offset + written, count - written)?;
        if n == 0 {
            if just_rewound {
                return Err(DecodeError::EmptyStream);
            }
            stream.seek_start()?;
            just_rewound = true;
            continue;
        }
        just_rewound = false;
        written += n;
    }

    Ok(())
}

/// Copy interleaved frames into the ring, duplicating mono to both channels
pub(crate) fn write_frames(
    left: &mut [i16],
    right: &mut [i16],
    offset: usize,
    samples: &[i16],
    channels: usize,
) -> usize {
    let mut frames = 0;
    for frame in samples.chunks_exact(channels) {
        let slot = (offset + frames) & RING_MASK;
        left[slot] = frame[0];
        right[slot] = if channels > 1 { frame[1] } else { frame[0] };
        frames += 1;
    }
    frames
}

// ────────────────────────────────────────────────────────────────────────────
// Decoder
// ────────────────────────────────────────────────────────────────────────────

enum Adapter {
    Pcm(PcmDecoder),
    Streaming(StreamingDecoder),
}

/// Decoder bound to one source
pub struct Decoder {
    adapter: Adapter,
    closed: bool,
}

impl Decoder {
    /// Sniff the data and open the matching adapter
    pub fn open(data: &SampleData) -> Result<Self, FormatError> {
        let adapter = match ContainerFormat::sniff(data.as_bytes()) {
            Some(ContainerFormat::Wave) => Adapter::Pcm(PcmDecoder::open(data)?),
            Some(ContainerFormat::Ogg) => Adapter::Streaming(StreamingDecoder::open(data)?),
            None => return Err(FormatError::Unrecognized),
        };
        Ok(Self {
            adapter,
            closed: false,
        })
    }

    pub fn format(&self) -> ContainerFormat {
        match self.adapter {
            Adapter::Pcm(_) => ContainerFormat::Wave,
            Adapter::Streaming(_) => ContainerFormat::Ogg,
        }
    }

    /// Native sample rate of the encoded audio
    pub fn sample_rate(&self) -> u32 {
        match &self.adapter {
            Adapter::Pcm(pcm) => pcm.sample_rate(),
            Adapter::Streaming(stream) => stream.sample_rate(),
        }
    }

    /// Length of the stream in frames
    pub fn total_frames(&self) -> u64 {
        match &self.adapter {
            Adapter::Pcm(pcm) => pcm.total_frames(),
            Adapter::Streaming(stream) => stream.total_frames(),
        }
    }

    pub fn rewind(&mut self) -> Result<(), DecodeError> {
        self.stream()?.seek_start()
    }

    /// Decode `count` frames into the ring at `offset`, looping at end of stream
    pub fn decode(
        &mut self,
        left: &mut [i16],
        right: &mut [i16],
        offset: usize,
        count: usize,
    ) -> Result<(), DecodeError> {
        fill_looping(self.stream()?, left, right, offset, count)
    }

    /// Release the adapter
    ///
    /// Returns true if this call closed it. The adapter's memory is freed
    /// wherever the decoder itself is dropped.
    pub fn close(&mut self) -> bool {
        !std::mem::replace(&mut self.closed, true)
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn stream(&mut self) -> Result<&mut dyn FrameStream, DecodeError> {
        if self.closed {
            return Err(DecodeError::Closed);
        }
        Ok(match &mut self.adapter {
            Adapter::Pcm(pcm) => pcm as &mut dyn FrameStream,
            Adapter::Streaming(stream) => stream as &mut dyn FrameStream,
        })
    }
}

impl fmt::Debug for Decoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Decoder")
            .field("format", &self.format())
            .field("sample_rate", &self.sample_rate())
            .field("total_frames", &self.total_frames())
            .field("closed", &self.closed)
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod test_util {
    use std::io::Cursor;

    /// Build a 16-bit WAV file in memory
    pub fn wav_bytes(channels: u16, sample_rate: u32, samples: &[i16]) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for &s in samples {
                writer.write_sample(s).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::test_util::wav_bytes;
    use super::*;
    use crate::types::RING_FRAMES;

    /// Stream of `len` frames whose left sample is the frame index
    struct CountingStream {
        len: usize,
        pos: usize,
        chunk: usize,
        seeks: usize,
    }

    impl FrameStream for CountingStream {
        fn read(
            &mut self,
            left: &mut [i16],
            right: &mut [i16],
            offset: usize,
            max: usize,
        ) -> Result<usize, DecodeError> {
            let n = max.min(self.len - self.pos).min(self.chunk);
            for i in 0..n {
                let slot = (offset + i) & RING_MASK;
                left[slot] = (self.pos + i) as i16;
                right[slot] = -((self.pos + i) as i16);
            }
            self.pos += n;
            Ok(n)
        }

        fn seek_start(&mut self) -> Result<(), DecodeError> {
            self.pos = 0;
            self.seeks += 1;
            Ok(())
        }
    }

    #[test]
    fn test_sniff() {
        let mut riff = b"RIFF\0\0\0\0WAVEfmt ".to_vec();
        assert_eq!(ContainerFormat::sniff(&riff), Some(ContainerFormat::Wave));
        riff.truncate(12);
        assert_eq!(ContainerFormat::sniff(&riff), None);

        assert_eq!(ContainerFormat::sniff(b"OggS\0"), Some(ContainerFormat::Ogg));
        assert_eq!(ContainerFormat::sniff(b"OggS"), None);
        assert_eq!(ContainerFormat::sniff(b"ID3\x04\0\0\0\0\0\0\0\0\0"), None);
        assert_eq!(ContainerFormat::sniff(b""), None);
    }

    #[test]
    fn test_open_rejects_unknown_data() {
        let data = SampleData::new(vec![0u8; 64]);
        assert!(matches!(Decoder::open(&data), Err(FormatError::Unrecognized)));
    }

    #[test]
    fn test_open_rejects_corrupt_ogg() {
        let mut bytes = b"OggS".to_vec();
        bytes.extend_from_slice(&[0u8; 60]);
        let data = SampleData::new(bytes);
        assert!(matches!(Decoder::open(&data), Err(FormatError::Stream(_))));
    }

    #[test]
    fn test_short_stream_wraps_seamlessly() {
        let mut stream = CountingStream { len: 100, pos: 0, chunk: 37, seeks: 0 };
        let mut left = vec![0i16; RING_FRAMES];
        let mut right = vec![0i16; RING_FRAMES];

        fill_looping(&mut stream, &mut left, &mut right, 0, 4096).unwrap();

        for i in 0..4096 {
            assert_eq!(left[i], (i % 100) as i16, "frame {i}");
            assert_eq!(right[i], -((i % 100) as i16));
        }
        assert_eq!(stream.seeks, 4096 / 100);
    }

    #[test]
    fn test_fill_wraps_ring_offset() {
        let mut stream = CountingStream { len: 10_000, pos: 0, chunk: usize::MAX, seeks: 0 };
        let mut left = vec![0i16; RING_FRAMES];
        let mut right = vec![0i16; RING_FRAMES];

        fill_looping(&mut stream, &mut left, &mut right, RING_FRAMES - 2, 4).unwrap();

        assert_eq!(left[RING_FRAMES - 2], 0);
        assert_eq!(left[RING_FRAMES - 1], 1);
        assert_eq!(left[0], 2);
        assert_eq!(left[1], 3);
    }

    #[test]
    fn test_empty_stream_is_an_error() {
        let mut stream = CountingStream { len: 0, pos: 0, chunk: 16, seeks: 0 };
        let mut left = vec![0i16; RING_FRAMES];
        let mut right = vec![0i16; RING_FRAMES];

        let result = fill_looping(&mut stream, &mut left, &mut right, 0, 16);
        assert!(matches!(result, Err(DecodeError::EmptyStream)));
    }

    #[test]
    fn test_close_is_idempotent() {
        let data = SampleData::new(wav_bytes(1, 22050, &[1, 2, 3]));
        let mut decoder = Decoder::open(&data).unwrap();
        assert_eq!(decoder.format(), ContainerFormat::Wave);

        assert!(decoder.close());
        assert!(!decoder.close());
        assert!(decoder.is_closed());

        let mut left = vec![0i16; RING_FRAMES];
        let mut right = vec![0i16; RING_FRAMES];
        assert!(matches!(
            decoder.decode(&mut left, &mut right, 0, 4),
            Err(DecodeError::Closed)
        ));
        assert!(matches!(decoder.rewind(), Err(DecodeError::Closed)));
    }

    #[test]
    fn test_sample_data_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        std::fs::write(&path, wav_bytes(2, 44100, &[5, -5])).unwrap();

        let data = SampleData::from_file(&path).unwrap();
        assert_eq!(ContainerFormat::sniff(data.as_bytes()), Some(ContainerFormat::Wave));
        assert!(SampleData::from_file(dir.path().join("missing.wav")).is_err());
    }
}
