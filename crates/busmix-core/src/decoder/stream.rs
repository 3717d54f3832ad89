//! Ogg Vorbis adapter
//!
//! Decodes packet by packet while the source plays. The unconsumed tail of
//! the last decoded packet stays in the sample buffer until the next read
//! asks for it.
//!
//! The sample buffer is sized once at open from the codec's largest packet,
//! so reads and rewinds on the audio thread never grow it. A rewind that the
//! container cannot perform is a [`DecodeError::Seek`], which stops the
//! source; the stream is only reopened while counting frames at open.

use std::io::{self, Cursor};

use symphonia::core::audio::{SampleBuffer, SignalSpec};
use symphonia::core::codecs::{Decoder as CodecDecoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::default::formats::OggReader;

use super::{write_frames, FrameStream, SampleData};
use crate::error::{DecodeError, FormatError};

/// Packet size used when the codec doesn't report one (the largest Vorbis block)
const DEFAULT_PACKET_FRAMES: u64 = 8192;

/// Container reader plus codec for one pass over the stream
struct OpenStream {
    reader: Box<dyn FormatReader>,
    codec: Box<dyn CodecDecoder>,
    track_id: u32,
    spec: SignalSpec,
    n_frames: Option<u64>,
    max_packet_frames: u64,
}

impl OpenStream {
    fn open(data: &SampleData) -> Result<Self, FormatError> {
        let source = Cursor::new(data.clone());
        let mss = MediaSourceStream::new(Box::new(source), Default::default());

        let reader: Box<dyn FormatReader> = Box::new(
            OggReader::try_new(mss, &FormatOptions::default())
                .map_err(|e| FormatError::Stream(e.to_string()))?,
        );

        let track = reader
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| FormatError::Stream("no audio track".to_string()))?;

        let params = track.codec_params.clone();
        let track_id = track.id;

        let layout = params
            .channels
            .ok_or_else(|| FormatError::Stream("unknown channel layout".to_string()))?;
        if !(1..=2).contains(&layout.count()) {
            return Err(FormatError::UnsupportedChannels(layout.count()));
        }
        let sample_rate = params
            .sample_rate
            .ok_or_else(|| FormatError::Stream("unknown sample rate".to_string()))?;

        let codec = symphonia::default::get_codecs()
            .make(&params, &DecoderOptions::default())
            .map_err(|e| FormatError::Stream(e.to_string()))?;

        Ok(Self {
            reader,
            codec,
            track_id,
            spec: SignalSpec::new(sample_rate, layout),
            n_frames: params.n_frames,
            max_packet_frames: params.max_frames_per_packet.unwrap_or(DEFAULT_PACKET_FRAMES),
        })
    }

    fn channels(&self) -> usize {
        self.spec.channels.count()
    }

    /// Seek back to the first packet and clear the codec's overlap state
    fn rewind(&mut self) -> Result<(), DecodeError> {
        let track_id = self.track_id;
        self.reader
            .seek(SeekMode::Accurate, SeekTo::TimeStamp { ts: 0, track_id })
            .map_err(|e| DecodeError::Seek(e.to_string()))?;
        self.codec.reset();
        Ok(())
    }
}

/// Incremental Ogg Vorbis decoder
pub struct StreamingDecoder {
    data: SampleData,
    stream: OpenStream,
    total_frames: u64,
    /// Interleaved samples of the current packet
    samples: SampleBuffer<i16>,
    /// Next unread sample in `samples`
    pending_pos: usize,
}

impl StreamingDecoder {
    pub fn open(data: &SampleData) -> Result<Self, FormatError> {
        let stream = OpenStream::open(data)?;
        let n_frames = stream.n_frames;
        let samples = SampleBuffer::new(stream.max_packet_frames, stream.spec);

        let mut decoder = Self {
            data: data.clone(),
            stream,
            total_frames: 0,
            samples,
            pending_pos: 0,
        };

        decoder.total_frames = match n_frames {
            Some(n) => n,
            None => decoder
                .count_frames()
                .map_err(|e| FormatError::Stream(e.to_string()))?,
        };
        if decoder.total_frames == 0 {
            return Err(FormatError::Empty);
        }

        log::debug!(
            "Opened Ogg stream: {} Hz, {} channel(s), {} frames, {}-frame packets",
            decoder.stream.spec.rate,
            decoder.stream.channels(),
            decoder.total_frames,
            decoder.stream.max_packet_frames
        );

        Ok(decoder)
    }

    pub fn sample_rate(&self) -> u32 {
        self.stream.spec.rate
    }

    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    /// Length from a full decode pass, for containers that don't report it
    fn count_frames(&mut self) -> Result<u64, DecodeError> {
        let channels = self.stream.channels();
        let mut frames = 0u64;
        while self.next_packet()? {
            frames += (self.samples.len() / channels) as u64;
        }

        self.samples.clear();
        self.pending_pos = 0;
        if let Err(e) = self.stream.rewind() {
            log::debug!("{e}, reopening stream after counting frames");
            self.stream =
                OpenStream::open(&self.data).map_err(|e| DecodeError::Seek(e.to_string()))?;
        }
        Ok(frames)
    }

    /// Decode the next packet of our track into `samples`
    ///
    /// Returns false at end of stream.
    fn next_packet(&mut self) -> Result<bool, DecodeError> {
        let channels = self.stream.channels();
        let stream = &mut self.stream;
        loop {
            let packet = match stream.reader.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    return Ok(false);
                }
                Err(SymphoniaError::ResetRequired) => {
                    stream.codec.reset();
                    continue;
                }
                Err(e) => return Err(DecodeError::Codec(e.to_string())),
            };

            if packet.track_id() != stream.track_id {
                continue;
            }

            let decoded = match stream.codec.decode(&packet) {
                Ok(decoded) => decoded,
                // Corrupt packet: skip it and keep going
                Err(SymphoniaError::DecodeError(e)) => {
                    log::warn!("Skipping undecodable packet: {e}");
                    continue;
                }
                Err(e) => return Err(DecodeError::Codec(e.to_string())),
            };

            let frames = decoded.frames();
            if frames == 0 {
                continue;
            }
            let capacity = self.samples.capacity() / channels;
            if frames > capacity {
                return Err(DecodeError::PacketTooLarge { frames, capacity });
            }

            self.samples.copy_interleaved_ref(decoded);
            self.pending_pos = 0;
            return Ok(true);
        }
    }
}

impl FrameStream for StreamingDecoder {
    fn read(
        &mut self,
        left: &mut [i16],
        right: &mut [i16],
        offset: usize,
        max: usize,
    ) -> Result<usize, DecodeError> {
        let channels = self.stream.channels();
        let mut written = 0;

        while written < max {
            if self.pending_pos >= self.samples.len() {
                if !self.next_packet()? {
                    break;
                }
                continue;
            }

            let available = (self.samples.len() - self.pending_pos) / channels;
            let n = available.min(max - written);
            let end = self.pending_pos + n * channels;
            write_frames(
                left,
                right,
                offset + written,
                &self.samples.samples()[self.pending_pos..end],
                channels,
            );
            self.pending_pos = end;
            written += n;
        }

        Ok(written)
    }

    fn seek_start(&mut self) -> Result<(), DecodeError> {
        self.samples.clear();
        self.pending_pos = 0;
        self.stream.rewind()
    }
}

#[cfg(test)]
mod tests {
    use super::super::{fill_looping, ContainerFormat, Decoder};
    use super::*;
    use crate::engine::{create_mixer, EngineConfig};
    use crate::types::{PlaybackState, RING_FRAMES};

    /// 640 mono frames at 44.1 kHz in 256-sample blocks, written by
    /// `testdata/make_pulse.py`
    const PULSE_OGG: &[u8] = include_bytes!("testdata/pulse.ogg");
    const PULSE_FRAMES: usize = 640;

    fn pulse() -> SampleData {
        SampleData::new(PULSE_OGG.to_vec())
    }

    fn ring() -> (Vec<i16>, Vec<i16>) {
        (vec![0; RING_FRAMES], vec![0; RING_FRAMES])
    }

    #[test]
    fn test_open_reports_rate_and_length() {
        let decoder = StreamingDecoder::open(&pulse()).unwrap();
        assert_eq!(decoder.sample_rate(), 44100);
        assert_eq!(decoder.total_frames(), PULSE_FRAMES as u64);
        assert!(decoder.samples.capacity() >= 128);

        let decoder = Decoder::open(&pulse()).unwrap();
        assert_eq!(decoder.format(), ContainerFormat::Ogg);
        assert_eq!(decoder.total_frames(), PULSE_FRAMES as u64);
    }

    #[test]
    fn test_single_pass_matches_reported_length() {
        let mut decoder = StreamingDecoder::open(&pulse()).unwrap();
        let (mut left, mut right) = ring();

        let mut frames = 0;
        loop {
            let n = decoder.read(&mut left, &mut right, frames, 100).unwrap();
            if n == 0 {
                break;
            }
            frames += n;
        }
        assert_eq!(frames, PULSE_FRAMES);
        assert!(left[..frames].iter().any(|&s| s != 0));
        // Mono is duplicated
        assert_eq!(left[..frames], right[..frames]);
    }

    #[test]
    fn test_decode_wraps_past_the_end() {
        let mut decoder = Decoder::open(&pulse()).unwrap();
        let (mut left, mut right) = ring();

        decoder.decode(&mut left, &mut right, 0, 4096).unwrap();

        for t in 0..(4096 - PULSE_FRAMES) {
            assert_eq!(left[t], left[t + PULSE_FRAMES], "frame {t}");
        }
        assert!(left[..PULSE_FRAMES].iter().any(|&s| s != 0));
    }

    #[test]
    fn test_rewind_restarts_from_first_frame() {
        let mut decoder = Decoder::open(&pulse()).unwrap();
        let (mut first, mut right) = ring();
        decoder.decode(&mut first, &mut right, 0, 300).unwrap();

        // Stop mid-packet, then rewind
        let (mut scratch, mut scratch_right) = ring();
        decoder.decode(&mut scratch, &mut scratch_right, 0, 77).unwrap();
        decoder.rewind().unwrap();

        let (mut again, mut right) = ring();
        decoder.decode(&mut again, &mut right, 0, 300).unwrap();
        assert_eq!(first[..300], again[..300]);
    }

    #[test]
    fn test_buffer_is_not_regrown_while_playing() {
        let mut decoder = StreamingDecoder::open(&pulse()).unwrap();
        let capacity = decoder.samples.capacity();
        let (mut left, mut right) = ring();

        for _ in 0..5 {
            fill_looping(&mut decoder, &mut left, &mut right, 0, 1000).unwrap();
            decoder.seek_start().unwrap();
        }
        assert_eq!(decoder.samples.capacity(), capacity);
    }

    #[test]
    fn test_looping_source_renders_through_mixer() {
        let (mut mixer, mut engine) = create_mixer(EngineConfig {
            sample_rate: 44100,
            max_sources: 4,
            command_queue_capacity: 16,
            max_frames: 512,
        })
        .unwrap();
        let id = mixer.create_source(&pulse()).unwrap();
        mixer.set_loop(id, true);
        mixer.play(id, true);

        let mut out = vec![0i16; 4096 * 2];
        engine.render(&mut out);
        let left: Vec<i16> = out.iter().step_by(2).copied().collect();

        assert!(left.iter().any(|&s| s != 0));
        for t in 0..(4096 - PULSE_FRAMES) {
            assert_eq!(left[t], left[t + PULSE_FRAMES], "frame {t}");
        }
        assert_eq!(mixer.state(id), PlaybackState::Playing);
        assert_eq!(mixer.stats().callbacks, 1);
    }
}
