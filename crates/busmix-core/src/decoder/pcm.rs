//! RIFF/WAVE adapter
//!
//! The whole file is decoded to 16-bit samples when the source is created, so
//! reads in the audio callback are plain copies.

use std::io::Cursor;

use super::{write_frames, FrameStream, SampleData};
use crate::error::{DecodeError, FormatError};

/// Decoded 16-bit PCM with a read cursor
pub struct PcmDecoder {
    samples: Vec<i16>,
    channels: usize,
    sample_rate: u32,
    cursor: usize,
}

impl PcmDecoder {
    pub fn open(data: &SampleData) -> Result<Self, FormatError> {
        let reader = hound::WavReader::new(Cursor::new(data.as_bytes()))?;
        let spec = reader.spec();

        if spec.sample_format != hound::SampleFormat::Int {
            return Err(FormatError::UnsupportedSampleFormat);
        }
        if spec.bits_per_sample != 16 {
            return Err(FormatError::UnsupportedBitDepth(spec.bits_per_sample));
        }
        let channels = spec.channels as usize;
        if !(1..=2).contains(&channels) {
            return Err(FormatError::UnsupportedChannels(channels));
        }

        let samples = reader
            .into_samples::<i16>()
            .collect::<Result<Vec<_>, _>>()?;
        if samples.len() < channels {
            return Err(FormatError::Empty);
        }

        log::debug!(
            "Opened WAV: {} Hz, {} channel(s), {} frames",
            spec.sample_rate,
            channels,
            samples.len() / channels
        );

        Ok(Self {
            samples,
            channels,
            sample_rate: spec.sample_rate,
            cursor: 0,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn total_frames(&self) -> u64 {
        (self.samples.len() / self.channels) as u64
    }
}

impl FrameStream for PcmDecoder {
    fn read(
        &mut self,
        left: &mut [i16],
        right: &mut [i16],
        offset: usize,
        max: usize,
    ) -> Result<usize, DecodeError> {
        let total = self.samples.len() / self.channels;
        let n = max.min(total - self.cursor);
        let start = self.cursor * self.channels;
        let end = start + n * self.channels;
        write_frames(left, right, offset, &self.samples[start..end], self.channels);
        self.cursor += n;
        Ok(n)
    }

    fn seek_start(&mut self) -> Result<(), DecodeError> {
        self.cursor = 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_util::wav_bytes;
    use super::super::{fill_looping, Decoder};
    use super::*;
    use crate::types::RING_FRAMES;
    use std::io::Cursor;

    fn ring() -> (Vec<i16>, Vec<i16>) {
        (vec![0; RING_FRAMES], vec![0; RING_FRAMES])
    }

    #[test]
    fn test_stereo_frames_split_into_channels() {
        let data = SampleData::new(wav_bytes(2, 48000, &[1, -1, 2, -2, 3, -3]));
        let mut pcm = PcmDecoder::open(&data).unwrap();
        assert_eq!(pcm.sample_rate(), 48000);
        assert_eq!(pcm.total_frames(), 3);

        let (mut left, mut right) = ring();
        assert_eq!(pcm.read(&mut left, &mut right, 10, 8).unwrap(), 3);
        assert_eq!(&left[10..13], &[1, 2, 3]);
        assert_eq!(&right[10..13], &[-1, -2, -3]);
        // Exhausted until rewound
        assert_eq!(pcm.read(&mut left, &mut right, 13, 8).unwrap(), 0);
    }

    #[test]
    fn test_mono_is_duplicated() {
        let data = SampleData::new(wav_bytes(1, 22050, &[7, 8, 9, 10]));
        let mut decoder = Decoder::open(&data).unwrap();
        assert_eq!(decoder.total_frames(), 4);

        let (mut left, mut right) = ring();
        decoder.decode(&mut left, &mut right, 0, 10).unwrap();
        assert_eq!(&left[..10], &[7, 8, 9, 10, 7, 8, 9, 10, 7, 8]);
        assert_eq!(left[..10], right[..10]);
    }

    #[test]
    fn test_rewind_restarts_stream() {
        let data = SampleData::new(wav_bytes(1, 8000, &[1, 2, 3, 4, 5]));
        let mut pcm = PcmDecoder::open(&data).unwrap();
        let (mut left, mut right) = ring();

        fill_looping(&mut pcm, &mut left, &mut right, 0, 3).unwrap();
        pcm.seek_start().unwrap();
        fill_looping(&mut pcm, &mut left, &mut right, 3, 3).unwrap();
        assert_eq!(&left[..6], &[1, 2, 3, 1, 2, 3]);
    }

    #[test]
    fn test_rejects_non_16_bit() {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 44100,
            bits_per_sample: 24,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            writer.write_sample(1000i32).unwrap();
            writer.finalize().unwrap();
        }
        let data = SampleData::new(cursor.into_inner());
        assert!(matches!(
            PcmDecoder::open(&data),
            Err(FormatError::UnsupportedBitDepth(24))
        ));
    }

    #[test]
    fn test_rejects_float_samples() {
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 44100,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            writer.write_sample(0.5f32).unwrap();
            writer.write_sample(-0.5f32).unwrap();
            writer.finalize().unwrap();
        }
        let data = SampleData::new(cursor.into_inner());
        assert!(matches!(
            PcmDecoder::open(&data),
            Err(FormatError::UnsupportedSampleFormat)
        ));
    }

    #[test]
    fn test_rejects_many_channels_and_empty_data() {
        let data = SampleData::new(wav_bytes(4, 44100, &[0; 8]));
        assert!(matches!(
            PcmDecoder::open(&data),
            Err(FormatError::UnsupportedChannels(4))
        ));

        let data = SampleData::new(wav_bytes(2, 44100, &[]));
        assert!(matches!(PcmDecoder::open(&data), Err(FormatError::Empty)));
    }

    #[test]
    fn test_truncated_header_is_wav_error() {
        let mut bytes = wav_bytes(1, 44100, &[1, 2, 3]);
        bytes.truncate(20);
        let data = SampleData::new(bytes);
        assert!(matches!(PcmDecoder::open(&data), Err(FormatError::Wav(_))));
    }
}
