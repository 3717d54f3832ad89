//! Source - one node of the mixing graph
//!
//! A source owns a decoder, a fixed-point read cursor into a ring of raw
//! decoded frames, and an interleaved `i32` output buffer. Each callback it
//! resamples its stream into the output buffer (on top of whatever its
//! inputs wrote there), applies its gains and passes the result on to its
//! destination.

use std::sync::atomic::{AtomicI64, AtomicU8, Ordering};
use std::sync::Arc;

use crate::decoder::Decoder;
use crate::error::DecodeError;
use crate::fixed::{lerp, Fixed};
use crate::types::{PlaybackState, SourceId, DECODE_CHUNK_FRAMES, RING_FRAMES, RING_MASK};

/// Source state the control context can read without a lock
///
/// Written by the render thread after every render, read by the control
/// thread. Relaxed ordering is sufficient: each value is independent.
#[derive(Debug)]
pub struct SourceAtomics {
    state: AtomicU8,
    /// Raw fixed-point playback position in frames
    position: AtomicI64,
}

impl SourceAtomics {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(PlaybackState::Stopped as u8),
            position: AtomicI64::new(0),
        }
    }

    #[inline]
    pub fn state(&self) -> PlaybackState {
        PlaybackState::from_u8(self.state.load(Ordering::Relaxed))
    }

    /// Playback position in (fractional) frames of the source's own rate
    #[inline]
    pub fn position(&self) -> f64 {
        Fixed::from_raw(self.position.load(Ordering::Relaxed)).to_f64()
    }

    #[inline]
    fn publish(&self, state: PlaybackState, position: Fixed) {
        self.state.store(state as u8, Ordering::Relaxed);
        self.position.store(position.raw(), Ordering::Relaxed);
    }
}

impl Default for SourceAtomics {
    fn default() -> Self {
        Self::new()
    }
}

/// Derived left/right channel gains for a raw gain and pan
///
/// Pan is clamped to `[-1, 1]` and gain to `>= 0` (NaN counts as 0). Each
/// channel's linear gain is squared before conversion to fixed point.
pub fn channel_gains(gain: f64, pan: f64) -> (Fixed, Fixed) {
    let pan = if pan.is_nan() { 0.0 } else { pan.clamp(-1.0, 1.0) };
    let gain = if gain > 0.0 { gain } else { 0.0 };

    let left = if pan < 0.0 { 1.0 } else { 1.0 - pan } * gain;
    let right = if pan > 0.0 { 1.0 } else { 1.0 + pan } * gain;

    (Fixed::from_f64(left * left), Fixed::from_f64(right * right))
}

/// Render-side state of one source
pub(crate) struct SourceNode {
    decoder: Option<Decoder>,
    state: PlaybackState,

    // Transport, in frames of the source's native rate
    position: Fixed,
    rate: Fixed,
    /// Native rate divided by the engine rate
    base_rate: f64,
    /// Frame index at which looping or stopping is evaluated
    end: i64,
    /// One past the last frame decoded into the ring
    buf_end: i64,
    length: i64,
    looping: bool,

    gain: f64,
    pan: f64,
    lgain: Fixed,
    rgain: Fixed,

    raw_left: Box<[i16]>,
    raw_right: Box<[i16]>,
    /// Interleaved stereo, `2 * max_frames` samples
    output: Box<[i32]>,

    dest: Option<SourceId>,
    /// Next write into this buffer overwrites instead of accumulating
    replace: bool,

    atomics: Arc<SourceAtomics>,
}

impl SourceNode {
    /// Build a source around an opened decoder, routed to the master bus
    pub(crate) fn new(
        decoder: Decoder,
        engine_rate: u32,
        max_frames: usize,
        atomics: Arc<SourceAtomics>,
    ) -> Self {
        let base_rate = decoder.sample_rate() as f64 / engine_rate as f64;
        let length = decoder.total_frames().min(i64::MAX as u64) as i64;

        let mut node = Self::bus(max_frames, atomics);
        node.base_rate = base_rate;
        node.rate = Fixed::from_f64(base_rate);
        node.length = length;
        node.end = length;
        node.decoder = Some(decoder);
        node.dest = Some(SourceId::MASTER);
        node
    }

    /// The master bus: no decoder, no destination
    pub(crate) fn master(max_frames: usize, atomics: Arc<SourceAtomics>) -> Self {
        Self::bus(max_frames, atomics)
    }

    fn bus(max_frames: usize, atomics: Arc<SourceAtomics>) -> Self {
        let (lgain, rgain) = channel_gains(1.0, 0.0);
        Self {
            decoder: None,
            state: PlaybackState::Stopped,
            position: Fixed::ZERO,
            rate: Fixed::ZERO,
            base_rate: 0.0,
            end: 0,
            buf_end: 0,
            length: 0,
            looping: false,
            gain: 1.0,
            pan: 0.0,
            lgain,
            rgain,
            raw_left: vec![0; RING_FRAMES].into_boxed_slice(),
            raw_right: vec![0; RING_FRAMES].into_boxed_slice(),
            output: vec![0; max_frames * 2].into_boxed_slice(),
            dest: None,
            replace: true,
            atomics,
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Command application
    // ─────────────────────────────────────────────────────────────

    /// Start playing, rewinding when stopped or when `reset` is set
    pub(crate) fn play(&mut self, reset: bool) {
        if reset || self.state == PlaybackState::Stopped {
            if let Err(e) = self.rewind() {
                log::warn!("Could not rewind source: {e}");
                self.state = PlaybackState::Stopped;
                return;
            }
        }
        self.state = PlaybackState::Playing;
    }

    /// Toggle between playing and paused; no-op when stopped
    pub(crate) fn pause(&mut self) {
        self.state = match self.state {
            PlaybackState::Playing => PlaybackState::Paused,
            PlaybackState::Paused => PlaybackState::Playing,
            PlaybackState::Stopped => PlaybackState::Stopped,
        };
    }

    pub(crate) fn stop(&mut self) {
        self.state = PlaybackState::Stopped;
    }

    pub(crate) fn set_gain(&mut self, gain: f64) {
        self.gain = gain;
        self.recalc_gains();
    }

    pub(crate) fn set_pan(&mut self, pan: f64) {
        self.pan = pan;
        self.recalc_gains();
    }

    /// Scale the native-to-engine rate ratio; negative multipliers count as 0
    pub(crate) fn set_rate(&mut self, multiplier: f64) {
        self.rate = Fixed::from_f64(self.base_rate * multiplier.max(0.0));
    }

    pub(crate) fn set_loop(&mut self, looping: bool) {
        self.looping = looping;
    }

    pub(crate) fn set_destination(&mut self, dest: Option<SourceId>) {
        self.dest = dest;
    }

    pub(crate) fn destination(&self) -> Option<SourceId> {
        self.dest
    }

    /// Close the decoder; returns true the first time
    pub(crate) fn close(&mut self) -> bool {
        self.state = PlaybackState::Stopped;
        self.decoder.as_mut().map_or(false, |d| d.close())
    }

    fn recalc_gains(&mut self) {
        let (lgain, rgain) = channel_gains(self.gain, self.pan);
        self.lgain = lgain;
        self.rgain = rgain;
    }

    fn rewind(&mut self) -> Result<(), DecodeError> {
        if let Some(decoder) = self.decoder.as_mut() {
            decoder.rewind()?;
            decoder.decode(&mut self.raw_left, &mut self.raw_right, 0, DECODE_CHUNK_FRAMES)?;
        }
        self.position = Fixed::ZERO;
        self.end = self.length;
        self.buf_end = DECODE_CHUNK_FRAMES as i64;
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────
    // Rendering
    // ─────────────────────────────────────────────────────────────

    /// Render `frames` frames into the output buffer and apply gains
    pub(crate) fn render(&mut self, frames: usize) {
        let out = &mut self.output[..frames * 2];
        if self.replace {
            out.fill(0);
        }

        if self.state == PlaybackState::Playing {
            if let Some(decoder) = self.decoder.as_mut() {
                'frames: for frame in out.chunks_exact_mut(2) {
                    let index = self.position.floor();

                    // Rates above one chunk per frame need more than one refill
                    while index + 1 >= self.buf_end {
                        let offset = self.buf_end as usize & RING_MASK;
                        if let Err(e) = decoder.decode(
                            &mut self.raw_left,
                            &mut self.raw_right,
                            offset,
                            DECODE_CHUNK_FRAMES,
                        ) {
                            log::warn!("Decoder failed, stopping source: {e}");
                            self.state = PlaybackState::Stopped;
                            break 'frames;
                        }
                        self.buf_end += DECODE_CHUNK_FRAMES as i64;
                    }

                    if index >= self.end {
                        if !self.looping {
                            self.state = PlaybackState::Stopped;
                            break;
                        }
                        // The ring is filled in a loop, so the next pass just starts here
                        self.end = index + self.length;
                    }

                    let frac = self.position.frac();
                    let a = index as usize & RING_MASK;
                    let b = (index + 1) as usize & RING_MASK;
                    let left = lerp(self.raw_left[a] as i32, self.raw_left[b] as i32, frac);
                    let right = lerp(self.raw_right[a] as i32, self.raw_right[b] as i32, frac);
                    frame[0] = frame[0].saturating_add(left);
                    frame[1] = frame[1].saturating_add(right);

                    self.position += self.rate;
                }
            }
        }

        for frame in out.chunks_exact_mut(2) {
            frame[0] = self.lgain.mul_sample(frame[0]);
            frame[1] = self.rgain.mul_sample(frame[1]);
        }
    }

    /// Write this source's rendered frames into its destination
    pub(crate) fn mix_into(&self, dest: &mut SourceNode, frames: usize) {
        let src = &self.output[..frames * 2];
        let dst = &mut dest.output[..frames * 2];
        if dest.replace {
            dst.copy_from_slice(src);
            dest.replace = false;
        } else {
            for (d, s) in dst.iter_mut().zip(src) {
                *d = d.saturating_add(*s);
            }
        }
    }

    /// End of this source's render step
    pub(crate) fn finish_render(&mut self) {
        self.replace = true;
        self.atomics.publish(self.state, self.position);
    }

    /// Publish state after a command changed it outside of rendering
    pub(crate) fn publish(&self) {
        self.atomics.publish(self.state, self.position);
    }

    /// Rendered frames from the last render step
    pub(crate) fn output(&self, frames: usize) -> &[i32] {
        &self.output[..frames * 2]
    }

    pub(crate) fn state(&self) -> PlaybackState {
        self.state
    }

    pub(crate) fn max_frames(&self) -> usize {
        self.output.len() / 2
    }
}
