//! MixEngine - the render side of the mixer
//!
//! Owns every live source in a fixed arena. Once per callback it drains the
//! command queue, renders all sources newest-first so each one has written
//! into its destination before that destination renders, and exposes the
//! master bus buffer.
//!
//! Nothing here allocates, blocks or frees: arena and order list are sized
//! up front, and removed sources go to the GC thread.

use basedrop::Owned;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::command::{Command, CommandReceiver};
use super::source::SourceNode;
use crate::error::{MixerError, MixerResult};
use crate::types::SourceId;

/// Largest `max_frames`; matches the largest device buffer
pub const MAX_BLOCK_FRAMES: usize = crate::audio::MAX_BUFFER_SIZE;

/// Largest `max_sources`, master bus included
pub const MAX_SOURCES: usize = 4096;

/// Largest `command_queue_capacity`
pub const MAX_COMMAND_QUEUE_CAPACITY: usize = 1 << 16;

/// Engine construction parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Output sample rate in Hz; sources are resampled to it
    pub sample_rate: u32,
    /// Arena capacity, including the master bus
    pub max_sources: usize,
    /// Commands the ring holds before spilling into the backlog
    pub command_queue_capacity: usize,
    /// Largest block rendered in one step; bigger callbacks are split
    pub max_frames: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            max_sources: 256,
            command_queue_capacity: super::command::COMMAND_QUEUE_CAPACITY,
            max_frames: 4096,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> MixerResult<()> {
        if self.sample_rate == 0 {
            return Err(MixerError::InvalidConfig("sample_rate must be positive".into()));
        }
        if self.max_sources < 2 {
            return Err(MixerError::InvalidConfig(
                "max_sources must leave room for at least one source besides master".into(),
            ));
        }
        if self.max_sources > MAX_SOURCES {
            return Err(MixerError::InvalidConfig(format!(
                "max_sources must be at most {MAX_SOURCES}"
            )));
        }
        if !(1..=MAX_COMMAND_QUEUE_CAPACITY).contains(&self.command_queue_capacity) {
            return Err(MixerError::InvalidConfig(format!(
                "command_queue_capacity must be between 1 and {MAX_COMMAND_QUEUE_CAPACITY}"
            )));
        }
        if !(1..=MAX_BLOCK_FRAMES).contains(&self.max_frames) {
            return Err(MixerError::InvalidConfig(format!(
                "max_frames must be between 1 and {MAX_BLOCK_FRAMES}"
            )));
        }
        Ok(())
    }
}

/// Engine counters shared with the control context
#[derive(Debug, Default)]
pub struct EngineStats {
    sources_added: AtomicU64,
    sources_released: AtomicU64,
    commands_applied: AtomicU64,
    commands_dropped: AtomicU64,
    callbacks: AtomicU64,
}

/// Point-in-time copy of [`EngineStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub sources_added: u64,
    pub sources_released: u64,
    pub commands_applied: u64,
    pub commands_dropped: u64,
    pub callbacks: u64,
}

impl EngineStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            sources_added: self.sources_added.load(Ordering::Relaxed),
            sources_released: self.sources_released.load(Ordering::Relaxed),
            commands_applied: self.commands_applied.load(Ordering::Relaxed),
            commands_dropped: self.commands_dropped.load(Ordering::Relaxed),
            callbacks: self.callbacks.load(Ordering::Relaxed),
        }
    }

    #[inline]
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

struct Slot {
    generation: u32,
    node: Option<Owned<SourceNode>>,
}

/// Render-side mixer
///
/// Move this into the audio callback. The paired [`Mixer`](super::Mixer)
/// stays on the control thread.
pub struct MixEngine {
    slots: Vec<Slot>,
    /// Live slot indices in creation order; master first
    order: Vec<u32>,
    /// Taken out only while draining, so commands can be applied to `self`
    commands: Option<CommandReceiver>,
    max_frames: usize,
    /// Frames rendered by the last `process` call
    last_frames: usize,
    stats: Arc<EngineStats>,
}

impl MixEngine {
    pub(crate) fn new(
        commands: CommandReceiver,
        master: Owned<SourceNode>,
        config: &EngineConfig,
        stats: Arc<EngineStats>,
    ) -> Self {
        let mut slots: Vec<Slot> = (0..config.max_sources)
            .map(|_| Slot {
                generation: 0,
                node: None,
            })
            .collect();
        slots[SourceId::MASTER.index()].node = Some(master);

        let mut order = Vec::with_capacity(config.max_sources);
        order.push(SourceId::MASTER.index() as u32);

        Self {
            slots,
            order,
            commands: Some(commands),
            max_frames: config.max_frames,
            last_frames: 0,
            stats,
        }
    }

    /// Apply every queued command, in order
    ///
    /// Commands pushed while draining wait for the next call.
    pub fn process_commands(&mut self) {
        if let Some(mut commands) = self.commands.take() {
            commands.drain(|command| self.apply(command));
            self.commands = Some(commands);
        }
    }

    /// Render one block of at most `max_frames` frames through the graph
    ///
    /// Returns the number of frames rendered.
    pub fn process(&mut self, frames: usize) -> usize {
        let frames = frames.min(self.max_frames);

        for k in (0..self.order.len()).rev() {
            let index = self.order[k] as usize;

            let dest = match self.slots[index].node.as_mut() {
                Some(node) => {
                    node.render(frames);
                    node.destination()
                }
                None => continue,
            };

            if let Some(dest) = dest.filter(|d| d.index() != index && self.is_live(*d)) {
                let (src, dst) = pair_mut(&mut self.slots, index, dest.index());
                if let (Some(src), Some(dst)) = (src.node.as_ref(), dst.node.as_mut()) {
                    src.mix_into(dst, frames);
                }
            }

            if let Some(node) = self.slots[index].node.as_mut() {
                node.finish_render();
            }
        }

        self.last_frames = frames;
        frames
    }

    /// Drain the queue once, then fill an interleaved stereo buffer from master
    ///
    /// Samples are clamped to the `i16` range. A trailing odd sample is zeroed.
    pub fn render(&mut self, out: &mut [i16]) {
        self.begin_callback();

        for chunk in out.chunks_mut(self.max_frames * 2) {
            let frames = self.process(chunk.len() / 2);
            let master = self.master_output();
            for (dst, &src) in chunk.iter_mut().zip(master) {
                *dst = clamp_i16(src);
            }
            chunk[frames * 2..].fill(0);
        }
    }

    /// Start of an audio callback: drain the command queue once
    ///
    /// Callers that drive [`process`](Self::process) themselves call this
    /// once per hardware callback.
    pub fn begin_callback(&mut self) {
        self.process_commands();
        EngineStats::bump(&self.stats.callbacks);
    }

    /// Master bus samples from the last `process` call (interleaved stereo)
    pub fn master_output(&self) -> &[i32] {
        match self.slots[SourceId::MASTER.index()].node.as_ref() {
            Some(master) => master.output(self.last_frames),
            None => &[],
        }
    }

    pub fn max_frames(&self) -> usize {
        self.max_frames
    }

    /// Number of live sources, master included
    pub fn live_sources(&self) -> usize {
        self.order.len()
    }

    fn is_live(&self, id: SourceId) -> bool {
        self.slots
            .get(id.index())
            .map_or(false, |s| s.generation == id.generation() && s.node.is_some())
    }

    fn live_mut(&mut self, id: SourceId) -> Option<&mut SourceNode> {
        let slot = self.slots.get_mut(id.index())?;
        if slot.generation != id.generation() {
            return None;
        }
        slot.node.as_deref_mut()
    }

    /// Whether following destinations from `from` reaches `target`
    fn reaches(&self, from: SourceId, target: SourceId) -> bool {
        let mut current = Some(from);
        // Bounded walk: a chain can't be longer than the arena
        for _ in 0..self.slots.len() {
            match current {
                Some(id) if id == target => return true,
                Some(id) => {
                    current = self.slots[id.index()]
                        .node
                        .as_ref()
                        .and_then(|n| n.destination());
                }
                None => return false,
            }
        }
        true
    }

    fn apply(&mut self, command: Command) {
        let id = command.target();
        let applied = match command {
            Command::Add { id, node } => self.add(id, node),
            Command::Destroy { id } => self.destroy(id),
            Command::SetDestination { id, dest } => {
                let valid = !id.is_master()
                    && dest.map_or(true, |d| self.is_live(d) && !self.reaches(d, id));
                valid && self.with_live(id, |n| n.set_destination(dest))
            }
            Command::Play { id, reset } => self.with_live(id, |n| n.play(reset)),
            Command::Pause { id } => self.with_live(id, |n| n.pause()),
            Command::Stop { id } => self.with_live(id, |n| n.stop()),
            Command::SetGain { id, gain } => self.with_live(id, |n| n.set_gain(gain)),
            Command::SetPan { id, pan } => self.with_live(id, |n| n.set_pan(pan)),
            Command::SetRate { id, rate } => self.with_live(id, |n| n.set_rate(rate)),
            Command::SetLoop { id, looping } => self.with_live(id, |n| n.set_loop(looping)),
        };

        if applied {
            EngineStats::bump(&self.stats.commands_applied);
        } else {
            log::trace!("Dropped command for {id}");
            EngineStats::bump(&self.stats.commands_dropped);
        }
    }

    fn with_live(&mut self, id: SourceId, f: impl FnOnce(&mut SourceNode)) -> bool {
        match self.live_mut(id) {
            Some(node) => {
                f(node);
                node.publish();
                true
            }
            None => false,
        }
    }

    fn add(&mut self, id: SourceId, node: Owned<SourceNode>) -> bool {
        let Some(slot) = self.slots.get_mut(id.index()) else {
            return false;
        };
        if id.is_master() || slot.node.is_some() || node.max_frames() < self.max_frames {
            // Rejected node is reclaimed on the GC thread
            return false;
        }
        slot.generation = id.generation();
        slot.node = Some(node);
        self.order.push(id.index() as u32);
        EngineStats::bump(&self.stats.sources_added);
        true
    }

    fn destroy(&mut self, id: SourceId) -> bool {
        if id.is_master() {
            return false;
        }
        let Some(node) = self.live_mut(id) else {
            return false;
        };
        node.close();
        node.publish();

        let index = id.index();
        // Dropping the Owned pointer hands the node to the GC thread
        self.slots[index].node = None;
        self.order.retain(|&i| i as usize != index);
        EngineStats::bump(&self.stats.sources_released);
        true
    }
}

/// Clamp a mixed sample to the 16-bit output range
#[inline]
pub fn clamp_i16(sample: i32) -> i16 {
    sample.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

/// Mutable references to two distinct elements
fn pair_mut<T>(items: &mut [T], a: usize, b: usize) -> (&mut T, &mut T) {
    debug_assert_ne!(a, b);
    if a < b {
        let (lo, hi) = items.split_at_mut(b);
        (&mut lo[a], &mut hi[0])
    } else {
        let (lo, hi) = items.split_at_mut(a);
        (&mut hi[0], &mut lo[b])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_configs() {
        let bad = [
            EngineConfig { sample_rate: 0, ..Default::default() },
            EngineConfig { max_sources: 1, ..Default::default() },
            EngineConfig { command_queue_capacity: 0, ..Default::default() },
            EngineConfig { max_frames: 0, ..Default::default() },
        ];
        for config in bad {
            assert!(matches!(config.validate(), Err(MixerError::InvalidConfig(_))));
        }
    }

    #[test]
    fn test_oversized_configs_are_rejected_before_allocating() {
        let bad = [
            EngineConfig { max_frames: usize::MAX / 2, ..Default::default() },
            EngineConfig { max_frames: MAX_BLOCK_FRAMES + 1, ..Default::default() },
            EngineConfig { max_sources: usize::MAX, ..Default::default() },
            EngineConfig { max_sources: MAX_SOURCES + 1, ..Default::default() },
            EngineConfig { command_queue_capacity: usize::MAX, ..Default::default() },
        ];
        for config in bad {
            assert!(matches!(
                crate::engine::create_mixer(config),
                Err(MixerError::InvalidConfig(_))
            ));
        }

        let largest = EngineConfig {
            max_frames: MAX_BLOCK_FRAMES,
            max_sources: MAX_SOURCES,
            command_queue_capacity: MAX_COMMAND_QUEUE_CAPACITY,
            ..Default::default()
        };
        assert!(largest.validate().is_ok());
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: EngineConfig = serde_yaml::from_str("sample_rate: 48000\n").unwrap();
        assert_eq!(config.sample_rate, 48000);
        assert_eq!(config.max_sources, EngineConfig::default().max_sources);
    }

    #[test]
    fn test_clamp_i16() {
        assert_eq!(clamp_i16(40000), i16::MAX);
        assert_eq!(clamp_i16(-40000), i16::MIN);
        assert_eq!(clamp_i16(-123), -123);
    }

    #[test]
    fn test_pair_mut() {
        let mut items = [1, 2, 3, 4];
        let (a, b) = pair_mut(&mut items, 3, 1);
        std::mem::swap(a, b);
        assert_eq!(items, [1, 4, 3, 2]);
    }
}
