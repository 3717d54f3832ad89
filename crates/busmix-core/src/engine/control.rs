//! Mixer - the control side of the engine
//!
//! Hands out [`SourceId`]s, builds sources (decoder, ring, buffers) on the
//! calling thread and forwards every change to the render side as a
//! [`Command`]. It also tracks who routes into whom: a destroyed source stays
//! alive until nothing routes into it, so a live source's destination is
//! always live.

use basedrop::Owned;
use std::sync::Arc;

use super::command::{command_channel, Command, CommandSender};
use super::engine::{EngineConfig, EngineStats, MixEngine, StatsSnapshot};
use super::gc::gc_handle;
use super::source::{SourceAtomics, SourceNode};
use crate::decoder::{Decoder, SampleData};
use crate::error::{MixerError, MixerResult};
use crate::types::{PlaybackState, SourceId};

/// Control-side bookkeeping for one arena slot
#[derive(Default)]
struct Entry {
    generation: u32,
    live: bool,
    /// The owner gave up the handle; freed once `inbound` reaches zero
    released: bool,
    dest: Option<SourceId>,
    /// Live sources routed into this one
    inbound: usize,
    atomics: Option<Arc<SourceAtomics>>,
}

/// Create a paired control handle and render engine
///
/// The master bus exists from the start and is live immediately.
pub fn create_mixer(config: EngineConfig) -> MixerResult<(Mixer, MixEngine)> {
    config.validate()?;

    let (sender, receiver) = command_channel(config.command_queue_capacity);
    let stats = Arc::new(EngineStats::default());

    let master_atomics = Arc::new(SourceAtomics::new());
    let master = Owned::new(
        &gc_handle(),
        SourceNode::master(config.max_frames, Arc::clone(&master_atomics)),
    );
    let engine = MixEngine::new(receiver, master, &config, Arc::clone(&stats));

    let mut entries: Vec<Entry> = (0..config.max_sources).map(|_| Entry::default()).collect();
    entries[SourceId::MASTER.index()] = Entry {
        live: true,
        atomics: Some(master_atomics),
        ..Entry::default()
    };

    // Lowest indices are handed out first
    let free = (1..config.max_sources as u32).rev().collect();

    log::info!(
        "Mixer created: {} Hz, up to {} sources, {} frames per block",
        config.sample_rate,
        config.max_sources,
        config.max_frames
    );

    let mixer = Mixer {
        sender,
        entries,
        free,
        config,
        stats,
    };
    Ok((mixer, engine))
}

/// Control handle for the mixer
///
/// All methods return immediately. Changes take effect at the start of the
/// next audio callback.
pub struct Mixer {
    sender: CommandSender,
    entries: Vec<Entry>,
    free: Vec<u32>,
    config: EngineConfig,
    stats: Arc<EngineStats>,
}

impl Mixer {
    // ─────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────

    /// Decode the header of `data` and create a stopped source routed to master
    pub fn create_source(&mut self, data: &SampleData) -> MixerResult<SourceId> {
        if self.free.is_empty() {
            return Err(MixerError::TooManySources {
                max: self.config.max_sources,
            });
        }
        let decoder = Decoder::open(data)?;
        let index = self.free.pop().ok_or(MixerError::TooManySources {
            max: self.config.max_sources,
        })?;

        let atomics = Arc::new(SourceAtomics::new());
        let node = SourceNode::new(
            decoder,
            self.config.sample_rate,
            self.config.max_frames,
            Arc::clone(&atomics),
        );

        let entry = &mut self.entries[index as usize];
        let id = SourceId::new(index, entry.generation);
        entry.live = true;
        entry.released = false;
        entry.dest = Some(SourceId::MASTER);
        entry.inbound = 0;
        entry.atomics = Some(atomics);
        self.entries[SourceId::MASTER.index()].inbound += 1;

        self.sender.send(Command::Add {
            id,
            node: Owned::new(&gc_handle(), node),
        });
        log::debug!("Created {id}");
        Ok(id)
    }

    /// Give up a source handle
    ///
    /// The source is removed once nothing routes into it. Destroying a stale
    /// handle is a no-op.
    pub fn destroy(&mut self, id: SourceId) -> MixerResult<()> {
        if id.is_master() {
            return Err(MixerError::MasterBus("destroyed"));
        }
        if !self.is_alive(id) {
            log::debug!("Ignoring destroy of stale handle {id}");
            return Ok(());
        }
        self.entries[id.index()].released = true;
        self.try_collect(id.index());
        Ok(())
    }

    /// Free a released source and, in turn, any released destinations it kept alive
    fn try_collect(&mut self, mut index: usize) {
        loop {
            let entry = &mut self.entries[index];
            if !entry.live || !entry.released || entry.inbound > 0 {
                return;
            }

            let id = SourceId::new(index as u32, entry.generation);
            let dest = entry.dest.take();
            entry.live = false;
            entry.released = false;
            entry.atomics = None;
            entry.generation = entry.generation.wrapping_add(1);

            self.sender.send(Command::Destroy { id });
            self.free.push(index as u32);
            log::debug!("Destroyed {id}");

            match dest {
                Some(dest) => {
                    let target = &mut self.entries[dest.index()];
                    target.inbound = target.inbound.saturating_sub(1);
                    index = dest.index();
                }
                None => return,
            }
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Transport
    // ─────────────────────────────────────────────────────────────

    /// Start playback; `reset` rewinds a paused source instead of resuming it
    pub fn play(&mut self, id: SourceId, reset: bool) {
        self.send_live(id, Command::Play { id, reset });
    }

    /// Toggle between playing and paused
    pub fn pause(&mut self, id: SourceId) {
        self.send_live(id, Command::Pause { id });
    }

    pub fn stop(&mut self, id: SourceId) {
        self.send_live(id, Command::Stop { id });
    }

    /// State as of the last audio callback; stale handles read as stopped
    pub fn state(&self, id: SourceId) -> PlaybackState {
        self.atomics(id)
            .map_or(PlaybackState::Stopped, |a| a.state())
    }

    /// Playback position in frames of the source's native rate
    pub fn position(&self, id: SourceId) -> f64 {
        self.atomics(id).map_or(0.0, |a| a.position())
    }

    // ─────────────────────────────────────────────────────────────
    // Parameters
    // ─────────────────────────────────────────────────────────────

    pub fn set_gain(&mut self, id: SourceId, gain: f64) {
        self.send_live(id, Command::SetGain { id, gain });
    }

    /// Stereo pan in `[-1, 1]`; values outside are clamped
    pub fn set_pan(&mut self, id: SourceId, pan: f64) {
        self.send_live(id, Command::SetPan { id, pan });
    }

    /// Playback rate multiplier; 1.0 plays at the source's native pitch
    pub fn set_rate(&mut self, id: SourceId, rate: f64) {
        self.send_live(id, Command::SetRate { id, rate });
    }

    pub fn set_loop(&mut self, id: SourceId, looping: bool) {
        self.send_live(id, Command::SetLoop { id, looping });
    }

    /// Route a source into another source, or into nothing
    ///
    /// Rejects rerouting the master bus, stale handles and routes that would
    /// form a cycle.
    pub fn set_destination(&mut self, id: SourceId, dest: Option<SourceId>) -> MixerResult<()> {
        if id.is_master() {
            return Err(MixerError::MasterBus("rerouted"));
        }
        if !self.is_alive(id) {
            return Err(MixerError::StaleHandle(id));
        }
        if let Some(dest) = dest {
            if !self.is_alive(dest) {
                return Err(MixerError::StaleHandle(dest));
            }
            if self.reaches(dest, id) {
                return Err(MixerError::RoutingCycle { from: id, to: dest });
            }
        }

        let old = std::mem::replace(&mut self.entries[id.index()].dest, dest);
        if let Some(dest) = dest {
            self.entries[dest.index()].inbound += 1;
        }
        self.sender.send(Command::SetDestination { id, dest });

        if let Some(old) = old {
            let entry = &mut self.entries[old.index()];
            entry.inbound = entry.inbound.saturating_sub(1);
            self.try_collect(old.index());
        }
        Ok(())
    }

    /// Current destination as seen by the control side
    pub fn destination(&self, id: SourceId) -> Option<SourceId> {
        if self.is_alive(id) {
            self.entries[id.index()].dest
        } else {
            None
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────

    pub fn master(&self) -> SourceId {
        SourceId::MASTER
    }

    /// Whether `id` names a source whose handle has not been given up
    pub fn is_alive(&self, id: SourceId) -> bool {
        self.entries.get(id.index()).map_or(false, |e| {
            e.live && !e.released && e.generation == id.generation()
        })
    }

    /// Whether any source other than master was playing at the last callback
    pub fn any_playing(&self) -> bool {
        self.entries
            .iter()
            .skip(1)
            .filter(|e| e.live)
            .filter_map(|e| e.atomics.as_deref())
            .any(|a| a.state() == PlaybackState::Playing)
    }

    /// Push backlogged commands into the ring; returns how many still wait
    ///
    /// Optional: the engine also takes the backlog itself at its next callback.
    pub fn flush(&mut self) -> usize {
        self.sender.flush()
    }

    /// Commands waiting for room in the ring
    pub fn pending_commands(&self) -> usize {
        self.sender.pending()
    }

    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    fn atomics(&self, id: SourceId) -> Option<&SourceAtomics> {
        let entry = self.entries.get(id.index())?;
        if entry.live && entry.generation == id.generation() {
            entry.atomics.as_deref()
        } else {
            None
        }
    }

    fn send_live(&mut self, id: SourceId, command: Command) {
        if self.is_alive(id) {
            self.sender.send(command);
        } else {
            log::debug!("Ignoring {} for stale handle {id}", command.name());
        }
    }

    /// Whether following destinations from `from` reaches `target`
    fn reaches(&self, from: SourceId, target: SourceId) -> bool {
        let mut current = Some(from);
        while let Some(id) = current {
            if id == target {
                return true;
            }
            current = self.entries[id.index()].dest;
        }
        false
    }
}
