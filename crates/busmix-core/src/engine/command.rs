//! Lock-free command queue from the control context to the render context
//!
//! Every mutation of a live source travels through here. The control side
//! pushes into a bounded `rtrb` ring; the render side drains it once per
//! callback and applies commands in arrival order.
//!
//! When the ring is full, commands spill into a shared backlog. While the
//! backlog is non-empty every new command joins it, so everything in the
//! ring is older than everything in the backlog. The render side takes the
//! backlog with `try_lock` after emptying the ring; if the control side
//! happens to hold the lock, the spill waits for the next callback.
//!
//! ```ignore
//! let (mut tx, mut rx) = command_channel(COMMAND_QUEUE_CAPACITY);
//!
//! // Control thread
//! tx.send(Command::Play { id, reset: true });
//!
//! // Audio thread
//! rx.drain(|cmd| { /* apply */ });
//! ```

use basedrop::Owned;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};

use super::source::SourceNode;
use crate::types::SourceId;

/// Commands sent from the control context to the render context
pub(crate) enum Command {
    // ─────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────
    /// Insert a fully built source into its arena slot
    ///
    /// The node is allocated on the control thread; only the pointer
    /// crosses the queue.
    Add { id: SourceId, node: Owned<SourceNode> },
    /// Remove a source from the live set and close its decoder
    Destroy { id: SourceId },

    // ─────────────────────────────────────────────────────────────
    // Transport
    // ─────────────────────────────────────────────────────────────
    /// Start playback; `reset` rewinds even when paused
    Play { id: SourceId, reset: bool },
    /// Toggle between playing and paused
    Pause { id: SourceId },
    Stop { id: SourceId },

    // ─────────────────────────────────────────────────────────────
    // Parameters
    // ─────────────────────────────────────────────────────────────
    SetDestination { id: SourceId, dest: Option<SourceId> },
    SetGain { id: SourceId, gain: f64 },
    SetPan { id: SourceId, pan: f64 },
    /// Playback rate multiplier relative to the source's native rate
    SetRate { id: SourceId, rate: f64 },
    SetLoop { id: SourceId, looping: bool },
}

impl Command {
    /// Source the command targets
    pub(crate) fn target(&self) -> SourceId {
        match *self {
            Command::Add { id, .. }
            | Command::Destroy { id }
            | Command::Play { id, .. }
            | Command::Pause { id }
            | Command::Stop { id }
            | Command::SetDestination { id, .. }
            | Command::SetGain { id, .. }
            | Command::SetPan { id, .. }
            | Command::SetRate { id, .. }
            | Command::SetLoop { id, .. } => id,
        }
    }

    pub(crate) fn name(&self) -> &'static str {
        match self {
            Command::Add { .. } => "add",
            Command::Destroy { .. } => "destroy",
            Command::Play { .. } => "play",
            Command::Pause { .. } => "pause",
            Command::Stop { .. } => "stop",
            Command::SetDestination { .. } => "set_destination",
            Command::SetGain { .. } => "set_gain",
            Command::SetPan { .. } => "set_pan",
            Command::SetRate { .. } => "set_rate",
            Command::SetLoop { .. } => "set_loop",
        }
    }
}

/// Default capacity of the command ring
///
/// Sized for bursts such as creating and configuring a few hundred sources
/// between two callbacks. Overflow goes to the backlog, not to the floor.
pub const COMMAND_QUEUE_CAPACITY: usize = 1024;

/// Commands that did not fit in the ring
///
/// `spilled` mirrors "backlog is non-empty" and is only written with the
/// lock held, so the fast paths on both sides skip the lock entirely.
struct Spill {
    backlog: Mutex<VecDeque<Command>>,
    spilled: AtomicBool,
}

impl Spill {
    fn is_spilled(&self) -> bool {
        self.spilled.load(Ordering::Acquire)
    }

    fn set_spilled(&self, spilled: bool) {
        self.spilled.store(spilled, Ordering::Release);
    }

    /// Blocking lock for the control side
    fn lock(&self) -> MutexGuard<'_, VecDeque<Command>> {
        self.backlog.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Non-blocking lock for the render side
    fn try_lock(&self) -> Option<MutexGuard<'_, VecDeque<Command>>> {
        match self.backlog.try_lock() {
            Ok(guard) => Some(guard),
            Err(TryLockError::Poisoned(poisoned)) => Some(poisoned.into_inner()),
            Err(TryLockError::WouldBlock) => None,
        }
    }
}

/// Control-side end of the command queue
pub(crate) struct CommandSender {
    producer: rtrb::Producer<Command>,
    spill: Arc<Spill>,
}

impl CommandSender {
    /// Queue a command behind everything sent before it
    pub(crate) fn send(&mut self, command: Command) {
        let command = if self.spill.is_spilled() {
            command
        } else {
            match self.producer.push(command) {
                Ok(()) => return,
                Err(rtrb::PushError::Full(command)) => command,
            }
        };

        let mut backlog = self.spill.lock();
        move_into_ring(&mut self.producer, &mut backlog);
        if backlog.is_empty() {
            if let Err(rtrb::PushError::Full(command)) = self.producer.push(command) {
                log::debug!("Command ring full, deferring {}", command.name());
                backlog.push_back(command);
            }
        } else {
            backlog.push_back(command);
        }
        self.spill.set_spilled(!backlog.is_empty());
    }

    /// Move backlogged commands into the ring while there is room
    ///
    /// Returns the number of commands still waiting. The render side also
    /// drains the backlog on its own, so calling this is never required.
    pub(crate) fn flush(&mut self) -> usize {
        if !self.spill.is_spilled() {
            return 0;
        }
        let mut backlog = self.spill.lock();
        move_into_ring(&mut self.producer, &mut backlog);
        self.spill.set_spilled(!backlog.is_empty());
        backlog.len()
    }

    /// Commands waiting in the backlog
    pub(crate) fn pending(&self) -> usize {
        if self.spill.is_spilled() {
            self.spill.lock().len()
        } else {
            0
        }
    }
}

fn move_into_ring(producer: &mut rtrb::Producer<Command>, backlog: &mut VecDeque<Command>) {
    while let Some(command) = backlog.pop_front() {
        if let Err(rtrb::PushError::Full(command)) = producer.push(command) {
            backlog.push_front(command);
            break;
        }
    }
}

/// Render-side end of the command queue
pub(crate) struct CommandReceiver {
    consumer: rtrb::Consumer<Command>,
    spill: Arc<Spill>,
}

impl CommandReceiver {
    /// Hand every queued command to `apply`, oldest first
    ///
    /// Takes the readable ring contents, then the backlog if one exists and
    /// its lock is free. Never allocates or blocks.
    pub(crate) fn drain(&mut self, mut apply: impl FnMut(Command)) {
        let count = self.consumer.slots();
        for _ in 0..count {
            match self.consumer.pop() {
                Ok(command) => apply(command),
                Err(_) => break,
            }
        }

        if !self.spill.is_spilled() {
            return;
        }
        let Some(mut backlog) = self.spill.try_lock() else {
            log::trace!("Command backlog busy, leaving it for the next callback");
            return;
        };
        // While spilled, nothing new enters the ring, so it is older than the backlog
        while let Ok(command) = self.consumer.pop() {
            apply(command);
        }
        while let Some(command) = backlog.pop_front() {
            apply(command);
        }
        self.spill.set_spilled(false);
    }
}

/// Create a command queue with room for `capacity` commands in the ring
pub(crate) fn command_channel(capacity: usize) -> (CommandSender, CommandReceiver) {
    let (producer, consumer) = rtrb::RingBuffer::new(capacity);
    let spill = Arc::new(Spill {
        backlog: Mutex::new(VecDeque::new()),
        spilled: AtomicBool::new(false),
    });
    (
        CommandSender {
            producer,
            spill: Arc::clone(&spill),
        },
        CommandReceiver { consumer, spill },
    )
}
