//! Deferred reclamation for memory released on the render thread
//!
//! Sources, their decoders and the encoded bytes behind them are wrapped in
//! `basedrop` pointers. Dropping one on the render thread only enqueues the
//! pointer; the actual free happens on the `mixer-gc` thread, so a
//! `Destroy` applied mid-callback never calls into the allocator.
//!
//! ```ignore
//! use basedrop::Owned;
//! use crate::engine::gc::gc_handle;
//!
//! let node = Owned::new(&gc_handle(), SourceNode::master(4096, atomics));
//! drop(node); // queued, freed on the collector thread
//! ```

use basedrop::{Collector, Handle};
use std::sync::mpsc;
use std::sync::OnceLock;
use std::thread;
use std::time::Duration;

/// How often the collector thread reclaims queued drops
const COLLECT_INTERVAL: Duration = Duration::from_millis(50);

static GC_HANDLE: OnceLock<Handle> = OnceLock::new();

fn init_gc() -> Handle {
    let (tx, rx) = mpsc::channel();

    let spawned = thread::Builder::new()
        .name("mixer-gc".to_string())
        .spawn(move || {
            // Collector is !Sync, so it lives and dies on this thread
            let mut collector = Collector::new();
            if tx.send(collector.handle()).is_err() {
                return;
            }

            log::info!("Mixer GC thread started");

            loop {
                collector.collect();
                thread::sleep(COLLECT_INTERVAL);
            }
        });

    match spawned.ok().and_then(|_| rx.recv().ok()) {
        Some(handle) => handle,
        None => {
            // Without a collector thread, leak the collector so its handle stays
            // valid; queued drops are then simply never reclaimed.
            log::error!("Could not start mixer GC thread; deferred drops will not be reclaimed");
            let collector = Box::leak(Box::new(Collector::new()));
            collector.handle()
        }
    }
}

/// Handle for creating `Owned<T>` / `Shared<T>` allocations
///
/// The collector thread is started on first use.
pub fn gc_handle() -> Handle {
    GC_HANDLE.get_or_init(init_gc).clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use basedrop::Shared;

    #[test]
    fn test_shared_clone_and_drop() {
        let data = Shared::new(&gc_handle(), vec![1u8, 2, 3]);
        let copy = Shared::clone(&data);
        drop(data);
        assert_eq!(copy.as_slice(), &[1, 2, 3]);
    }

    #[test]
    fn test_handle_is_reused() {
        // Two handles from the same global collector can both allocate
        let a = Shared::new(&gc_handle(), 1u32);
        let b = Shared::new(&gc_handle(), 2u32);
        assert_eq!(*a + *b, 3);
    }
}
