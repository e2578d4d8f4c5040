//! Deferred frees for sample buffers
//!
//! Every buffer a voice plays is wrapped in `basedrop::Shared`. A voice that
//! finishes on the output callback drops its reference there, which only
//! enqueues the node; the free itself runs on the "clipdeck-gc" thread. A
//! take of several minutes is tens of megabytes, and returning that to the
//! allocator inside the callback would glitch the monitor.
//!
//! ```ignore
//! use basedrop::Shared;
//! use clipdeck_core::engine::gc::gc_handle;
//!
//! let sample = Shared::new(&gc_handle(), buffer);
//! drop(sample); // freed on the collector thread
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::OnceLock;
use std::thread;
use std::time::Duration;

use basedrop::{Collector, Handle};

/// Collector sweep period
///
/// A voice released by `Engine::stop_voice` is freed within one sweep plus
/// its stop fade.
const COLLECT_INTERVAL: Duration = Duration::from_millis(50);

/// The collector is !Sync and stays on its thread; only handles leave it
static GC_HANDLE: OnceLock<Handle> = OnceLock::new();

/// Allocations alive after the last sweep
static LIVE_ALLOCATIONS: AtomicUsize = AtomicUsize::new(0);

fn spawn_collector() -> Handle {
    let (handle_tx, handle_rx) = mpsc::sync_channel(1);

    thread::Builder::new()
        .name("clipdeck-gc".to_string())
        .spawn(move || {
            let mut collector = Collector::new();
            handle_tx
                .send(collector.handle())
                .expect("GC handle receiver gone");
            log::info!("gc: collector running every {:?}", COLLECT_INTERVAL);

            let mut last_live = 0;
            loop {
                collector.collect();
                let live = collector.alloc_count();
                LIVE_ALLOCATIONS.store(live, Ordering::Relaxed);
                if live != last_live {
                    log::debug!("gc: {} sample buffers alive", live);
                    last_live = live;
                }
                thread::sleep(COLLECT_INTERVAL);
            }
        })
        .expect("Failed to spawn GC thread");

    handle_rx.recv().expect("GC thread exited before handing out a handle")
}

/// Handle for wrapping buffers in `Shared`
///
/// Starts the collector thread on first use.
pub fn gc_handle() -> Handle {
    GC_HANDLE.get_or_init(spawn_collector).clone()
}

/// Shared allocations still alive as of the collector's last sweep
pub fn live_allocations() -> usize {
    LIVE_ALLOCATIONS.load(Ordering::Relaxed)
}
