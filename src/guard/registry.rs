//! Running-container registry.
//!
//! Records the images of containers this process has started so the
//! interrupt sweep knows what to kill. The orchestration code is the only
//! writer, the interrupt guard the only reader.

use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Deserialize;
use tracing::{debug, trace};

/// How many spawned images the registry remembers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingMode {
    /// Single slot holding the most recently registered image. Only the
    /// interrupt sweep clears it.
    Latest,
    /// Every image with at least one container that has not exited yet.
    #[default]
    AllLive,
}

/// Image name plus the number of live registrations for it.
#[derive(Debug)]
struct Entry {
    image: String,
    live: usize,
}

#[derive(Debug, Default)]
struct Slots {
    // Insertion ordered
    entries: Vec<Entry>,
    closed: bool,
}

/// Process-wide record of spawned container images.
///
/// Constructed once at startup and shared through an `Arc` with the
/// container runner and the interrupt guard. The lock is only held for the
/// duration of a single read or write, and a poisoned lock is recovered so
/// the interrupt path can never panic on it.
///
/// Once [`close`](Self::close) has been called the registry refuses new
/// registrations, so nothing can be started behind the sweep's back.
#[derive(Debug)]
pub struct ContainerRegistry {
    mode: TrackingMode,
    slots: Mutex<Slots>,
}

impl Default for ContainerRegistry {
    fn default() -> Self {
        Self::new(TrackingMode::default())
    }
}

impl ContainerRegistry {
    pub const fn new(mode: TrackingMode) -> Self {
        Self {
            mode,
            slots: Mutex::new(Slots {
                entries: Vec::new(),
                closed: false,
            }),
        }
    }

    pub const fn mode(&self) -> TrackingMode {
        self.mode
    }

    fn slots(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record an image about to be started. Call before spawning.
    ///
    /// Returns `false` once the registry is closed; the caller must not start
    /// the container then.
    pub fn register(&self, image: impl Into<String>) -> bool {
        let image = image.into();
        let mut slots = self.slots();
        if slots.closed {
            debug!(image = %image, "Registry closed, refusing container image");
            return false;
        }
        trace!(image = %image, mode = ?self.mode, "Registering container image");

        match self.mode {
            TrackingMode::Latest => {
                slots.entries.clear();
                slots.entries.push(Entry { image, live: 1 });
            }
            TrackingMode::AllLive => {
                if let Some(entry) = slots.entries.iter_mut().find(|e| e.image == image) {
                    entry.live += 1;
                } else {
                    slots.entries.push(Entry { image, live: 1 });
                }
            }
        }
        true
    }

    /// Forget one registration of `image` after its container exited normally.
    ///
    /// No-op in [`TrackingMode::Latest`], where the slot keeps the last
    /// started image until the sweep takes it.
    pub fn release(&self, image: &str) {
        if self.mode == TrackingMode::Latest {
            return;
        }

        let mut slots = self.slots();
        let Some(idx) = slots.entries.iter().position(|e| e.image == image) else {
            return;
        };

        slots.entries[idx].live = slots.entries[idx].live.saturating_sub(1);
        if slots.entries[idx].live == 0 {
            slots.entries.remove(idx);
            trace!(image = %image, "Released container image");
        }
    }

    /// Snapshot of the tracked images, oldest first.
    pub fn images(&self) -> Vec<String> {
        self.slots().entries.iter().map(|e| e.image.clone()).collect()
    }

    /// Refuse further registrations and take every tracked image.
    ///
    /// Closing and draining happen under one lock, so an image is either
    /// returned here or its registration is refused.
    pub fn close(&self) -> Vec<String> {
        let mut slots = self.slots();
        slots.closed = true;
        slots.entries.drain(..).map(|e| e.image).collect()
    }

    pub fn is_closed(&self) -> bool {
        self.slots().closed
    }

    pub fn is_empty(&self) -> bool {
        self.slots().entries.is_empty()
    }
}
