//! The callbacks through which the core reaches its host.

use std::time::Duration;

/// Interface the embedding program hands to [`crate::vm::Machine::run_tic`].
///
/// The core never sleeps: when a frame is ready it reports the delay the
/// game asked for and lets the host pace itself.
pub trait Host {
    /// `buffer_index` should be presented next, after waiting `delay`.
    fn video_frame_ready(&mut self, buffer_index: usize, delay: Duration);

    /// A draw touched `buffer_index`. Useful for debugging overlays.
    fn video_buffer_changed(&mut self, _buffer_index: usize) {}

    /// A mixed PCM buffer is available, for hosts that prefer pushed audio
    /// over pulling from the mixer themselves.
    fn audio_ready(&mut self, _samples: &[i8]) {}
}

/// Host that discards every notification. Handy for tests and headless
/// runs.
pub struct NullHost;

impl Host for NullHost {
    fn video_frame_ready(&mut self, _buffer_index: usize, _delay: Duration) {}
}
