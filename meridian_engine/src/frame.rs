//! Frame context - explicit frames-in-flight state
//!
//! The renderer advances one `FrameContext` per frame and passes it by
//! reference to everything that needs to know which in-flight slot is
//! current (binding tables, material application). There is no global
//! frame accessor; code that needs the frame receives it.

/// Current frame state, threaded explicitly through per-frame operations.
#[derive(Debug, Clone)]
pub struct FrameContext {
    /// Monotonically increasing frame counter
    frame_number: u64,

    /// Current in-flight slot, always `frame_number % frames_in_flight`
    slot: u32,

    /// Number of frames in flight (fixed at creation)
    frames_in_flight: u32,
}

impl FrameContext {
    /// Create a frame context starting at frame 0, slot 0.
    ///
    /// `frames_in_flight` must be at least 1.
    pub fn new(frames_in_flight: u32) -> Self {
        assert!(frames_in_flight >= 1, "frames_in_flight must be >= 1");
        Self {
            frame_number: 0,
            slot: 0,
            frames_in_flight,
        }
    }

    /// Advance to the next frame, rotating the in-flight slot
    pub fn advance(&mut self) {
        self.frame_number += 1;
        self.slot = (self.frame_number % self.frames_in_flight as u64) as u32;
    }

    /// Current in-flight slot in `0..frames_in_flight`
    pub fn slot(&self) -> u32 {
        self.slot
    }

    /// Monotonic frame counter since creation
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    /// Number of frames in flight
    pub fn frames_in_flight(&self) -> u32 {
        self.frames_in_flight
    }
}

#[cfg(test)]
#[path = "frame_tests.rs"]
mod tests;
