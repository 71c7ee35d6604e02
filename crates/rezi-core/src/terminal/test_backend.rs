//! In-memory backend for testing.

use std::collections::VecDeque;

use crate::error::{Result, ReziCoreError};

use super::{Backend, PolledBytes, TerminalCaps};

/// In-memory terminal backend for testing.
///
/// Input bytes are scripted with [`TestBackend::push_input`]; submitted
/// drawlists are captured for inspection. A drain-control knob simulates
/// output backpressure.
#[derive(Debug)]
pub struct TestBackend {
    size: (u16, u16),
    caps: TerminalCaps,
    started: bool,
    stopped: bool,
    disposed: bool,
    input: VecDeque<Vec<u8>>,
    frames: Vec<Vec<u8>>,
    drained: bool,
    user_events: Vec<(u32, Vec<u8>)>,
}

impl TestBackend {
    /// Create a test backend with the given size.
    pub fn new(cols: u16, rows: u16) -> Self {
        Self {
            size: (cols, rows),
            caps: TerminalCaps::default(),
            started: false,
            stopped: false,
            disposed: false,
            input: VecDeque::new(),
            frames: Vec::new(),
            drained: true,
            user_events: Vec::new(),
        }
    }

    /// Script a chunk of input bytes for the next poll.
    pub fn push_input(&mut self, bytes: impl Into<Vec<u8>>) {
        self.input.push_back(bytes.into());
    }

    /// Drawlists submitted so far, oldest first.
    pub fn frames(&self) -> &[Vec<u8>] {
        &self.frames
    }

    /// Number of frames submitted.
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// User events posted so far.
    pub fn user_events(&self) -> &[(u32, Vec<u8>)] {
        &self.user_events
    }

    /// Simulate output backpressure: subsequent frames report not drained.
    pub fn set_drained(&mut self, drained: bool) {
        self.drained = drained;
    }

    /// Simulate a terminal resize.
    pub fn set_size(&mut self, cols: u16, rows: u16) {
        self.size = (cols, rows);
    }

    /// Whether the backend was started and not stopped.
    pub fn is_running(&self) -> bool {
        self.started && !self.stopped
    }

    fn check_running(&self) -> Result<()> {
        if self.disposed {
            return Err(ReziCoreError::InvalidState("backend disposed".into()));
        }
        if self.stopped || !self.started {
            return Err(ReziCoreError::Stopped);
        }
        Ok(())
    }
}

impl Backend for TestBackend {
    fn start(&mut self) -> Result<()> {
        if self.disposed {
            return Err(ReziCoreError::InvalidState("backend disposed".into()));
        }
        self.started = true;
        self.stopped = false;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.stopped = true;
        Ok(())
    }

    fn dispose(&mut self) {
        self.stopped = true;
        self.disposed = true;
        self.input.clear();
    }

    fn request_frame(&mut self, drawlist: &[u8]) -> Result<bool> {
        self.check_running()?;
        self.frames.push(drawlist.to_vec());
        Ok(self.drained)
    }

    fn poll_events(&mut self) -> Result<Option<PolledBytes>> {
        self.check_running()?;
        Ok(self.input.pop_front().map(|bytes| PolledBytes { bytes }))
    }

    fn poll_drained(&mut self) -> bool {
        self.drained
    }

    fn post_user_event(&mut self, tag: u32, payload: Vec<u8>) -> Result<()> {
        self.check_running()?;
        self.user_events.push((tag, payload));
        Ok(())
    }

    fn take_user_events(&mut self) -> Vec<(u32, Vec<u8>)> {
        std::mem::take(&mut self.user_events)
    }

    fn caps(&self) -> &TerminalCaps {
        &self.caps
    }

    fn size(&self) -> Result<(u16, u16)> {
        Ok(self.size)
    }
}
