//! In-memory motor controller that records every command.

use std::sync::{Arc, Mutex, MutexGuard};

use super::{MotorChannel, MotorOutput};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotorCall {
    pub output: MotorOutput,
    pub scale: u8,
}

#[derive(Debug, Default)]
struct RecordingState {
    unavailable: bool,
    /// Commands after this many calls are not acknowledged.
    fail_after: Option<usize>,
    calls: Vec<MotorCall>,
}

/// Recording motor controller. Clones share state, so a test can keep a
/// handle after boxing one into a dispatcher.
#[derive(Debug, Clone, Default)]
pub struct RecordingMotor {
    state: Arc<Mutex<RecordingState>>,
}

impl RecordingMotor {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RecordingState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_available(&self, available: bool) {
        self.lock().unavailable = !available;
    }

    /// Acknowledge the first `n` commands only.
    pub fn fail_after(&self, n: usize) {
        self.lock().fail_after = Some(n);
    }

    pub fn calls(&self) -> Vec<MotorCall> {
        self.lock().calls.clone()
    }

    pub fn clear(&self) {
        self.lock().calls.clear();
    }
}

impl MotorChannel for RecordingMotor {
    fn is_available(&self) -> bool {
        !self.lock().unavailable
    }

    fn forward(&mut self, output: MotorOutput, scale: u8) -> bool {
        let mut state = self.lock();
        state.calls.push(MotorCall { output, scale });
        match state.fail_after {
            Some(n) => state.calls.len() <= n,
            None => true,
        }
    }
}
