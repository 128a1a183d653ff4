//! Observer interface for controller outcomes.

/// Receives operator-facing controller events. Every method defaults to a
/// no-op so observers implement only what they display.
pub trait ControllerEvents {
    /// A user checkpoint was reached; `index` counts from the start of the
    /// whole path, including segments finished before a pause.
    fn on_checkpoint_passed(&mut self, _index: usize) {}

    fn on_operation_complete(&mut self) {}

    /// The operation was stopped for safety.
    fn on_abort(&mut self, _reason: &str) {}

    fn on_log_message(&mut self, _text: &str) {}
}

/// Observer that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEvents;

impl ControllerEvents for NoopEvents {}

/// Observer that records every event in order of arrival.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventLog {
    pub checkpoints: Vec<usize>,
    pub completions: usize,
    pub aborts: Vec<String>,
    pub messages: Vec<String>,
}

impl ControllerEvents for EventLog {
    fn on_checkpoint_passed(&mut self, index: usize) {
        self.checkpoints.push(index);
    }

    fn on_operation_complete(&mut self) {
        self.completions += 1;
    }

    fn on_abort(&mut self, reason: &str) {
        self.aborts.push(reason.to_string());
    }

    fn on_log_message(&mut self, text: &str) {
        self.messages.push(text.to_string());
    }
}

impl<T: ControllerEvents + ?Sized> ControllerEvents for &mut T {
    fn on_checkpoint_passed(&mut self, index: usize) {
        (**self).on_checkpoint_passed(index);
    }

    fn on_operation_complete(&mut self) {
        (**self).on_operation_complete();
    }

    fn on_abort(&mut self, reason: &str) {
        (**self).on_abort(reason);
    }

    fn on_log_message(&mut self, text: &str) {
        (**self).on_log_message(text);
    }
}
