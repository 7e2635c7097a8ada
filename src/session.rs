use serde::Serialize;

/// Whether the box currently has an outstanding streaming request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum SessionState {
    #[default]
    Idle,
    Streaming,
}

/// Acquisition state plus the number of responses still owed by a bounded request
#[derive(Debug, Default)]
pub(crate) struct Session {
    state: SessionState,
    remaining: Option<u32>,
}

impl Session {
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// A REQUEST went out; `count == 0` means the box streams until STOP
    pub fn begin(&mut self, count: u32) {
        self.state = SessionState::Streaming;
        self.remaining = if count == 0 { None } else { Some(count) };
    }

    /// One response of the current request was consumed
    pub fn consumed(&mut self) {
        match self.remaining {
            Some(1) => self.end(),
            Some(left) => self.remaining = Some(left - 1),
            None => {}
        }
    }

    pub fn end(&mut self) {
        self.state = SessionState::Idle;
        self.remaining = None;
    }
}
