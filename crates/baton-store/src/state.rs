use serde::{Deserialize, Serialize};

/// Kind of a flow run or task run state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateKind {
  Pending,
  Scheduled,
  Submitted,
  Queued,
  Retrying,
  Running,
  Success,
  /// Finished by fanning out into one child task run per mapped element.
  Mapped,
  Skipped,
  Failed,
  TimedOut,
  Cancelled,
}

impl StateKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      StateKind::Pending => "Pending",
      StateKind::Scheduled => "Scheduled",
      StateKind::Submitted => "Submitted",
      StateKind::Queued => "Queued",
      StateKind::Retrying => "Retrying",
      StateKind::Running => "Running",
      StateKind::Success => "Success",
      StateKind::Mapped => "Mapped",
      StateKind::Skipped => "Skipped",
      StateKind::Failed => "Failed",
      StateKind::TimedOut => "TimedOut",
      StateKind::Cancelled => "Cancelled",
    }
  }
}

/// State of a flow run or task run, with an optional message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct State {
  #[serde(rename = "type")]
  pub kind: StateKind,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub message: Option<String>,
}

impl State {
  pub fn new(kind: StateKind) -> Self {
    Self {
      kind,
      message: None,
    }
  }

  pub fn with_message(kind: StateKind, message: impl Into<String>) -> Self {
    Self {
      kind,
      message: Some(message.into()),
    }
  }

  pub fn scheduled() -> Self {
    Self::new(StateKind::Scheduled)
  }

  pub fn running() -> Self {
    Self::new(StateKind::Running)
  }

  pub fn success() -> Self {
    Self::new(StateKind::Success)
  }

  pub fn mapped() -> Self {
    Self::new(StateKind::Mapped)
  }

  pub fn failed(message: impl Into<String>) -> Self {
    Self::with_message(StateKind::Failed, message)
  }

  pub fn cancelled(message: impl Into<String>) -> Self {
    Self::with_message(StateKind::Cancelled, message)
  }

  pub fn is_running(&self) -> bool {
    matches!(self.kind, StateKind::Running)
  }

  /// Whether the state is terminal.
  pub fn is_finished(&self) -> bool {
    matches!(
      self.kind,
      StateKind::Success
        | StateKind::Mapped
        | StateKind::Skipped
        | StateKind::Failed
        | StateKind::TimedOut
        | StateKind::Cancelled
    )
  }

  pub fn is_mapped(&self) -> bool {
    matches!(self.kind, StateKind::Mapped)
  }

  pub fn is_failed(&self) -> bool {
    matches!(self.kind, StateKind::Failed | StateKind::TimedOut)
  }

  pub fn is_successful(&self) -> bool {
    matches!(
      self.kind,
      StateKind::Success | StateKind::Mapped | StateKind::Skipped
    )
  }

  pub fn is_scheduled(&self) -> bool {
    matches!(self.kind, StateKind::Scheduled | StateKind::Retrying)
  }

  /// Not started yet: neither running nor finished.
  pub fn is_pending(&self) -> bool {
    !self.is_running() && !self.is_finished()
  }
}

impl std::fmt::Display for State {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match &self.message {
      Some(message) => write!(f, "{}({:?})", self.kind.as_str(), message),
      None => write!(f, "{}", self.kind.as_str()),
    }
  }
}
