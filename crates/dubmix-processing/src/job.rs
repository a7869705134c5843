//! Merge job state machine.

use crate::error::MergeFailure;
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeState {
    Pending,
    Fetching,
    Composing,
    ThumbnailExtracting,
    Publishing,
    Recording,
    Done,
    /// Terminal failure with its reason code.
    Failed(String),
}

impl MergeState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, MergeState::Done | MergeState::Failed(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            MergeState::Pending => "pending",
            MergeState::Fetching => "fetching",
            MergeState::Composing => "composing",
            MergeState::ThumbnailExtracting => "thumbnail_extracting",
            MergeState::Publishing => "publishing",
            MergeState::Recording => "recording",
            MergeState::Done => "done",
            MergeState::Failed(_) => "failed",
        }
    }

    fn can_advance_to(&self, next: &MergeState) -> bool {
        use MergeState::*;
        match (self, next) {
            (s, Failed(_)) => !s.is_terminal(),
            (Pending, Fetching)
            | (Fetching, Composing)
            | (Composing, ThumbnailExtracting)
            | (ThumbnailExtracting, Publishing)
            | (ThumbnailExtracting, Done)
            | (Publishing, Recording)
            | (Recording, Done) => true,
            _ => false,
        }
    }
}

impl fmt::Display for MergeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MergeState::Failed(reason) => write!(f, "failed({})", reason),
            other => f.write_str(other.name()),
        }
    }
}

/// One merge run. Lives only while the pipeline executes.
#[derive(Debug)]
pub struct MergeJob {
    pub id: Uuid,
    state: MergeState,
}

impl MergeJob {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            state: MergeState::Pending,
        }
    }

    pub fn state(&self) -> &MergeState {
        &self.state
    }

    pub fn advance(&mut self, next: MergeState) -> Result<(), MergeFailure> {
        if !self.state.can_advance_to(&next) {
            return Err(MergeFailure::Internal(format!(
                "Illegal merge transition {} -> {}",
                self.state, next
            )));
        }
        tracing::debug!(job_id = %self.id, from = %self.state, to = %next, "Merge state changed");
        self.state = next;
        Ok(())
    }

    /// Move to `Failed`. A job that already finished keeps its state.
    pub fn fail(&mut self, reason: &str) {
        if !self.state.is_terminal() {
            self.state = MergeState::Failed(reason.to_string());
        }
    }
}

impl Default for MergeJob {
    fn default() -> Self {
        Self::new()
    }
}
