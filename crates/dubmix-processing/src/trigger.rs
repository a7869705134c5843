//! Trigger adapters.
//!
//! Each entry point (store event, HTTP request, in-process worker) implements
//! [`TriggerAdapter`] to turn its input into a [`MergeRequest`] and a terminal outcome
//! back into its own response shape. [`dispatch`] wires the two halves to the
//! orchestrator.

use crate::error::MergeFailure;
use crate::orchestrator::{JobControl, MergeOrchestrator, MergeOutcome, MergeRequest};

pub trait TriggerAdapter {
    type Input;
    type Output;

    fn parse_input(&self, input: Self::Input) -> Result<MergeRequest, MergeFailure>;

    fn emit_result(&self, outcome: MergeOutcome) -> Self::Output;

    fn emit_error(&self, failure: MergeFailure) -> Self::Output;
}

/// Parse, run and translate one trigger invocation.
pub async fn dispatch<A: TriggerAdapter>(
    adapter: &A,
    orchestrator: &MergeOrchestrator,
    input: A::Input,
    control: JobControl,
) -> A::Output {
    let request = match adapter.parse_input(input) {
        Ok(request) => request,
        Err(failure) => {
            tracing::warn!(reason = failure.reason_code(), error = %failure, "Rejected merge trigger");
            return adapter.emit_error(failure);
        }
    };

    match orchestrator.run(request, control).await {
        Ok(outcome) => adapter.emit_result(outcome),
        Err(failure) => adapter.emit_error(failure),
    }
}
