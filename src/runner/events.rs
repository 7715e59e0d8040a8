//! Per-command lifecycle callbacks and metadata.
//!
//! For every command exactly one terminal callback fires, preceded by
//! `on_command_start` and any number of metadata updates:
//! start -> (metadata updates) -> complete | skipped | failed.

use crate::commands::Command;
use crate::errors::OrchestraError;

/// Host decision after a command failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorResolution {
    /// Proceed with the next command.
    Continue,
    /// Terminate the flow.
    Fail,
}

/// Per-command bookkeeping surfaced to the host for UI reporting.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandMetadata {
    pub number_of_runs: Option<u32>,
    pub evaluated_command: Option<Command>,
    pub log_messages: Vec<String>,
}

/// Observer hooks supplied by the host at orchestra construction.
///
/// All hooks default to no-ops; `on_command_failed` defaults to failing
/// the flow.
pub trait FlowObserver {
    fn on_flow_start(&self, _commands: &[Command]) {}

    fn on_command_start(&self, _index: usize, _command: &Command) {}

    fn on_command_complete(&self, _index: usize, _command: &Command) {}

    fn on_command_failed(
        &self,
        _index: usize,
        _command: &Command,
        _error: &OrchestraError,
    ) -> ErrorResolution {
        ErrorResolution::Fail
    }

    fn on_command_skipped(&self, _index: usize, _command: &Command) {}

    fn on_command_reset(&self, _command: &Command) {}

    fn on_command_metadata_update(&self, _command: &Command, _metadata: &CommandMetadata) {}
}

/// Observer that ignores every event.
pub struct NoopObserver;

impl FlowObserver for NoopObserver {}
