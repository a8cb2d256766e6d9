//! Conversion pipeline
//!
//! This module handles:
//! - The conversion state machine (`PipelineState`)
//! - The single-threaded feed/drain loop that moves PCM from a `WavReader`
//!   through an `EncoderSession` into a `ContainerMuxer`
//! - The report returned for a finished conversion

pub mod driver;

use serde::Serialize;

pub use driver::{ConversionReport, PipelineDriver};

/// Where a conversion currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PipelineState {
    Idle,
    /// Input remains; the next step hands PCM to the encoder
    Feeding,
    /// Pulling encoded units out until none are ready
    Draining,
    /// Input end-of-stream submitted, waiting for the encoder's
    AwaitingEndOfStream,
    Finalizing,
    Finished,
    Failed,
}

impl PipelineState {
    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineState::Finished | PipelineState::Failed)
    }

    /// Whether `next` is a legal successor of `self`.
    pub fn can_transition_to(self, next: PipelineState) -> bool {
        use PipelineState::*;
        match (self, next) {
            (s, Failed) => !s.is_terminal(),
            (Idle, Feeding) => true,
            (Feeding, Draining) | (Feeding, AwaitingEndOfStream) => true,
            (Draining, Feeding) | (Draining, AwaitingEndOfStream) | (Draining, Finalizing) => true,
            (AwaitingEndOfStream, Finalizing) => true,
            (Finalizing, Finished) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::PipelineState::*;

    #[test]
    fn test_happy_path_is_legal() {
        let path = [
            Idle,
            Feeding,
            Draining,
            Feeding,
            AwaitingEndOfStream,
            Finalizing,
            Finished,
        ];
        for w in path.windows(2) {
            assert!(w[0].can_transition_to(w[1]), "{} -> {}", w[0], w[1]);
        }
    }

    #[test]
    fn test_failed_reachable_from_non_terminal_only() {
        for s in [Idle, Feeding, Draining, AwaitingEndOfStream, Finalizing] {
            assert!(s.can_transition_to(Failed));
        }
        assert!(!Finished.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Failed));
    }

    #[test]
    fn test_no_shortcuts() {
        assert!(!Idle.can_transition_to(Finalizing));
        assert!(!Feeding.can_transition_to(Finished));
        assert!(!AwaitingEndOfStream.can_transition_to(Feeding));
        assert!(!Finished.can_transition_to(Idle));
    }
}
