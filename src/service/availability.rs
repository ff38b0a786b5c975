//! Process-wide model availability flag.
//!
//! `Unloaded → Loading → Ready | Failed`, each transition taken at most once.
//! Readers never block: the state is a single atomic byte.

use crate::error::{MedqaError, Result};
use std::fmt;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle of the loaded model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ModelState {
    Unloaded = 0,
    Loading = 1,
    Ready = 2,
    Failed = 3,
}

impl ModelState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Loading,
            2 => Self::Ready,
            3 => Self::Failed,
            _ => Self::Unloaded,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unloaded => "unloaded",
            Self::Loading => "loading",
            Self::Ready => "ready",
            Self::Failed => "failed",
        }
    }

    pub fn is_ready(self) -> bool {
        self == Self::Ready
    }
}

impl fmt::Display for ModelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Write-once availability gate shared by every request.
#[derive(Debug)]
pub struct Availability {
    state: AtomicU8,
    failure: OnceLock<String>,
}

impl Availability {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(ModelState::Unloaded as u8),
            failure: OnceLock::new(),
        }
    }

    pub fn state(&self) -> ModelState {
        ModelState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Unloaded → Loading.
    pub fn begin_loading(&self) -> Result<()> {
        self.transition(ModelState::Unloaded, ModelState::Loading)
    }

    /// Loading → Ready.
    pub fn mark_ready(&self) -> Result<()> {
        self.transition(ModelState::Loading, ModelState::Ready)
    }

    /// Loading → Failed, remembering why.
    pub fn mark_failed(&self, message: impl Into<String>) -> Result<()> {
        self.transition(ModelState::Loading, ModelState::Failed)?;
        // Only the winner of the transition above gets here
        let _ = self.failure.set(message.into());
        Ok(())
    }

    /// Load error recorded by [`mark_failed`](Self::mark_failed).
    pub fn failure_message(&self) -> Option<&str> {
        self.failure.get().map(String::as_str)
    }

    /// Short-circuit unless the model is ready.
    pub fn ensure_ready(&self) -> Result<()> {
        match self.state() {
            ModelState::Ready => Ok(()),
            state => Err(MedqaError::ModelUnavailable { state }),
        }
    }

    fn transition(&self, from: ModelState, to: ModelState) -> Result<()> {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| {
                tracing::debug!(%from, %to, "Model state transition");
            })
            .map_err(|actual| MedqaError::InvalidTransition {
                from: ModelState::from_u8(actual),
                to,
            })
    }
}

impl Default for Availability {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn starts_unloaded() {
        let availability = Availability::new();
        assert_eq!(availability.state(), ModelState::Unloaded);
        assert!(availability.failure_message().is_none());
    }

    #[test]
    fn load_success_path() {
        let availability = Availability::new();
        availability.begin_loading().unwrap();
        assert_eq!(availability.state(), ModelState::Loading);
        availability.mark_ready().unwrap();
        assert_eq!(availability.state(), ModelState::Ready);
        assert!(availability.ensure_ready().is_ok());
    }

    #[test]
    fn load_failure_path_records_message() {
        let availability = Availability::new();
        availability.begin_loading().unwrap();
        availability.mark_failed("adapter missing").unwrap();
        assert_eq!(availability.state(), ModelState::Failed);
        assert_eq!(availability.failure_message(), Some("adapter missing"));
    }

    #[test]
    fn ensure_ready_reports_observed_state() {
        let availability = Availability::new();
        for expected in [ModelState::Unloaded, ModelState::Loading] {
            match availability.ensure_ready() {
                Err(MedqaError::ModelUnavailable { state }) => assert_eq!(state, expected),
                other => panic!("expected ModelUnavailable({expected}), got {other:?}"),
            }
            if expected == ModelState::Unloaded {
                availability.begin_loading().unwrap();
            }
        }

        availability.mark_failed("boom").unwrap();
        assert!(matches!(
            availability.ensure_ready(),
            Err(MedqaError::ModelUnavailable {
                state: ModelState::Failed
            })
        ));
    }

    #[test]
    fn no_reload_after_ready() {
        let availability = Availability::new();
        availability.begin_loading().unwrap();
        availability.mark_ready().unwrap();

        match availability.begin_loading() {
            Err(MedqaError::InvalidTransition { from, to }) => {
                assert_eq!(from, ModelState::Ready);
                assert_eq!(to, ModelState::Loading);
            }
            other => panic!("reload must be rejected, got {other:?}"),
        }
        assert_eq!(availability.state(), ModelState::Ready);
    }

    #[test]
    fn no_retry_after_failure() {
        let availability = Availability::new();
        availability.begin_loading().unwrap();
        availability.mark_failed("first").unwrap();

        assert!(availability.begin_loading().is_err());
        assert!(availability.mark_ready().is_err());
        assert!(availability.mark_failed("second").is_err());
        assert_eq!(availability.failure_message(), Some("first"));
        assert_eq!(availability.state(), ModelState::Failed);
    }

    #[test]
    fn ready_requires_loading_first() {
        let availability = Availability::new();
        assert!(availability.mark_ready().is_err());
        assert!(availability.mark_failed("x").is_err());
        assert_eq!(availability.state(), ModelState::Unloaded);
    }

    #[test]
    fn only_one_concurrent_loader_wins() {
        let availability = Arc::new(Availability::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let availability = Arc::clone(&availability);
                std::thread::spawn(move || availability.begin_loading().is_ok())
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1, "exactly one thread may start loading");
    }

    #[test]
    fn state_display_is_lowercase() {
        assert_eq!(ModelState::Unloaded.to_string(), "unloaded");
        assert_eq!(ModelState::Loading.to_string(), "loading");
        assert_eq!(ModelState::Ready.to_string(), "ready");
        assert_eq!(ModelState::Failed.to_string(), "failed");
    }

    #[test]
    fn from_u8_roundtrips_every_state() {
        for state in [
            ModelState::Unloaded,
            ModelState::Loading,
            ModelState::Ready,
            ModelState::Failed,
        ] {
            assert_eq!(ModelState::from_u8(state as u8), state);
        }
    }
}
