//! Assessment-run state machine and setup-metadata vocabularies.

use serde::{Deserialize, Serialize};

use crate::question_bank::FULL_QUESTION_COUNT;
use crate::retake::RETAKE_QUESTION_COUNT;

/// Lifecycle status of an assessment run.
///
/// `draft → in_progress → {completed, canceled}`. Item ids are
/// assigned exactly once, at the draft→in_progress transition. The
/// two terminal states admit no further mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Draft,
    InProgress,
    Completed,
    Canceled,
}

/// An attempted transition that the state machine does not permit.
#[derive(Debug, thiserror::Error)]
#[error("illegal run transition: {from} -> {to}")]
pub struct IllegalTransition {
    pub from: RunStatus,
    pub to: RunStatus,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Draft => "draft",
            RunStatus::InProgress => "in_progress",
            RunStatus::Completed => "completed",
            RunStatus::Canceled => "canceled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "draft" => Some(RunStatus::Draft),
            "in_progress" => Some(RunStatus::InProgress),
            "completed" => Some(RunStatus::Completed),
            "canceled" => Some(RunStatus::Canceled),
            _ => None,
        }
    }

    /// `completed` and `canceled` admit no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Canceled)
    }

    /// Response writes are permitted only in `draft` and `in_progress`.
    pub fn is_writable(self) -> bool {
        matches!(self, RunStatus::Draft | RunStatus::InProgress)
    }

    /// Check a transition against the state machine.
    pub fn transition_to(self, to: RunStatus) -> Result<RunStatus, IllegalTransition> {
        let legal = matches!(
            (self, to),
            (RunStatus::Draft, RunStatus::InProgress)
                | (RunStatus::Draft, RunStatus::Canceled)
                | (RunStatus::InProgress, RunStatus::Completed)
                | (RunStatus::InProgress, RunStatus::Canceled)
        );
        if legal {
            Ok(to)
        } else {
            Err(IllegalTransition { from: self, to })
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which question set a run uses, derived from its run number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssessmentMode {
    /// Initial run: the full 143-item bank.
    Full143,
    /// Any retake: the reduced 43-item set.
    Monthly43,
}

impl AssessmentMode {
    /// `run_number == 1` is the initial full assessment; everything
    /// after is a retake.
    pub fn for_run_number(run_number: i32) -> Self {
        if run_number > 1 {
            AssessmentMode::Monthly43
        } else {
            AssessmentMode::Full143
        }
    }

    pub fn question_count(self) -> usize {
        match self {
            AssessmentMode::Full143 => FULL_QUESTION_COUNT,
            AssessmentMode::Monthly43 => RETAKE_QUESTION_COUNT,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AssessmentMode::Full143 => "full_143",
            AssessmentMode::Monthly43 => "monthly_43",
        }
    }
}

/// Allowed `context_scope` values for draft setup metadata.
pub const ALLOWED_CONTEXT_SCOPES: &[&str] = &["work", "home", "mixed"];

/// Allowed `focus_area` values for draft setup metadata.
pub const ALLOWED_FOCUS_AREAS: &[&str] = &["confidence", "clarity", "energy", "connection"];

/// Validate a `context_scope` value against the closed vocabulary.
pub fn validate_context_scope(value: &str) -> Result<(), String> {
    if ALLOWED_CONTEXT_SCOPES.contains(&value) {
        Ok(())
    } else {
        Err(format!(
            "Invalid context_scope '{value}'. Must be one of: {}",
            ALLOWED_CONTEXT_SCOPES.join(", ")
        ))
    }
}

/// Validate a `focus_area` value against the closed vocabulary.
pub fn validate_focus_area(value: &str) -> Result<(), String> {
    if ALLOWED_FOCUS_AREAS.contains(&value) {
        Ok(())
    } else {
        Err(format!(
            "Invalid focus_area '{value}'. Must be one of: {}",
            ALLOWED_FOCUS_AREAS.join(", ")
        ))
    }
}

/// Normalize a client-supplied source route; anything that is not a
/// site-relative path falls back to the setup page.
pub fn normalize_source_route(value: Option<&str>) -> String {
    match value {
        Some(route) if route.starts_with('/') => route.to_string(),
        _ => "/assessment/setup".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draft_can_start_or_cancel() {
        assert!(RunStatus::Draft.transition_to(RunStatus::InProgress).is_ok());
        assert!(RunStatus::Draft.transition_to(RunStatus::Canceled).is_ok());
        assert!(RunStatus::Draft.transition_to(RunStatus::Completed).is_err());
    }

    #[test]
    fn in_progress_can_complete_or_cancel() {
        assert!(RunStatus::InProgress
            .transition_to(RunStatus::Completed)
            .is_ok());
        assert!(RunStatus::InProgress
            .transition_to(RunStatus::Canceled)
            .is_ok());
        assert!(RunStatus::InProgress
            .transition_to(RunStatus::Draft)
            .is_err());
    }

    #[test]
    fn terminal_states_admit_nothing() {
        for terminal in [RunStatus::Completed, RunStatus::Canceled] {
            assert!(terminal.is_terminal());
            assert!(!terminal.is_writable());
            for to in [
                RunStatus::Draft,
                RunStatus::InProgress,
                RunStatus::Completed,
                RunStatus::Canceled,
            ] {
                assert!(terminal.transition_to(to).is_err());
            }
        }
    }

    #[test]
    fn mode_follows_run_number() {
        assert_eq!(AssessmentMode::for_run_number(1), AssessmentMode::Full143);
        assert_eq!(AssessmentMode::for_run_number(2), AssessmentMode::Monthly43);
        assert_eq!(AssessmentMode::for_run_number(7), AssessmentMode::Monthly43);
        assert_eq!(AssessmentMode::Full143.question_count(), 143);
        assert_eq!(AssessmentMode::Monthly43.question_count(), 43);
    }

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            RunStatus::Draft,
            RunStatus::InProgress,
            RunStatus::Completed,
            RunStatus::Canceled,
        ] {
            assert_eq!(RunStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(RunStatus::parse("unknown"), None);
    }

    #[test]
    fn setup_metadata_vocabularies() {
        assert!(validate_context_scope("work").is_ok());
        assert!(validate_context_scope("office").is_err());
        assert!(validate_focus_area("clarity").is_ok());
        assert!(validate_focus_area("focus").is_err());
        assert_eq!(normalize_source_route(Some("/pricing")), "/pricing");
        assert_eq!(
            normalize_source_route(Some("https://evil.example")),
            "/assessment/setup"
        );
        assert_eq!(normalize_source_route(None), "/assessment/setup");
    }
}
