//! Sequential status workflow per collection.
//!
//! Statuses form an ordered list. From any status a document may stay put,
//! reset to the first status, or move exactly one step forward or back.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DRAFT: &str = "draft";
pub const NEEDS_REVIEW: &str = "needs_review";
pub const PUBLISHED: &str = "published";
pub const ARCHIVED: &str = "archived";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("workflow needs at least one status")]
    Empty,
    #[error("duplicate status `{0}`")]
    DuplicateStatus(String),
    #[error("status `{0}` is not part of the workflow")]
    UnknownStatus(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct InvalidTransition {
    pub from: String,
    pub to: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowStatus {
    pub name: String,
    pub label: String,
    /// Action label shown for moving into this status ("Publish").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verb: Option<String>,
}

impl WorkflowStatus {
    pub fn new(name: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            verb: None,
        }
    }

    pub fn with_verb(mut self, verb: impl Into<String>) -> Self {
        self.verb = Some(verb.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TransitionKind {
    Reset,
    Back,
    Forward,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transition<'w> {
    pub status: &'w WorkflowStatus,
    pub kind: TransitionKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    statuses: Vec<WorkflowStatus>,
    default_status: String,
    published_status: String,
    archived_status: String,
}

impl Workflow {
    /// `default_status` falls back to the first status.
    pub fn new(
        statuses: Vec<WorkflowStatus>,
        default_status: Option<&str>,
    ) -> Result<Self, WorkflowError> {
        let first = statuses.first().ok_or(WorkflowError::Empty)?.name.clone();
        for (i, status) in statuses.iter().enumerate() {
            if statuses[..i].iter().any(|s| s.name == status.name) {
                return Err(WorkflowError::DuplicateStatus(status.name.clone()));
            }
        }
        let default_status = default_status.map(str::to_string).unwrap_or(first);
        let last = statuses.last().map(|s| s.name.clone()).unwrap_or_default();
        let pick = |wanted: &str, fallback: &str| {
            if statuses.iter().any(|s| s.name == wanted) {
                wanted.to_string()
            } else {
                fallback.to_string()
            }
        };
        let published_status = pick(PUBLISHED, &last);
        let archived_status = pick(ARCHIVED, &last);

        let workflow = Self {
            statuses,
            default_status,
            published_status,
            archived_status,
        };
        workflow.require(&workflow.default_status)?;
        Ok(workflow)
    }

    /// draft → published → archived.
    pub fn standard() -> Self {
        Self::from_known(vec![
            WorkflowStatus::new(DRAFT, "Draft"),
            WorkflowStatus::new(PUBLISHED, "Published").with_verb("Publish"),
            WorkflowStatus::new(ARCHIVED, "Archived").with_verb("Archive"),
        ])
    }

    /// draft → needs_review → published → archived.
    pub fn with_review() -> Self {
        Self::from_known(vec![
            WorkflowStatus::new(DRAFT, "Draft"),
            WorkflowStatus::new(NEEDS_REVIEW, "Needs review").with_verb("Request review"),
            WorkflowStatus::new(PUBLISHED, "Published").with_verb("Publish"),
            WorkflowStatus::new(ARCHIVED, "Archived").with_verb("Archive"),
        ])
    }

    fn from_known(statuses: Vec<WorkflowStatus>) -> Self {
        Self {
            statuses,
            default_status: DRAFT.to_string(),
            published_status: PUBLISHED.to_string(),
            archived_status: ARCHIVED.to_string(),
        }
    }

    /// Override which statuses count as live and retired.
    pub fn with_lifecycle_statuses(
        mut self,
        published: &str,
        archived: &str,
    ) -> Result<Self, WorkflowError> {
        self.require(published)?;
        self.require(archived)?;
        self.published_status = published.to_string();
        self.archived_status = archived.to_string();
        Ok(self)
    }

    fn require(&self, name: &str) -> Result<(), WorkflowError> {
        match self.position(name) {
            Some(_) => Ok(()),
            None => Err(WorkflowError::UnknownStatus(name.to_string())),
        }
    }

    pub fn statuses(&self) -> &[WorkflowStatus] {
        &self.statuses
    }

    pub fn default_status(&self) -> &str {
        &self.default_status
    }

    pub fn published_status(&self) -> &str {
        &self.published_status
    }

    pub fn archived_status(&self) -> &str {
        &self.archived_status
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.statuses.iter().position(|s| s.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    fn first(&self) -> &WorkflowStatus {
        // Construction guarantees a non-empty list.
        &self.statuses[0]
    }

    /// Check whether a document in `current` may move to `next`.
    pub fn validate_status_transition(
        &self,
        current: &str,
        next: &str,
    ) -> Result<(), InvalidTransition> {
        if current == next {
            return Ok(());
        }
        let reject = |reason: String| InvalidTransition {
            from: current.to_string(),
            to: next.to_string(),
            reason,
        };
        let Some(to) = self.position(next) else {
            return Err(reject(format!("`{next}` is not a status of this workflow")));
        };
        if to == 0 {
            return Ok(());
        }
        let Some(from) = self.position(current) else {
            return Err(reject(format!(
                "`{current}` is not a status of this workflow; only `{}` is reachable",
                self.first().name
            )));
        };
        if from.abs_diff(to) == 1 {
            return Ok(());
        }
        Err(reject(format!(
            "cannot move from `{current}` to `{next}`; statuses advance one step at a time"
        )))
    }

    /// Moves offered from `current`: reset, one step back, one step forward.
    pub fn available_transitions(&self, current: &str) -> Vec<Transition<'_>> {
        let mut out = Vec::new();
        let Some(from) = self.position(current) else {
            out.push(Transition {
                status: self.first(),
                kind: TransitionKind::Reset,
            });
            return out;
        };
        if from > 0 {
            out.push(Transition {
                status: self.first(),
                kind: TransitionKind::Reset,
            });
        }
        if from > 1 {
            out.push(Transition {
                status: &self.statuses[from - 1],
                kind: TransitionKind::Back,
            });
        }
        if let Some(next) = self.statuses.get(from + 1) {
            out.push(Transition {
                status: next,
                kind: TransitionKind::Forward,
            });
        }
        out
    }
}

impl Default for Workflow {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names<'w>(transitions: &[Transition<'w>]) -> Vec<(&'w str, TransitionKind)> {
        transitions
            .iter()
            .map(|t| (t.status.name.as_str(), t.kind))
            .collect()
    }

    #[test]
    fn review_workflow_transitions() {
        let wf = Workflow::with_review();
        assert!(wf.validate_status_transition("draft", "published").is_err());
        assert!(wf.validate_status_transition("draft", "needs_review").is_ok());
        assert!(wf.validate_status_transition("published", "draft").is_ok());
        assert!(wf.validate_status_transition("needs_review", "draft").is_ok());
        assert!(wf.validate_status_transition("archived", "needs_review").is_err());
        assert!(wf.validate_status_transition("archived", "archived").is_ok());
        assert!(wf.validate_status_transition("published", "archived").is_ok());
    }

    #[test]
    fn rejection_names_both_statuses() {
        let err = Workflow::with_review()
            .validate_status_transition("draft", "archived")
            .unwrap_err();
        assert!(err.reason.contains("draft"));
        assert!(err.reason.contains("archived"));
        assert_eq!(err.to_string(), err.reason);
    }

    #[test]
    fn unknown_statuses() {
        let wf = Workflow::standard();
        assert!(wf.validate_status_transition("draft", "deleted").is_err());
        assert!(wf.validate_status_transition("legacy", "draft").is_ok());
        assert!(wf.validate_status_transition("legacy", "published").is_err());
    }

    #[test]
    fn available_from_each_position() {
        let wf = Workflow::with_review();
        assert_eq!(
            names(&wf.available_transitions("draft")),
            vec![("needs_review", TransitionKind::Forward)]
        );
        assert_eq!(
            names(&wf.available_transitions("needs_review")),
            vec![("draft", TransitionKind::Reset), ("published", TransitionKind::Forward)]
        );
        assert_eq!(
            names(&wf.available_transitions("published")),
            vec![
                ("draft", TransitionKind::Reset),
                ("needs_review", TransitionKind::Back),
                ("archived", TransitionKind::Forward)
            ]
        );
        assert_eq!(
            names(&wf.available_transitions("archived")),
            vec![("draft", TransitionKind::Reset), ("published", TransitionKind::Back)]
        );
    }

    #[test]
    fn available_transitions_are_all_valid() {
        let wf = Workflow::with_review();
        for status in wf.statuses() {
            for t in wf.available_transitions(&status.name) {
                assert!(wf.validate_status_transition(&status.name, &t.status.name).is_ok());
            }
        }
    }

    #[test]
    fn construction_rules() {
        assert_eq!(Workflow::new(vec![], None).unwrap_err(), WorkflowError::Empty);
        assert_eq!(
            Workflow::new(
                vec![WorkflowStatus::new("a", "A"), WorkflowStatus::new("a", "A")],
                None
            )
            .unwrap_err(),
            WorkflowError::DuplicateStatus("a".into())
        );
        assert_eq!(
            Workflow::new(vec![WorkflowStatus::new("a", "A")], Some("b")).unwrap_err(),
            WorkflowError::UnknownStatus("b".into())
        );

        let wf = Workflow::new(
            vec![
                WorkflowStatus::new("idea", "Idea"),
                WorkflowStatus::new("live", "Live"),
            ],
            Some("live"),
        )
        .unwrap();
        assert_eq!(wf.default_status(), "live");
        assert_eq!(wf.published_status(), "live");
        assert_eq!(wf.archived_status(), "live");
    }

    #[test]
    fn lifecycle_status_override() {
        let wf = Workflow::standard()
            .with_lifecycle_statuses("published", "draft")
            .unwrap();
        assert_eq!(wf.archived_status(), "draft");
        assert!(Workflow::standard()
            .with_lifecycle_statuses("live", "archived")
            .is_err());
    }
}
