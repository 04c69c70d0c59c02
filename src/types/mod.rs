//! Core data types for the Canvas API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Assignment group within a course.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentGroup {
    /// Group ID.
    pub id: u64,
    /// Group name.
    pub name: String,
    /// Position in the course's group ordering.
    #[serde(default)]
    pub position: Option<u32>,
    /// Weight of the group in the final grade, in percent.
    #[serde(default)]
    pub group_weight: Option<f64>,
    /// SIS identifier.
    #[serde(default)]
    pub sis_source_id: Option<String>,
    /// Grading rules, e.g. `drop_lowest`.
    #[serde(default)]
    pub rules: Option<serde_json::Value>,
}

/// Request to create or update an assignment group.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AssignmentGroupRequest {
    /// Group name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Position.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<u32>,
    /// Weight in percent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_weight: Option<f64>,
    /// SIS identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sis_source_id: Option<String>,
}

impl AssignmentGroupRequest {
    /// Creates a request that sets only the name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }
}

/// Submission for an assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    /// Submission ID.
    #[serde(default)]
    pub id: Option<u64>,
    /// Assignment ID.
    pub assignment_id: u64,
    /// Submitting user.
    pub user_id: u64,
    /// Attempt number.
    #[serde(default)]
    pub attempt: Option<u32>,
    /// Grade as entered (letter, points or percentage).
    #[serde(default)]
    pub grade: Option<String>,
    /// Numeric score.
    #[serde(default)]
    pub score: Option<f64>,
    /// Submission timestamp.
    #[serde(default)]
    pub submitted_at: Option<DateTime<Utc>>,
    /// Grading timestamp.
    #[serde(default)]
    pub graded_at: Option<DateTime<Utc>>,
    /// Workflow state (submitted, unsubmitted, graded, pending_review).
    #[serde(default)]
    pub workflow_state: Option<String>,
    /// Whether the submission was late.
    #[serde(default)]
    pub late: bool,
    /// Whether the submission is missing.
    #[serde(default)]
    pub missing: bool,
}

/// Grade and comment for a single submission.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GradeRequest {
    /// Submission fields.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submission: Option<GradeFields>,
    /// Comment to attach.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<CommentFields>,
}

impl GradeRequest {
    /// Creates a request that posts a grade.
    pub fn grade(grade: impl Into<String>) -> Self {
        Self {
            submission: Some(GradeFields {
                posted_grade: Some(grade.into()),
                excuse: None,
            }),
            comment: None,
        }
    }

    /// Adds a text comment.
    pub fn with_comment(mut self, text: impl Into<String>) -> Self {
        self.comment = Some(CommentFields {
            text_comment: text.into(),
        });
        self
    }
}

/// Submission fields of a grade request.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GradeFields {
    /// Grade to post.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub posted_grade: Option<String>,
    /// Excuse the student from the assignment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub excuse: Option<bool>,
}

/// Comment fields of a grade request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommentFields {
    /// Comment text.
    pub text_comment: String,
}

/// Grades for many students at once, keyed by user ID.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BulkGradeRequest {
    /// Per-user grade data.
    pub grade_data: BTreeMap<String, BulkGradeEntry>,
}

impl BulkGradeRequest {
    /// Creates an empty bulk request.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a grade for one user.
    pub fn grade(mut self, user_id: u64, grade: impl Into<String>) -> Self {
        self.grade_data.insert(
            user_id.to_string(),
            BulkGradeEntry {
                posted_grade: Some(grade.into()),
                text_comment: None,
            },
        );
        self
    }

    /// Returns true if no grades were added.
    pub fn is_empty(&self) -> bool {
        self.grade_data.is_empty()
    }
}

/// One user's entry in a bulk grade request.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BulkGradeEntry {
    /// Grade to post.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub posted_grade: Option<String>,
    /// Comment to attach.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_comment: Option<String>,
}

/// State of an asynchronous server-side job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    /// Waiting to run.
    Queued,
    /// Running.
    Running,
    /// Finished successfully.
    Completed,
    /// Finished with an error.
    Failed,
}

impl WorkflowState {
    /// Returns true for completed and failed jobs.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Progress of an asynchronous server-side job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    /// Progress ID.
    pub id: u64,
    /// Context the job runs in, e.g. `Course`.
    #[serde(default)]
    pub context_type: Option<String>,
    /// Context ID.
    #[serde(default)]
    pub context_id: Option<u64>,
    /// Job type, e.g. `submissions_update`.
    #[serde(default)]
    pub tag: Option<String>,
    /// Percent complete.
    #[serde(default)]
    pub completion: Option<f64>,
    /// Job state.
    pub workflow_state: WorkflowState,
    /// Status or error message.
    #[serde(default)]
    pub message: Option<String>,
    /// Creation timestamp.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// Last update timestamp.
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    /// URL to poll for updates.
    #[serde(default)]
    pub url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_progress_deserialize() {
        let json = r#"{
            "id": 7,
            "context_type": "Course",
            "context_id": 3,
            "tag": "submissions_update",
            "completion": 50.0,
            "workflow_state": "running",
            "message": null,
            "created_at": "2024-05-01T12:00:00Z",
            "url": "https://canvas.example.edu/api/v1/progress/7"
        }"#;

        let progress: Progress = serde_json::from_str(json).unwrap();
        assert_eq!(progress.id, 7);
        assert_eq!(progress.workflow_state, WorkflowState::Running);
        assert!(!progress.workflow_state.is_terminal());
        assert_eq!(progress.completion, Some(50.0));
        assert!(progress.updated_at.is_none());
    }

    #[test]
    fn test_grade_request_body() {
        let request = GradeRequest::grade("A-").with_comment("Nice work");
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "submission": {"posted_grade": "A-"},
                "comment": {"text_comment": "Nice work"}
            })
        );
    }

    #[test]
    fn test_bulk_grade_body() {
        let request = BulkGradeRequest::new().grade(12, "90").grade(4, "75");
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "grade_data": {
                    "12": {"posted_grade": "90"},
                    "4": {"posted_grade": "75"}
                }
            })
        );
    }

    #[test]
    fn test_assignment_group_minimal() {
        let group: AssignmentGroup =
            serde_json::from_str(r#"{"id": 1, "name": "Homework"}"#).unwrap();
        assert_eq!(group.name, "Homework");
        assert!(group.group_weight.is_none());
    }
}
