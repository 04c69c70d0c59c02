//! Submission and grading operations.

use crate::client::CanvasClient;
use crate::errors::{CanvasError, CanvasResult};
use crate::types::{BulkGradeRequest, GradeRequest, Progress, Submission};

/// Service for submission operations.
pub struct SubmissionsService<'a> {
    client: &'a CanvasClient,
}

impl<'a> SubmissionsService<'a> {
    /// Creates a new submissions service.
    pub fn new(client: &'a CanvasClient) -> Self {
        Self { client }
    }

    fn base(course_id: u64, assignment_id: u64) -> String {
        format!(
            "courses/{}/assignments/{}/submissions",
            course_id, assignment_id
        )
    }

    /// Lists every submission for an assignment, following all pages.
    pub async fn list(&self, course_id: u64, assignment_id: u64) -> CanvasResult<Vec<Submission>> {
        self.client
            .get_all_pages(&Self::base(course_id, assignment_id))
            .await
    }

    /// Gets one user's submission.
    pub async fn get(
        &self,
        course_id: u64,
        assignment_id: u64,
        user_id: u64,
    ) -> CanvasResult<Submission> {
        self.client
            .get_json(&format!("{}/{}", Self::base(course_id, assignment_id), user_id))
            .await
    }

    /// Grades or comments on one user's submission.
    pub async fn grade(
        &self,
        course_id: u64,
        assignment_id: u64,
        user_id: u64,
        request: &GradeRequest,
    ) -> CanvasResult<Submission> {
        self.client
            .put_json(
                &format!("{}/{}", Self::base(course_id, assignment_id), user_id),
                request,
            )
            .await
    }

    /// Starts a bulk grading job. Poll the returned progress with
    /// [`crate::services::ProgressService::wait_for_completion`].
    pub async fn bulk_grade(
        &self,
        course_id: u64,
        assignment_id: u64,
        request: &BulkGradeRequest,
    ) -> CanvasResult<Progress> {
        if request.is_empty() {
            return Err(CanvasError::configuration("bulk grade request has no grades"));
        }

        self.client
            .post_json(
                &format!("{}/update_grades", Self::base(course_id, assignment_id)),
                request,
            )
            .await
    }
}
