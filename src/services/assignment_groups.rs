//! Assignment group operations.

use crate::client::CanvasClient;
use crate::errors::{CanvasError, CanvasResult};
use crate::pagination::PaginationParams;
use crate::types::{AssignmentGroup, AssignmentGroupRequest};
use serde::Serialize;

/// Service for assignment group operations.
pub struct AssignmentGroupsService<'a> {
    client: &'a CanvasClient,
}

impl<'a> AssignmentGroupsService<'a> {
    /// Creates a new assignment groups service.
    pub fn new(client: &'a CanvasClient) -> Self {
        Self { client }
    }

    /// Lists every assignment group in a course, following all pages.
    pub async fn list(&self, course_id: u64) -> CanvasResult<Vec<AssignmentGroup>> {
        self.list_with_params(course_id, &PaginationParams::new().per_page(100))
            .await
    }

    /// Lists assignment groups with custom pagination.
    pub async fn list_with_params(
        &self,
        course_id: u64,
        params: &PaginationParams,
    ) -> CanvasResult<Vec<AssignmentGroup>> {
        self.client
            .get_all_pages_with_params(&format!("courses/{}/assignment_groups", course_id), params)
            .await
    }

    /// Gets an assignment group.
    pub async fn get(&self, course_id: u64, group_id: u64) -> CanvasResult<AssignmentGroup> {
        self.client
            .get_json(&format!("courses/{}/assignment_groups/{}", course_id, group_id))
            .await
    }

    /// Creates an assignment group.
    pub async fn create(
        &self,
        course_id: u64,
        request: &AssignmentGroupRequest,
    ) -> CanvasResult<AssignmentGroup> {
        self.client
            .post_json(&format!("courses/{}/assignment_groups", course_id), request)
            .await
    }

    /// Updates an assignment group.
    pub async fn update(
        &self,
        course_id: u64,
        group_id: u64,
        request: &AssignmentGroupRequest,
    ) -> CanvasResult<AssignmentGroup> {
        self.client
            .put_json(
                &format!("courses/{}/assignment_groups/{}", course_id, group_id),
                request,
            )
            .await
    }

    /// Deletes an assignment group and the assignments in it.
    pub async fn delete(&self, course_id: u64, group_id: u64) -> CanvasResult<()> {
        self.client
            .delete(&format!("courses/{}/assignment_groups/{}", course_id, group_id))
            .await
    }

    /// Deletes an assignment group and moves its assignments into another.
    pub async fn delete_moving_to(
        &self,
        course_id: u64,
        group_id: u64,
        move_to: u64,
    ) -> CanvasResult<()> {
        #[derive(Serialize)]
        struct Query {
            move_assignments_to: u64,
        }

        let query = serde_urlencoded::to_string(Query {
            move_assignments_to: move_to,
        })
        .map_err(|e| CanvasError::serialization(e.to_string()))?;

        self.client
            .delete(&format!(
                "courses/{}/assignment_groups/{}?{}",
                course_id, group_id, query
            ))
            .await
    }
}
