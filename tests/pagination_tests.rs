//! Integration tests for Link-header pagination.

mod common;

use common::*;
use integrations_canvas::{CanvasErrorKind, PaginationParams, ResponseCache};
use pretty_assertions::assert_eq;
use serde::Deserialize;
use std::sync::Arc;
use wiremock::matchers::query_param;
use wiremock::ResponseTemplate;

#[derive(Debug, Deserialize, PartialEq)]
struct Item {
    id: u64,
}

fn next_link(server_uri: &str, page: u32) -> String {
    format!(
        "<{}/api/v1/courses/1/assignment_groups?page={}>; rel=\"next\"",
        server_uri, page
    )
}

#[tokio::test]
async fn test_get_all_pages_follows_next_links_in_order() {
    let server = setup_mock_server().await;

    mock_get("courses/1/assignment_groups")
        .and(query_param("page", "2"))
        .respond_with(success_response(serde_json::json!([{"id": 3}])))
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;

    mock_get("courses/1/assignment_groups")
        .respond_with(
            success_response(serde_json::json!([{"id": 1}, {"id": 2}]))
                .insert_header("Link", next_link(&server.uri(), 2).as_str()),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server);
    let items: Vec<Item> = client
        .get_all_pages("courses/1/assignment_groups")
        .await
        .unwrap();

    assert_eq!(items, vec![Item { id: 1 }, Item { id: 2 }, Item { id: 3 }]);

    let requests = server.received_requests().await.unwrap();
    let pages: Vec<Option<String>> = requests
        .iter()
        .filter(|r| r.url.path().ends_with("assignment_groups"))
        .map(|r| r.url.query().map(str::to_string))
        .collect();
    assert_eq!(pages, vec![None, Some("page=2".to_string())]);
}

#[tokio::test]
async fn test_single_page_without_link_header() {
    let server = setup_mock_server().await;

    mock_get("courses")
        .respond_with(success_response(serde_json::json!([{"id": 7}])))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server);
    let items: Vec<Item> = client.get_all_pages("courses").await.unwrap();

    assert_eq!(items, vec![Item { id: 7 }]);
}

#[tokio::test]
async fn test_params_encoded_into_first_request() {
    let server = setup_mock_server().await;

    mock_get("courses")
        .and(query_param("per_page", "100"))
        .respond_with(success_response(serde_json::json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server);
    let items: Vec<Item> = client
        .get_all_pages_with_params("courses", &PaginationParams::new().per_page(250))
        .await
        .unwrap();

    assert!(items.is_empty());
}

#[tokio::test]
async fn test_failed_page_discards_partial_results() {
    let server = setup_mock_server().await;

    mock_get("courses/1/assignment_groups")
        .and(query_param("page", "2"))
        .respond_with(error_response(500, "boom"))
        .with_priority(1)
        .mount(&server)
        .await;

    mock_get("courses/1/assignment_groups")
        .respond_with(
            success_response(serde_json::json!([{"id": 1}]))
                .insert_header("Link", next_link(&server.uri(), 2).as_str()),
        )
        .mount(&server)
        .await;

    let client = client_builder(&server).no_retry().build().unwrap();
    let err = client
        .get_all_pages::<Item>("courses/1/assignment_groups")
        .await
        .unwrap_err();

    assert_eq!(err.kind(), CanvasErrorKind::InternalError);
}

#[tokio::test]
async fn test_foreign_next_link_rejected() {
    let server = setup_mock_server().await;

    mock_get("courses")
        .respond_with(
            success_response(serde_json::json!([{"id": 1}])).insert_header(
                "Link",
                "<https://elsewhere.example.com/api/v1/courses?page=2>; rel=\"next\"",
            ),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server);
    let err = client.get_all_pages::<Item>("courses").await.unwrap_err();

    assert_eq!(err.kind(), CanvasErrorKind::UnexpectedFormat);
}

#[tokio::test]
async fn test_paginator_walks_page_by_page() {
    let server = setup_mock_server().await;

    mock_get("courses/1/assignment_groups")
        .and(query_param("page", "2"))
        .respond_with(success_response(serde_json::json!([{"id": 2}])))
        .with_priority(1)
        .mount(&server)
        .await;

    mock_get("courses/1/assignment_groups")
        .respond_with(
            success_response(serde_json::json!([{"id": 1}]))
                .insert_header("Link", next_link(&server.uri(), 2).as_str()),
        )
        .mount(&server)
        .await;

    let client = test_client(&server);
    let mut pages = client.paginate::<Item>("courses/1/assignment_groups");

    let first = pages.next_page().await.unwrap().unwrap();
    assert!(first.has_next());
    assert!(pages.has_more());

    let second = pages.next_page().await.unwrap().unwrap();
    assert!(!second.has_next());
    assert_eq!(second.items, vec![Item { id: 2 }]);

    assert!(pages.next_page().await.unwrap().is_none());
    assert_eq!(pages.pages_fetched(), 2);
}

#[tokio::test]
async fn test_cached_pages_keep_next_link() {
    let server = setup_mock_server().await;

    mock_get("courses/1/assignment_groups")
        .and(query_param("page", "2"))
        .respond_with(success_response(serde_json::json!([{"id": 2}])))
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;

    mock_get("courses/1/assignment_groups")
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!([{"id": 1}]))
                .insert_header("Link", next_link(&server.uri(), 2).as_str()),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = client_builder(&server)
        .cache(Arc::new(ResponseCache::new()))
        .build()
        .unwrap();

    let first: Vec<Item> = client.get_all_pages("courses/1/assignment_groups").await.unwrap();
    let second: Vec<Item> = client.get_all_pages("courses/1/assignment_groups").await.unwrap();

    assert_eq!(first, second);
    assert_eq!(second.len(), 2);
}

#[tokio::test]
async fn test_relative_next_link_resolved_against_page() {
    let server = setup_mock_server().await;

    mock_get("courses")
        .and(query_param("page", "2"))
        .respond_with(success_response(serde_json::json!([{"id": 2}])))
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;

    mock_get("courses")
        .respond_with(
            success_response(serde_json::json!([{"id": 1}]))
                .insert_header("Link", "</api/v1/courses?page=2>; rel=\"next\""),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server);
    let items: Vec<Item> = client.get_all_pages("courses").await.unwrap();

    assert_eq!(items, vec![Item { id: 1 }, Item { id: 2 }]);
}
