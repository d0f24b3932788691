use anyhow::Result;
use axum::http::{Method, StatusCode};
use serde_json::{json, Value};

use crate::api::handlers::test_support::{body_json, login, memory_store, request, send, test_app};

async fn create(app: &axum::Router, cookie: &str, body: Value) -> Result<String> {
    let response = send(app, request(Method::POST, "/notes", Some(cookie), Some(body))?).await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    Ok(body_json(response).await?["id"]
        .as_str()
        .unwrap_or_default()
        .to_string())
}

#[tokio::test]
async fn note_lifecycle_for_owner() -> Result<()> {
    let store = memory_store();
    let app = test_app(store.clone())?;
    let (user, cookie) = login(&store, "1", "alice").await?;

    let id = create(
        &app,
        &cookie,
        json!({"title": "First", "content": "hello", "tags": ["a"], "isPinned": true}),
    )
    .await?;

    let response = send(&app, request(Method::GET, &format!("/notes/{id}"), Some(&cookie), None)?).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let note = body_json(response).await?;
    assert_eq!(note["title"], "First");
    assert_eq!(note["ownerId"], user.id.to_string());
    assert_eq!(note["tags"], json!(["a"]));
    assert_eq!(note["isPinned"], true);

    let response = send(
        &app,
        request(
            Method::PUT,
            &format!("/notes/{id}"),
            Some(&cookie),
            Some(json!({"title": "Renamed", "content": "updated"})),
        )?,
    )
    .await?;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = send(&app, request(Method::GET, &format!("/notes/{id}"), Some(&cookie), None)?).await?;
    let note = body_json(response).await?;
    assert_eq!(note["title"], "Renamed");
    assert_eq!(note["isPinned"], false);

    let response = send(&app, request(Method::DELETE, &format!("/notes/{id}"), Some(&cookie), None)?).await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await?["message"], "Note deleted");

    let response = send(&app, request(Method::GET, &format!("/notes/{id}"), Some(&cookie), None)?).await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await?["error"], "Note not found");
    Ok(())
}

#[tokio::test]
async fn non_owner_sees_not_found_and_note_is_unchanged() -> Result<()> {
    let store = memory_store();
    let app = test_app(store.clone())?;
    let (_, alice) = login(&store, "1", "alice").await?;
    let (_, bob) = login(&store, "2", "bob").await?;

    let id = create(&app, &alice, json!({"title": "Private", "content": "secret"})).await?;
    let uri = format!("/notes/{id}");

    let response = send(&app, request(Method::GET, &uri, Some(&bob), None)?).await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = send(
        &app,
        request(
            Method::PUT,
            &uri,
            Some(&bob),
            Some(json!({"title": "Hijacked", "content": "mine"})),
        )?,
    )
    .await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = send(&app, request(Method::DELETE, &uri, Some(&bob), None)?).await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = send(&app, request(Method::GET, "/notes", Some(&bob), None)?).await?;
    assert_eq!(body_json(response).await?, json!([]));

    let response = send(&app, request(Method::GET, &uri, Some(&alice), None)?).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let note = body_json(response).await?;
    assert_eq!(note["title"], "Private");
    assert_eq!(note["content"], "secret");
    Ok(())
}

#[tokio::test]
async fn list_is_newest_first() -> Result<()> {
    let store = memory_store();
    let app = test_app(store.clone())?;
    let (_, cookie) = login(&store, "1", "alice").await?;

    create(&app, &cookie, json!({"title": "older", "content": "1"})).await?;
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    create(&app, &cookie, json!({"title": "newer", "content": "2"})).await?;

    let response = send(&app, request(Method::GET, "/notes", Some(&cookie), None)?).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let notes = body_json(response).await?;
    assert_eq!(notes[0]["title"], "newer");
    assert_eq!(notes[1]["title"], "older");
    Ok(())
}

#[tokio::test]
async fn invalid_input_is_rejected() -> Result<()> {
    let store = memory_store();
    let app = test_app(store.clone())?;
    let (_, cookie) = login(&store, "1", "alice").await?;

    let response = send(
        &app,
        request(
            Method::POST,
            "/notes",
            Some(&cookie),
            Some(json!({"title": "x".repeat(101)})),
        )?,
    )
    .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await?;
    assert_eq!(body["error"], "Validation error");
    assert_eq!(
        body["details"],
        json!(["title must be 100 characters or fewer", "content is required"])
    );

    let response = send(&app, request(Method::GET, "/notes/123", Some(&cookie), None)?).await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Malformed JSON never reaches the store.
    let malformed = axum::http::Request::builder()
        .method(Method::POST)
        .uri("/notes")
        .header(axum::http::header::COOKIE, &cookie)
        .header(axum::http::header::CONTENT_TYPE, "application/json")
        .body(axum::body::Body::from("{not json"))?;
    let response = send(&app, malformed).await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = send(&app, request(Method::GET, "/notes", Some(&cookie), None)?).await?;
    assert_eq!(body_json(response).await?, json!([]));
    Ok(())
}
