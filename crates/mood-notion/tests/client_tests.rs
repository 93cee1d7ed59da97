//! Notion client tests against a local warp server

use mood_core::{BlockId, BlockKind, BlockUpdate, DocumentStore, SourceId, StoreError};
use mood_notion::{NotionClient, NotionOptions, NOTION_VERSION};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use warp::http::StatusCode;
use warp::Filter;

/// Requests the fake server saw
#[derive(Debug, Default)]
struct Seen {
    auth: Vec<String>,
    versions: Vec<String>,
    queries: Vec<Value>,
    cursors: Vec<Option<String>>,
    patches: Vec<(String, Value)>,
}

fn error_body(status: u16, code: &str, message: &str) -> Value {
    json!({ "object": "error", "status": status, "code": code, "message": message })
}

fn children_page(id: &str, cursor: Option<&str>) -> Value {
    match (id, cursor) {
        ("page", None) => json!({
            "object": "list",
            "results": [
                { "object": "block", "id": "p1", "type": "paragraph", "has_children": false, "paragraph": {} }
            ],
            "has_more": true,
            "next_cursor": "cursor-2"
        }),
        ("page", Some("cursor-2")) => json!({
            "object": "list",
            "results": [
                { "object": "block", "id": "cols", "type": "column_list", "has_children": true, "column_list": {} },
                {
                    "object": "block",
                    "id": "img",
                    "type": "image",
                    "has_children": false,
                    "image": { "type": "external", "external": { "url": "https://img/old.png" } }
                }
            ],
            "has_more": false,
            "next_cursor": null
        }),
        ("truncated", _) => json!({
            "object": "list",
            "results": [
                { "object": "block", "id": "p1", "type": "paragraph", "has_children": false, "paragraph": {} }
            ],
            "has_more": true,
            "next_cursor": null
        }),
        _ => json!({ "object": "list", "results": [], "has_more": false, "next_cursor": null }),
    }
}

async fn fake_notion() -> (SocketAddr, Arc<Mutex<Seen>>) {
    let seen = Arc::new(Mutex::new(Seen::default()));

    let headers = {
        let seen = Arc::clone(&seen);
        warp::header::<String>("authorization")
            .and(warp::header::<String>("notion-version"))
            .map(move |auth: String, version: String| {
                let mut seen = seen.lock();
                seen.auth.push(auth);
                seen.versions.push(version);
            })
            .untuple_one()
    };

    let query = {
        let seen = Arc::clone(&seen);
        warp::post()
            .and(warp::path!("v1" / "databases" / String / "query"))
            .and(warp::body::json())
            .map(move |id: String, body: Value| {
                seen.lock().queries.push(body);
                match id.as_str() {
                    "forbidden" => warp::reply::with_status(
                        warp::reply::json(&error_body(
                            403,
                            "restricted_resource",
                            "integration lacks access",
                        )),
                        StatusCode::FORBIDDEN,
                    ),
                    "garbled" => warp::reply::with_status(
                        warp::reply::json(&json!({ "unexpected": true })),
                        StatusCode::OK,
                    ),
                    _ => warp::reply::with_status(
                        warp::reply::json(&json!({
                            "object": "list",
                            "results": [
                                {
                                    "object": "page",
                                    "id": "row-1",
                                    "properties": {
                                        "Progress": {
                                            "type": "formula",
                                            "formula": { "type": "number", "number": 0.61 }
                                        }
                                    }
                                },
                                { "object": "page", "id": "row-2", "properties": {} }
                            ],
                            "has_more": false,
                            "next_cursor": null
                        })),
                        StatusCode::OK,
                    ),
                }
            })
    };

    let children = {
        let seen = Arc::clone(&seen);
        warp::get()
            .and(warp::path!("v1" / "blocks" / String / "children"))
            .and(warp::query::<HashMap<String, String>>())
            .then(move |id: String, params: HashMap<String, String>| {
                let seen = Arc::clone(&seen);
                async move {
                    let cursor = params.get("start_cursor").cloned();
                    seen.lock().cursors.push(cursor.clone());
                    if id == "slow" {
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                    warp::reply::json(&children_page(&id, cursor.as_deref()))
                }
            })
    };

    let patch = {
        let seen = Arc::clone(&seen);
        warp::patch()
            .and(warp::path!("v1" / "blocks" / String))
            .and(warp::body::json())
            .map(move |id: String, body: Value| {
                seen.lock().patches.push((id.clone(), body));
                warp::reply::json(&json!({ "object": "block", "id": id, "type": "image" }))
            })
    };

    let routes = headers.and(query.or(children).or(patch));
    let (addr, server) = warp::serve(routes).bind_ephemeral(([127, 0, 0, 1], 0));
    tokio::spawn(server);
    (addr, seen)
}

fn client(addr: SocketAddr) -> NotionClient {
    let options = NotionOptions::default().with_base_url(format!("http://{addr}/v1"));
    NotionClient::new("secret_test", options).unwrap()
}

#[tokio::test]
async fn query_maps_records_and_sends_headers() {
    let (addr, seen) = fake_notion().await;

    let records = client(addr)
        .query_progress(&SourceId::new("db-1"), "Progress")
        .await
        .unwrap();

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].id, "row-1");
    assert_eq!(records[0].progress, Some(0.61));
    assert_eq!(records[1].progress, None);

    let seen = seen.lock();
    assert_eq!(seen.auth, vec!["Bearer secret_test".to_string()]);
    assert_eq!(seen.versions, vec![NOTION_VERSION.to_string()]);
    assert_eq!(seen.queries, vec![json!({ "page_size": 100 })]);
}

#[tokio::test]
async fn list_children_follows_cursors() {
    let (addr, seen) = fake_notion().await;

    let blocks = client(addr)
        .list_children(&BlockId::new("page"))
        .await
        .unwrap();

    let ids: Vec<&str> = blocks.iter().map(|b| b.id.as_str()).collect();
    assert_eq!(ids, vec!["p1", "cols", "img"]);
    assert!(blocks[1].has_unloaded_children());
    assert_eq!(blocks[2].kind, BlockKind::Image);
    assert_eq!(blocks[2].external_url.as_deref(), Some("https://img/old.png"));

    assert_eq!(
        seen.lock().cursors,
        vec![None, Some("cursor-2".to_string())]
    );
}

#[tokio::test]
async fn more_children_without_cursor_is_an_error() {
    let (addr, seen) = fake_notion().await;

    let err = client(addr)
        .list_children(&BlockId::new("truncated"))
        .await
        .unwrap_err();

    assert!(matches!(err, StoreError::Decode(ref msg) if msg.contains("truncated")));
    assert!(!err.is_retryable());
    assert_eq!(seen.lock().cursors, vec![None]);
}

#[tokio::test]
async fn update_sends_external_image_body() {
    let (addr, seen) = fake_notion().await;

    client(addr)
        .update_block(
            &BlockId::new("img"),
            &BlockUpdate::ExternalImage {
                url: "https://img/mood-3.png".to_string(),
            },
        )
        .await
        .unwrap();

    assert_eq!(
        seen.lock().patches,
        vec![(
            "img".to_string(),
            json!({ "image": { "external": { "url": "https://img/mood-3.png" } } })
        )]
    );
}

#[tokio::test]
async fn error_status_carries_notion_code() {
    let (addr, _seen) = fake_notion().await;

    let err = client(addr)
        .query_progress(&SourceId::new("forbidden"), "Progress")
        .await
        .unwrap_err();

    assert_eq!(
        err,
        StoreError::Status {
            status: 403,
            code: "restricted_resource".to_string(),
            message: "integration lacks access".to_string(),
        }
    );
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn unexpected_body_is_decode_error() {
    let (addr, _seen) = fake_notion().await;

    let err = client(addr)
        .query_progress(&SourceId::new("garbled"), "Progress")
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Decode(_)));
}

#[tokio::test]
async fn slow_response_times_out() {
    let (addr, _seen) = fake_notion().await;
    let options = NotionOptions::default()
        .with_base_url(format!("http://{addr}/v1"))
        .with_timeout(Duration::from_millis(100));
    let client = NotionClient::new("secret_test", options).unwrap();

    let err = client
        .list_children(&BlockId::new("slow"))
        .await
        .unwrap_err();
    assert_eq!(err, StoreError::Timeout { elapsed_ms: 100 });
    assert!(err.is_retryable());
}

#[tokio::test]
async fn unreachable_server_is_transport_error() {
    // Bind then drop to get a port nothing listens on.
    let addr = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap();

    let err = client(addr)
        .list_children(&BlockId::new("page"))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Transport(_)));
    assert!(err.is_retryable());
}
