//! Integration tests for the metadata server client against a local HTTP
//! listener.
//!
//! Covers:
//! - paged entity listing, page size and bearer token
//! - a missing listing vs. a missing trailing page
//! - single entity and bundle lookups

use std::sync::{Arc, Mutex};

use score_storage::{Entity, EntitySource, StorageError};
use score_storage_cloud::HttpEntitySource;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Answers each request with `route(target)` and records the request heads.
struct MetadataServer {
    base_url: String,
    requests: Arc<Mutex<Vec<String>>>,
}

impl MetadataServer {
    async fn start(route: fn(&str) -> (u16, String)) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let requests: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));

        let recorded = requests.clone();
        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    return;
                };
                let mut head: Vec<u8> = Vec::new();
                let mut buf = [0u8; 1024];
                while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                    match stream.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => head.extend_from_slice(&buf[..n]),
                    }
                }
                let head: String = String::from_utf8_lossy(&head).into_owned();
                let target: String = head.split_whitespace().nth(1).unwrap_or("").to_string();
                recorded.lock().unwrap().push(head);

                let (status, body) = route(&target);
                let reason: &str = match status {
                    200 => "OK",
                    404 => "Not Found",
                    _ => "Error",
                };
                let response: String = format!(
                    "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    reason,
                    body.len(),
                    body
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        });

        Self { base_url, requests }
    }

    fn targets(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|head| head.split_whitespace().nth(1).unwrap_or("").to_string())
            .collect()
    }

    fn heads(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

fn entity_json(id: &str, gnos_id: &str) -> String {
    format!(r#"{{"id":"{}","gnosId":"{}","fileName":"{}.bam"}}"#, id, gnos_id, id)
}

fn page_json(entities: &[(&str, &str)], last: bool) -> String {
    let content: Vec<String> = entities.iter().map(|(id, g)| entity_json(id, g)).collect();
    format!(r#"{{"content":[{}],"last":{}}}"#, content.join(","), last)
}

fn ids(entities: &[Entity]) -> Vec<&str> {
    entities.iter().map(|e| e.id.as_str()).collect()
}

#[tokio::test]
async fn test_entities_pages_until_last() {
    let server = MetadataServer::start(|target| match target {
        "/entities?page=0&size=2" => (200, page_json(&[("a", "DO1"), ("b", "DO1")], false)),
        "/entities?page=1&size=2" => (200, page_json(&[("c", "DO2")], true)),
        _ => (500, String::new()),
    })
    .await;
    let source = HttpEntitySource::new(&server.base_url)
        .unwrap()
        .with_page_size(2)
        .with_access_token("secret");

    let entities = source.entities().await.unwrap();

    assert_eq!(ids(&entities), vec!["a", "b", "c"]);
    assert_eq!(
        server.targets(),
        vec!["/entities?page=0&size=2", "/entities?page=1&size=2"]
    );
    assert!(server
        .heads()
        .iter()
        .all(|head| head.to_ascii_lowercase().contains("authorization: bearer secret")));
}

#[tokio::test]
async fn test_missing_listing_is_an_error() {
    let server = MetadataServer::start(|_| (404, String::new())).await;
    let source = HttpEntitySource::new(&server.base_url).unwrap();

    let err = source.entities().await.unwrap_err();

    assert!(matches!(err, StorageError::BackendUnavailable { .. }));
    assert_eq!(server.targets().len(), 1);
}

#[tokio::test]
async fn test_missing_trailing_page_ends_listing() {
    let server = MetadataServer::start(|target| match target {
        "/entities?page=0&size=2000" => (200, page_json(&[("a", "DO1")], false)),
        _ => (404, String::new()),
    })
    .await;
    let source = HttpEntitySource::new(&server.base_url).unwrap();

    let entities = source.entities().await.unwrap();

    assert_eq!(ids(&entities), vec!["a"]);
    assert_eq!(server.targets().len(), 2);
}

#[tokio::test]
async fn test_server_error_fails_listing() {
    let server = MetadataServer::start(|_| (503, String::new())).await;
    let source = HttpEntitySource::new(&server.base_url).unwrap();

    let err = source.entities().await.unwrap_err();
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_find_entity() {
    let server = MetadataServer::start(|target| match target {
        "/entities/abc" => (200, entity_json("abc", "DO7")),
        _ => (404, String::new()),
    })
    .await;
    let source = HttpEntitySource::new(&server.base_url).unwrap();

    let found = source.find_entity("abc").await.unwrap().unwrap();
    assert_eq!(found.gnos_id, "DO7");
    assert_eq!(found.file_name, "abc.bam");

    assert!(source.find_entity("missing").await.unwrap().is_none());
    assert_eq!(server.targets(), vec!["/entities/abc", "/entities/missing"]);
}

#[tokio::test]
async fn test_find_entities_by_gnos_id() {
    let server = MetadataServer::start(|target| match target {
        "/entities?gnosId=DO1" => (200, page_json(&[("a", "DO1"), ("b", "DO1")], true)),
        _ => (404, String::new()),
    })
    .await;
    let source = HttpEntitySource::new(&server.base_url).unwrap();

    let bundle = source.find_entities_by_gnos_id("DO1").await.unwrap();
    assert_eq!(ids(&bundle), vec!["a", "b"]);

    assert!(source.find_entities_by_gnos_id("DO9").await.unwrap().is_empty());
}
