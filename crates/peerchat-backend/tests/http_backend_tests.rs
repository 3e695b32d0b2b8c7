//! HttpBackend against a minimal local HTTP server

use std::sync::{Arc, Mutex};
use std::time::Duration;

use peerchat_backend::HttpBackend;
use peerchat_core::{
    BackendClient, MessageRecord, Origin, PeerChatError, RegisteredUser, SessionId,
};
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

#[derive(Debug, Clone)]
struct Recorded {
    method: String,
    path: String,
    body: Value,
}

#[derive(Clone, Default)]
struct Server {
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl Server {
    async fn start(status: u16, history: Value) -> (Self, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let server = Server::default();
        let recorder = server.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let recorder = recorder.clone();
                let history = history.clone();
                tokio::spawn(async move { recorder.serve(stream, status, history).await });
            }
        });
        (server, base)
    }

    fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    async fn serve(&self, mut stream: TcpStream, status: u16, history: Value) {
        let mut data = Vec::new();
        let mut buf = [0u8; 1024];
        let head_end = loop {
            let n = stream.read(&mut buf).await.unwrap();
            if n == 0 {
                return;
            }
            data.extend_from_slice(&buf[..n]);
            if let Some(pos) = data.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
        };
        let head = String::from_utf8_lossy(&data[..head_end]).to_string();
        let content_length = head
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse::<usize>().ok())
                    .flatten()
            })
            .unwrap_or(0);
        while data.len() < head_end + content_length {
            let n = stream.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            data.extend_from_slice(&buf[..n]);
        }

        let mut request_line = head.lines().next().unwrap_or_default().split(' ');
        let method = request_line.next().unwrap_or_default().to_string();
        let path = request_line.next().unwrap_or_default().to_string();
        let body = serde_json::from_slice(&data[head_end..]).unwrap_or(Value::Null);
        self.requests.lock().unwrap().push(Recorded {
            method: method.clone(),
            path: path.clone(),
            body,
        });

        let payload = if method == "GET" { history.to_string() } else { "{}".to_string() };
        let response = format!(
            "HTTP/1.1 {} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            payload.len(),
            payload
        );
        let _ = stream.write_all(response.as_bytes()).await;
        let _ = stream.shutdown().await;
    }
}

fn id(s: &str) -> SessionId {
    SessionId::new(s).unwrap()
}

const WAIT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn test_register_and_persist_bodies() {
    let (server, base) = Server::start(200, json!([])).await;
    let backend = HttpBackend::new(&base).unwrap();

    let user = RegisteredUser {
        name: "alice".to_string(),
        peer_id: id("p-1"),
    };
    timeout(WAIT, backend.register(&user)).await.unwrap().unwrap();
    let record = MessageRecord::new(id("p-1"), id("p-2"), "hi");
    timeout(WAIT, backend.persist_message(&record)).await.unwrap().unwrap();

    let requests = server.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].method, "POST");
    assert_eq!(requests[0].path, "/api/register");
    assert_eq!(requests[0].body, json!({"name": "alice", "peerId": "p-1"}));
    assert_eq!(requests[1].path, "/api/message");
    assert_eq!(
        requests[1].body,
        json!({"senderId": "p-1", "receiverId": "p-2", "message": "hi"})
    );
}

#[tokio::test]
async fn test_fetch_history_maps_origin() {
    let history = json!([
        {"senderId": "p-1", "receiverId": "p-2", "message": "first", "timestamp": "2024-05-01T10:15:00.000Z"},
        {"senderId": "p-2", "receiverId": "p-1", "message": "second", "timestamp": 1714558560000u64},
        {"senderId": "p-1", "receiverId": "p-2", "message": "third"}
    ]);
    let (server, base) = Server::start(200, history).await;
    let backend = HttpBackend::new(&base).unwrap();

    let records = timeout(WAIT, backend.fetch_history(&id("p-1"), &id("p-2")))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(server.requests()[0].path, "/api/messages/p-1/p-2");

    let local = id("p-1");
    let messages: Vec<_> = records.into_iter().map(|r| r.into_message(&local)).collect();
    let summary: Vec<_> = messages.iter().map(|m| (m.body.as_str(), m.origin)).collect();
    assert_eq!(
        summary,
        vec![
            ("first", Origin::Local),
            ("second", Origin::Remote),
            ("third", Origin::Local)
        ]
    );
}

#[tokio::test]
async fn test_malformed_history_entries_are_skipped() {
    let history = json!([
        {"senderId": "", "receiverId": "p-1", "message": "blank sender"},
        {"senderId": "p-2", "receiverId": "p-1", "message": "fine"}
    ]);
    let (_server, base) = Server::start(200, history).await;
    let backend = HttpBackend::new(&base).unwrap();

    let records = timeout(WAIT, backend.fetch_history(&id("p-1"), &id("p-2")))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].message, "fine");
}

#[tokio::test]
async fn test_server_error_is_backend_unavailable() {
    let (_server, base) = Server::start(500, json!([])).await;
    let backend = HttpBackend::new(&base).unwrap();

    let result = timeout(WAIT, backend.persist_message(&MessageRecord::new(id("a"), id("b"), "x")))
        .await
        .unwrap();
    assert!(matches!(result, Err(PeerChatError::BackendUnavailable { .. })));
    let result = timeout(WAIT, backend.fetch_history(&id("a"), &id("b"))).await.unwrap();
    assert!(matches!(result, Err(PeerChatError::BackendUnavailable { .. })));
}

#[tokio::test]
async fn test_unreachable_backend_is_backend_unavailable() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let backend = HttpBackend::new(&base).unwrap();
    let user = RegisteredUser {
        name: "bob".to_string(),
        peer_id: id("p-9"),
    };
    let result = timeout(WAIT, backend.register(&user)).await.unwrap();
    assert!(matches!(result, Err(PeerChatError::BackendUnavailable { .. })));
}
