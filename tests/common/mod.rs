//! Shared fixtures: a fake page server and a fake Ollama backend.

#![allow(dead_code)]

use std::collections::HashMap;
use std::time::Duration;

use page_insight::{AppState, api::routes::create_router, config::Config};
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const HTML: &str = "<!DOCTYPE html><html><head><title>Example</title></head><body><h1>Example Domain</h1><p>Illustrative text.</p></body></html>";

pub fn html_response(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.as_bytes().to_vec(), "text/html; charset=utf-8")
}

/// Page server answering `GET /page` with `template`.
pub async fn page_server(template: ResponseTemplate) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/page"))
        .respond_with(template)
        .mount(&server)
        .await;
    server
}

/// Buffered `/api/chat` reply carrying `content`.
pub fn chat_reply(content: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "model": "test-model",
        "created_at": "2024-05-01T00:00:00Z",
        "message": { "role": "assistant", "content": content },
        "done": true,
    }))
}

/// Streamed `/api/chat` reply: one NDJSON line per fragment, then a done marker.
pub fn chat_stream_reply(fragments: &[&str]) -> ResponseTemplate {
    let mut body = String::new();
    for fragment in fragments {
        body.push_str(
            &json!({ "message": { "role": "assistant", "content": fragment }, "done": false })
                .to_string(),
        );
        body.push('\n');
    }
    body.push_str(&json!({ "done": true, "done_reason": "stop" }).to_string());
    body.push('\n');

    ResponseTemplate::new(200).set_body_raw(body.into_bytes(), "application/x-ndjson")
}

/// Mounts `template` on `/api/chat`, expecting exactly `calls` requests.
pub async fn mount_chat(server: &MockServer, template: ResponseTemplate, calls: u64) {
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(template)
        .expect(calls)
        .mount(server)
        .await;
}

pub fn config(ollama_uri: &str, overrides: &[(&str, &str)]) -> Config {
    let mut vars: HashMap<String, String> = HashMap::new();
    vars.insert("OLLAMA_BASE_URL".to_string(), ollama_uri.to_string());
    vars.insert("ALLOW_LOCALHOST".to_string(), "true".to_string());
    for (key, value) in overrides {
        vars.insert(key.to_string(), value.to_string());
    }
    Config::from_lookup(|key| vars.get(key).cloned()).expect("test config")
}

pub fn app(config: Config) -> axum::Router {
    create_router(AppState::new(config).expect("app state"))
}

/// Raw HTTP server answering one request with a chunked body of `content_type`
/// and no `Content-Length`. After the given chunks it either terminates the
/// body or stalls, reporting through the returned channel whether the client
/// hung up within five seconds. Returns the server's base URL.
pub async fn chunked_server(
    content_type: &'static str,
    chunks: Vec<Vec<u8>>,
    stall: bool,
) -> (String, oneshot::Receiver<bool>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (closed_tx, closed_rx) = oneshot::channel();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = [0u8; 4096];
        let _ = socket.read(&mut request).await;

        let head = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nTransfer-Encoding: chunked\r\n\r\n",
            content_type
        );
        if socket.write_all(head.as_bytes()).await.is_err() {
            let _ = closed_tx.send(true);
            return;
        }
        for chunk in chunks {
            let mut framed = format!("{:x}\r\n", chunk.len()).into_bytes();
            framed.extend_from_slice(&chunk);
            framed.extend_from_slice(b"\r\n");
            if socket.write_all(&framed).await.is_err() {
                let _ = closed_tx.send(true);
                return;
            }
        }

        if stall {
            // Drain whatever is still in flight until EOF or a reset.
            let hung_up = tokio::time::timeout(Duration::from_secs(5), async {
                let mut buf = [0u8; 1024];
                loop {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(_) => continue,
                    }
                }
            })
            .await
            .is_ok();
            let _ = closed_tx.send(hung_up);
        } else {
            let _ = socket.write_all(b"0\r\n\r\n").await;
            let _ = closed_tx.send(false);
        }
    });

    (format!("http://{}", addr), closed_rx)
}
