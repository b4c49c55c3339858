//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use screen_translator::api::ClientConfig;
use screen_translator::capture::ScreenCapture;

pub mod constants {
    pub const TEST_API_KEY: &str = "test-api-key";
    pub const TRANSLATE_MODEL: &str = "translate-model";
    pub const VISION_MODEL: &str = "vision-model";
}

/// PNG signature followed by filler; never decoded.
pub const FAKE_PNG: &[u8] = &[0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a, 1, 2, 3];

pub fn client_config(base_url: &str) -> ClientConfig {
    ClientConfig {
        api_key: constants::TEST_API_KEY.to_string(),
        base_url: base_url.to_string(),
        translate_model: constants::TRANSLATE_MODEL.to_string(),
        vision_model: constants::VISION_MODEL.to_string(),
        ..Default::default()
    }
}

/// Blocking chat completion body with one choice.
pub fn completion_body(content: &str) -> String {
    serde_json::json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "created": 1700000000,
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": content },
            "finish_reason": "stop"
        }],
        "usage": { "prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15 }
    })
    .to_string()
}

/// SSE body emitting one chunk per delta, then `[DONE]`.
pub fn sse_body(deltas: &[&str]) -> String {
    let mut body = String::from(": stream opened\n\n");
    for (i, delta) in deltas.iter().enumerate() {
        let finish = if i + 1 == deltas.len() {
            serde_json::json!("stop")
        } else {
            serde_json::Value::Null
        };
        let chunk = serde_json::json!({
            "id": "chatcmpl-stream",
            "object": "chat.completion.chunk",
            "created": 1700000001,
            "model": "m",
            "choices": [{ "index": 0, "delta": { "content": delta }, "finish_reason": finish }]
        });
        body.push_str(&format!("data: {}\n\n", chunk));
    }
    body.push_str("data: [DONE]\n\n");
    body
}

/// Capture stub that returns fixed bytes and counts calls.
pub struct StaticCapture {
    bytes: Vec<u8>,
    calls: AtomicUsize,
}

impl StaticCapture {
    pub fn new(bytes: &[u8]) -> Self {
        Self {
            bytes: bytes.to_vec(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ScreenCapture for StaticCapture {
    fn capture_to_bytes(&self, _: i32, _: i32, _: i32, _: i32) -> anyhow::Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.bytes.clone())
    }
}

/// One-shot HTTP server that answers with a chunked SSE body holding
/// `first_frame`, then goes silent for `stall` before closing. Returns the
/// base URL.
pub fn stalling_sse_server(first_frame: String, stall: Duration) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    thread::spawn(move || {
        let (mut socket, _) = match listener.accept() {
            Ok(conn) => conn,
            Err(_) => return,
        };
        read_request(&mut socket);

        let chunk = format!("data: {}\n\n", first_frame);
        let head = "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nTransfer-Encoding: chunked\r\n\r\n";
        let _ = socket.write_all(head.as_bytes());
        let _ = socket.write_all(format!("{:x}\r\n{}\r\n", chunk.len(), chunk).as_bytes());
        let _ = socket.flush();

        thread::sleep(stall);
        let _ = socket.write_all(b"0\r\n\r\n");
    });

    format!("http://{}", addr)
}

/// Consume headers and a Content-Length body.
fn read_request(socket: &mut impl Read) {
    let mut data = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        let n = match socket.read(&mut buf) {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };
        data.extend_from_slice(&buf[..n]);
        let Some(end) = data.windows(4).position(|w| w == b"\r\n\r\n") else {
            continue;
        };
        let headers = String::from_utf8_lossy(&data[..end]).to_ascii_lowercase();
        let length = headers
            .lines()
            .find_map(|line| line.strip_prefix("content-length:"))
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(0);
        if data.len() >= end + 4 + length {
            return;
        }
    }
}

/// One `chat.completion.chunk` payload carrying `delta`.
pub fn chunk_json(delta: &str) -> String {
    serde_json::json!({
        "id": "chatcmpl-stream",
        "object": "chat.completion.chunk",
        "choices": [{ "index": 0, "delta": { "content": delta }, "finish_reason": null }]
    })
    .to_string()
}
