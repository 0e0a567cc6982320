//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::io::Write as _;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use flate2::write::GzEncoder;
use flate2::Compression;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use api_gateway::{GatewayConfig, GatewayServer};

/// Start a mock backend whose response is computed from the raw request
/// head. Returns the bound address.
pub async fn spawn_backend<F>(respond: F) -> SocketAddr
where
    F: Fn(&str) -> Vec<u8> + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let respond = Arc::new(respond);

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            let respond = respond.clone();
            tokio::spawn(async move {
                let head = read_head(&mut socket).await;
                let response = respond(&head);
                let _ = socket.write_all(&response).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    addr
}

/// Start a mock backend that returns a fixed 200 response.
pub async fn spawn_ok_backend(body: &'static str) -> SocketAddr {
    spawn_backend(move |_| http_response(200, &[], body.as_bytes())).await
}

/// Start a mock backend that records each request head.
pub async fn spawn_recording_backend() -> (SocketAddr, mpsc::UnboundedReceiver<String>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let addr = spawn_backend(move |head| {
        let _ = tx.send(head.to_string());
        http_response(200, &[], b"recorded")
    })
    .await;
    (addr, rx)
}

/// Start a mock backend that counts requests and answers with `status`.
pub async fn spawn_counting_backend(status: u16) -> (SocketAddr, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let addr = spawn_backend(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        http_response(status, &[], b"counted")
    })
    .await;
    (addr, calls)
}

/// Start a mock backend that always serves a gzip-compressed body.
pub async fn spawn_gzip_backend(body: &'static str) -> SocketAddr {
    spawn_backend(move |_| {
        let compressed = gzip(body.as_bytes());
        http_response(200, &[("Content-Encoding", "gzip")], &compressed)
    })
    .await
}

/// Start a mock backend that sleeps before answering.
pub async fn spawn_slow_backend(delay: Duration) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(async move {
                let _ = read_head(&mut socket).await;
                tokio::time::sleep(delay).await;
                let _ = socket.write_all(&http_response(200, &[], b"late")).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    addr
}

/// Serialize a minimal HTTP/1.1 response.
pub fn http_response(status: u16, extra_headers: &[(&str, &str)], body: &[u8]) -> Vec<u8> {
    let reason = match status {
        200 => "OK",
        204 => "No Content",
        401 => "Unauthorized",
        404 => "Not Found",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        _ => "OK",
    };

    let mut head = format!(
        "HTTP/1.1 {status} {reason}\r\nContent-Length: {}\r\nConnection: close\r\n",
        body.len()
    );
    for (name, value) in extra_headers {
        head.push_str(&format!("{name}: {value}\r\n"));
    }
    head.push_str("\r\n");

    let mut response = head.into_bytes();
    response.extend_from_slice(body);
    response
}

pub fn gzip(body: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(body).unwrap();
    encoder.finish().unwrap()
}

/// Start the gateway on an ephemeral port and return its address.
pub async fn start_gateway(config: GatewayConfig) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = GatewayServer::new(config).unwrap();

    tokio::spawn(async move {
        server.run(listener).await.unwrap();
    });

    addr
}

async fn read_head(socket: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                buf.extend_from_slice(&chunk[..n]);
                if buf.windows(4).any(|w| w == b"\r\n\r\n") {
                    break;
                }
            }
        }
    }
    String::from_utf8_lossy(&buf).to_string()
}
