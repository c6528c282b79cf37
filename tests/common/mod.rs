//! Shared utilities for integration tests.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use legacy_gateway::config::GatewayConfig;
use legacy_gateway::lifecycle::Shutdown;
use legacy_gateway::{GatewayServer, LegacyServer};

/// Method and request-target of a request seen by a mock backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeenRequest {
    pub method: String,
    pub target: String,
}

/// Start a programmable mock backend; `f` maps each request to (status, body).
pub async fn start_programmable_backend<F, Fut>(addr: SocketAddr, f: F)
where
    F: Fn(SeenRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind(addr).await.unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        let Some(seen) = read_request_head(&mut socket).await else {
                            return;
                        };
                        let (status, body) = f(seen).await;
                        let status_text = match status {
                            200 => "200 OK",
                            404 => "404 Not Found",
                            500 => "500 Internal Server Error",
                            502 => "502 Bad Gateway",
                            503 => "503 Service Unavailable",
                            _ => "200 OK",
                        };

                        let response = format!(
                            "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status_text,
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    });
                }
                Err(_) => break,
            }
        }
    });
}

async fn read_request_head(socket: &mut TcpStream) -> Option<SeenRequest> {
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = socket.read(&mut buf).await.ok()?;
        if n == 0 {
            return None;
        }
        head.extend_from_slice(&buf[..n]);
    }

    let head = String::from_utf8_lossy(&head);
    let mut parts = head.lines().next()?.split_whitespace();
    Some(SeenRequest {
        method: parts.next()?.to_string(),
        target: parts.next()?.to_string(),
    })
}

/// Start the gateway and, when one is given, the built-in legacy server.
pub async fn start_gateway(config: GatewayConfig, legacy: Option<LegacyServer>) -> Shutdown {
    let shutdown = Shutdown::new();

    if let Some(server) = legacy {
        let listener = TcpListener::bind(("127.0.0.1", config.legacy.port)).await.unwrap();
        let rx = shutdown.subscribe();
        tokio::spawn(async move {
            let _ = server.run(listener, rx).await;
        });
    }

    let listener = TcpListener::bind(&config.proxy.bind_address).await.unwrap();
    let gateway = GatewayServer::new(&config).unwrap();
    let rx = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = gateway.run(listener, rx).await;
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    shutdown
}

/// A client that uses the gateway as its HTTP proxy.
pub fn proxy_client(gateway: &str) -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .proxy(reqwest::Proxy::http(format!("http://{gateway}")).unwrap())
        .build()
        .unwrap()
}
