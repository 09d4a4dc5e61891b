//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use upload_bridge::config::BridgeConfig;
use upload_bridge::http::{AppState, HttpServer};
use upload_bridge::lifecycle::Shutdown;
use upload_bridge::protocol::codec::encode_string;
use upload_bridge::protocol::ALLOWED_MARKER;

/// What a mock backend saw during one upload.
#[derive(Debug)]
pub struct ReceivedUpload {
    pub op: String,
    pub filename: String,
    pub size: i64,
    /// Granted: the payload. Denied: anything sent after the denial.
    pub payload: Vec<u8>,
}

pub async fn read_string(socket: &mut TcpStream) -> String {
    let len = socket.read_u16().await.unwrap() as usize;
    let mut buf = vec![0u8; len];
    socket.read_exact(&mut buf).await.unwrap();
    String::from_utf8(buf).unwrap()
}

pub async fn write_string(socket: &mut TcpStream, s: &str) {
    socket.write_all(&encode_string(s).unwrap()).await.unwrap();
}

/// Start a backend that answers every upload with `permission`, then with
/// `final_reply` if permission was granted.
pub async fn start_upload_backend(
    permission: &'static str,
    final_reply: &'static str,
) -> (SocketAddr, mpsc::UnboundedReceiver<ReceivedUpload>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let addr = start_programmable_backend(move |mut socket| {
        let tx = tx.clone();
        async move {
            let op = read_string(&mut socket).await;
            let filename = read_string(&mut socket).await;
            let size = socket.read_i64().await.unwrap();
            write_string(&mut socket, permission).await;

            let mut payload = Vec::new();
            if permission.contains(ALLOWED_MARKER) {
                payload.resize(size as usize, 0);
                socket.read_exact(&mut payload).await.unwrap();
                write_string(&mut socket, final_reply).await;
            } else {
                socket.read_to_end(&mut payload).await.unwrap();
            }
            let _ = tx.send(ReceivedUpload {
                op,
                filename,
                size,
                payload,
            });
        }
    })
    .await;
    (addr, rx)
}

/// Start a backend that runs `f` for every accepted connection.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn(TcpStream) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = std::sync::Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move { f(socket).await });
                }
                Err(_) => break,
            }
        }
    });
    addr
}

/// A bridge server running on an ephemeral port.
pub struct Bridge {
    pub addr: SocketAddr,
    pub state: AppState,
    pub config_tx: mpsc::UnboundedSender<BridgeConfig>,
    shutdown: Shutdown,
}

impl Bridge {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn stop(&self) {
        self.shutdown.trigger();
    }
}

pub fn config_for(backend: SocketAddr) -> BridgeConfig {
    let mut config = BridgeConfig::default();
    config.backend.address = backend.to_string();
    config.timeouts.connect_secs = 2;
    config.timeouts.read_secs = 2;
    config.observability.metrics_enabled = false;
    config
}

pub async fn start_bridge(config: BridgeConfig) -> Bridge {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = HttpServer::new(config);
    let state = server.state().clone();
    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    let (config_tx, config_updates) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let _ = server.run(listener, config_updates, server_shutdown).await;
    });

    Bridge {
        addr,
        state,
        config_tx,
        shutdown,
    }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
