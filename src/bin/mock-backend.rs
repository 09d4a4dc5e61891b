//! Reference file backend speaking the bridge's binary protocol.
//!
//! Grants uploads up to `--quota` bytes, stores them under `--dir`, and
//! serves them back on `DOWNLOAD`. Several commands may share one
//! connection; the connection ends when the client closes it.

use std::path::{Path, PathBuf};

use clap::Parser;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use upload_bridge::protocol::codec::{encode_i64, encode_string};
use upload_bridge::protocol::{ALLOWED_MARKER, NOT_FOUND_SIZE, OP_DOWNLOAD, OP_UPLOAD};

#[derive(Parser)]
#[command(name = "mock-backend")]
#[command(about = "Local file backend for exercising the upload bridge", long_about = None)]
struct Args {
    #[arg(short, long, default_value = "127.0.0.1:6600")]
    bind: String,

    /// Directory uploads are stored in.
    #[arg(short, long, default_value = "uploads")]
    dir: PathBuf,

    /// Largest upload granted, in bytes.
    #[arg(short, long, default_value_t = 100 * 1024 * 1024)]
    quota: i64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mock_backend=info".into()),
        )
        .init();

    let args = Args::parse();
    tokio::fs::create_dir_all(&args.dir).await?;
    let listener = TcpListener::bind(&args.bind).await?;
    tracing::info!(
        address = %listener.local_addr()?,
        dir = %args.dir.display(),
        "Backend listening"
    );

    loop {
        let (socket, peer) = listener.accept().await?;
        let dir = args.dir.clone();
        let quota = args.quota;
        tokio::spawn(async move {
            match serve(socket, &dir, quota).await {
                Ok(()) => tracing::debug!(peer = %peer, "Client disconnected"),
                Err(e) => {
                    tracing::warn!(peer = %peer, error = %e, "Client session ended with error")
                }
            }
        });
    }
}

async fn serve(mut socket: TcpStream, dir: &Path, quota: i64) -> std::io::Result<()> {
    loop {
        let command = match read_string(&mut socket).await {
            Ok(command) => command,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(()),
            Err(e) => return Err(e),
        };

        if command.eq_ignore_ascii_case(OP_UPLOAD) {
            let name = read_string(&mut socket).await?;
            let size = socket.read_i64().await?;
            if !(0..=quota).contains(&size) {
                write_string(&mut socket, "DENIED: quota exceeded").await?;
                tracing::info!(file = %name, size, "Upload denied");
                continue;
            }
            write_string(&mut socket, ALLOWED_MARKER).await?;

            let mut data = vec![0u8; size as usize];
            socket.read_exact(&mut data).await?;
            tokio::fs::write(stored_path(dir, &name), &data).await?;
            write_string(&mut socket, "OK").await?;
            tracing::info!(file = %name, size, "File received");
        } else if command.eq_ignore_ascii_case(OP_DOWNLOAD) {
            let name = read_string(&mut socket).await?;
            match tokio::fs::read(stored_path(dir, &name)).await {
                Ok(data) => {
                    socket.write_all(&encode_i64(data.len() as i64)).await?;
                    socket.write_all(&data).await?;
                    write_string(&mut socket, "OK").await?;
                    tracing::info!(file = %name, size = data.len(), "File sent");
                }
                Err(_) => {
                    socket.write_all(&encode_i64(NOT_FOUND_SIZE)).await?;
                    write_string(&mut socket, "ERROR: File not found").await?;
                }
            }
        } else {
            write_string(&mut socket, "ERROR: Unknown command").await?;
        }
    }
}

/// Keep only the final path component so clients cannot escape `dir`.
fn stored_path(dir: &Path, name: &str) -> PathBuf {
    let base = Path::new(name)
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "unnamed".into());
    dir.join(base)
}

async fn read_string(socket: &mut TcpStream) -> std::io::Result<String> {
    let len = socket.read_u16().await? as usize;
    let mut buf = vec![0u8; len];
    socket.read_exact(&mut buf).await?;
    String::from_utf8(buf).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

async fn write_string(socket: &mut TcpStream, s: &str) -> std::io::Result<()> {
    let frame = encode_string(s)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
    socket.write_all(&frame).await
}

