use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use upload_bridge::http::{BridgeResponse, X_FILENAME};

#[derive(Parser)]
#[command(name = "bridge-cli")]
#[command(about = "Upload and download files through the upload bridge", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a local file
    Upload {
        path: PathBuf,
        /// Name to store the file under (defaults to the file name)
        #[arg(short, long)]
        name: Option<String>,
    },
    /// Download a stored file
    Download {
        name: String,
        /// Output path (defaults to downloads/<name>)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    match cli.command {
        Commands::Upload { path, name } => {
            let name = match name {
                Some(name) => name,
                None => path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .ok_or("path has no file name")?,
            };
            let data = tokio::fs::read(&path).await?;
            println!("Uploading {} ({} bytes) as {}", path.display(), data.len(), name);

            let res = client
                .post(format!("{}/upload", cli.url))
                .header(X_FILENAME, utf8_percent_encode(&name, NON_ALPHANUMERIC).to_string())
                .body(data)
                .send()
                .await?;
            let status = res.status();
            let body: BridgeResponse = res.json().await?;
            let message = body.message.unwrap_or_default();
            if body.success {
                println!("Server response: {}", message);
            } else {
                eprintln!("Upload failed ({}): {}", status, message);
            }
        }
        Commands::Download { name, out } => {
            let res = client
                .get(format!(
                    "{}/download/{}",
                    cli.url,
                    utf8_percent_encode(&name, NON_ALPHANUMERIC)
                ))
                .send()
                .await?;
            let status = res.status();
            if !status.is_success() {
                let body: BridgeResponse = res.json().await?;
                eprintln!("Download failed ({}): {}", status, body.message.unwrap_or_default());
                return Ok(());
            }

            let out = out.unwrap_or_else(|| default_download_path(&name));
            if let Some(parent) = out.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            let data = res.bytes().await?;
            tokio::fs::write(&out, &data).await?;
            println!("File downloaded to {} ({} bytes)", out.display(), data.len());
        }
    }

    Ok(())
}

/// Local path for a download without `--out`. Only the final component of
/// `name` is kept so the file always lands inside `downloads/`.
fn default_download_path(name: &str) -> PathBuf {
    let base = Path::new(name)
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "download".into());
    Path::new("downloads").join(base)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn download_path_stays_in_downloads_dir() {
        assert_eq!(default_download_path("notes.txt"), Path::new("downloads/notes.txt"));
        assert_eq!(default_download_path("../x"), Path::new("downloads/x"));
        assert_eq!(default_download_path("a/b/../../etc/passwd"), Path::new("downloads/passwd"));
        assert_eq!(default_download_path(".."), Path::new("downloads/download"));
    }
}
