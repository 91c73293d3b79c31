use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::{Path as UrlPath, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use tokio::process::Command;
use tokio::sync::{oneshot, Semaphore};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Fans the external main-content extractor out over archived bodies. Bodies
/// are served to the child processes from a loopback HTTP server on an
/// ephemeral port; each child's stdout lands in `output_dir/<hash>`.
pub struct ExtractorDriver {
    /// Program plus leading arguments; the per-hash URL is appended.
    pub command: String,
    pub body_dir: PathBuf,
    pub output_dir: PathBuf,
}

#[derive(Clone)]
struct ServeState {
    body_dir: Arc<PathBuf>,
}

async fn serve_body(
    State(state): State<ServeState>,
    UrlPath(hash): UrlPath<String>,
) -> Result<Vec<u8>, StatusCode> {
    // only hash-shaped names reach the filesystem
    if hash.len() != 64 || !hash.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(StatusCode::NOT_FOUND);
    }
    tokio::fs::read(state.body_dir.join(&hash))
        .await
        .map_err(|_| StatusCode::NOT_FOUND)
}

/// Serve `GET /{hash}` from `body_dir` on an ephemeral loopback port until
/// the returned sender fires.
async fn spawn_body_server(
    body_dir: PathBuf,
) -> Result<(u16, oneshot::Sender<()>, JoinHandle<()>)> {
    let state = ServeState {
        body_dir: Arc::new(body_dir),
    };
    let app = Router::new().route("/:hash", get(serve_body)).with_state(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .context("bind loopback body server")?;
    let port = listener.local_addr()?.port();
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(async move {
        let _ = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await;
    });
    Ok((port, shutdown_tx, handle))
}

impl ExtractorDriver {
    pub async fn run(&self, hashes: &[String]) -> Result<()> {
        if hashes.is_empty() {
            info!("no HTML bodies to extract");
            return Ok(());
        }
        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .with_context(|| format!("extractor dir {}", self.output_dir.display()))?;

        let (port, shutdown_tx, server) = spawn_body_server(self.body_dir.clone()).await?;
        info!(port, bodies = hashes.len(), "extractor body server listening");

        let result = self.run_children(port, hashes).await;

        // the server comes down on every exit path
        let _ = shutdown_tx.send(());
        let _ = server.await;
        result
    }

    async fn run_children(&self, port: u16, hashes: &[String]) -> Result<()> {
        let mut parts = self.command.split_whitespace();
        let program = parts
            .next()
            .context("extractor command is empty")?
            .to_string();
        let leading_args: Vec<String> = parts.map(|s| s.to_string()).collect();

        let workers = std::cmp::max(1, num_cpus::get().saturating_sub(1));
        let semaphore = Arc::new(Semaphore::new(workers));
        info!(workers, "spawning extractor children");

        let mut handles = Vec::with_capacity(hashes.len());
        for hash in hashes {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .context("extractor semaphore closed")?;
            let program = program.clone();
            let leading_args = leading_args.clone();
            let output_dir = self.output_dir.clone();
            let hash = hash.clone();
            handles.push(tokio::spawn(async move {
                let _permit = permit;
                let body_url = format!("http://127.0.0.1:{port}/{hash}");
                let output = Command::new(&program)
                    .args(&leading_args)
                    .arg(&body_url)
                    .stdout(Stdio::piped())
                    .output()
                    .await;
                match output {
                    Ok(out) if out.status.success() => {
                        if let Err(e) = tokio::fs::write(output_dir.join(&hash), &out.stdout).await
                        {
                            warn!(hash = %hash, "extractor output write failed: {}", e);
                        }
                    }
                    Ok(out) => {
                        warn!(hash = %hash, code = ?out.status.code(), "extractor exited non-zero, skipping");
                    }
                    Err(e) => warn!(hash = %hash, "extractor spawn failed: {}", e),
                }
            }));
        }
        for handle in handles {
            let _ = handle.await;
        }
        Ok(())
    }
}
