//! GRBL TCP front end
//!
//! One listening socket, one emulator session per connection. Senders
//! get the greeting banner on connect, then a plain request/response
//! byte stream: incoming chunks feed the session, response lines go
//! straight back. Sessions share nothing but the spooler handle, so a
//! disconnecting sender never disturbs another.

use anyhow::Context;
use laserkit_core::command::CommandSink;
use laserkit_grbl::{GrblConfig, GrblEmulator, GrblResponse};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// TCP server hosting GRBL emulator sessions
pub struct GrblServer {
    sink: Arc<dyn CommandSink>,
    grbl: GrblConfig,
    listen: String,
}

impl GrblServer {
    /// Create a server that will bind `listen` when run
    pub fn new(
        sink: Arc<dyn CommandSink>,
        grbl: GrblConfig,
        listen: impl Into<String>,
    ) -> Self {
        GrblServer {
            sink,
            grbl,
            listen: listen.into(),
        }
    }

    /// Accept connections until Ctrl-C
    pub async fn run(&self) -> anyhow::Result<()> {
        let listener = TcpListener::bind(&self.listen)
            .await
            .with_context(|| format!("failed to bind {}", self.listen))?;
        tracing::info!(addr = %self.listen, "GRBL server listening");

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, peer) = accepted.context("accept failed")?;
                    tracing::info!(%peer, "GRBL sender connected");
                    let sink = self.sink.clone();
                    let grbl = self.grbl.clone();
                    tokio::spawn(async move {
                        match serve_session(stream, sink, grbl).await {
                            Ok(()) => tracing::info!(%peer, "GRBL sender disconnected"),
                            Err(err) => {
                                tracing::warn!(%peer, error = %err, "GRBL session dropped")
                            }
                        }
                    });
                }
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("shutdown signal received");
                    return Ok(());
                }
            }
        }
    }
}

async fn serve_session(
    mut stream: TcpStream,
    sink: Arc<dyn CommandSink>,
    grbl: GrblConfig,
) -> anyhow::Result<()> {
    stream
        .write_all(GrblResponse::Welcome.to_wire().as_bytes())
        .await?;

    let mut session = GrblEmulator::new(sink, grbl);
    let mut chunk = [0u8; 512];
    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        let mut out = String::new();
        for response in session.write(&chunk[..n]) {
            out.push_str(&response.to_wire());
        }
        if !out.is_empty() {
            stream.write_all(out.as_bytes()).await?;
        }
    }
}
