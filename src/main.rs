//! Weaverbird - feature development conversations from the terminal
//!
//! Reads user messages from stdin and prints UI events as JSON lines on
//! stdout. `/code` generates code for the current approach, `/accept` writes
//! it into the workspace, `/retry` repeats the last message. Ctrl-C while a
//! request runs cancels it; Ctrl-C while waiting for input, or end of input,
//! ends the session.

use std::future::Future;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use weaverbird::remote::{HttpJobClient, HttpUploader};
use weaverbird::vfs::InMemoryFileSystem;
use weaverbird::{ChannelMessenger, Session, SessionConfig, SessionError};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging; stdout carries the event stream
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "weaverbird=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let config = SessionConfig::from_env()?;
    let Some(endpoint) = config.endpoint.clone() else {
        tracing::error!("WEAVERBIRD_ENDPOINT is not set");
        return Err("WEAVERBIRD_ENDPOINT is not set".into());
    };
    tracing::info!(
        workspace = %config.workspace_root.display(),
        %endpoint,
        poll_interval = ?config.polling.interval,
        poll_max_iterations = config.polling.max_iterations,
        "Starting session"
    );

    let (messenger, mut events) = ChannelMessenger::new();
    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match serde_json::to_string(&event) {
                Ok(line) => println!("{line}"),
                Err(e) => tracing::warn!(error = %e, "Failed to encode event"),
            }
        }
    });

    let mut session = Session::new(
        &config,
        uuid::Uuid::new_v4().to_string(),
        Arc::new(HttpJobClient::new(&endpoint)?),
        Arc::new(HttpUploader::new()?),
        Arc::new(messenger),
        Arc::new(InMemoryFileSystem::new()),
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = next_line(&mut lines, interrupted()).await? {
        let line = line.trim();
        let result = match line {
            "/code" => match session.init_codegen() {
                Ok(()) => {
                    let token = session.cancellation_token();
                    until_cancelled(session.start_code_generation(), &token)
                        .await
                        .map(|_| ())
                }
                Err(e) => Err(e),
            },
            "/accept" => session.accept_changes().await.map(|_| ()),
            "/retry" => {
                let token = session.cancellation_token();
                until_cancelled(session.retry(), &token).await.map(|_| ())
            }
            message => send_message(&mut session, message).await,
        };

        if let Err(e) = result {
            session.handle_error(&e);
        }
    }

    drop(session);
    printer.await?;
    Ok(())
}

async fn send_message(session: &mut Session, message: &str) -> Result<(), SessionError> {
    session.preloader(message).await?;
    let token = session.cancellation_token();
    let interaction = until_cancelled(session.send(message), &token).await?;
    if let Some(content) = interaction.content {
        tracing::debug!(content = %content, "Interaction content");
    }
    Ok(())
}

/// Next input line, or `None` at end of input or once `interrupt` fires
async fn next_line<R, I>(lines: &mut Lines<R>, interrupt: I) -> std::io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
    I: Future<Output = ()>,
{
    tokio::select! {
        line = lines.next_line() => line,
        () = interrupt => {
            tracing::info!("Interrupted, ending session");
            Ok(None)
        }
    }
}

/// Resolves on Ctrl-C; never resolves if the handler cannot be installed
async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Unable to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

/// Drive `future` to completion, cancelling `token` on Ctrl-C
///
/// The future is never dropped early; the state notices the cancellation at
/// its next polling boundary and finishes on its own.
async fn until_cancelled<F: Future>(future: F, token: &CancellationToken) -> F::Output {
    tokio::pin!(future);
    tokio::select! {
        output = &mut future => return output,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Cancelling current request");
            token.cancel();
        }
    }
    future.await
}
