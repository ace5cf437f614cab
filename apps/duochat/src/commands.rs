//! Host and connect flows: establish, exchange keys, chat
//!
//! Once a Ctrl+C listener has been installed the process no longer dies on
//! SIGINT, so every wait outside a running chat races `until_interrupted`.

use std::future::Future;
use std::net::IpAddr;

use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{info, warn};

use net_transport::{
    Established, HandshakeOutcome, accept_until, bind_listener, connect_with_retry,
    perform_initiator_handshake, perform_responder_handshake,
};
use shared_protocol::{SessionRole, SessionState};

use crate::config::ChatConfig;
use crate::console::{self, StdinLines};
use crate::session::ChatSession;

/// Wait for one peer on the configured port and chat with it
pub async fn host(config: &ChatConfig, input: &mut StdinLines) -> Result<()> {
    let listener = bind_listener(config.port)
        .await
        .with_context(|| format!("Cannot listen on port {}", config.port))?;
    info!("Hosting on port {}", config.port);
    println!("Waiting for a peer on port {}...", config.port);

    let waiting = accept_until(
        listener,
        config.connect_timeout(),
        console::countdown_reporter(config.connect_timeout_secs),
    );
    let Some(established) = until_interrupted(waiting).await else {
        return Ok(());
    };
    let established = established.context("Failed to accept a connection")?;

    let Some(mut stream) = arrived(established, config) else {
        return Ok(());
    };

    println!("Peer connected, exchanging keys...");
    let exchange = perform_responder_handshake(&mut stream, config.handshake_timeout());
    let Some(outcome) = until_interrupted(exchange).await else {
        return Ok(());
    };
    let outcome = outcome.context("Key exchange failed")?;

    chat(stream, outcome, SessionRole::Responder, config, input).await;
    Ok(())
}

/// Connect to `address`, retrying until the timeout, and chat
pub async fn connect(address: IpAddr, config: &ChatConfig, input: &mut StdinLines) -> Result<()> {
    println!("Connecting to {}:{}...", address, config.port);

    let connecting = connect_with_retry(
        address,
        config.port,
        config.connect_timeout(),
        config.retry_pause(),
        console::countdown_reporter(config.connect_timeout_secs),
    );
    let Some(established) = until_interrupted(connecting).await else {
        return Ok(());
    };

    let Some(mut stream) = arrived(established, config) else {
        return Ok(());
    };

    println!("Connected, exchanging keys...");
    let exchange = perform_initiator_handshake(&mut stream, config.handshake_timeout());
    let Some(outcome) = until_interrupted(exchange).await else {
        return Ok(());
    };
    let outcome = outcome.context("Key exchange failed")?;

    chat(stream, outcome, SessionRole::Initiator, config, input).await;
    Ok(())
}

/// Run `work` unless Ctrl+C comes first; `None` means interrupted
pub async fn until_interrupted<F: Future>(work: F) -> Option<F::Output> {
    let output = unless(work, ctrl_c()).await;
    if output.is_none() {
        println!("\nCancelled.");
    }
    output
}

async fn unless<F, C>(work: F, interrupt: C) -> Option<F::Output>
where
    F: Future,
    C: Future<Output = ()>,
{
    tokio::select! {
        output = work => Some(output),
        _ = interrupt => None,
    }
}

/// Resolves on Ctrl+C; never resolves if the handler cannot be installed
async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Cannot listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
}

fn arrived(
    established: Established,
    config: &ChatConfig,
) -> Option<tokio::net::TcpStream> {
    // Finish the countdown line
    println!();

    let stream = established.into_stream();
    if stream.is_none() {
        console::print_timed_out(config.connect_timeout_secs);
    }
    stream
}

async fn chat<S>(
    stream: S,
    outcome: HandshakeOutcome,
    role: SessionRole,
    config: &ChatConfig,
    input: &mut StdinLines,
) where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    console::print_secure_channel(&outcome.fingerprint);

    let session = ChatSession::new(stream, outcome.cipher, role, config.session.clone());
    let handle = session.handle();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() && handle.state() == SessionState::Running {
            handle.shutdown();
        }
    });

    let report = session.run(input, console::render_event).await;
    interrupt.abort();
    info!(
        "Session {} as {} ended: {:?}",
        report.id, report.role, report.reason
    );

    console::print_report(&report);
}
