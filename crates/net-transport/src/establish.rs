//! Deadline-bounded connection establishment
//!
//! Responder: accept once, racing a timer. Initiator: connect repeatedly
//! until the deadline, since the responder may not be listening yet.
//! Running out of time is the `TimedOut` outcome, never an error.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::{Countdown, CountdownReporter, TransportError, TransportResult};

const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Result of waiting for a peer
#[derive(Debug)]
pub enum Established {
    Connected(TcpStream),
    TimedOut,
}

impl Established {
    pub fn into_stream(self) -> Option<TcpStream> {
        match self {
            Self::Connected(stream) => Some(stream),
            Self::TimedOut => None,
        }
    }

    pub fn is_timed_out(&self) -> bool {
        matches!(self, Self::TimedOut)
    }
}

/// Bind a listener on all IPv4 interfaces
pub async fn bind_listener(port: u16) -> TransportResult<TcpListener> {
    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    TcpListener::bind(addr)
        .await
        .map_err(|e| TransportError::Bind(format!("{}: {}", addr, e)))
}

/// Listen on `port` and wait at most `deadline` for one connection
pub async fn accept_with_deadline(
    port: u16,
    deadline: Duration,
    reporter: Arc<dyn CountdownReporter>,
) -> TransportResult<Established> {
    let listener = bind_listener(port).await?;
    info!("Listening on {}", listener.local_addr()?);

    accept_until(listener, deadline, reporter).await
}

/// Wait at most `deadline` for one connection on an already bound listener
///
/// The listener is consumed and closed on every return path.
pub async fn accept_until(
    listener: TcpListener,
    deadline: Duration,
    reporter: Arc<dyn CountdownReporter>,
) -> TransportResult<Established> {
    let deadline_at = instant_after(deadline);
    let _countdown = Countdown::start(deadline_at, reporter);

    let outcome = tokio::select! {
        accepted = listener.accept() => {
            let (stream, peer) = accepted.map_err(|e| TransportError::Accept(e.to_string()))?;
            info!("Accepted connection from {}", peer);
            configure_stream(&stream);
            Established::Connected(stream)
        }
        _ = tokio::time::sleep_until(deadline_at) => {
            info!("No connection within {:?}", deadline);
            Established::TimedOut
        }
    };

    drop(listener);
    Ok(outcome)
}

/// Connect to `addr:port`, retrying until `deadline` runs out
///
/// Each attempt races the time left; a failed attempt is dropped and retried
/// after `retry_pause`, clamped so the deadline is never overshot or cut short.
pub async fn connect_with_retry(
    addr: IpAddr,
    port: u16,
    deadline: Duration,
    retry_pause: Duration,
    reporter: Arc<dyn CountdownReporter>,
) -> Established {
    let target = SocketAddr::new(addr, port);
    let deadline_at = instant_after(deadline);
    let _countdown = Countdown::start(deadline_at, reporter);

    info!("Connecting to {}", target);

    let mut attempts = 0u32;
    loop {
        let remaining = deadline_at.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            info!("Gave up on {} after {} attempt(s)", target, attempts);
            return Established::TimedOut;
        }

        attempts += 1;
        match tokio::time::timeout(remaining, TcpStream::connect(target)).await {
            Ok(Ok(stream)) => {
                info!("Connected to {} (attempt {})", target, attempts);
                configure_stream(&stream);
                return Established::Connected(stream);
            }
            Ok(Err(e)) => debug!("Connect attempt {} to {} failed: {}", attempts, target, e),
            Err(_) => debug!("Connect attempt {} to {} ran out of time", attempts, target),
        }

        let remaining = deadline_at.saturating_duration_since(Instant::now());
        tokio::time::sleep(retry_pause.min(remaining)).await;
    }
}

/// `now + deadline`, saturating at roughly thirty years out
fn instant_after(deadline: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(deadline).unwrap_or(now + FAR_FUTURE)
}

fn configure_stream(stream: &TcpStream) {
    if let Err(e) = stream.set_nodelay(true) {
        warn!("Failed to set TCP_NODELAY: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant as StdInstant;

    fn quiet() -> Arc<dyn CountdownReporter> {
        Arc::new(|_: u64| {})
    }

    /// A port that was free a moment ago
    async fn free_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }

    #[tokio::test]
    async fn test_accept_times_out_and_releases_port() {
        let port = free_port().await;
        let deadline = Duration::from_millis(300);

        let started = StdInstant::now();
        let outcome = accept_with_deadline(port, deadline, quiet()).await.unwrap();
        let elapsed = started.elapsed();

        assert!(outcome.is_timed_out());
        assert!(elapsed >= deadline, "returned early: {:?}", elapsed);
        assert!(elapsed < deadline + Duration::from_millis(250), "returned late: {:?}", elapsed);

        // Listener is gone, so the port can be bound again
        let rebound = bind_listener(port).await;
        assert!(rebound.is_ok());
    }

    #[tokio::test]
    async fn test_accept_returns_connected_stream() {
        let listener = bind_listener(0).await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let client = tokio::spawn(async move {
            TcpStream::connect((Ipv4Addr::LOCALHOST, port)).await.unwrap()
        });

        let outcome = accept_until(listener, Duration::from_secs(5), quiet())
            .await
            .unwrap();
        let stream = outcome.into_stream().expect("should be connected");
        let client = client.await.unwrap();

        assert_eq!(stream.peer_addr().unwrap(), client.local_addr().unwrap());
        assert!(stream.nodelay().unwrap());
    }

    #[tokio::test]
    async fn test_bind_conflict_is_an_error() {
        let listener = bind_listener(0).await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let result = accept_with_deadline(port, Duration::from_millis(100), quiet()).await;
        assert!(matches!(result, Err(TransportError::Bind(_))));
    }

    #[tokio::test]
    async fn test_connect_times_out_no_earlier_than_deadline() {
        let port = free_port().await;
        let deadline = Duration::from_millis(700);

        let started = StdInstant::now();
        let outcome = connect_with_retry(
            IpAddr::V4(Ipv4Addr::LOCALHOST),
            port,
            deadline,
            Duration::from_millis(100),
            quiet(),
        )
        .await;
        let elapsed = started.elapsed();

        assert!(outcome.is_timed_out());
        assert!(elapsed >= deadline, "returned early: {:?}", elapsed);
        assert!(elapsed < deadline + Duration::from_millis(500), "returned late: {:?}", elapsed);
    }

    #[tokio::test]
    async fn test_connect_retries_until_listener_appears() {
        let port = free_port().await;

        let server = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(400)).await;
            let listener = bind_listener(port).await.unwrap();
            let (stream, _) = listener.accept().await.unwrap();
            stream
        });

        let outcome = connect_with_retry(
            IpAddr::V4(Ipv4Addr::LOCALHOST),
            port,
            Duration::from_secs(5),
            Duration::from_millis(50),
            quiet(),
        )
        .await;

        assert!(matches!(outcome, Established::Connected(_)));
        server.await.unwrap();
    }

    #[test]
    fn test_huge_deadline_saturates() {
        let at = instant_after(Duration::from_secs(u64::MAX));
        assert!(at > Instant::now() + Duration::from_secs(86_400 * 365));

        let near = instant_after(Duration::from_secs(5));
        assert!(near <= Instant::now() + Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_unbounded_deadlines_still_connect() {
        let listener = bind_listener(0).await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let connecting = connect_with_retry(
            IpAddr::V4(Ipv4Addr::LOCALHOST),
            port,
            Duration::from_secs(u64::MAX),
            Duration::from_millis(10),
            quiet(),
        );
        let accepting = accept_until(listener, Duration::from_secs(u64::MAX), quiet());

        let (connected, accepted) = tokio::time::timeout(
            Duration::from_secs(5),
            async { tokio::join!(connecting, accepting) },
        )
        .await
        .expect("deadline handling stalled");

        assert!(matches!(connected, Established::Connected(_)));
        assert!(matches!(accepted, Ok(Established::Connected(_))));
    }
}
