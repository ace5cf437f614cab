//! Remaining-time reporting while waiting for a peer

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Receives the number of whole seconds left before a deadline
pub trait CountdownReporter: Send + Sync {
    fn report_remaining(&self, seconds: u64);
}

impl<F> CountdownReporter for F
where
    F: Fn(u64) + Send + Sync,
{
    fn report_remaining(&self, seconds: u64) {
        self(seconds)
    }
}

/// Ticks a reporter once per second until the deadline or until dropped
pub struct Countdown {
    task: JoinHandle<()>,
}

impl Countdown {
    pub fn start(deadline: Instant, reporter: Arc<dyn CountdownReporter>) -> Self {
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(1));
            loop {
                ticker.tick().await;
                let remaining = deadline.saturating_duration_since(Instant::now());
                reporter.report_remaining(whole_seconds(remaining));
                if remaining.is_zero() {
                    break;
                }
            }
        });

        Self { task }
    }
}

impl Drop for Countdown {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Seconds rounded up, so 0 is only reported once the deadline has passed
fn whole_seconds(remaining: Duration) -> u64 {
    remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_whole_seconds_rounds_up() {
        assert_eq!(whole_seconds(Duration::ZERO), 0);
        assert_eq!(whole_seconds(Duration::from_millis(1)), 1);
        assert_eq!(whole_seconds(Duration::from_secs(30)), 30);
        assert_eq!(whole_seconds(Duration::from_millis(29_001)), 30);
    }

    #[tokio::test(start_paused = true)]
    async fn test_countdown_reports_every_second() {
        let reports = Arc::new(Mutex::new(Vec::<u64>::new()));
        let sink = reports.clone();
        let reporter: Arc<dyn CountdownReporter> = Arc::new(move |s: u64| sink.lock().push(s));

        let _countdown = Countdown::start(Instant::now() + Duration::from_secs(3), reporter);
        tokio::time::sleep(Duration::from_millis(3500)).await;

        assert_eq!(*reports.lock(), vec![3, 2, 1, 0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_countdown_stops_reports() {
        let reports = Arc::new(Mutex::new(Vec::<u64>::new()));
        let sink = reports.clone();
        let reporter: Arc<dyn CountdownReporter> = Arc::new(move |s: u64| sink.lock().push(s));

        let countdown = Countdown::start(Instant::now() + Duration::from_secs(10), reporter);
        tokio::time::sleep(Duration::from_millis(1500)).await;
        drop(countdown);
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(*reports.lock(), vec![10, 9]);
    }
}
