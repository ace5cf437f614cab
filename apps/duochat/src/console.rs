//! Plain terminal front end: stdin lines, event rendering, countdown

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::warn;

use net_transport::CountdownReporter;
use shared_protocol::{Directive, ShutdownReason};

use crate::session::{ChatEvent, LineSource, SessionReport};

const BAR_WIDTH: usize = 30;

/// Lines from stdin, read on a dedicated thread
///
/// One instance is shared by the menu and every session, so a line typed
/// while a session winds down is not lost.
pub struct StdinLines {
    rx: mpsc::Receiver<String>,
}

impl StdinLines {
    pub fn spawn() -> io::Result<Self> {
        let (tx, rx) = mpsc::channel(32);

        std::thread::Builder::new()
            .name("stdin".into())
            .spawn(move || {
                for line in io::stdin().lock().lines() {
                    match line {
                        Ok(line) => {
                            if tx.blocking_send(line).is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            warn!("Failed to read stdin: {}", e);
                            break;
                        }
                    }
                }
            })?;

        Ok(Self { rx })
    }

    /// Print `text` without a newline, then read one line
    pub async fn prompt(&mut self, text: &str) -> io::Result<Option<String>> {
        print!("{}", text);
        io::stdout().flush()?;
        self.read_line().await
    }
}

#[async_trait]
impl LineSource for StdinLines {
    async fn read_line(&mut self) -> io::Result<Option<String>> {
        Ok(self.rx.recv().await)
    }
}

/// Main menu entries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuChoice {
    Host,
    Connect,
    Quit,
}

impl MenuChoice {
    /// Accepts the entry name or its first letter
    pub fn parse(line: &str) -> Option<Self> {
        match line.trim().to_ascii_lowercase().chars().next()? {
            'h' => Some(Self::Host),
            'c' => Some(Self::Connect),
            'q' => Some(Self::Quit),
            _ => None,
        }
    }
}

pub fn print_banner(local_ip: &str) {
    println!();
    println!("=== duochat ===");
    println!("Your local IP: {}", local_ip);
}

pub fn print_help() {
    for (command, description) in Directive::usage() {
        println!(" {:<7}- {}", command, description);
    }
}

pub fn clear_screen() {
    print!("\x1B[2J\x1B[1;1H");
    let _ = io::stdout().flush();
}

pub fn print_secure_channel(fingerprint: &str) {
    println!("Secure channel established.");
    println!("Host key fingerprint: {}", fingerprint);
    println!("Type /help for commands.");
}

pub fn print_timed_out(secs: u64) {
    println!("No peer within {} seconds.", secs);
}

/// Render one session event on stdout
pub fn render_event(event: ChatEvent) {
    match event {
        ChatEvent::PeerMessage(text) => println!("[Friend]: {}", text),
        ChatEvent::PeerExited => println!("[Peer exited the chat]"),
        ChatEvent::PeerDisconnected => println!("[Peer disconnected]"),
        ChatEvent::ReservedInput => println!("[That text is reserved and was not sent]"),
        ChatEvent::Help => print_help(),
        ChatEvent::ClearScreen => clear_screen(),
        ChatEvent::DecryptionFailed { terminating: true } => {
            println!("[Could not decrypt a message, ending the chat]")
        }
        ChatEvent::DecryptionFailed { terminating: false } => {
            println!("[Could not decrypt a message, skipped]")
        }
        ChatEvent::MessageTooLong { size, max } => {
            println!("[Message not sent: {} bytes encrypted, limit is {}]", size, max)
        }
        ChatEvent::SendError(e) => println!("[Send error: {}]", e),
        ChatEvent::ReceiveError(e) => println!("[Error receiving messages: {}]", e),
    }
}

pub fn print_report(report: &SessionReport) {
    let headline = match report.reason {
        ShutdownReason::Cancelled => "Chat interrupted",
        reason if reason.is_local() => "You left the chat",
        _ => "Chat ended",
    };
    if report.skipped > 0 {
        println!(
            "{} ({} sent, {} received, {} unreadable).",
            headline, report.sent, report.received, report.skipped
        );
    } else {
        println!("{} ({} sent, {} received).", headline, report.sent, report.received);
    }
}

/// Countdown that redraws one line in place
pub fn countdown_reporter(total_secs: u64) -> Arc<dyn CountdownReporter> {
    Arc::new(move |remaining: u64| {
        let mut stdout = io::stdout();
        let _ = write!(stdout, "\r{}", countdown_line(remaining, total_secs));
        if remaining == 0 {
            let _ = writeln!(stdout);
        }
        let _ = stdout.flush();
    })
}

fn countdown_line(remaining: u64, total: u64) -> String {
    let total = total.max(1);
    let elapsed = total.saturating_sub(remaining.min(total));
    let fill = (u128::from(elapsed) * BAR_WIDTH as u128 / u128::from(total)) as usize;

    format!(
        "[{}{}] {} sec remaining  ",
        "#".repeat(fill),
        "-".repeat(BAR_WIDTH - fill),
        remaining
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_menu_choice() {
        assert_eq!(MenuChoice::parse("h"), Some(MenuChoice::Host));
        assert_eq!(MenuChoice::parse("Host"), Some(MenuChoice::Host));
        assert_eq!(MenuChoice::parse(" c "), Some(MenuChoice::Connect));
        assert_eq!(MenuChoice::parse("Q"), Some(MenuChoice::Quit));
        assert_eq!(MenuChoice::parse("x"), None);
        assert_eq!(MenuChoice::parse(""), None);
    }

    #[test]
    fn test_countdown_bar_fills_up() {
        let start = countdown_line(30, 30);
        assert!(start.starts_with(&format!("[{}]", "-".repeat(BAR_WIDTH))));
        assert!(start.contains("30 sec remaining"));

        let half = countdown_line(15, 30);
        assert!(half.starts_with(&format!("[{}{}]", "#".repeat(15), "-".repeat(15))));

        let done = countdown_line(0, 30);
        assert!(done.starts_with(&format!("[{}]", "#".repeat(BAR_WIDTH))));
    }

    #[test]
    fn test_countdown_tolerates_odd_totals() {
        assert!(countdown_line(5, 0).contains("5 sec remaining"));
        assert!(countdown_line(40, 30).starts_with(&format!("[{}]", "-".repeat(BAR_WIDTH))));
    }

    #[test]
    fn test_countdown_handles_huge_totals() {
        let start = countdown_line(u64::MAX, u64::MAX);
        assert!(start.starts_with(&format!("[{}]", "-".repeat(BAR_WIDTH))));

        let done = countdown_line(0, u64::MAX);
        assert!(done.starts_with(&format!("[{}]", "#".repeat(BAR_WIDTH))));
    }
}
