//! Daemon - runs one earbud's ANC manager
//!
//! Owns the manager on a single task and feeds it timer expiries and console
//! commands through one `select!` loop, so every event goes through the same
//! dispatch point in arrival order.

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast, mpsc};

use crate::anc::{AncManager, Collaborators};
use crate::audio::SimulatedAudio;
use crate::clock::SystemClockBridge;
use crate::event::Event;
use crate::notify::Notification;
use crate::peer::NullPeerLink;
use crate::persist::FileSessionStore;
use crate::timer::TokioTimer;
use crate::{Config, Result};

/// Console command buffer
const CONSOLE_BUFFER: usize = 16;

/// A line typed on the console
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleCommand {
    /// Deliver an event to the manager
    Event(Event),
    /// Print the runtime state
    Status,
    /// Power off and exit
    Quit,
}

/// Parse one console line; blank lines yield `None`
///
/// # Errors
///
/// Returns error text for an unrecognised command
pub fn parse_console_line(line: &str) -> std::result::Result<Option<ConsoleCommand>, String> {
    match line.trim() {
        "" => Ok(None),
        "status" => Ok(Some(ConsoleCommand::Status)),
        "quit" | "exit" => Ok(Some(ConsoleCommand::Quit)),
        other => other
            .parse::<Event>()
            .map(|e| Some(ConsoleCommand::Event(e)))
            .map_err(|e| e.to_string()),
    }
}

/// The ANC daemon
pub struct Daemon {
    config: Config,
}

impl Daemon {
    /// Create a new daemon instance
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config }
    }

    /// Run the daemon until interrupted or told to quit
    ///
    /// # Errors
    ///
    /// Returns error if the manager fails to initialise
    pub async fn run(self) -> Result<()> {
        let (timer, mut timer_rx) = TokioTimer::new();
        let side = self.config.side;
        let session_path = self.config.persist.path.clone();

        let io = Collaborators {
            audio: Box::new(SimulatedAudio::new(side.to_string())),
            store: Box::new(FileSessionStore::new(&session_path)),
            peer: Box::new(NullPeerLink),
            clock: Box::new(SystemClockBridge),
            timer: Box::new(timer.clone()),
        };
        let mut manager = AncManager::new(self.config, io);

        tokio::spawn(print_notifications(manager.subscribe()));

        let (console_tx, mut console_rx) = mpsc::channel(CONSOLE_BUFFER);
        tokio::spawn(read_console(console_tx));

        // Set up shutdown signal
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let _ = shutdown_tx.send(()).await;
            }
        });

        manager.initialise()?;
        manager.dispatch(Event::PowerOn)?;

        tracing::info!(
            %side,
            state = %manager.state(),
            mode = %manager.current_mode(),
            session = %session_path.display(),
            "daemon running"
        );

        let mut console_open = true;
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::info!("shutdown requested");
                    break;
                }
                Some(fired) = timer_rx.recv() => {
                    if let Some(kind) = timer.accept(fired) {
                        if let Err(e) = manager.dispatch(Event::TimerExpired(kind)) {
                            tracing::debug!(%kind, error = %e, "timer event not handled");
                        }
                    }
                }
                cmd = console_rx.recv(), if console_open => match cmd {
                    Some(ConsoleCommand::Event(event)) => {
                        if let Err(e) = manager.dispatch(event) {
                            tracing::warn!(%event, error = %e, "command failed");
                        }
                    }
                    Some(ConsoleCommand::Status) => print_status(&manager),
                    Some(ConsoleCommand::Quit) => break,
                    None => {
                        tracing::debug!("console closed");
                        console_open = false;
                    }
                },
            }
        }

        if let Err(e) = manager.dispatch(Event::PowerOff) {
            tracing::warn!(error = %e, "power-off did not complete cleanly");
        }
        tracing::info!("daemon stopped");
        Ok(())
    }
}

async fn read_console(tx: mpsc::Sender<ConsoleCommand>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(error = %e, "console read failed");
                break;
            }
        };

        match parse_console_line(&line) {
            Ok(Some(cmd)) => {
                if tx.send(cmd).await.is_err() {
                    break;
                }
            }
            Ok(None) => {}
            Err(e) => tracing::warn!("{e}"),
        }
    }
}

async fn print_notifications(mut rx: broadcast::Receiver<Notification>) {
    loop {
        match rx.recv().await {
            Ok(notification) => match serde_json::to_string(&notification) {
                Ok(json) => println!("{json}"),
                Err(e) => tracing::warn!(error = %e, "failed to encode notification"),
            },
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "notification printer fell behind");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn print_status(manager: &AncManager) {
    match serde_json::to_string_pretty(manager.runtime()) {
        Ok(json) => println!("{json}"),
        Err(e) => tracing::warn!(error = %e, "failed to encode status"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anc::AncMode;

    #[test]
    fn console_lines() {
        assert_eq!(parse_console_line("  "), Ok(None));
        assert_eq!(parse_console_line("status"), Ok(Some(ConsoleCommand::Status)));
        assert_eq!(parse_console_line("exit"), Ok(Some(ConsoleCommand::Quit)));
        assert_eq!(
            parse_console_line("mode 2"),
            Ok(Some(ConsoleCommand::Event(Event::SetMode(AncMode::new(1)))))
        );
        assert!(parse_console_line("fly").is_err());
    }

    #[tokio::test]
    async fn notifications_print_until_closed() {
        let (tx, rx) = broadcast::channel(4);
        let printer = tokio::spawn(print_notifications(rx));
        tx.send(Notification::QuietModeOn).unwrap();
        drop(tx);
        printer.await.unwrap();
    }
}
