//! Sync CLI commands for replaying queued changes against the server.

use chrono::{Local, TimeZone};
use clap::{Args, Subcommand};

use omnipa_core::SyncReport;

use crate::config::Config;
use crate::session::Session;

/// Sync with remote server
#[derive(Debug, Args)]
pub struct SyncCommand {
    #[command(subcommand)]
    command: Option<SyncSubcommand>,
}

#[derive(Debug, Subcommand)]
enum SyncSubcommand {
    /// Show sync configuration, connectivity and queue status
    Status,
}

impl SyncCommand {
    pub async fn run(&self, config: &Config, session: &Session) -> Result<(), SyncCommandError> {
        match &self.command {
            None => self.sync(config, session).await,
            Some(SyncSubcommand::Status) => {
                self.status(config, session);
                Ok(())
            }
        }
    }

    async fn sync(&self, config: &Config, session: &Session) -> Result<(), SyncCommandError> {
        if !config.sync.is_configured() {
            return Err(SyncCommandError::NotConfigured);
        }

        let pending = session.sync.pending_changes_count(None);
        if session.sync.is_offline() {
            return Err(SyncCommandError::Unreachable {
                server_url: session.server_url().unwrap_or_default().to_string(),
                pending,
            });
        }
        if pending == 0 {
            println!("Nothing to sync.");
            return Ok(());
        }

        let report = session.sync.sync_now().await;
        print_report(&report, session.sync.pending_changes_count(None));
        Ok(())
    }

    fn status(&self, config: &Config, session: &Session) {
        println!("Sync Status");
        println!("===========");
        println!();

        match session.server_url() {
            Some(url) => println!("Server:       {}", url),
            None => {
                println!("Server:       not configured");
            }
        }
        println!(
            "Auto-sync:    {}",
            if config.sync.auto_sync {
                "enabled"
            } else {
                "disabled"
            }
        );
        println!("Connectivity: {}", session.monitor.status());
        println!();

        let sync = &session.sync;
        println!("Pending changes: {}", sync.pending_changes_count(None));
        println!("Dead letters:    {}", sync.tracker().dead_letters().len());
        println!("Last sync:       {}", format_last_sync(sync.last_sync()));

        if !config.sync.is_configured() {
            println!();
            println!("To enable sync, add to your config file:");
            println!();
            println!("  sync:");
            println!("    server_url: \"http://localhost:8080\"");
            println!("    api_key: \"your-api-key\"");
            println!();
            println!("Or set environment variables:");
            println!("  OMNIPA_SERVER_URL");
            println!("  OMNIPA_API_KEY");
        }
    }
}

fn print_report(report: &SyncReport, remaining: usize) {
    if report.synced > 0 {
        println!("✓ synced {} change(s)", report.synced);
    }
    if report.failed > 0 {
        println!("✗ {} change(s) failed and will be retried", report.failed);
    }
    if report.dead_lettered > 0 {
        println!(
            "✗ gave up on {} change(s); see 'omnipa pending dead-letters'",
            report.dead_lettered
        );
    }
    if remaining == 0 {
        println!("All changes synced.");
    } else {
        println!("{} change(s) still pending.", remaining);
    }
}

fn format_last_sync(millis: Option<i64>) -> String {
    millis
        .and_then(|ms| Local.timestamp_millis_opt(ms).single())
        .map(|at| at.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "never".to_string())
}

/// Errors from sync commands
#[derive(Debug)]
pub enum SyncCommandError {
    NotConfigured,
    Unreachable { server_url: String, pending: usize },
}

impl std::fmt::Display for SyncCommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncCommandError::NotConfigured => write!(
                f,
                "Sync is not configured. Set sync.server_url and sync.api_key in your config file."
            ),
            SyncCommandError::Unreachable {
                server_url,
                pending,
            } => write!(
                f,
                "Server {} is unreachable. {} change(s) remain queued.",
                server_url, pending
            ),
        }
    }
}

impl std::error::Error for SyncCommandError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_last_sync_never() {
        assert_eq!(format_last_sync(None), "never");
    }

    #[test]
    fn test_format_last_sync_timestamp() {
        let formatted = format_last_sync(Some(1_700_000_000_000));
        assert_eq!(formatted.len(), "2023-11-14 22:13:20".len());
        assert!(formatted.starts_with("2023-11-1"));
    }

    #[test]
    fn test_error_messages() {
        assert!(SyncCommandError::NotConfigured
            .to_string()
            .contains("not configured"));
        let err = SyncCommandError::Unreachable {
            server_url: "http://localhost:8080".to_string(),
            pending: 2,
        };
        assert_eq!(
            err.to_string(),
            "Server http://localhost:8080 is unreachable. 2 change(s) remain queued."
        );
    }
}
