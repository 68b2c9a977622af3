use clap::{Args, Subcommand, ValueEnum};
use std::fs;
use std::io::Write;
use std::path::Path;

use crate::config::Config;

#[derive(Clone, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Args)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub command: ConfigSubcommand,
}

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Show current configuration values
    Show {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Initialize configuration file
    Init,
}

const DEFAULT_CONFIG: &str = r#"# omnipa configuration

# Where the offline mirror and the pending-change queue are kept
# (default: ~/.local/share/omnipa)
# data_dir: ~/.local/share/omnipa

sync:
  # server_url: "http://localhost:8080"
  # api_key: "your-api-key"

  # Replay queued changes at startup when the server is reachable
  auto_sync: true

  # Give up on a change after this many failed replays (default: never)
  # max_attempts: 10

  # Health check timeout in milliseconds
  probe_timeout_ms: 3000

cache:
  # Seconds an online read stays fresh
  stale_secs: 300
"#;

impl ConfigCommand {
    pub fn run(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            ConfigSubcommand::Show { format } => {
                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(config)?);
                    }
                    OutputFormat::Text => print_config(config),
                }
                Ok(())
            }

            ConfigSubcommand::Init => {
                let config_path = Config::default_config_path();
                if init_config(&config_path)? {
                    println!("Created config file: {}", config_path.display());
                    println!("\nEdit this file to customize your settings.");
                } else {
                    println!("Config file already exists: {}", config_path.display());
                    println!("Use 'omnipa config show' to view current configuration.");
                }
                Ok(())
            }
        }
    }
}

fn print_config(config: &Config) {
    println!("Configuration");
    println!("=============\n");

    if let Some(path) = &config.config_file {
        println!("Config file: {}", path.display());
    } else {
        println!(
            "Config file: {} (not found)",
            Config::default_config_path().display()
        );
    }
    println!();

    println!("data_dir: {}", config.data_dir.value.display());
    println!("  source: {}", config.data_dir.source);
    println!();

    let sync = &config.sync;
    println!("sync:");
    println!(
        "  server_url:         {}",
        sync.server_url.as_deref().unwrap_or("(not set)")
    );
    println!(
        "  api_key:            {}",
        if sync.api_key.is_some() {
            "(set)"
        } else {
            "(not set)"
        }
    );
    println!("  auto_sync:          {}", sync.auto_sync);
    println!("  reconnect_delay_ms: {}", sync.reconnect_delay_ms);
    match sync.max_attempts {
        Some(max) => println!("  max_attempts:       {}", max),
        None => println!("  max_attempts:       unlimited"),
    }
    println!("  probe_timeout_ms:   {}", sync.probe_timeout_ms);
    println!();

    println!("cache:");
    println!("  stale_secs: {}", config.cache.stale_secs);
}

/// Write the default config file. Returns false if one already exists.
fn init_config(config_path: &Path) -> std::io::Result<bool> {
    if config_path.exists() {
        return Ok(false);
    }
    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = fs::File::create(config_path)?;
    file.write_all(DEFAULT_CONFIG.as_bytes())?;
    Ok(true)
}
