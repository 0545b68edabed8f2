//! Config command: manager, intelligence and CLI settings

use clap::{Args, Subcommand};

use crate::config::{config_file_path, Config};

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print one setting
    Get {
        /// Setting name, e.g. max_snapshots or inference_threshold
        key: String,
    },
    /// Change one setting and write the config file
    Set {
        /// Setting name
        key: String,
        /// New value; thresholds must lie in [0, 1]
        value: String,
    },
    /// Put one setting back to its default
    Reset {
        /// Setting name
        key: String,
    },
    /// Print every setting
    List,
    /// Print the config file location
    Path,
    /// Write a config file holding the defaults
    Init {
        /// Replace an existing file
        #[arg(long)]
        force: bool,
    },
}

pub fn run(args: &ConfigArgs) -> anyhow::Result<()> {
    let path = config_file_path();
    match &args.command {
        ConfigCommands::Get { key } => {
            let value = Config::load().get(key).ok_or_else(|| {
                anyhow::anyhow!(
                    "Unknown config key: {}. Available keys: {}",
                    key,
                    Config::keys().join(", ")
                )
            })?;
            println!("{}", value);
        }
        ConfigCommands::Set { key, value } => {
            let mut config = Config::load();
            config.set(key, value)?;
            config.save()?;
            tracing::info!("Updated {} in {}", key, path.display());
            println!("Set {} = {}", key, value);
        }
        ConfigCommands::Reset { key } => {
            let mut config = Config::load();
            config.reset(key)?;
            config.save()?;
            println!("Reset {} = {}", key, config.get(key).unwrap_or_default());
        }
        ConfigCommands::List => {
            let config = Config::load();
            let width = Config::keys().iter().map(|k| k.len()).max().unwrap_or(0);
            for key in Config::keys() {
                let value = config.get(key).unwrap_or_default();
                println!("{:width$} = {}", key, value, width = width);
            }
        }
        ConfigCommands::Path => println!("{}", path.display()),
        ConfigCommands::Init { force } => {
            if path.exists() && !force {
                anyhow::bail!(
                    "{} already exists; pass --force to replace it",
                    path.display()
                );
            }
            Config::default().save_to(&path)?;
            println!("Wrote default config to {}", path.display());
        }
    }
    Ok(())
}
