use clap::{Args, Subcommand};

use super::OutputFormat;
use lieux::config::Config;

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
}

impl ConfigCommand {
    pub fn run(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            ConfigSubcommand::Show { format } => {
                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(config)?);
                    }
                    OutputFormat::Text => {
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

                        println!("backend: {}", config.backend.value);
                        println!("  source: {}", config.backend.source);
                        println!();

                        println!("user_id: {}", config.user_id.value);
                        println!("  source: {}", config.user_id.source);
                        println!();

                        let firestore = &config.firestore;
                        let show = |v: &Option<String>| {
                            v.clone().unwrap_or_else(|| "(not set)".to_string())
                        };
                        let secret = |v: &Option<String>| if v.is_some() { "(set)" } else { "(not set)" };
                        println!("firestore:");
                        println!("  project_id: {}", show(&firestore.project_id));
                        println!("  api_key: {}", secret(&firestore.api_key));
                        println!("  base_url: {}", show(&firestore.base_url));
                        println!("  email: {}", show(&firestore.email));
                        println!("  password: {}", secret(&firestore.password));
                    }
                }
                Ok(())
            }
        }
    }
}
