use clap::{Args, Subcommand};

use super::OutputFormat;
use lieux::models::DEFAULT_TAG_COLOR;
use lieux::SyncStore;

#[derive(Args)]
pub struct TagCommand {
    #[command(subcommand)]
    pub command: TagSubcommand,
}

#[derive(Subcommand)]
pub enum TagSubcommand {
    /// Create a tag
    Add {
        /// Tag name
        name: String,

        /// Display color
        #[arg(long, default_value = DEFAULT_TAG_COLOR)]
        color: String,
    },

    /// List tags
    List {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Delete a tag and remove it from every place
    Delete {
        /// Tag name
        name: String,
    },

    /// Upload tags created while offline, then reload
    Sync,
}

impl TagCommand {
    pub async fn run(&self, store: &SyncStore) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            TagSubcommand::Add { name, color } => match store.add_tag(name, color).await {
                Some(tag) => {
                    println!("Created tag: {}", tag);
                    if tag.local_only {
                        println!("Saved locally only; run `lieux tag sync` to upload it.");
                    }
                    Ok(())
                }
                None => Err(format!("Tag name is empty or already used: '{}'", name.trim()).into()),
            },

            TagSubcommand::List { format } => {
                let tags = store.tags();
                if tags.is_empty() {
                    println!("No tags found");
                    return Ok(());
                }

                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&tags)?);
                    }
                    OutputFormat::Text => {
                        let used = store.used_tags();
                        println!("{:<24}  {:<9}  {:<6}  STATUS", "NAME", "COLOR", "USED");
                        println!("{}", "-".repeat(52));
                        for tag in &tags {
                            let in_use = if used.contains(&tag.name) { "yes" } else { "no" };
                            let status = if tag.local_only { "local" } else { "synced" };
                            println!(
                                "{:<24}  {:<9}  {:<6}  {}",
                                tag.name, tag.color, in_use, status
                            );
                        }
                        println!("\nTotal: {} tag(s)", tags.len());
                    }
                }
                Ok(())
            }

            TagSubcommand::Delete { name } => {
                if !store.delete_tag(name).await {
                    return Err(format!("Tag not found: {}", name).into());
                }
                println!("Deleted tag: {}", name.trim());
                Ok(())
            }

            TagSubcommand::Sync => {
                let pushed = store.push_local_tags().await;
                store.load_tags().await;
                println!("Uploaded {} tag(s); {} tag(s) total", pushed, store.tag_count());
                Ok(())
            }
        }
    }
}
