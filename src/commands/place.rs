use chrono::NaiveDate;
use clap::{Args, Subcommand};
use std::io::{self, Write};

use super::OutputFormat;
use lieux::models::{normalize_tags, Place, PlaceDraft, PlaceUpdate};
use lieux::SyncStore;

#[derive(Args)]
pub struct PlaceCommand {
    #[command(subcommand)]
    pub command: PlaceSubcommand,
}

#[derive(Subcommand)]
pub enum PlaceSubcommand {
    /// Save a new place
    Add {
        /// Name of the place
        name: String,

        /// Latitude in degrees
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,

        /// Longitude in degrees
        #[arg(long, allow_hyphen_values = true)]
        lng: f64,

        /// Free-form description
        #[arg(long)]
        description: Option<String>,

        /// Date of an event held at the place (YYYY-MM-DD)
        #[arg(long)]
        event_date: Option<NaiveDate>,

        /// Tags (can be repeated)
        #[arg(long = "tag", value_name = "TAG")]
        tags: Vec<String>,

        /// Ask for a reminder on the event date
        #[arg(long)]
        notify: bool,
    },

    /// List saved places, newest first
    List {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,

        /// Filter by tag
        #[arg(long = "tag", value_name = "TAG")]
        tag: Option<String>,
    },

    /// Show a place's details
    Show {
        /// Place ID or name
        identifier: String,

        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Update an existing place
    Update {
        /// Place ID or name
        identifier: String,

        /// New name
        #[arg(long)]
        name: Option<String>,

        /// New description
        #[arg(long)]
        description: Option<String>,

        /// New latitude
        #[arg(long, allow_hyphen_values = true)]
        lat: Option<f64>,

        /// New longitude
        #[arg(long, allow_hyphen_values = true)]
        lng: Option<f64>,

        /// New event date (YYYY-MM-DD)
        #[arg(long, conflicts_with = "clear_event_date")]
        event_date: Option<NaiveDate>,

        /// Remove the event date
        #[arg(long)]
        clear_event_date: bool,

        /// Turn the event reminder on or off
        #[arg(long)]
        notify: Option<bool>,

        /// Add a tag (can be repeated)
        #[arg(long = "add-tag", value_name = "TAG")]
        add_tags: Vec<String>,

        /// Remove a tag (can be repeated)
        #[arg(long = "remove-tag", value_name = "TAG")]
        remove_tags: Vec<String>,
    },

    /// Delete a place
    Delete {
        /// Place ID or name
        identifier: String,

        /// Skip confirmation prompt
        #[arg(long, short)]
        force: bool,
    },
}

/// Look a place up by id, then by name (case-insensitive).
fn find_place(store: &SyncStore, identifier: &str) -> Result<Place, Box<dyn std::error::Error>> {
    if let Some(place) = store.place_by_id(identifier) {
        return Ok(place);
    }
    let lower = identifier.to_lowercase();
    store
        .places()
        .into_iter()
        .find(|p| p.name.to_lowercase() == lower)
        .ok_or_else(|| format!("Place not found: {}", identifier).into())
}

/// Turn a no-result from the store into the recorded error, if any.
fn failure(store: &SyncStore, fallback: &str) -> Box<dyn std::error::Error> {
    store
        .last_error()
        .unwrap_or_else(|| fallback.to_string())
        .into()
}

impl PlaceCommand {
    pub async fn run(&self, store: &SyncStore) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            PlaceSubcommand::Add {
                name,
                lat,
                lng,
                description,
                event_date,
                tags,
                notify,
            } => {
                if name.trim().is_empty() {
                    return Err("Place name cannot be empty".into());
                }

                let mut draft = PlaceDraft::new(name.trim(), *lat, *lng).with_tags(tags.clone());
                if let Some(description) = description {
                    draft = draft.with_description(description);
                }
                if let Some(date) = event_date {
                    draft = draft.with_event_date(*date);
                }
                if *notify {
                    draft = draft.with_notification(true);
                }

                match store.add_place(draft).await? {
                    Some(place) => {
                        println!("Saved place:");
                        println!("{}", place);
                        Ok(())
                    }
                    None => Err(failure(
                        store,
                        "A place with this name and location already exists",
                    )),
                }
            }

            PlaceSubcommand::List { format, tag } => {
                let places: Vec<_> = match tag {
                    Some(tag) => store
                        .places_by_date()
                        .into_iter()
                        .filter(|p| p.has_tag(tag))
                        .collect(),
                    None => store.places_by_date(),
                };

                if places.is_empty() {
                    println!("No places found");
                    return Ok(());
                }

                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&places)?);
                    }
                    OutputFormat::Text => {
                        println!("{:<20}  {:<30}  {:<22}  TAGS", "ID", "NAME", "LOCATION");
                        println!("{}", "-".repeat(90));
                        for place in &places {
                            let name = if place.name.chars().count() > 30 {
                                format!("{}...", place.name.chars().take(27).collect::<String>())
                            } else {
                                place.name.clone()
                            };
                            let location = format!("{:.5}, {:.5}", place.lat, place.lng);
                            println!(
                                "{:<20}  {:<30}  {:<22}  {}",
                                place.id,
                                name,
                                location,
                                place.tags.join(", ")
                            );
                        }
                        println!("\nTotal: {} place(s)", places.len());
                    }
                }
                Ok(())
            }

            PlaceSubcommand::Show { identifier, format } => {
                let place = find_place(store, identifier)?;
                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&place)?);
                    }
                    OutputFormat::Text => {
                        println!("{}", place);
                    }
                }
                Ok(())
            }

            PlaceSubcommand::Update {
                identifier,
                name,
                description,
                lat,
                lng,
                event_date,
                clear_event_date,
                notify,
                add_tags,
                remove_tags,
            } => {
                let place = find_place(store, identifier)?;

                let tags = if add_tags.is_empty() && remove_tags.is_empty() {
                    None
                } else {
                    let mut tags = place.tags.clone();
                    tags.extend(add_tags.iter().cloned());
                    tags.retain(|t| !remove_tags.iter().any(|r| r.trim() == t));
                    Some(normalize_tags(tags))
                };

                let update = PlaceUpdate {
                    name: name.clone(),
                    description: description.clone(),
                    lat: *lat,
                    lng: *lng,
                    event_date: if *clear_event_date {
                        Some(None)
                    } else {
                        event_date.map(Some)
                    },
                    tags,
                    notification_enabled: *notify,
                    ..PlaceUpdate::default()
                };

                if update.is_empty() {
                    return Err("Nothing to update. Provide at least one option.".into());
                }

                match store.update_place(&place.id, update).await? {
                    Some(updated) => {
                        println!("Updated place:");
                        println!("{}", updated);
                        Ok(())
                    }
                    None => Err(failure(store, "Place was not updated")),
                }
            }

            PlaceSubcommand::Delete { identifier, force } => {
                let place = find_place(store, identifier)?;

                if !force {
                    print!("Delete place '{}'? [y/N] ", place.name);
                    io::stdout().flush()?;

                    let mut input = String::new();
                    io::stdin().read_line(&mut input)?;

                    if !input.trim().eq_ignore_ascii_case("y") {
                        println!("Deletion cancelled.");
                        return Ok(());
                    }
                }

                if !store.delete_place(&place.id).await {
                    return Err(failure(store, "Place was not deleted"));
                }
                println!("Deleted place: {}", place.name);
                Ok(())
            }
        }
    }
}
