mod config_cmd;
mod place;
mod tag;

pub use config_cmd::ConfigCommand;
pub use place::PlaceCommand;
pub use tag::TagCommand;

use clap::ValueEnum;

#[derive(Clone, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}
