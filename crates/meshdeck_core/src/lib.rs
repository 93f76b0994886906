pub mod config;
pub mod logging;

pub use config::DeckConfig;
pub use logging::{default_filter, init_logging, init_logging_to_dir};
