//! Configuration module.
//!
//! - `types`: field defaults and constants
//! - `config_struct`: the `Settings` struct and its normalization
//! - `io`: settings loading and saving

mod config_struct;
mod io;
mod types;

pub use config_struct::Settings;
pub use io::{get_settings_path, load_settings, load_settings_from, save_settings, save_settings_to};
pub use types::API_KEY_ENV;
