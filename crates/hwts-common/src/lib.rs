#![doc = "Common types shared across the hw-timestamper workspace."]

pub mod config;
pub mod error;
pub mod record;
pub mod state;

pub use config::*;
pub use error::*;
pub use record::*;
pub use state::*;
