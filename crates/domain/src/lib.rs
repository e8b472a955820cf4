pub mod config;
pub mod error;
pub mod models;
pub mod stream;

pub use config::Config;
pub use error::{Error, Result};
