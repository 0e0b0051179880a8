pub mod config;
pub mod error;
pub mod models;
pub mod runner;
pub mod services;
pub mod webdav_xml_parser;


pub use config::{Cli, SyncConfig};
pub use error::{ConfigError, Result, SyncError};
