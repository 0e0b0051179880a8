// Re-export all model types for ease of use

pub mod date_window;
pub mod manifest;
pub mod resource;

pub use date_window::DateWindow;
pub use manifest::Manifest;
pub use resource::{collection_sentinel_date, Resource, ResourceKind};
