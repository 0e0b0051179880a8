// WebDAV protocol client and folder crawler

pub mod common;
pub mod crawler;
pub mod service;

// Re-export main types for convenience
pub use crawler::{CrawlReport, FolderLister, SkippedEntry, TreeCrawler};
pub use service::{Depth, WebDAVService};
