pub mod sync_planner;
pub mod webdav;
