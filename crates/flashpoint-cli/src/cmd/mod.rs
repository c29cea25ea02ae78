pub mod config;
pub mod create;
pub mod list;
pub mod reclaim;
