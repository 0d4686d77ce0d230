pub mod api;
pub mod catalog;
pub mod config;
pub mod merge;
pub mod query;
pub mod refresh;
pub mod source;
pub mod stats;
pub mod storage;
