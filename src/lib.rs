pub mod archive_it;
pub mod completeness;
pub mod config;
pub mod domain;
pub mod error;
pub mod fs_util;
pub mod inventory;
pub mod naming;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod reports;
pub mod seed;
pub mod tools;
pub mod warc;
