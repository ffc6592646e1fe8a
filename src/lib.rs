#![allow(clippy::uninlined_format_args)]

pub mod app;
pub mod backend;
pub mod composer;
pub mod config;
pub mod data;
pub mod error;
pub mod feed;
pub mod format;
pub mod logging;
pub mod media;
pub mod model;
pub mod page;
pub mod preview;
pub mod ui;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use app::run;
