// KwTheme - platform/mod.rs
//
// Platform abstraction layer: directories, config file and environment,
// filesystem helpers, on-disk table formats.
// Must NOT depend on: app.

pub mod config;
pub mod fs;
pub mod table;
