// KwTheme - core/mod.rs
//
// Core business logic layer: extraction, rule filtering, classification,
// aggregation, and report serialisation.
// Must NOT depend on: platform, app. The only network I/O is in `remote`.

pub mod aggregate;
pub mod classify;
pub mod export;
pub mod extract;
pub mod filter;
pub mod model;
pub mod remote;
pub mod rules;
