// KwTheme - app/mod.rs
//
// Application layer: analysis orchestration, report persistence, rule
// document management.
// Dependencies: core, platform.

pub mod pipeline;
pub mod report;
pub mod rules_store;
