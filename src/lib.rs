pub mod api;
pub mod config;
pub mod engine;
pub mod events;
pub mod humanize;
pub mod ledger;
pub mod media;
pub mod observability;
pub mod pipeline;
pub mod queue;
