//! Convert typed domain events into storage-neutral stored-event records and
//! back, with pluggable value-kind extensions and optional encryption.

pub mod config;
pub mod domain;
pub mod event_sourcing;
pub mod metrics;
