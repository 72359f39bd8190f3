//! Rondo delivers a catalog of bilingual practice phrases to a chat
//! channel on a wall-clock schedule, every phrase exactly once per cycle,
//! with a Redis read-through cache in front of Postgres.
//!
//! The crate is layered the usual way: `domain` holds entities, `application`
//! holds the distribution engine, dispatch coordinator, and services,
//! `cache` is the coherency layer over a pluggable backend, and `infra`
//! carries the Postgres, Slack, and telemetry adapters. The binary in
//! `main.rs` wires them together and runs the cron monitor.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
