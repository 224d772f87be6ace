//! Notable Core - Domain logic for offline-first note sync
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain entities** - `Notebook`, `Page`, `Stroke`, `Image`, `Folder`
//! - **Sync policies** - backoff ladder, result aggregation, remote file naming
//! - **Port definitions** - Traits for adapters: `ILocalStore`, `IRemoteStore`,
//!   `ISyncQueueRepository`, `IDeletionLogRepository`, `IWatermarkStore`, `IImageStore`
//! - **Configuration** - YAML config with validation
//!
//! # Architecture
//!
//! The domain module contains pure logic with no I/O. Ports define trait
//! interfaces that adapter crates implement; the orchestrator in
//! `notable-sync` drives the domain through them.

pub mod config;
pub mod domain;
pub mod ports;
