//! TenantSync Core - Domain logic for tenant backup and restore
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain entities** - canonical paths, containers, collections, delta state,
//!   collision policy
//! - **Fault bus** - per-run error accumulation under a failure policy
//! - **Counter bus** - named run counters with roll-up
//! - **Configuration** - YAML configuration with validation
//! - **Port definitions** - Traits for adapters: `IContainerEnumerator`,
//!   `IItemFetcher`, `IDriveRestoreTarget`
//!
//! # Architecture
//!
//! The domain module contains pure business logic with no I/O.
//! Ports define trait interfaces that adapter crates implement. The backup
//! and restore engines live in their own crates and only talk to the
//! outside world through these ports.

pub mod config;
pub mod count;
pub mod domain;
pub mod fault;
pub mod ports;
