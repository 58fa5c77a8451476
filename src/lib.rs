//! Room coordinator backend for shared karaoke queues.
//!
//! Each room is a single-writer state machine: one coordinator owns the
//! queue, votes, identities, playback clock and connection registry, guarded
//! by one lock. Clients follow along over a per-room WebSocket with an HTTP
//! polling fallback; everything durable persists write-through to a
//! document-per-key room store.

/// Durable storage: store trait, backends and legacy schema migration.
pub mod dao;
/// Wire shapes for HTTP and WebSocket surfaces.
pub mod dto;
/// Error taxonomy and HTTP mapping.
pub mod error;
/// Identity claims, PIN hashing and performance history.
pub mod identity;
/// Pure queue ordering, voting and advancement algebra.
pub mod queue;
/// HTTP route trees.
pub mod routes;
/// Service layer between routes and the coordinator.
pub mod services;
/// Shared application state and the per-room coordinator.
pub mod state;

/// Runtime configuration.
pub mod config;
