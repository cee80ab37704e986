//! # Marcus Core
//!
//! Marcus Core is the assignment engine at the center of a multi-agent
//! coordination server: it hands autonomous coding agents the single best next
//! task, keeps their claim on it alive through a lease, and reconciles state
//! with a kanban board of record.
//!
//! ## Architecture
//!
//! The system consists of:
//! - **Task Store**: an in-memory mirror of the kanban board's task graph
//! - **Assignment Persistence**: durable agent -> task bindings, independent of
//!   the kanban board
//! - **Lease Manager**: liveness contract over each assignment
//! - **Agent Registry**: the set of currently connected agents and their skills
//! - **Assignment Engine**: the filter/score/commit pipeline that picks the
//!   next task for a requesting agent
//! - **Monitors**: background reconciliation between leases, assignments, and
//!   the kanban board
//!
//! ## Usage
//!
//! The system is typically run as a standalone server exposing HTTP and stdio
//! transports for agent clients, backed by a pluggable kanban provider.

/// AI-backed instruction generation, with a deterministic fallback
pub mod ai;
/// Artifact logging under a project's working directory
pub mod artifact;
/// Authentication for the transport layer
pub mod auth;
/// System configuration
pub mod config;
/// System-wide constants
pub mod constants;
/// Assignment engine: filter pipeline, scoring, phase gate, retry hints
pub mod engine;
/// Error types and handling
pub mod error;
/// Lease manager
pub mod lease;
/// Core data models
pub mod models;
/// Background lease/assignment reconciliation loops
pub mod monitors;
/// Assignment persistence, independent of the kanban board
pub mod persistence;
/// Rate limiting for the transport layer
pub mod rate_limit;
/// Agent registry
pub mod registry;
/// Task store and kanban provider interface
pub mod store;
/// HTTP and stdio transports, and the tool dispatcher they share
pub mod transport;

pub use error::{MarcusError, Result};
