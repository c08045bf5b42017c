//! # Task Context Core
//!
//! Storage-agnostic logic for Task Context: the task hierarchy, the
//! dependency graph, resource assignment with inheritance, and scoped
//! context assembly for question answering.
//!
//! This crate contains no sqlx, HTTP client, or filesystem I/O. All
//! persistence goes through the [`store::Store`] trait, and every top-level
//! operation on [`engine::TaskEngine`] runs inside exactly one
//! [`store::StoreTx`] unit of work.
//!
//! ## Two graphs
//!
//! ```text
//!   hierarchy (forest, cycle-free)        dependencies (any digraph)
//!
//!        PROJ-001                          API-001 ──blocks──▶ UI-001
//!        └── DEV-001                          ▲                  │
//!            └── API-001                      └─────related──────┘
//! ```
//!
//! The hierarchy is kept cycle-free structurally (moves into one's own
//! subtree are rejected). The dependency graph accepts any edge except a
//! self-loop and reports cycles as data from [`graph::DependencyGraph`].
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`models`] | Tasks, dependency edges, resources, assignments |
//! | [`error`] | `EngineError` taxonomy |
//! | [`path`] | Materialized path helpers |
//! | [`store`] | `Store` / `StoreTx` traits and the in-memory store |
//! | [`hierarchy`] | Task tree operations and progress roll-up |
//! | [`dependencies`] | Dependency edge CRUD |
//! | [`graph`] | Roots, leaves, cycle detection, analysis |
//! | [`resources`] | Resource assignment and inheritance |
//! | [`context`] | Scope-driven context assembly |
//! | [`qa`] | Context text building and answer orchestration |
//! | [`engine`] | Transaction-scoped facade over all of the above |

pub mod context;
pub mod dependencies;
pub mod engine;
pub mod error;
pub mod graph;
pub mod hierarchy;
pub mod models;
pub mod path;
pub mod qa;
pub mod resources;
pub mod store;

pub use engine::{EngineOptions, TaskEngine};
pub use error::{EngineError, Result};
