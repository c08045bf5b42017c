//! # Task Context
//!
//! A hierarchical task and resource context engine. Work is organized as a
//! forest of tasks with a separate dependency graph; documents attached to a
//! task are visible to its subtasks; and questions about a task are answered
//! from context gathered across the hierarchy.
//!
//! The engine itself lives in [`task_context_core`]. This crate binds it to
//! SQLite, adds keyword search and an answer backend, and provides the
//! `tctx` command line.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌─────────────┐
//! │   CLI    │──▶│  TaskEngine  │──▶│ SqliteStore │
//! │  (tctx)  │   │ (core crate) │   │  WAL + FTS5 │
//! └──────────┘   └──────┬───────┘   └─────────────┘
//!                       │
//!            ┌──────────┴──────────┐
//!            ▼                     ▼
//!    ┌───────────────┐    ┌────────────────┐
//!    │ KeywordSearch │    │ OpenAiAnswerer │
//!    └───────────────┘    └────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite implementation of the store traits |
//! | [`search`] | FTS5 keyword similarity search |
//! | [`answer`] | Answer generation backends |
//! | [`engine`] | Engine construction from config |
//! | [`task_cmd`], [`dep_cmd`], [`resource_cmd`], [`context_cmd`], [`stats`] | CLI commands |

pub mod answer;
pub mod config;
pub mod context_cmd;
pub mod db;
pub mod dep_cmd;
pub mod engine;
pub mod migrate;
pub mod output;
pub mod resource_cmd;
pub mod search;
pub mod sqlite_store;
pub mod stats;
pub mod task_cmd;
