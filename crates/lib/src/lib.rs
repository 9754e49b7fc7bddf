//! kiln-lib: incremental action-graph engine
//!
//! A build is described as a set of [`BuildAction`]s, each consuming and
//! producing files interned in a shared [`FileArena`]. The engine:
//! - links the actions into an [`ActionGraph`], rejecting conflicting
//!   producers and dependency cycles, and orders them for scheduling
//! - decides which actions are outdated from file timestamps, the
//!   command-line history and compiler-emitted dependency lists
//! - hands the outdated, required actions to an [`Executor`] and verifies
//!   what came back
//!
//! Per-file knowledge that survives between runs lives in the persistent
//! caches under [`cache`].

pub mod action;
pub mod cache;
pub mod config;
pub mod consts;
pub mod error;
pub mod execute;
pub mod fs;
pub mod graph;

pub use action::{ActionId, ActionKind, BuildAction};
pub use config::EngineConfig;
pub use error::KilnError;
pub use execute::{ActionBatch, BuildSession, Executor, ExecutorOutcome};
pub use fs::FileArena;
pub use graph::{ActionGraph, OutdatedQuery};
