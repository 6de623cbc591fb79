//! Position-preserving ex command execution through an embedded Neovim.
//!
//! An editor hands this crate its buffer lines, one ex command and its
//! cursors. The crate runs the command in a fresh headless engine and
//! returns the transformed lines together with where each cursor ended up.
//!
//! * `execute`: The execution protocol, one engine per call
//! * `marker`: Gravity-aware markers that follow text through edits
//! * `launcher`: Resolving, spawning and tearing down engine sessions
//! * `reconcile`: Mapping editor selections in and engine results out
//! * `guard`: Caller-owned single-flight protection

#![warn(missing_docs)]

pub mod config;
pub mod engine;
pub mod error;
pub mod execute;
pub mod guard;
pub mod launcher;
pub mod marker;
pub mod notice;
pub mod position;
pub mod reconcile;
pub mod resolve;

pub use config::{EngineConfig, Version};
pub use engine::{EngineApi, EngineError, MarkerId, NamespaceId, NvimApi};
pub use error::{FilterError, Result};
pub use execute::{Filter, execute};
pub use guard::{AlreadyRunning, Invocation, InvocationGuard};
pub use launcher::{EngineLauncher, EngineProcess, EngineSession, ProcessLauncher};
pub use marker::{Gravity, MarkerTracker, TrackedCursor};
pub use notice::{Level, Notice, Remediation};
pub use position::{CursorSpec, ExecutionResult, LineRange, Position};
pub use reconcile::{Reconciled, cursor_spec_for_selection, reconcile};
