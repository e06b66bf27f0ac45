//! AIM Engine recipe resolution
//!
//! Picks a validated deployment configuration (GPU count, precision, serving
//! backend, launch arguments) for an LLM inference server from a catalog of
//! per-model recipes and the accelerators visible on this machine.
//!
//! ## Main Components
//!
//! - `catalog`: model and recipe records loaded from disk
//! - `hardware`: three-tier GPU visibility probe
//! - `resolver`: recipe matching with deterministic fallback search
//! - `synthesis`: launch command, environment and volume synthesis
//! - `config`: configuration values passed into each component

pub mod catalog;
pub mod config;
pub mod hardware;
pub mod resolver;
pub mod synthesis;
pub mod types;

pub use config::Config;
pub use resolver::{RecipeResolver, ResolutionRequest, ResolveError, ResolvedConfiguration};
pub use synthesis::{ConfigSynthesizer, SynthesizedConfig};
pub use types::{Backend, GpuCount, Precision};

/// Library errors
pub use anyhow::{Error, Result};
