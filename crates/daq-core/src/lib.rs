//! `daq-core`
//!
//! Core trait definitions and types for the rust-daq hardware-module framework.
//!
//! ## Layout
//!
//! - [`modules`]: activation lifecycle shared by all hardware modules
//! - [`camera`]: the synchronous camera contract and its value types
//! - [`capabilities`]: async capability traits used by the acquisition pipeline
//! - [`data`]: image frames
//! - [`config`]: module option loading (TOML + environment)
//! - [`error`]: [`DaqError`](error::DaqError) and structured driver errors

pub mod camera;
pub mod capabilities;
pub mod config;
pub mod data;
pub mod error;
pub mod modules;

pub use anyhow::{anyhow, Result};
