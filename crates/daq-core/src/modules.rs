//! Hardware-module lifecycle.
//!
//! Every hardware module is created from its configuration in the
//! [`ModuleState::Deactivated`] state, acquires its resources in
//! [`Module::on_activate`] and releases them in [`Module::on_deactivate`].

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Lifecycle state of a hardware module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ModuleState {
    /// No device resources held
    #[default]
    Deactivated,
    /// Device open and accepting calls
    Idle,
}

/// Activation contract implemented by every hardware module.
pub trait Module {
    /// Name used in log messages and errors.
    fn module_name(&self) -> &str;

    /// Acquire device resources.
    ///
    /// On error the module stays deactivated and holds nothing.
    fn on_activate(&mut self) -> Result<()>;

    /// Release device resources.
    ///
    /// Resources are released even when the device reports an error while closing;
    /// the error is still returned.
    fn on_deactivate(&mut self) -> Result<()>;

    /// Current lifecycle state.
    fn module_state(&self) -> ModuleState;

    /// Shorthand for `module_state() == Idle`.
    fn is_active(&self) -> bool {
        self.module_state() == ModuleState::Idle
    }
}
