pub mod controller;
pub mod error;
pub mod types;

pub use controller::{run_regen_loop, StaminaController, StaminaObserver};
pub use error::{Result, StaminaError};
pub use types::{StaminaSnapshot, StaminaState};
