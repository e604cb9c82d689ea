pub mod correlator;
pub mod error;

pub use correlator::{run_eviction_loop, Correlator};
pub use error::{CorrelatorError, Result};
