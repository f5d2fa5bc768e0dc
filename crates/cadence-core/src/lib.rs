pub mod capability;
pub mod config;
pub mod error;
pub mod logging;
pub mod types;

pub use config::CadenceConfig;
pub use error::{CadenceError, CapabilityError, Result};
pub use types::*;
