pub mod assistant;
pub mod category;
pub mod error;
pub mod generation;
pub mod logging;
pub mod prompt;
pub mod sharing;

pub use error::{GenError, Result};
