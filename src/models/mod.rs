//! Data Models
//!
//! Configuration, prompt definitions, and run statistics.

pub mod prompt;
pub mod settings;
pub mod stats;

pub use prompt::*;
pub use settings::*;
pub use stats::*;
