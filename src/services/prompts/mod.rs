//! Prompt Registry
//!
//! Prompt definitions keyed by field name and their handlebars rendering.

pub mod registry;
pub mod render;

pub use registry::{PromptRegistry, RenderedPrompt};
pub use render::PromptRenderer;
