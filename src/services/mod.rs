//! Services
//!
//! Prompt handling, generation, polishing, and the pipeline that ties them
//! together.

pub mod generation;
pub mod pipeline;
pub mod polish;
pub mod prompts;

pub use generation::{GenerationOrchestrator, GenerationRun, ProviderSet};
pub use pipeline::{PipelineOutput, ReportPipeline};
pub use polish::{OutputPolisher, PolishResult};
pub use prompts::PromptRegistry;
