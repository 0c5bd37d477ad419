pub mod analysis;
pub mod content;
pub mod paper;

pub use analysis::{AnalysisResult, Critique, SourceRef, Verification};
pub use content::{ExtractedContent, ImagePayload};
pub use paper::PaperDescriptor;
