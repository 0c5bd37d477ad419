pub mod analysis;
pub mod critic;
pub mod extraction;
pub mod paper_flow;
pub mod paper_state;
pub mod prompts;
pub mod synthesis;

pub use analysis::AnalystAgent;
pub use critic::CriticAgent;
pub use extraction::ExtractionAgent;
pub use paper_flow::PaperFlow;
pub use paper_state::{PaperAnalysisState, PaperOutcome};
pub use synthesis::SynthesizerAgent;
