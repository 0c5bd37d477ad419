pub mod llm_service;
pub mod paper_search;
pub mod report_writer;
pub mod thought_writer;
pub mod web_search;

pub use llm_service::{LlmService, ReasoningRequest, ReasoningService};
pub use paper_search::{ArxivSearch, PaperSource};
pub use report_writer::ReportWriter;
pub use thought_writer::{ThoughtKind, ThoughtWriter};
pub use web_search::{DuckDuckGoSearch, SearchHit, WebSearch};
