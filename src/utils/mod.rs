pub mod json;
pub mod logging;
pub mod retry;

pub use json::extract_json_block;
pub use logging::truncate_text;
pub use retry::RetryPolicy;
