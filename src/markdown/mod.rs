pub mod parser;
pub mod writer;

pub use parser::MarkdownParser;
pub use writer::MarkdownWriter;

pub const ACTIVE_HEADING: &str = "## Active";
pub const COMPLETED_HEADING: &str = "## Completed";
pub const DOCUMENT_TYPE: &str = "daily-tasks";
pub const DOCUMENT_TITLE: &str = "今日任务";
