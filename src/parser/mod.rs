pub mod batch;
pub mod comments;

pub use batch::{Batch, BatchLineAnalyzer, SqlBatchParser};
pub use comments::CommentSpan;
