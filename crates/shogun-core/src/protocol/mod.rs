//! Line protocol between the worker pool and its runner processes.
//!
//! One JSON request line goes to the runner's stdin per job. The runner
//! answers on stdout with any number of `OUT:` progress lines followed by
//! exactly one `RESULT:` line. There is no pipelining: the next request is
//! only written after the previous `RESULT:` arrived.

mod parser;
mod types;

pub use parser::{parse_line, progress_line, request_line, result_line};
pub use types::*;
