//! Trace-line parsing: cursor, value type and grammar.

pub mod parser;
pub mod stream;
pub mod val;

pub use parser::{escape, parse_call, parse_expr, syscall_name, ParsedCall};
pub use stream::Stream;
pub use val::Val;
