mod common;
mod java;

pub use common::{erase_type, ParseResult, Parser};
pub use java::JavaParser;
