mod file_finder;

pub use file_finder::{is_java_source, FileFinder, SourceFile};
