//! File format layer: building, encoding, rolling and reading
//!
//! The write path runs builder → codec → rolling writer: rows become
//! delimited lines, lines become size-bounded files, files are promoted
//! atomically and checkpointed. The read path mirrors it with the
//! delimited reader streaming typed rows back out of a directory.

pub mod builder;
pub mod codec;
pub mod compression;
pub mod reader;
pub mod rolling;

pub use builder::{InputFormat, InputFormatBuilder, OutputFormat, OutputFormatBuilder};
pub use codec::DelimitedCodec;
pub use compression::OutputCompression;
pub use reader::DelimitedReader;
pub use rolling::{RollingWriter, STAGING_SUBDIR};
