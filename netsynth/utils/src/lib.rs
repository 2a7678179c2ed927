//! Shared utilities for the netsynth toolkit.
mod errors;
mod id;
mod namegenerator;
mod out_file;

pub use errors::{Error, SynthResult};
pub use id::{GSym, Id};
pub use namegenerator::NameGenerator;
pub use out_file::OutputFile;
