//! Interface for a netsynth backend.
use netsynth_ir::Design;
use netsynth_utils::{OutputFile, SynthResult};

/// A backend that lowers a design to a textual output format.
pub trait Backend {
    /// The name of this backend.
    fn name(&self) -> &'static str;
    /// Validate the design for emission with this backend. Returns an
    /// Err(..) if the design has unexpected constructs.
    fn validate(design: &Design) -> SynthResult<()>;
    /// Transforms the design into a formatted string representing a valid
    /// program and write it to `file`.
    fn emit(design: &Design, file: &mut OutputFile) -> SynthResult<()>;
    /// Convenience function to validate and emit the design.
    fn run(&self, design: &Design, mut file: OutputFile) -> SynthResult<()> {
        Self::validate(design)?;
        Self::emit(design, &mut file)
    }
}
