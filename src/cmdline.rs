//! Command-line interface for the netsynth driver.
use argh::FromArgs;
use netsynth_utils::OutputFile;
use std::path::PathBuf;

#[derive(FromArgs)]
/// Translate an elaborated structural netlist into FIRRTL.
pub struct Opts {
    /// input netlist (JSON); reads from stdin when omitted
    #[argh(positional)]
    pub file: Option<PathBuf>,

    /// output file, default is stdout
    #[argh(
        option,
        short = 'o',
        long = "output",
        default = "OutputFile::Stdout"
    )]
    pub output: OutputFile,

    /// silence warnings
    #[argh(switch, short = 'q', long = "quiet")]
    pub quiet: bool,
}
