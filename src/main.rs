//! netsynth: translate elaborated structural netlists into FIRRTL.
mod cmdline;

use cmdline::Opts;
use netsynth_backend::{Backend, FirrtlBackend};
use netsynth_utils::SynthResult;

fn main() {
    let opts: Opts = argh::from_env();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(
        if opts.quiet { "error" } else { "warn" },
    ))
    .init();

    if let Err(err) = run(&opts) {
        log::error!("{:?}", err);
        std::process::exit(1);
    }
}

fn run(opts: &Opts) -> SynthResult<()> {
    let mut design = match &opts.file {
        Some(path) => netsynth_frontend::parse_file(path)?,
        None => netsynth_frontend::parse_design(std::io::stdin().lock())?,
    };
    // The FIRRTL backend only understands two-input muxes.
    netsynth_opt::pmuxtree(&mut design)?;
    FirrtlBackend.run(&design, opts.output.clone())
}
