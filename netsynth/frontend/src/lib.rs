//! Frontend for the netsynth toolkit: loads elaborated structural netlists.
//!
//! HDL parsing and elaboration happen upstream; this crate only reads their
//! already-flattened JSON interchange form into a [`netsynth_ir::Design`].
mod json;

pub use json::{parse_design, parse_file};
