//! Netlist transformations run ahead of the backends.
mod pmuxtree;

pub use pmuxtree::pmuxtree;
