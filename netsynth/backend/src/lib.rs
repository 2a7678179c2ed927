//! Backends for the netsynth toolkit.
mod firrtl;
mod traits;

pub use firrtl::FirrtlBackend;
pub use traits::Backend;
