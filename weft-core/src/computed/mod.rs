//! Computation Engine
//!
//! Derived stores built from a read-tracking function. The function
//! receives a [`ComputeCx`] and reads other stores through it; exactly the
//! sources touched during the last evaluation become the dependency set,
//! so conditional reads subscribe only while their branch is taken.

mod context;
mod derived;

pub use context::{ComputeCx, Source};
pub use derived::Computed;
