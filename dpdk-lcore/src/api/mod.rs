//! Low-level building blocks: errno results, EAL-style options, lcore ids.

mod error;
pub use error::*;

pub mod args;
pub mod eal;
pub mod lcore;
