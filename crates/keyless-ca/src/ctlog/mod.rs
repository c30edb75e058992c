pub mod client;
pub mod sct;

pub use client::*;
pub use sct::*;
