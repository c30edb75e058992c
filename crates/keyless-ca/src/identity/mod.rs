pub mod extensions;
pub mod pool;
pub mod principal;

pub use extensions::*;
pub use pool::*;
pub use principal::*;
