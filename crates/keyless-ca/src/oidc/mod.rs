pub mod claims;
pub mod jwks;
pub mod verifier;

pub use claims::*;
pub use jwks::*;
pub use verifier::*;
