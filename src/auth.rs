//! Token kinds, the crypto codec, redacted secrets, and stored account credentials.

pub mod codec;
pub mod credentials;
pub mod kind;
pub mod secret;

pub use codec::*;
pub use credentials::*;
pub use kind::*;
pub use secret::*;
