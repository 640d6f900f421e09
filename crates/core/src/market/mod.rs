pub mod entity;
pub mod error;
#[cfg(feature = "test-utils")]
pub mod mock;
pub mod port;
