#![allow(unreachable_pub)]

mod classification;
mod error;

pub use classification::{Classification, Classify, FromFn, from_fn};
pub use error::ErrorKind;

/// The vnfetch `Result` type
pub type Result<T> = std::result::Result<T, crate::ErrorKind>;
