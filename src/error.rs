//! Centralized error type for the strata umbrella crate.
//!
//! Wraps all subsystem errors so `?` propagates naturally across crate boundaries.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] strata_core::Error),

    #[error("Stream: {0}")]
    Stream(#[from] strata_stream::Error),

    #[error("Mix: {0}")]
    Mix(#[from] strata_mix::Error),

    #[error("Session {0} is not registered with this engine")]
    UnknownSession(u64),
}

pub type Result<T> = std::result::Result<T, Error>;
