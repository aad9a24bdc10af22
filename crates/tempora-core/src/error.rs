//! Error Types for Tempora
//!
//! This module defines the error type shared by the format and storage
//! crates.
//!
//! ## Error Categories
//!
//! ### I/O Errors
//! - File system and backing-engine I/O, converted via `#[from]`
//!
//! ### Data Integrity Errors
//! - `TruncatedLatestValue`: a latest-tier value shorter than its fixed
//!   timestamp prefix
//! - `MalformedSegmentValue`: a segment value whose descriptor table and
//!   value heap do not add up
//!
//! ### Lifecycle Errors
//! - `NotOpen`: a data-path operation against a closed store or engine
//! - `UnknownKeyspace`: an operation against a keyspace the engine does
//!   not have
//! - `InvalidConfig`: rejected store configuration
//!
//! Programmer errors (violated call contracts, e.g. an out-of-range
//! `find`) are not represented here: they panic.
//!
//! ## Usage
//! All fallible functions return `Result<T>`, aliased to
//! `Result<T, Error>`, so call sites compose with the `?` operator.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store is not open")]
    NotOpen,

    #[error("unknown keyspace: {0}")]
    UnknownKeyspace(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("latest value truncated: {0} bytes")]
    TruncatedLatestValue(usize),

    #[error("malformed segment value: {0}")]
    MalformedSegmentValue(String),
}

pub type Result<T> = std::result::Result<T, Error>;
