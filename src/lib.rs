//! Upload bridge for chat-host extensions - lets external pages hand over
//! images and small text documents for optimization and storage
//!
//! Images go through an adaptive resizer that picks output dimensions from a
//! named strategy and re-encodes at a quality level; the result is handed to a
//! storage backend that returns a retrievable URL.

pub mod app;
pub mod context;
pub mod error;
pub mod image;
pub mod models;
pub mod storage;

pub use error::{Error, Result};
