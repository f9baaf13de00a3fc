//! QMX-Improved integer compression
//!
//! A codec for sequences of u32 values, built for search-engine posting lists
//! where doc-id d-gaps are stored compressed and decode speed dominates
//! lookup latency. This library provides:
//! - A selector-based wire format: 128-bit-aligned payload words up front,
//!   selector bytes reversed onto the tail
//! - An encoder with width classification, block promotion and short-tail
//!   accommodation
//! - A selector-dispatched decoder with NEON (aarch64), SSE4.1 (x86_64) and
//!   scalar paths producing bit-identical output
//! - Posting-list helpers: d-gap transform, SIMD cumulative sum and a framed
//!   container for standalone persistence
//!
//! The stream carries no header and no length field; callers keep the
//! original integer count and hand it back to [`QmxCodec::decode`].

pub mod error;
pub mod postings;
pub mod selector;
pub mod simd;

mod decoder;
mod encoder;

pub use decoder::DECODE_SLACK_INTS;
pub use encoder::{ENCODE_SLACK_BYTES, QmxCodec};
pub use error::{Error, Result};
pub use postings::{decode_postings, encode_postings, read_framed, write_framed};
pub use selector::bits_needed_for;
