//! Digest primitives shared by the signature verifier and the audit chain.
//!
//! Every digest in the system is SHA-256 rendered as 64 lowercase hex
//! characters. Both the client signature and the audit links are defined over
//! UTF-8 strings, so the primitives here take `&str` and return `String`.
//!
//! # Example
//!
//! ```rust
//! use prizedraw_core::crypto::{Digest, GENESIS_HASH};
//!
//! let data_hash = Digest::hex("alice");
//! let final_hash = Digest::chain(&data_hash, GENESIS_HASH);
//! assert_eq!(final_hash.len(), 64);
//! ```

mod hash;

pub use hash::{DIGEST_HEX_LEN, Digest, GENESIS_HASH, is_digest_hex};
