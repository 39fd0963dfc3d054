/*
 * Copyright (c) 2020-2023, Stalwart Labs Ltd.
 *
 * Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
 * https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
 * <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
 * option. This file may not be copied, modified, or distributed
 * except according to those terms.
 */

//! # arc-auth
//!
//! _arc-auth_ ingests a message header-by-header and validates its
//! **Authenticated Received Chain (ARC)** — the set of `ARC-Seal`,
//! `ARC-Message-Signature`, and `ARC-Authentication-Results` headers each
//! relay in a forwarding path adds, per [RFC 8617](https://datatracker.ietf.org/doc/html/rfc8617).
//!
//! The crate owns chain assembly (grouping and completeness-checking the
//! per-instance header sets) and chain validation (walking the chain from
//! the newest instance back, re-verifying earlier instances whose `cv=`
//! tag requires it). Cryptographic verification, DNS key retrieval, and
//! header/body canonicalization are each a small trait — [`SignatureVerifier`],
//! [`KeyProvider`], [`Canonicalizer`] — so a caller can supply its own DNS
//! resolver or hardware-backed signer without this crate depending on
//! either. A ready-to-use [`DefaultVerifier`] covers the common case: RSA
//! (PKCS#1 v1.5) and Ed25519 verification over `sha1`/`sha2`/`rsa`/
//! `ed25519-dalek`.
//!
//! ## Usage
//!
//! ```rust
//! use arc_auth::{Library, crypto::DefaultVerifier};
//!
//! # struct NullKeys;
//! # impl arc_auth::KeyProvider for NullKeys {
//! #     fn fetch_key(&self, _domain: &str, _selector: &str) -> Result<Vec<u8>, arc_auth::Status> {
//! #         Ok(Vec::new())
//! #     }
//! # }
//! # struct Identity;
//! # impl arc_auth::Canonicalizer for Identity {
//! #     fn canonicalize_header(&self, _name: &[u8], value: &[u8]) -> Vec<u8> { value.to_vec() }
//! #     fn canonicalize_body(&self, body: &[u8]) -> Vec<u8> { body.to_vec() }
//! # }
//! let library = Library::new();
//! let mut message = library.message();
//!
//! for line in ["Subject: hello\r\n", "From: a@example.org\r\n"] {
//!     message.header_field(line.as_bytes()).unwrap();
//! }
//! message.end_of_headers().unwrap();
//! message.body_chunk(b"body\r\n").unwrap();
//!
//! let state = message
//!     .end_of_message(&DefaultVerifier, &NullKeys, &Identity)
//!     .unwrap();
//! assert_eq!(state, arc_auth::ChainState::None);
//! ```
//!
//! ## Non-goals
//!
//! Generating new `ARC-Seal`/`ARC-Message-Signature` headers (sealing),
//! DNS resolution, and RFC 6376/5322 canonicalization are out of scope:
//! this crate validates chains it is handed, against keys and
//! canonicalized bytes a caller supplies.
//!
//! ## License
//!
//! Licensed under either of
//!
//!  * Apache License, Version 2.0 ([LICENSE-APACHE](LICENSE-APACHE) or http://www.apache.org/licenses/LICENSE-2.0)
//!  * MIT license ([LICENSE-MIT](LICENSE-MIT) or http://opensource.org/licenses/MIT)
//!
//! at your option.
//!
//! ## Copyright
//!
//! Copyright (C) 2020-2023, Stalwart Labs Ltd.

pub mod chain;
pub mod crypto;
pub mod feature;
pub mod headers;
pub mod library;
pub mod message;
pub mod provider;
pub mod status;
pub mod tagset;

pub use chain::{Chain, ChainError};
pub use crypto::DefaultVerifier;
pub use feature::Feature;
pub use headers::HeaderField;
pub use library::{Flags, Library};
pub use message::{Message, SealMaterial};
pub use provider::{Canonicalizer, KeyProvider, SignatureVerifier, VerifyRequest};
pub use status::{ChainState, SigError, Status};
pub use tagset::{SetType, TagSet};

/// Identifies the cryptographic backend compiled into this build.
pub fn crypto_provider_version() -> &'static str {
    concat!("rsa/", env!("CARGO_PKG_VERSION"))
}
