/*
 * Copyright (c) 2020-2023, Stalwart Labs Ltd.
 *
 * Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
 * https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
 * <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
 * option. This file may not be copied, modified, or distributed
 * except according to those terms.
 */

use std::fmt::Display;

/// Result of a core operation.
///
/// Mirrors the `ARC_STAT_*` constants of the originating C implementation:
/// every entry point in this crate returns one of these (wrapped in
/// `Result<T, Status>` where `T` is not `()`) rather than the raw integer
/// codes the C library uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Operation invoked out of state order, or an invalid option argument.
    Invalid,
    /// Malformed header, malformed tag-list, bad instance numbering, or a
    /// gap in the chain.
    Syntax,
    /// Allocation or buffer-growth failure. Rust's allocator panics on
    /// exhaustion rather than returning an error in the common case, so
    /// this variant is reachable only from explicit capacity checks (e.g.
    /// an absurdly large claimed instance count).
    NoResource,
    /// Invariant violation in parsing, or in a collaborator not otherwise
    /// classifiable (e.g. a signed-header list that names an ARC header).
    Internal,
    /// A cryptographic verification failed.
    BadSig,
    /// The key provider could not retrieve a key due to a transient
    /// failure (DNS timeout, malformed record, etc).
    KeyFail,
    /// The key provider found no key for the given selector/domain.
    NoKey,
}

impl Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Status::Invalid => "invalid operation",
            Status::Syntax => "syntax error",
            Status::NoResource => "resource exhausted",
            Status::Internal => "internal error",
            Status::BadSig => "bad signature",
            Status::KeyFail => "key retrieval failure",
            Status::NoKey => "no key found",
        })
    }
}

impl std::error::Error for Status {}

/// Specific diagnostic carried alongside a `Status::Syntax` result, for the
/// cases the caller may want to distinguish programmatically rather than by
/// matching the error string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SigError {
    /// Two `ARC-Seal` headers (or two `ARC-Message-Signature`, or two
    /// `ARC-Authentication-Results`) claimed the same instance number.
    DupInstance,
    /// An instance number is missing from the `1..N` sequence.
    InstanceGap,
    /// An instance number referenced by a signature or AR header exceeds
    /// the seal-derived chain length.
    InstanceOutOfRange,
}

impl Display for SigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            SigError::DupInstance => "duplicate instance number",
            SigError::InstanceGap => "gap in instance sequence",
            SigError::InstanceOutOfRange => "instance number out of range",
        })
    }
}

/// Overall validity of an assembled ARC chain, computed by
/// [`crate::chain::Chain::validate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainState {
    /// No validation has been performed yet.
    Unknown,
    /// The message carried no ARC headers at all (`N == 0`).
    None,
    /// The chain validated successfully.
    Pass,
    /// The chain failed to validate.
    Fail,
}

impl Display for ChainState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ChainState::Unknown => "unknown",
            ChainState::None => "none",
            ChainState::Pass => "pass",
            ChainState::Fail => "fail",
        })
    }
}
