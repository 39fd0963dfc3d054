/*
 * Copyright (c) 2020-2023, Stalwart Labs Ltd.
 *
 * Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
 * https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
 * <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
 * option. This file may not be copied, modified, or distributed
 * except according to those terms.
 */

//! The chain assembler and chain validator: the two halves that together
//! turn a flat header list into a verified (or rejected) ARC chain.

use crate::headers::HeaderField;
use crate::provider::{Canonicalizer, KeyProvider, SignatureVerifier, VerifyRequest};
use crate::status::{ChainState, SigError, Status};
use crate::tagset::{parse_tagset, SetType, TagSet};

const AR_HDRNAME: &str = "ARC-Authentication-Results";
const AMS_HDRNAME: &str = "ARC-Message-Signature";
const AS_HDRNAME: &str = "ARC-Seal";

/// Upper bound on the instance number a seal may claim. A single crafted
/// `ARC-Seal: i=<huge>` header must not grow the presence table
/// proportionally before being rejected.
const MAX_INSTANCES: u32 = 1 << 16;

/// Error produced while assembling or validating a chain. Carries the
/// [`Status`] to return to the caller, a human-readable diagnostic (the
/// same text a [`crate::message::Message::error`] call would surface), and
/// — for the duplicate/gap cases — the specific [`SigError`] code.
#[derive(Debug, Clone)]
pub struct ChainError {
    pub status: Status,
    pub message: String,
    pub sig_error: Option<SigError>,
}

impl ChainError {
    fn syntax(message: impl Into<String>) -> Self {
        ChainError {
            status: Status::Syntax,
            message: message.into(),
            sig_error: None,
        }
    }

    fn syntax_with(message: impl Into<String>, sig_error: SigError) -> Self {
        ChainError {
            status: Status::Syntax,
            message: message.into(),
            sig_error: Some(sig_error),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        ChainError {
            status: Status::Internal,
            message: message.into(),
            sig_error: None,
        }
    }

    fn no_resource(message: impl Into<String>) -> Self {
        ChainError {
            status: Status::NoResource,
            message: message.into(),
            sig_error: None,
        }
    }
}

/// A fully assembled ARC chain: for each instance `1..=N`, exactly one
/// `ARC-Seal`, `ARC-Message-Signature`, and `ARC-Authentication-Results`
/// set, indexed by instance (index 0 is instance 1).
pub struct Chain {
    seals: Vec<TagSet>,
    signatures: Vec<TagSet>,
    ar: Vec<TagSet>,
    state: ChainState,
}

impl Chain {
    /// Number of instances in the chain (`N`). `0` means no ARC headers
    /// were present at all.
    pub fn len(&self) -> u32 {
        self.seals.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.seals.is_empty()
    }

    /// The overall chain validity computed by the most recent call to
    /// [`Chain::validate`], or [`ChainState::Unknown`] before the first
    /// call.
    pub fn state(&self) -> ChainState {
        self.state
    }

    /// The `ARC-Seal` set for the given 1-based instance.
    pub fn seal(&self, instance: u32) -> Option<&TagSet> {
        self.seals.get(instance.checked_sub(1)? as usize)
    }

    /// The `ARC-Message-Signature` set for the given 1-based instance.
    pub fn signature(&self, instance: u32) -> Option<&TagSet> {
        self.signatures.get(instance.checked_sub(1)? as usize)
    }

    /// The `ARC-Authentication-Results` set for the given 1-based
    /// instance.
    pub fn authentication_results(&self, instance: u32) -> Option<&TagSet> {
        self.ar.get(instance.checked_sub(1)? as usize)
    }

    /// Verifies the latest instance, then walks earlier instances whose
    /// recorded `cv` matches what they should have reported at the time
    /// they sealed, computing the overall [`ChainState`].
    pub fn validate(
        &mut self,
        headers: &[HeaderField],
        body: &[u8],
        verifier: &dyn SignatureVerifier,
        keys: &dyn KeyProvider,
        canon: &dyn Canonicalizer,
    ) -> Result<ChainState, Status> {
        let n = self.len();

        if n == 0 {
            self.state = ChainState::None;
            return Ok(ChainState::None);
        }

        let state = match self.verify_instance(n, headers, body, verifier, keys, canon) {
            Err(Status::BadSig) => ChainState::Fail,
            Err(other) => return Err(other),
            Ok(()) => {
                let mut state = ChainState::Pass;

                for i in (1..n).rev() {
                    let seal_i = self
                        .seal(i)
                        .expect("chain assembler guarantees a dense 1..=N seal sequence");
                    let cv = seal_i.get("cv").unwrap_or("");
                    let required = if i == 1 { "none" } else { "pass" };

                    if cv.eq_ignore_ascii_case(required) {
                        match self.verify_instance(i, headers, body, verifier, keys, canon) {
                            Err(Status::BadSig) => {
                                state = ChainState::Fail;
                                break;
                            }
                            Err(other) => return Err(other),
                            Ok(()) => {}
                        }
                    }
                }

                state
            }
        };

        self.state = state;
        Ok(state)
    }

    fn verify_instance(
        &self,
        instance: u32,
        headers: &[HeaderField],
        body: &[u8],
        verifier: &dyn SignatureVerifier,
        keys: &dyn KeyProvider,
        canon: &dyn Canonicalizer,
    ) -> Result<(), Status> {
        let signature = self.signature(instance).expect("present by construction");
        let seal = self.seal(instance).expect("present by construction");

        let domain = signature.get("d").ok_or(Status::Internal)?;
        let selector = signature.get("s").ok_or(Status::Internal)?;

        let public_key = keys.fetch_key(domain, selector)?;
        let body_hash = canon.canonicalize_body(body);

        verifier.verify(VerifyRequest {
            instance,
            signature,
            seal,
            headers,
            body_hash: &body_hash,
            public_key: &public_key,
        })
    }
}

/// Assembles a [`Chain`] from a message's header list (`arc_eoh`).
///
/// Parses every `Authentication-Results`, `ARC-Message-Signature`, and
/// `ARC-Seal` header with the tag-list parser, then verifies structural
/// completeness: dense `1..=N` instance numbering with no gaps or
/// duplicates, independently for each of the three types.
pub fn assemble(headers: &[HeaderField]) -> Result<Chain, ChainError> {
    let mut raw_seals = Vec::new();
    let mut raw_signatures = Vec::new();
    let mut raw_ar = Vec::new();

    for header in headers {
        let name = header.name();
        let set_type = if ieq(name, AR_HDRNAME) {
            SetType::Ar
        } else if ieq(name, AMS_HDRNAME) {
            SetType::Signature
        } else if ieq(name, AS_HDRNAME) {
            SetType::Seal
        } else {
            continue;
        };

        let set = parse_tagset(set_type, header.value()).map_err(|e| ChainError {
            status: e.status,
            message: e.message,
            sig_error: None,
        })?;

        match set_type {
            SetType::Ar => raw_ar.push(set),
            SetType::Signature => raw_signatures.push(set),
            SetType::Seal => raw_seals.push(set),
            SetType::Key => unreachable!("key sets are never parsed from header fields"),
        }
    }

    let n = index_by_instance(&raw_seals, "ARC seal")?;
    let seals = order_by_instance(raw_seals, n, "ARC seal")?;

    let signatures = order_bounded_by_instance(raw_signatures, n, "ARC signature")?;
    let ar = order_bounded_by_instance(raw_ar, n, "ARC authentication results")?;

    Ok(Chain {
        seals,
        signatures,
        ar,
        state: ChainState::Unknown,
    })
}

fn ieq(a: &[u8], b: &str) -> bool {
    a.eq_ignore_ascii_case(b.as_bytes())
}

/// The seal walk: establishes `N` (the largest instance number seen) and
/// rejects duplicates or gaps.
fn index_by_instance(sets: &[TagSet], label: &str) -> Result<u32, ChainError> {
    let mut present: Vec<bool> = Vec::new();

    for set in sets {
        let i = set
            .instance()
            .filter(|&i| i > 0)
            .ok_or_else(|| ChainError::syntax(format!("invalid instance number in {label} data")))?;

        if i > MAX_INSTANCES {
            return Err(ChainError::no_resource(format!(
                "{label} instance {i} exceeds maximum chain length"
            )));
        }

        let idx = (i - 1) as usize;
        if idx >= present.len() {
            present.resize(idx + 1, false);
        }

        if present[idx] {
            return Err(ChainError::syntax_with(
                format!("duplicate {label} at instance {i}"),
                SigError::DupInstance,
            ));
        }
        present[idx] = true;
    }

    for (idx, set) in present.iter().enumerate() {
        if !set {
            return Err(ChainError::syntax_with(
                format!("{label} gap at instance {}", idx + 1),
                SigError::InstanceGap,
            ));
        }
    }

    Ok(present.len() as u32)
}

/// Places the already-validated seal sets into ascending-instance order.
fn order_by_instance(sets: Vec<TagSet>, n: u32, label: &str) -> Result<Vec<TagSet>, ChainError> {
    let mut ordered: Vec<Option<TagSet>> = (0..n).map(|_| None).collect();

    for set in sets {
        let i = set.instance().expect("validated by index_by_instance");
        ordered[(i - 1) as usize] = Some(set);
    }

    ordered
        .into_iter()
        .enumerate()
        .map(|(idx, set)| set.ok_or_else(|| ChainError::internal(format!("{label} instance {} missing after indexing", idx + 1))))
        .collect()
}

/// Verifies and orders a `SIGNATURE` or `AR` set list against a seal-
/// derived `N`: every instance `1..=N` must be present exactly once, and
/// no instance may exceed `N`.
fn order_bounded_by_instance(sets: Vec<TagSet>, n: u32, label: &str) -> Result<Vec<TagSet>, ChainError> {
    let mut present = vec![false; n as usize];
    let mut ordered: Vec<Option<TagSet>> = (0..n).map(|_| None).collect();

    for set in sets {
        let i = set
            .instance()
            .filter(|&i| i > 0)
            .ok_or_else(|| ChainError::syntax(format!("invalid instance number in {label} data")))?;

        if i > n {
            return Err(ChainError::syntax_with(
                format!("{label} instance {i} out of range"),
                SigError::InstanceOutOfRange,
            ));
        }

        let idx = (i - 1) as usize;
        if present[idx] {
            return Err(ChainError::syntax_with(
                format!("duplicate {label} at instance {i}"),
                SigError::DupInstance,
            ));
        }
        present[idx] = true;
        ordered[idx] = Some(set);
    }

    for (idx, seen) in present.iter().enumerate() {
        if !seen {
            return Err(ChainError::syntax_with(
                format!("{label} gap at instance {}", idx + 1),
                SigError::InstanceGap,
            ));
        }
    }

    Ok(ordered.into_iter().map(|s| s.expect("completeness checked above")).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headers::build_header_field;
    use crate::library::Flags;

    fn ingest(lines: &[&str]) -> Vec<HeaderField> {
        lines
            .iter()
            .map(|line| build_header_field(line.as_bytes(), Flags::empty()).unwrap())
            .collect()
    }

    #[test]
    fn empty_chain_has_length_zero() {
        let headers = ingest(&["Subject: hi\r\n"]);
        let chain = assemble(&headers).unwrap();
        assert!(chain.is_empty());
    }

    #[test]
    fn single_hop_chain_assembles() {
        let headers = ingest(&[
            "ARC-Seal: i=1; cv=none; a=rsa-sha256; d=example.org; s=sel; b=AAAA\r\n",
            "ARC-Message-Signature: i=1; s=sel; h=from; d=example.org; b=AAAA; v=1; a=rsa-sha256\r\n",
            "ARC-Authentication-Results: i=1; mx.example.org; dkim=pass\r\n",
        ]);
        let chain = assemble(&headers).unwrap();
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn gap_in_seals_is_rejected() {
        let headers = ingest(&[
            "ARC-Seal: i=1; cv=none; a=rsa-sha256; d=example.org; s=sel; b=AAAA\r\n",
            "ARC-Seal: i=3; cv=pass; a=rsa-sha256; d=example.org; s=sel; b=AAAA\r\n",
        ]);
        let err = assemble(&headers).unwrap_err();
        assert_eq!(err.status, Status::Syntax);
        assert!(err.message.contains("gap at instance 2"));
    }

    #[test]
    fn duplicate_seal_instance_is_rejected() {
        let headers = ingest(&[
            "ARC-Seal: i=2; cv=none; a=rsa-sha256; d=example.org; s=sel; b=AAAA\r\n",
            "ARC-Seal: i=2; cv=none; a=rsa-sha256; d=example.org; s=sel; b=AAAA\r\n",
        ]);
        let err = assemble(&headers).unwrap_err();
        assert_eq!(err.sig_error, Some(SigError::DupInstance));
    }

    #[test]
    fn huge_claimed_instance_is_rejected_without_allocating() {
        let headers = ingest(&["ARC-Seal: i=4294967295; cv=none; a=rsa-sha256; d=example.org; s=sel; b=AAAA\r\n"]);
        let err = assemble(&headers).unwrap_err();
        assert_eq!(err.status, Status::NoResource);
    }
}
