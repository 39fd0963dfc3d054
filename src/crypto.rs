/*
 * Copyright (c) 2020-2023, Stalwart Labs Ltd.
 *
 * Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
 * https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
 * <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
 * option. This file may not be copied, modified, or distributed
 * except according to those terms.
 */

//! A concrete [`SignatureVerifier`]: RSA (PKCS#1 v1.5) and Ed25519
//! verification over the `h=`-listed headers plus the canonicalized body
//! hash, built on the `rsa`/`ed25519-dalek`/`sha1`/`sha2` crates.
//!
//! Headers named in `h=` are taken byte-for-byte as stored ("simple"
//! canonicalization only). A caller that needs "relaxed" canonicalization
//! pairs a [`crate::provider::Canonicalizer`] that rewrites headers in
//! place before they reach [`Message::header_field`](crate::Message::header_field)
//! — this verifier has no canonicalization logic of its own beyond byte
//! concatenation.

use rsa::{PaddingScheme, PublicKey as _};
use sha1::Digest as _;
use sha2::Digest as _;

use crate::headers::HeaderField;
use crate::provider::{SignatureVerifier, VerifyRequest};
use crate::status::Status;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Algorithm {
    RsaSha1,
    RsaSha256,
    Ed25519Sha256,
}

impl Algorithm {
    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "rsa-sha1" => Some(Algorithm::RsaSha1),
            "rsa-sha256" => Some(Algorithm::RsaSha256),
            "ed25519-sha256" => Some(Algorithm::Ed25519Sha256),
            _ => None,
        }
    }
}

/// Verifies ARC seals and message signatures with RSA or Ed25519 public
/// keys. A zero-sized type: all state needed for one verification arrives
/// in the [`VerifyRequest`].
pub struct DefaultVerifier;

impl SignatureVerifier for DefaultVerifier {
    fn verify(&self, request: VerifyRequest<'_>) -> Result<(), Status> {
        let algorithm = request
            .signature
            .get("a")
            .and_then(Algorithm::parse)
            .ok_or(Status::Syntax)?;

        let raw_b = request.signature.get("b").ok_or(Status::Syntax)?;
        let stripped: String = raw_b.chars().filter(|c| !c.is_whitespace()).collect();
        let signature = base64::decode(stripped).map_err(|_| Status::Syntax)?;

        let signed_data = signed_data(&request)?;

        match algorithm {
            Algorithm::RsaSha1 => verify_rsa_sha1(request.public_key, &signed_data, &signature),
            Algorithm::RsaSha256 => verify_rsa_sha256(request.public_key, &signed_data, &signature),
            Algorithm::Ed25519Sha256 => verify_ed25519(request.public_key, &signed_data, &signature),
        }
    }
}

/// Builds the byte string that was signed: every header named in `h=`, in
/// the order listed (most recent duplicate first), followed by the
/// canonicalized body hash supplied by the caller's
/// [`Canonicalizer`](crate::provider::Canonicalizer).
fn signed_data(request: &VerifyRequest<'_>) -> Result<Vec<u8>, Status> {
    let h = request.signature.get("h").ok_or(Status::Syntax)?;
    let mut out = Vec::new();
    let mut consumed: Vec<bool> = vec![false; request.headers.len()];

    for name in h.split(':') {
        let name = name.trim();
        let found = request
            .headers
            .iter()
            .enumerate()
            .rev()
            .find(|(idx, field)| !consumed[*idx] && field.name().eq_ignore_ascii_case(name.as_bytes()));

        let (idx, field): (usize, &HeaderField) = found.ok_or(Status::BadSig)?;
        consumed[idx] = true;
        out.extend_from_slice(field.raw());
    }

    out.extend_from_slice(request.body_hash);
    Ok(out)
}

fn decode_rsa_public_key(bytes: &[u8]) -> Result<rsa::RsaPublicKey, Status> {
    <rsa::RsaPublicKey as rsa::pkcs8::DecodePublicKey>::from_public_key_der(bytes)
        .or_else(|_| rsa::pkcs1::DecodeRsaPublicKey::from_pkcs1_der(bytes))
        .map_err(|_| Status::KeyFail)
}

fn verify_rsa_sha256(public_key: &[u8], signed_data: &[u8], signature: &[u8]) -> Result<(), Status> {
    let key = decode_rsa_public_key(public_key)?;
    let hash = sha2::Sha256::digest(signed_data);
    key.verify(PaddingScheme::new_pkcs1v15_sign::<sha2::Sha256>(), hash.as_ref(), signature)
        .map_err(|_| Status::BadSig)
}

fn verify_rsa_sha1(public_key: &[u8], signed_data: &[u8], signature: &[u8]) -> Result<(), Status> {
    let key = decode_rsa_public_key(public_key)?;
    let hash = sha1::Sha1::digest(signed_data);
    key.verify(PaddingScheme::new_pkcs1v15_sign::<sha1::Sha1>(), hash.as_ref(), signature)
        .map_err(|_| Status::BadSig)
}

fn verify_ed25519(public_key: &[u8], signed_data: &[u8], signature: &[u8]) -> Result<(), Status> {
    let key = ed25519_dalek::PublicKey::from_bytes(public_key).map_err(|_| Status::KeyFail)?;
    let sig = ed25519_dalek::Signature::from_bytes(signature).map_err(|_| Status::Syntax)?;
    let hash = sha2::Sha256::digest(signed_data);
    key.verify_strict(hash.as_ref(), &sig).map_err(|_| Status::BadSig)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headers::build_header_field;
    use crate::library::Flags;
    use crate::tagset::{parse_tagset, SetType};
    use ed25519_dalek::Signer;

    fn header(line: &str) -> HeaderField {
        build_header_field(line.as_bytes(), Flags::empty()).unwrap()
    }

    #[test]
    fn unknown_algorithm_is_syntax_error() {
        let seal = parse_tagset(
            SetType::Seal,
            b"i=1; cv=none; a=made-up; d=example.org; s=sel; b=AAAA",
        )
        .unwrap();
        let signature = parse_tagset(
            SetType::Signature,
            b"i=1; s=sel; h=from; d=example.org; b=AAAA; v=1; a=made-up",
        )
        .unwrap();
        let headers = [header("From: a@example.org\r\n")];

        let request = VerifyRequest {
            instance: 1,
            signature: &signature,
            seal: &seal,
            headers: &headers,
            body_hash: b"",
            public_key: b"",
        };

        assert_eq!(DefaultVerifier.verify(request).unwrap_err(), Status::Syntax);
    }

    #[test]
    fn ed25519_round_trip_verifies() {
        // Fixed 32-byte seed rather than a CSPRNG: deterministic, and avoids
        // pulling in a `rand` dev-dependency just for one test.
        let secret = ed25519_dalek::SecretKey::from_bytes(&[7u8; 32]).unwrap();
        let public = ed25519_dalek::PublicKey::from(&secret);
        let keypair = ed25519_dalek::Keypair { secret, public };

        let headers = [header("From: a@example.org\r\n")];
        let body_hash = sha2::Sha256::digest(b"body").to_vec();

        let mut signed = Vec::new();
        signed.extend_from_slice(headers[0].raw());
        signed.extend_from_slice(&body_hash);
        let digest = sha2::Sha256::digest(&signed);
        let sig = keypair.sign(digest.as_ref());
        let signature_b64 = base64::encode(sig.to_bytes());

        let seal = parse_tagset(
            SetType::Seal,
            b"i=1; cv=none; a=ed25519-sha256; d=example.org; s=sel; b=AAAA",
        )
        .unwrap();
        let signature = parse_tagset(
            SetType::Signature,
            format!("i=1; s=sel; h=from; d=example.org; b={signature_b64}; v=1; a=ed25519-sha256")
                .as_bytes(),
        )
        .unwrap();

        let request = VerifyRequest {
            instance: 1,
            signature: &signature,
            seal: &seal,
            headers: &headers,
            body_hash: &body_hash,
            public_key: keypair.public.as_bytes(),
        };

        assert!(DefaultVerifier.verify(request).is_ok());
    }

    #[test]
    fn missing_signed_header_is_bad_sig() {
        let seal = parse_tagset(
            SetType::Seal,
            b"i=1; cv=none; a=rsa-sha256; d=example.org; s=sel; b=AAAA",
        )
        .unwrap();
        let signature = parse_tagset(
            SetType::Signature,
            b"i=1; s=sel; h=subject; d=example.org; b=AAAA; v=1; a=rsa-sha256",
        )
        .unwrap();
        let headers = [header("From: a@example.org\r\n")];

        let request = VerifyRequest {
            instance: 1,
            signature: &signature,
            seal: &seal,
            headers: &headers,
            body_hash: b"",
            public_key: b"",
        };

        assert_eq!(DefaultVerifier.verify(request).unwrap_err(), Status::BadSig);
    }
}
