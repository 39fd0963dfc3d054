/*
 * Copyright (c) 2020-2023, Stalwart Labs Ltd.
 *
 * Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
 * https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
 * <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
 * option. This file may not be copied, modified, or distributed
 * except according to those terms.
 */

//! The message handle: the streaming state machine that sequences
//! `init → header → eoh → body → eom`, owns the header list and the
//! assembled chain, and carries the per-message error channel.

use crate::chain::{assemble, Chain};
use crate::headers::{build_header_field, HeaderField};
use crate::library::Library;
use crate::provider::{Canonicalizer, KeyProvider, SignatureVerifier};
use crate::status::{ChainState, SigError, Status};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Init,
    Header,
    Eoh,
    Body,
    Eom,
    /// Terminal sink entered on certain irrecoverable failures. All
    /// subsequent operations return `Invalid`.
    Unusable,
}

/// Material a caller would need to build a new `ARC-Seal`/
/// `ARC-Message-Signature` pair for this message.
///
/// Generating ARC headers is out of scope for this crate: the entry point
/// is kept in the API so callers porting an existing integration have
/// somewhere to call, but it always returns an empty result rather than
/// doing any sealing work.
#[derive(Debug, Clone, Default)]
pub struct SealMaterial {
    pub header: Option<String>,
}

/// Per-message handle: owns the header list, the assembled chain (once
/// `end_of_headers` has run), and the message-local error channel.
pub struct Message {
    library: Library,
    headers: Vec<HeaderField>,
    body: Vec<u8>,
    chain: Option<Chain>,
    state: State,
    error: Option<String>,
    last_sig_error: Option<SigError>,
    last_status: Option<Status>,
}

impl Message {
    pub(crate) fn new(library: Library) -> Self {
        Message {
            library,
            headers: Vec::new(),
            body: Vec::new(),
            chain: None,
            state: State::Init,
            error: None,
            last_sig_error: None,
            last_status: None,
        }
    }

    /// Consumes one raw header field (`arc_header_field`).
    ///
    /// Legal from `INIT` or `HEADER`; always leaves the message in
    /// `HEADER` once the state-order check passes, even if the field
    /// itself turns out to be malformed — the state commits before the
    /// bytes are validated.
    pub fn header_field(&mut self, raw: &[u8]) -> Result<(), Status> {
        if !matches!(self.state, State::Init | State::Header) {
            return Err(Status::Invalid);
        }
        self.state = State::Header;

        match build_header_field(raw, self.library.flags()) {
            Ok(field) => {
                self.headers.push(field);
                Ok(())
            }
            Err(status) => {
                self.set_error("malformed header field");
                self.last_status = Some(status);
                Err(status)
            }
        }
    }

    /// Declares no more header fields are coming (`arc_eoh`). Parses and
    /// indexes every ARC-related header, verifying structural
    /// completeness of the chain. A `Syntax`/`Internal` failure here moves
    /// the message to `Unusable`.
    pub fn end_of_headers(&mut self) -> Result<(), Status> {
        if self.state != State::Header {
            return Err(Status::Invalid);
        }

        match assemble(&self.headers) {
            Ok(chain) => {
                self.chain = Some(chain);
                self.state = State::Eoh;
                Ok(())
            }
            Err(err) => {
                self.last_sig_error = err.sig_error;
                self.last_status = Some(err.status);
                self.set_error(err.message);
                self.state = State::Unusable;
                Err(err.status)
            }
        }
    }

    /// Consumes one chunk of canonicalized body bytes (`arc_body`). Legal
    /// from `EOH` or `BODY`; always transitions to `BODY`.
    pub fn body_chunk(&mut self, buf: &[u8]) -> Result<(), Status> {
        if !matches!(self.state, State::Eoh | State::Body) {
            return Err(Status::Invalid);
        }
        self.state = State::Body;
        self.body.extend_from_slice(buf);
        Ok(())
    }

    /// Declares end of message (`arc_eom`) and runs the chain validator.
    pub fn end_of_message(
        &mut self,
        verifier: &dyn SignatureVerifier,
        keys: &dyn KeyProvider,
        canon: &dyn Canonicalizer,
    ) -> Result<ChainState, Status> {
        if !matches!(self.state, State::Eoh | State::Body) {
            return Err(Status::Invalid);
        }

        let chain = self.chain.as_mut().ok_or(Status::Invalid)?;
        let result = chain.validate(&self.headers, &self.body, verifier, keys, canon);

        match &result {
            Ok(_) => self.state = State::Eom,
            Err(status) => {
                self.set_error(format!("chain validation failed: {status}"));
                self.last_status = Some(*status);
                self.state = State::Unusable;
            }
        }

        result
    }

    /// Returns the signing material for this message, once sealed
    /// elsewhere (see [`SealMaterial`]). Always succeeds and returns an
    /// empty result: the actual seal/sign step is out of scope.
    pub fn get_seal(&self, _selector: &str, _domain: &str, _key: &[u8]) -> Result<SealMaterial, Status> {
        Ok(SealMaterial::default())
    }

    /// The header fields accepted so far, in arrival order.
    pub fn headers(&self) -> &[HeaderField] {
        &self.headers
    }

    /// The assembled chain, available once `end_of_headers` has
    /// succeeded.
    pub fn chain(&self) -> Option<&Chain> {
        self.chain.as_ref()
    }

    /// The overall chain state, or `Unknown` before `end_of_message` runs.
    pub fn chain_state(&self) -> ChainState {
        self.chain.as_ref().map(|c| c.state()).unwrap_or(ChainState::Unknown)
    }

    /// The most recent diagnostic, if any operation on this message has
    /// failed.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// The specific duplicate/gap diagnostic from the most recent
    /// `end_of_headers` failure, if any.
    pub fn last_sig_error(&self) -> Option<SigError> {
        self.last_sig_error
    }

    /// The status code of the most recent chain-affecting failure
    /// (`end_of_headers` or `end_of_message`), if any.
    pub fn last_status(&self) -> Option<Status> {
        self.last_status
    }

    fn set_error(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::{Flags, Library};
    use crate::provider::VerifyRequest;

    struct AlwaysOk;
    impl SignatureVerifier for AlwaysOk {
        fn verify(&self, _request: VerifyRequest<'_>) -> Result<(), Status> {
            Ok(())
        }
    }

    struct NullKeys;
    impl KeyProvider for NullKeys {
        fn fetch_key(&self, _domain: &str, _selector: &str) -> Result<Vec<u8>, Status> {
            Ok(Vec::new())
        }
    }

    struct IdentityCanon;
    impl Canonicalizer for IdentityCanon {
        fn canonicalize_header(&self, _name: &[u8], value: &[u8]) -> Vec<u8> {
            value.to_vec()
        }
        fn canonicalize_body(&self, body: &[u8]) -> Vec<u8> {
            body.to_vec()
        }
    }

    fn arc_headers(cv: &str) -> [String; 3] {
        [
            format!("ARC-Seal: i=1; cv={cv}; a=rsa-sha256; d=example.org; s=sel; b=AAAA\r\n"),
            "ARC-Message-Signature: i=1; s=sel; h=from; d=example.org; b=AAAA; v=1; a=rsa-sha256\r\n"
                .to_string(),
            "ARC-Authentication-Results: i=1; mx.example.org; dkim=pass\r\n".to_string(),
        ]
    }

    #[test]
    fn empty_chain_yields_none_state() {
        let lib = Library::new();
        let mut msg = lib.message();
        msg.header_field(b"Subject: hi\r\n").unwrap();
        msg.end_of_headers().unwrap();
        let state = msg
            .end_of_message(&AlwaysOk, &NullKeys, &IdentityCanon)
            .unwrap();
        assert_eq!(state, ChainState::None);
    }

    #[test]
    fn single_hop_chain_passes_with_stub_verifier() {
        let lib = Library::new();
        let mut msg = lib.message();
        for header in arc_headers("none") {
            msg.header_field(header.as_bytes()).unwrap();
        }
        msg.end_of_headers().unwrap();
        msg.body_chunk(b"body\r\n").unwrap();
        let state = msg
            .end_of_message(&AlwaysOk, &NullKeys, &IdentityCanon)
            .unwrap();
        assert_eq!(state, ChainState::Pass);
    }

    #[test]
    fn body_chunk_in_init_is_invalid_and_does_not_mutate_state() {
        let lib = Library::new();
        let mut msg = lib.message();
        assert_eq!(msg.body_chunk(b"x").unwrap_err(), Status::Invalid);
        // still usable from INIT afterwards
        assert!(msg.header_field(b"Subject: hi\r\n").is_ok());
    }

    #[test]
    fn end_of_headers_before_any_header_is_invalid() {
        let lib = Library::new();
        let mut msg = lib.message();
        assert_eq!(msg.end_of_headers().unwrap_err(), Status::Invalid);
    }

    #[test]
    fn malformed_tag_list_marks_message_unusable() {
        let lib = Library::new();
        let mut msg = lib.message();
        msg.header_field(b"ARC-Message-Signature: s=foo; h\r\n").unwrap();
        assert_eq!(msg.end_of_headers().unwrap_err(), Status::Syntax);
        assert_eq!(msg.header_field(b"X: y\r\n").unwrap_err(), Status::Invalid);
    }

    #[test]
    fn fixcrlf_flag_is_read_from_owning_library() {
        let lib = Library::new();
        lib.set_flags(Flags::FIXCRLF);
        let mut msg = lib.message();
        msg.header_field(b"Subject: hi\n").unwrap();
        assert!(msg.headers()[0].raw().ends_with(b"\r\n"));
    }
}
