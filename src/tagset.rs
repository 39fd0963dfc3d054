/*
 * Copyright (c) 2020-2023, Stalwart Labs Ltd.
 *
 * Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
 * https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
 * <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
 * option. This file may not be copied, modified, or distributed
 * except according to those terms.
 */

//! The tag-list parser: turns one ARC header field's value (the bytes
//! after the colon) into an ordered, lookup-indexed [`TagSet`].
//!
//! Grammar: `set := (WS* name WS* '=' WS* value? WS* (';' set?)? )?`, where
//! `name` begins with an alphanumeric and continues with any printable
//! ASCII except `=`, `;`, or mid-token whitespace, and `value` is any
//! printable-ASCII-or-whitespace run terminated by `;` or end of input.
//! Whitespace in a value is collapsed (stripped entirely, not just
//! trimmed) before the value is indexed.

use crate::status::Status;

/// The three wire ARC header types this crate indexes, plus the internal
/// `KEY` mode used only when parsing a DNS TXT record inside a key
/// provider: `KEY` never appears as a header field name in the wire
/// format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetType {
    Seal,
    Signature,
    Ar,
    Key,
}

impl SetType {
    fn label(&self) -> &'static str {
        match self {
            SetType::Seal => "ARC-Seal",
            SetType::Signature => "ARC-Message-Signature",
            SetType::Ar => "ARC-Authentication-Results",
            SetType::Key => "key record",
        }
    }

    /// Generic lowercase type word used in the "... data" family of
    /// diagnostics, as distinct from the full header name `label()` returns.
    fn kind(&self) -> &'static str {
        match self {
            SetType::Seal => "seal",
            SetType::Signature => "signature",
            SetType::Ar => "AR",
            SetType::Key => "key",
        }
    }
}

/// One parsed ARC (or key-record) header value.
///
/// Parameter lookup is case-insensitive on the name; values are
/// case-sensitive. Each parameter name appears at most once: a later
/// occurrence in the input overwrites an earlier one rather than
/// duplicating.
#[derive(Debug, Clone)]
pub struct TagSet {
    set_type: SetType,
    params: Vec<(String, String)>,
}

impl TagSet {
    /// The ARC header type this set was parsed from.
    pub fn set_type(&self) -> SetType {
        self.set_type
    }

    /// Looks up a parameter by name (case-insensitive). Returns the
    /// whitespace-collapsed value, or `None` if the parameter was never
    /// supplied.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// The instance number (`i=`) carried by this set, if present and
    /// well-formed.
    pub fn instance(&self) -> Option<u32> {
        self.get("i").and_then(|v| v.parse().ok())
    }

    fn set(&mut self, name: String, value: String) {
        if let Some(entry) = self.params.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(&name)) {
            entry.1 = value;
        } else {
            self.params.push((name, value));
        }
    }

    fn set_default(&mut self, name: &str, value: &str) {
        if self.get(name).is_none() {
            self.params.push((name.to_string(), value.to_string()));
        }
    }
}

/// A parse failure. Carries enough to format a diagnostic the caller can
/// surface through [`crate::message::Message::error`].
#[derive(Debug, Clone)]
pub struct TagSetError {
    pub status: Status,
    pub message: String,
}

fn syntax(set_type: SetType, message: impl Into<String>) -> TagSetError {
    let _ = set_type;
    TagSetError {
        status: Status::Syntax,
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> TagSetError {
    TagSetError {
        status: Status::Internal,
        message: message.into(),
    }
}

const ARC_HEADER_NAMES: &[&str] = &["ARC-Authentication-Results", "ARC-Message-Signature", "ARC-Seal"];

/// ASCII whitespace the *collapse* operation strips: HT, LF, VT, FF, CR, SP.
fn is_collapse_ws(b: u8) -> bool {
    matches!(b, 0x09 | 0x0a | 0x0b | 0x0c | 0x0d | 0x20)
}

/// `collapse(s)`: strip ASCII LWSP and CR/LF from a byte slice, shifting
/// the remaining bytes down. Idempotent: `collapse(collapse(s)) ==
/// collapse(s)`.
fn collapse(bytes: &[u8]) -> String {
    let filtered: Vec<u8> = bytes.iter().copied().filter(|&b| !is_collapse_ws(b)).collect();
    // Every byte reaching this function already passed the printable-or-
    // whitespace check in the scanner below, so this is always valid ASCII.
    String::from_utf8(filtered).expect("scanner only admits ASCII bytes")
}

fn is_ascii_lwsp(b: u8) -> bool {
    matches!(b, 0x09 | 0x0b | 0x0c | 0x20)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    BeforeParam,
    InParam,
    BeforeValue,
    InValue,
}

/// Parses one ARC (or key-record) header value into a [`TagSet`].
pub fn parse_tagset(set_type: SetType, input: &[u8]) -> Result<TagSet, TagSetError> {
    let mut set = TagSet {
        set_type,
        params: Vec::new(),
    };

    let mut state = State::BeforeParam;
    let mut param_start = 0usize;
    let mut value_start = 0usize;
    let mut spaced = false;
    let mut pending_name = String::new();

    for (i, &b) in input.iter().enumerate() {
        let is_value_whitespace = is_ascii_lwsp(b) || b == b'\r' || b == b'\n';
        if !(b.is_ascii() && (is_ascii_printable(b) || is_value_whitespace)) {
            return Err(syntax(
                set_type,
                format!(
                    "invalid character (ASCII 0x{:02x} at offset {}) in {} data",
                    b,
                    i,
                    set_type.kind()
                ),
            ));
        }

        match state {
            State::BeforeParam => {
                if is_value_whitespace {
                    continue;
                } else if b.is_ascii_alphanumeric() {
                    param_start = i;
                    state = State::InParam;
                } else {
                    return Err(syntax(
                        set_type,
                        format!(
                            "syntax error in {} data (ASCII 0x{:02x} at offset {})",
                            set_type.kind(),
                            b,
                            i
                        ),
                    ));
                }
            }
            State::InParam => {
                if is_value_whitespace {
                    spaced = true;
                } else if b == b'=' {
                    pending_name = collapse(&input[param_start..i]);
                    state = State::BeforeValue;
                    spaced = false;
                } else if b == b';' || spaced {
                    return Err(syntax(
                        set_type,
                        format!(
                            "syntax error in {} data (ASCII 0x{:02x} at offset {})",
                            set_type.kind(),
                            b,
                            i
                        ),
                    ));
                }
            }
            State::BeforeValue => {
                if is_value_whitespace {
                    continue;
                } else if b == b';' {
                    set.set(std::mem::take(&mut pending_name), String::new());
                    state = State::BeforeParam;
                } else {
                    value_start = i;
                    state = State::InValue;
                }
            }
            State::InValue => {
                if b == b';' {
                    let value = collapse(&input[value_start..i]);
                    set.set(std::mem::take(&mut pending_name), value);
                    state = State::BeforeParam;
                }
            }
        }
    }

    match state {
        State::BeforeParam => {}
        State::InValue => {
            let value = collapse(&input[value_start..]);
            set.set(std::mem::take(&mut pending_name), value);
        }
        State::BeforeValue => {
            set.set(std::mem::take(&mut pending_name), String::new());
        }
        State::InParam => {
            return Err(syntax(
                set_type,
                format!("tag without value at end of {} data", set_type.kind()),
            ));
        }
    }

    postprocess(set_type, &mut set)?;

    Ok(set)
}

fn is_ascii_printable(b: u8) -> bool {
    (0x21..=0x7e).contains(&b)
}

fn postprocess(set_type: SetType, set: &mut TagSet) -> Result<(), TagSetError> {
    match set_type {
        SetType::Signature => {
            const REQUIRED: &[&str] = &["s", "h", "d", "b", "v", "i", "a"];
            for tag in REQUIRED {
                if set.get(tag).is_none() {
                    return Err(syntax(
                        set_type,
                        format!("missing parameter(s) in {} data", set_type.kind()),
                    ));
                }
            }

            let h = set.get("h").expect("checked above").to_string();
            for name in h.split(':') {
                if ARC_HEADER_NAMES.iter().any(|arc_name| arc_name.eq_ignore_ascii_case(name)) {
                    return Err(internal(format!(
                        "{} signs {}",
                        set_type.label(),
                        name
                    )));
                }
            }

            for tag in ["t", "x", "i"] {
                if let Some(value) = set.get(tag) {
                    if !is_valid_uint(value) {
                        return Err(syntax(
                            set_type,
                            format!("invalid \"{}\" value in {} data", tag, set_type.kind()),
                        ));
                    }
                }
            }

            set.set_default("q", "dns/txt");
        }
        SetType::Key => {
            set.set_default("k", "rsa");
        }
        SetType::Seal | SetType::Ar => {}
    }

    Ok(())
}

fn is_valid_uint(value: &str) -> bool {
    !value.is_empty()
        && !value.starts_with('-')
        && value.bytes().all(|b| b.is_ascii_digit())
        && value.parse::<u64>().is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig(body: &str) -> Result<TagSet, TagSetError> {
        parse_tagset(SetType::Signature, body.as_bytes())
    }

    #[test]
    fn collapse_is_idempotent() {
        let once = collapse(b" f o\r\n o ");
        let twice = collapse(once.as_bytes());
        assert_eq!(once, twice);
    }

    #[test]
    fn parse_then_lookup_roundtrips_unspaced_values() {
        let set = parse_tagset(SetType::Ar, b"p=v").unwrap();
        assert_eq!(set.get("p"), Some("v"));
    }

    #[test]
    fn lookup_is_case_insensitive_on_name_only() {
        let set = parse_tagset(SetType::Ar, b"P=Value").unwrap();
        assert_eq!(set.get("p"), Some("Value"));
        assert_eq!(set.get("P"), Some("Value"));
    }

    #[test]
    fn later_duplicate_overwrites_earlier() {
        let set = parse_tagset(SetType::Ar, b"p=one; p=two").unwrap();
        assert_eq!(set.get("p"), Some("two"));
    }

    #[test]
    fn whitespace_in_value_is_collapsed_on_index() {
        let set = parse_tagset(SetType::Ar, b"p= a b c ").unwrap();
        assert_eq!(set.get("p"), Some("abc"));
    }

    #[test]
    fn tag_without_value_at_end_is_syntax_error() {
        let err = sig("s=foo; h").unwrap_err();
        assert_eq!(err.status, Status::Syntax);
        assert!(err.message.contains("tag without value"));
    }

    #[test]
    fn missing_mandatory_signature_params_is_syntax_error() {
        let err = sig("s=sel; h=From; d=example.org").unwrap_err();
        assert_eq!(err.status, Status::Syntax);
    }

    #[test]
    fn signed_header_list_forbids_arc_headers() {
        let err = sig("s=sel; h=from:arc-seal; d=example.org; b=AAAA; v=1; i=1; a=rsa-sha256")
            .unwrap_err();
        assert_eq!(err.status, Status::Internal);
        assert!(err.message.contains("arc-seal"));
    }

    #[test]
    fn signature_defaults_q_to_dns_txt() {
        let set = sig("s=sel; h=from; d=example.org; b=AAAA; v=1; i=1; a=rsa-sha256").unwrap();
        assert_eq!(set.get("q"), Some("dns/txt"));
    }

    #[test]
    fn key_defaults_k_to_rsa() {
        let set = parse_tagset(SetType::Key, b"p=abc").unwrap();
        assert_eq!(set.get("k"), Some("rsa"));
    }

    #[test]
    fn invalid_integer_tag_is_syntax_error() {
        let err = sig("s=sel; h=from; d=example.org; b=AAAA; v=1; i=1; a=rsa-sha256; t=-1")
            .unwrap_err();
        assert_eq!(err.status, Status::Syntax);
    }

    #[test]
    fn non_ascii_byte_is_syntax_error() {
        let err = parse_tagset(SetType::Ar, b"p=\xff").unwrap_err();
        assert_eq!(err.status, Status::Syntax);
    }

    #[test]
    fn empty_value_before_semicolon_is_accepted() {
        let set = parse_tagset(SetType::Ar, b"p=;q=1").unwrap();
        assert_eq!(set.get("p"), Some(""));
        assert_eq!(set.get("q"), Some("1"));
    }
}
