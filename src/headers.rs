/*
 * Copyright (c) 2020-2023, Stalwart Labs Ltd.
 *
 * Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
 * https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
 * <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
 * option. This file may not be copied, modified, or distributed
 * except according to those terms.
 */

//! The header store: validates and appends one raw header field at a time,
//! preserving arrival order. Never reorders or rewrites an already-stored
//! record.

use crate::library::Flags;
use crate::status::Status;

/// One accepted header field.
///
/// `text` holds the raw bytes as supplied (optionally CRLF-normalized);
/// `name_len` is the length of the field name, ending at the last
/// non-whitespace byte before the colon; `colon` is the byte offset of the
/// colon within `text`. Once appended, a record is never modified.
#[derive(Debug, Clone)]
pub struct HeaderField {
    text: Vec<u8>,
    name_len: usize,
    colon: usize,
}

impl HeaderField {
    /// The field name, byte-for-byte up to (and excluding) the last
    /// trailing-whitespace-then-colon.
    pub fn name(&self) -> &[u8] {
        &self.text[..self.name_len]
    }

    /// The field value: everything after the colon, including any leading
    /// whitespace, exactly as stored.
    pub fn value(&self) -> &[u8] {
        &self.text[self.colon + 1..]
    }

    /// The full raw text of the header field, as stored.
    pub fn raw(&self) -> &[u8] {
        &self.text
    }
}

/// Validates and normalizes one raw header line, producing a
/// [`HeaderField`] record.
///
/// Rules (RFC 5322 §2.2, tightened to also reject a continuation line
/// being misread as a header name):
/// - every byte before the first `:` must be printable ASCII (whitespace
///   tolerated);
/// - exactly one `:` is recognized — the first one;
/// - no `;` may appear before that `:`;
/// - every byte after the `:` must be HT, CR, LF, SP, or printable ASCII.
pub fn build_header_field(raw: &[u8], flags: Flags) -> Result<HeaderField, Status> {
    let mut colon = None;
    for (i, &b) in raw.iter().enumerate() {
        match colon {
            None => {
                if !(32..=126).contains(&b) {
                    return Err(Status::Syntax);
                }
                if b == b':' {
                    colon = Some(i);
                }
            }
            Some(_) => {
                let ok = b == 9 || b == 10 || b == 13 || (32..=126).contains(&b);
                if !ok {
                    return Err(Status::Syntax);
                }
            }
        }
    }

    let colon = colon.ok_or(Status::Syntax)?;

    if let Some(semicolon) = raw.iter().position(|&b| b == b';') {
        if semicolon < colon {
            return Err(Status::Syntax);
        }
    }

    let mut name_len = colon;
    while name_len > 0 && raw[name_len - 1].is_ascii_whitespace() {
        name_len -= 1;
    }

    let text = if flags.contains(Flags::FIXCRLF) {
        fix_crlf(raw)
    } else {
        raw.to_vec()
    };

    // FIXCRLF can only grow the buffer (LF -> CRLF, CR -> CRLF), so the
    // colon offset found above is still valid up to and including it; scan
    // again on the stored copy to be exact regardless.
    let stored_colon = text.iter().position(|&b| b == b':').ok_or(Status::Syntax)?;

    Ok(HeaderField {
        text,
        name_len,
        colon: stored_colon,
    })
}

/// Rewrites bare LF to CRLF and bare CR to CR+LF.
fn fix_crlf(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len());
    let mut prev = 0u8;

    for &b in raw {
        if b == b'\n' && prev != b'\r' {
            out.push(b'\r');
            out.push(b'\n');
        } else if prev == b'\r' && b != b'\n' {
            out.push(b'\n');
            out.push(b);
        } else {
            out.push(b);
        }
        prev = b;
    }

    if prev == b'\r' {
        out.push(b'\n');
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_ends_before_trailing_whitespace_and_colon() {
        let h = build_header_field(b"Subject  : hello", Flags::empty()).unwrap();
        assert_eq!(h.name(), b"Subject");
        assert_eq!(h.value(), b" hello");
    }

    #[test]
    fn missing_colon_is_syntax_error() {
        assert_eq!(build_header_field(b"no colon here", Flags::empty()), Err(Status::Syntax));
    }

    #[test]
    fn semicolon_before_colon_is_syntax_error() {
        assert_eq!(
            build_header_field(b"Bad;Name: value", Flags::empty()),
            Err(Status::Syntax)
        );
    }

    #[test]
    fn non_printable_byte_in_name_is_syntax_error() {
        assert_eq!(build_header_field(b"Sub\x01ject: value", Flags::empty()), Err(Status::Syntax));
    }

    #[test]
    fn fixcrlf_normalizes_bare_lf_when_flag_set() {
        let h = build_header_field(b"Subject: hello\n", Flags::FIXCRLF).unwrap();
        assert!(h.raw().ends_with(b"\r\n"));
    }

    #[test]
    fn bytes_preserved_verbatim_when_flag_clear() {
        let h = build_header_field(b"Subject: hello\n", Flags::empty()).unwrap();
        assert!(h.raw().ends_with(b"hello\n"));
        assert!(!h.raw().ends_with(b"\r\n"));
    }

    #[test]
    fn fixcrlf_normalizes_bare_cr() {
        let h = build_header_field(b"Subject: a\rb", Flags::FIXCRLF).unwrap();
        assert_eq!(h.value(), b" a\r\nb");
    }
}
