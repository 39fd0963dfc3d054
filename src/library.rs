/*
 * Copyright (c) 2020-2023, Stalwart Labs Ltd.
 *
 * Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
 * https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
 * <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
 * option. This file may not be copied, modified, or distributed
 * except according to those terms.
 */

use parking_lot::Mutex;
use std::sync::Arc;

use crate::feature::{Feature, FeatureSet};
use crate::message::Message;

/// Default temporary-directory path, used when [`Library::set_tmpdir`] is
/// called with `None` to restore the compiled-in default.
pub const DEFAULT_TMPDIR: &str = "/tmp";

/// Flag word recognized by [`Library::flags`] / [`Library::set_flags`].
///
/// Hand-rolled rather than built on the `bitflags` crate: a single
/// recognized bit doesn't earn a dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Flags(u32);

impl Flags {
    /// When set, [`Message::header_field`] rewrites bare LF to CRLF and
    /// bare CR to CR+LF in the stored copy of each header.
    pub const FIXCRLF: Flags = Flags(1 << 0);

    /// The empty flag word.
    pub const fn empty() -> Self {
        Flags(0)
    }

    /// True if every bit set in `other` is also set in `self`.
    pub const fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Raw bit pattern, for round-tripping through `options`.
    pub const fn bits(&self) -> u32 {
        self.0
    }

    /// Reconstructs a flag word from a raw bit pattern. Unrecognized bits
    /// are preserved, not masked away.
    pub const fn from_bits(bits: u32) -> Self {
        Flags(bits)
    }
}

impl std::ops::BitOr for Flags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Flags(self.0 | rhs.0)
    }
}

/// Process- or caller-scoped library handle.
///
/// Holds the feature bitset, the flag word, the temporary-directory path,
/// and a shared scratch buffer crypto collaborators may use for error
/// strings. No implicit global state: multiple `Library` instances may
/// coexist, and are cheaply `Clone`-able (an `Arc` around the mutable
/// parts).
#[derive(Clone)]
pub struct Library {
    inner: Arc<LibraryInner>,
}

struct LibraryInner {
    features: FeatureSet,
    state: Mutex<LibraryState>,
}

struct LibraryState {
    flags: Flags,
    tmpdir: String,
    crypto_scratch: String,
}

impl Library {
    /// Creates a new library instance (`arc_init`).
    pub fn new() -> Self {
        Library {
            inner: Arc::new(LibraryInner {
                features: FeatureSet::compiled(),
                state: Mutex::new(LibraryState {
                    flags: Flags::empty(),
                    tmpdir: DEFAULT_TMPDIR.to_string(),
                    crypto_scratch: String::new(),
                }),
            }),
        }
    }

    /// Terminates a library instance (`arc_close`). Dropping the last
    /// clone of a `Library` already reclaims its storage; this method is
    /// kept only so callers porting from the C API have an explicit call
    /// to make.
    pub fn close(self) {}

    /// Creates a new message handle bound to this library (`arc_message`).
    pub fn message(&self) -> Message {
        Message::new(self.clone())
    }

    /// Current flag word (`options(GET, FLAGS)`).
    pub fn flags(&self) -> Flags {
        self.inner.state.lock().flags
    }

    /// Replaces the flag word (`options(SET, FLAGS)`). Unrecognized bits
    /// are preserved byte-for-byte on a get/set round trip.
    pub fn set_flags(&self, flags: Flags) {
        self.inner.state.lock().flags = flags;
    }

    /// Current temporary-directory path (`options(GET, TMPDIR)`).
    pub fn tmpdir(&self) -> String {
        self.inner.state.lock().tmpdir.clone()
    }

    /// Sets the temporary-directory path (`options(SET, TMPDIR)`). Passing
    /// `None` restores [`DEFAULT_TMPDIR`].
    pub fn set_tmpdir(&self, path: Option<&str>) {
        let mut state = self.inner.state.lock();
        state.tmpdir = path.unwrap_or(DEFAULT_TMPDIR).to_string();
    }

    /// Reports whether the given optional capability was compiled in
    /// (`arc_libfeature`).
    pub fn has_feature(&self, feature: Feature) -> bool {
        self.inner.features.has(feature)
    }

    /// Writes into the shared crypto scratch buffer. Used by crypto
    /// collaborators to stash a human-readable error; writes are
    /// serialized across concurrent callers by the internal mutex.
    pub fn set_crypto_scratch(&self, message: impl Into<String>) {
        self.inner.state.lock().crypto_scratch = message.into();
    }

    /// Retrieves the shared crypto scratch buffer.
    pub fn crypto_scratch(&self) -> String {
        self.inner.state.lock().crypto_scratch.clone()
    }
}

impl Default for Library {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_round_trip() {
        let lib = Library::new();
        assert_eq!(lib.flags(), Flags::empty());
        lib.set_flags(Flags::FIXCRLF);
        assert!(lib.flags().contains(Flags::FIXCRLF));
    }

    #[test]
    fn tmpdir_round_trips_and_resets() {
        let lib = Library::new();
        assert_eq!(lib.tmpdir(), DEFAULT_TMPDIR);
        lib.set_tmpdir(Some("/var/tmp/arc"));
        assert_eq!(lib.tmpdir(), "/var/tmp/arc");
        lib.set_tmpdir(None);
        assert_eq!(lib.tmpdir(), DEFAULT_TMPDIR);
    }

    #[test]
    fn sha256_feature_is_available() {
        let lib = Library::new();
        assert!(lib.has_feature(Feature::Sha256));
    }

    #[test]
    fn clones_share_state() {
        let lib = Library::new();
        let other = lib.clone();
        other.set_flags(Flags::FIXCRLF);
        assert!(lib.flags().contains(Flags::FIXCRLF));
    }
}
