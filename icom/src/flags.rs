//! Link flags and their textual tokens.
//!
//! Flags travel in the second header field, so bit positions are part of the
//! wire format. `INVALID` is a reserved sentinel bit produced by
//! [`FlagSet::decode`] for unknown tokens; it is never sent.

use std::str::FromStr;

use bitflags::bitflags;

use crate::error::IcomError;

bitflags! {
    /// Behaviour switches shared by every link of a communicator.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FlagSet: u32 {
        /// Pass a shared-buffer handle instead of the payload bytes.
        const ZERO_COPY   = 1 << 0;
        /// Reserved for synchronized zero-copy; requires `ZERO_COPY`.
        const PROTECTED   = 1 << 1;
        /// Bound every blocking wait by the configured timeouts.
        const TIMEOUT     = 1 << 2;
        /// Acknowledgements are exchanged explicitly by the caller.
        const NOTIFY      = 1 << 3;
        /// Acknowledgements are exchanged by send/recv, wired on first use.
        const AUTO_NOTIFY = 1 << 4;
        /// Sentinel: the token list contained something unknown.
        const INVALID     = 1 << 31;
    }
}

const TOKENS: [(FlagSet, &str); 5] = [
    (FlagSet::ZERO_COPY, "zero"),
    (FlagSet::PROTECTED, "prot"),
    (FlagSet::TIMEOUT, "timeout"),
    (FlagSet::NOTIFY, "notify"),
    (FlagSet::AUTO_NOTIFY, "autonotify"),
];

/// Token for the empty flag set.
pub const DEFAULT_TOKEN: &str = "default";

fn lookup(token: &str) -> Option<FlagSet> {
    if token == DEFAULT_TOKEN {
        return Some(FlagSet::empty());
    }
    TOKENS.iter().find(|(_, t)| *t == token).map(|(f, _)| *f)
}

impl FlagSet {
    /// Decode a comma-joined token list.
    ///
    /// Unknown tokens (including the empty string) set [`FlagSet::INVALID`]
    /// instead of being skipped; check [`FlagSet::is_valid`] before use.
    pub fn decode(list: &str) -> FlagSet {
        list.split(',')
            .map(|token| lookup(token).unwrap_or(FlagSet::INVALID))
            .fold(FlagSet::empty(), |acc, f| acc | f)
    }

    /// `false` when the sentinel bit is set or the combination is illegal.
    pub fn is_valid(self) -> bool {
        !self.contains(FlagSet::INVALID) && self.check_combination().is_ok()
    }

    /// Reject combinations that have no meaning.
    pub fn check_combination(self) -> Result<(), IcomError> {
        if self.contains(FlagSet::NOTIFY | FlagSet::AUTO_NOTIFY) {
            return Err(IcomError::InvalidArgument(
                "invalid flags: notify and autonotify are exclusive".into(),
            ));
        }
        if self.contains(FlagSet::PROTECTED) && !self.contains(FlagSet::ZERO_COPY) {
            return Err(IcomError::InvalidArgument(
                "invalid flags: prot requires zero".into(),
            ));
        }
        Ok(())
    }

    /// `"default"` for the empty set, otherwise the comma-joined tokens.
    pub fn to_token_string(self) -> String {
        if self.is_empty() {
            return DEFAULT_TOKEN.to_string();
        }
        let mut names: Vec<&str> = TOKENS
            .iter()
            .filter(|(f, _)| self.contains(*f))
            .map(|(_, t)| *t)
            .collect();
        if self.contains(FlagSet::INVALID) {
            names.push("invalid");
        }
        names.join(",")
    }

    /// Either acknowledgement mode.
    pub fn wants_ack(self) -> bool {
        self.intersects(FlagSet::NOTIFY | FlagSet::AUTO_NOTIFY)
    }
}

impl FromStr for FlagSet {
    type Err = IcomError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut flags = FlagSet::empty();
        for token in s.split(',') {
            flags |= lookup(token).ok_or_else(|| IcomError::Lookup(token.to_string()))?;
        }
        flags.check_combination()?;
        Ok(flags)
    }
}
