//! Target Validation Module
//!
//! Classifies scan targets against a fixed set of accepted notations. A raw
//! target string is accepted only if every token is well formed; a single
//! bad token rejects the whole batch.

use ipnetwork::{Ipv4Network, Ipv6Network};
use lazy_static::lazy_static;
use regex::Regex;
use std::net::{Ipv4Addr, Ipv6Addr};

use super::tokenize::tokenize;

/// Maximum total hostname length
const MAX_HOSTNAME_LEN: usize = 253;

lazy_static! {
    /// `A.B.C.D-E`: only the final octet is a range. Octets are not range
    /// checked, so `999.999.999.999-999` passes.
    static ref DASHED_RANGE: Regex =
        Regex::new(r"^(?:[0-9]{1,3}\.){3}[0-9]{1,3}-[0-9]{1,3}$").expect("valid range pattern");

    /// First label up to 63 alphanumerics/hyphens, then alphabetic labels.
    static ref HOSTNAME: Regex =
        Regex::new(r"^[A-Za-z0-9][A-Za-z0-9\-]{0,61}[A-Za-z0-9]?(?:\.[A-Za-z]{2,})*$")
            .expect("valid hostname pattern");
}

/// A single well-formed target token
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetSpec {
    Ipv4(Ipv4Addr),
    Ipv4Cidr(Ipv4Network),
    Ipv6(Ipv6Addr),
    Ipv6Cidr(Ipv6Network),
    /// Last-octet range such as `192.168.1.1-254`
    DashedRange(String),
    Hostname(String),
    /// `*.` followed by a valid hostname
    WildcardHostname(String),
}

impl TargetSpec {
    /// Classify a token. Rules are tried in order and the first match wins.
    pub fn classify(token: &str) -> Option<Self> {
        if let Ok(addr) = token.parse::<Ipv4Addr>() {
            return Some(TargetSpec::Ipv4(addr));
        }
        if let Some(net) = parse_ipv4_cidr(token) {
            return Some(TargetSpec::Ipv4Cidr(net));
        }
        if let Ok(addr) = token.parse::<Ipv6Addr>() {
            return Some(TargetSpec::Ipv6(addr));
        }
        if let Some(net) = parse_cidr::<Ipv6Network>(token) {
            return Some(TargetSpec::Ipv6Cidr(net));
        }
        if DASHED_RANGE.is_match(token) {
            return Some(TargetSpec::DashedRange(token.to_string()));
        }
        if is_hostname(token) {
            return Some(TargetSpec::Hostname(token.to_string()));
        }
        if let Some(rest) = token.strip_prefix("*.") {
            if is_hostname(rest) {
                return Some(TargetSpec::WildcardHostname(token.to_string()));
            }
        }
        None
    }

    /// Short label used in debug logging
    pub fn kind(&self) -> &'static str {
        match self {
            TargetSpec::Ipv4(_) => "ipv4",
            TargetSpec::Ipv4Cidr(_) => "ipv4-cidr",
            TargetSpec::Ipv6(_) => "ipv6",
            TargetSpec::Ipv6Cidr(_) => "ipv6-cidr",
            TargetSpec::DashedRange(_) => "range",
            TargetSpec::Hostname(_) => "hostname",
            TargetSpec::WildcardHostname(_) => "wildcard",
        }
    }
}

/// Parse `addr/prefix` where prefix is a length, a netmask or a hostmask.
///
/// Non-strict: host bits may be set. A dotted mask is read as a netmask
/// first (`255.255.255.0`), then as a hostmask (`0.0.0.255`).
fn parse_ipv4_cidr(token: &str) -> Option<Ipv4Network> {
    let (addr, prefix) = token.split_once('/')?;
    let addr: Ipv4Addr = addr.parse().ok()?;

    let prefix = if prefix.contains('.') {
        let mask = u32::from(prefix.parse::<Ipv4Addr>().ok()?);
        if is_contiguous_netmask(mask) {
            mask.leading_ones()
        } else if is_contiguous_netmask(!mask) {
            (!mask).leading_ones()
        } else {
            return None;
        }
    } else {
        decimal_prefix(prefix, 32)?
    };

    Ipv4Network::new(addr, prefix as u8).ok()
}

/// Ones followed by zeros
fn is_contiguous_netmask(mask: u32) -> bool {
    mask.leading_ones() + mask.trailing_zeros() == 32
}

/// ASCII digits only, at most `max`
fn decimal_prefix(s: &str, max: u32) -> Option<u32> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse::<u32>().ok().filter(|p| *p <= max)
}

/// Parse `addr/prefix` (non-strict: host bits may be set).
///
/// The prefix must be present and all digits; `ipnetwork` alone would also
/// take a bare address or a `+`-signed length.
fn parse_cidr<N: std::str::FromStr>(token: &str) -> Option<N> {
    let (_, prefix) = token.split_once('/')?;
    decimal_prefix(prefix, 128)?;
    token.parse::<N>().ok()
}

fn is_hostname(s: &str) -> bool {
    !s.is_empty() && s.len() <= MAX_HOSTNAME_LEN && HOSTNAME.is_match(s)
}

/// Target tokens that passed validation.
///
/// Only obtainable through [`TargetList::parse`]; the command builder takes
/// this type so unvalidated text can never reach the argument vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetList {
    tokens: Vec<String>,
}

impl TargetList {
    /// Tokenize and validate a raw target string
    pub fn parse(raw: &str) -> Option<Self> {
        let tokens = tokenize(raw)?;
        Self::from_tokens(tokens)
    }

    /// Validate already-tokenized targets
    pub fn from_tokens(tokens: Vec<String>) -> Option<Self> {
        for token in &tokens {
            match TargetSpec::classify(token) {
                Some(spec) => tracing::trace!(kind = spec.kind(), "Target token accepted"),
                None => {
                    tracing::debug!(token = %token, "Target token rejected");
                    return None;
                }
            }
        }
        Some(Self { tokens })
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

/// Returns true iff every token of `raw` is a well-formed target.
pub fn validate_targets(raw: &str) -> bool {
    TargetList::parse(raw).is_some()
}
