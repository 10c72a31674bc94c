//! Option Validation Module
//!
//! Scanner flags are checked against a closed allow-list mapping each flag to
//! the number of arguments it requires. Anything not listed is rejected;
//! supporting a new flag means adding it here or in configuration.

use lazy_static::lazy_static;
use std::collections::BTreeMap;

use super::tokenize::tokenize;

/// Built-in flags and their required argument counts
const DEFAULT_OPTIONS: &[(&str, usize)] = &[
    ("-sV", 0),
    ("-sC", 0),
    ("-Pn", 0),
    ("-A", 0),
    ("-O", 0),
    ("-p", 1),
    ("--top-ports", 1),
];

/// Flag prefixes that make the scanner read or write host files
const FORBIDDEN_PREFIXES: &[&str] = &["-o", "-i"];

lazy_static! {
    /// Process-wide default allow-list, built once and never mutated
    pub static ref DEFAULT_ALLOW_LIST: OptionAllowList = OptionAllowList::default();
}

/// Errors raised while extending an allow-list at startup
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AllowListError {
    #[error("Option '{0}' must start with '-'")]
    NotAFlag(String),

    #[error("Option '{0}' contains whitespace")]
    Whitespace(String),

    #[error("Option '{0}' reads or writes host files and cannot be allowed")]
    Forbidden(String),
}

/// Closed mapping from flag to required argument count
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionAllowList {
    arities: BTreeMap<String, usize>,
}

impl Default for OptionAllowList {
    fn default() -> Self {
        Self {
            arities: DEFAULT_OPTIONS
                .iter()
                .map(|(flag, arity)| (flag.to_string(), *arity))
                .collect(),
        }
    }
}

impl OptionAllowList {
    /// Default allow-list plus operator-configured flags.
    ///
    /// Configured flags may change the arity of a built-in flag but can
    /// never add file-handling flags (`-o*`, `-i*`) or the bare `--`.
    pub fn with_extra<'a, I>(extra: I) -> Result<Self, AllowListError>
    where
        I: IntoIterator<Item = (&'a String, &'a usize)>,
    {
        let mut list = Self::default();
        for (flag, arity) in extra {
            check_flag(flag)?;
            list.arities.insert(flag.clone(), *arity);
        }
        Ok(list)
    }

    /// Required argument count for `flag`, or `None` if not allowed
    pub fn arity(&self, flag: &str) -> Option<usize> {
        self.arities.get(flag).copied()
    }

    pub fn flags(&self) -> impl Iterator<Item = &str> {
        self.arities.keys().map(String::as_str)
    }

    /// Tokenize and validate a raw option string
    pub fn parse(&self, raw: &str) -> Option<OptionList> {
        let tokens = tokenize(raw)?;
        self.check_tokens(tokens)
    }

    /// Returns true iff every flag in `raw` is allowed and fully argued
    pub fn validate(&self, raw: &str) -> bool {
        self.parse(raw).is_some()
    }

    /// Validate already-tokenized options
    pub fn check_tokens(&self, tokens: Vec<String>) -> Option<OptionList> {
        let mut i = 0;
        while i < tokens.len() {
            let flag = &tokens[i];
            let Some(arity) = self.arity(flag) else {
                tracing::debug!(flag = %flag, "Option not in allow-list");
                return None;
            };
            i += 1;

            for _ in 0..arity {
                match tokens.get(i) {
                    Some(arg) if !arg.starts_with('-') => i += 1,
                    _ => {
                        tracing::debug!(flag = %flag, "Option missing required argument");
                        return None;
                    }
                }
            }
        }
        Some(OptionList { tokens })
    }
}

fn check_flag(flag: &str) -> Result<(), AllowListError> {
    if !flag.starts_with('-') {
        return Err(AllowListError::NotAFlag(flag.to_string()));
    }
    if flag.chars().any(char::is_whitespace) {
        return Err(AllowListError::Whitespace(flag.to_string()));
    }
    if flag == "--" || FORBIDDEN_PREFIXES.iter().any(|p| flag.starts_with(p)) {
        return Err(AllowListError::Forbidden(flag.to_string()));
    }
    Ok(())
}

/// Option tokens that passed validation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptionList {
    tokens: Vec<String>,
}

impl OptionList {
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

/// Validate `raw` against the default allow-list
pub fn validate_options(raw: &str) -> bool {
    DEFAULT_ALLOW_LIST.validate(raw)
}
