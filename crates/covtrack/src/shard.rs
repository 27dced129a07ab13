//! Worker sharding
//!
//! Splits a list of script files across worker processes. Assignment is by
//! position in the list, so every worker given the same list and the same
//! total agrees on who runs what without talking to the others.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One worker's slice of the file list, written `N/M` (1-based)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShardConfig {
    /// This worker's shard (1-based)
    pub current: u32,
    /// Number of shards
    pub total: u32,
}

impl ShardConfig {
    /// Create a shard, rejecting zero or out-of-range values
    pub fn new(current: u32, total: u32) -> Result<Self, ShardParseError> {
        if total == 0 {
            return Err(ShardParseError::ZeroTotal);
        }
        if current == 0 {
            return Err(ShardParseError::ZeroCurrent);
        }
        if current > total {
            return Err(ShardParseError::CurrentExceedsTotal { current, total });
        }
        Ok(Self { current, total })
    }

    /// Parse the CLI form `"N/M"`
    pub fn parse(s: &str) -> Result<Self, ShardParseError> {
        let (current, total) = s
            .trim()
            .split_once('/')
            .ok_or_else(|| ShardParseError::InvalidFormat(s.to_string()))?;
        let number = |part: &str| {
            part.trim()
                .parse::<u32>()
                .map_err(|_| ShardParseError::InvalidNumber(part.to_string()))
        };
        Self::new(number(current)?, number(total)?)
    }

    /// Every shard of a `total`-way split, in order
    pub fn all(total: u32) -> impl Iterator<Item = Self> {
        (1..=total).map(move |current| Self { current, total })
    }

    /// Whether this shard is the whole list
    #[must_use]
    pub const fn is_whole(&self) -> bool {
        self.total == 1
    }

    /// Whether the item at `index` belongs to this shard
    #[must_use]
    pub fn should_run_index(&self, index: usize) -> bool {
        (index % self.total as usize) + 1 == self.current as usize
    }

    /// The items of `items` this shard runs, order preserved
    #[must_use]
    pub fn filter_by_index<T: Clone>(&self, items: &[T]) -> Vec<T> {
        items
            .iter()
            .enumerate()
            .filter(|(idx, _)| self.should_run_index(*idx))
            .map(|(_, item)| item.clone())
            .collect()
    }

    /// How many of `len` items this shard runs
    #[must_use]
    pub fn assigned_count(&self, len: usize) -> usize {
        let base = len / self.total as usize;
        let remainder = len % self.total as usize;
        if self.current as usize <= remainder {
            base + 1
        } else {
            base
        }
    }
}

impl Default for ShardConfig {
    fn default() -> Self {
        Self {
            current: 1,
            total: 1,
        }
    }
}

impl std::fmt::Display for ShardConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.current, self.total)
    }
}

impl std::str::FromStr for ShardConfig {
    type Err = ShardParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Rejected shard specification
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShardParseError {
    /// Not of the form `N/M`
    #[error("invalid shard format '{0}', expected 'N/M' (e.g. '1/4')")]
    InvalidFormat(String),
    /// One side is not a number
    #[error("invalid number in shard spec: '{0}'")]
    InvalidNumber(String),
    /// `M` is zero
    #[error("total shards cannot be zero")]
    ZeroTotal,
    /// `N` is zero
    #[error("current shard must be 1-based (cannot be 0)")]
    ZeroCurrent,
    /// `N` is larger than `M`
    #[error("current shard ({current}) exceeds total ({total})")]
    CurrentExceedsTotal {
        /// Requested shard
        current: u32,
        /// Shard count
        total: u32,
    },
}
