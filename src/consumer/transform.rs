//! The work itself: `n -> n*n`, encoded as `"n:n*n"`.

use crate::error::{Error, Result};
use serde::Serialize;
use std::fmt;

/// One processed work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ResultRecord {
    pub n: i64,
    /// Wide enough that no `i64` input can overflow.
    pub square: i128,
}

impl ResultRecord {
    /// Parse an `"n:square"` record as found in the output queue.
    pub fn parse(record: &str) -> Option<Self> {
        let (n, square) = record.split_once(':')?;
        Some(Self {
            n: n.parse().ok()?,
            square: square.parse().ok()?,
        })
    }

    /// Whether `square` really is `n * n`.
    pub fn is_consistent(&self) -> bool {
        transform(self.n) == *self
    }
}

impl fmt::Display for ResultRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.n, self.square)
    }
}

/// Square a work item. Pure, so re-driving an item yields the same record.
pub fn transform(n: i64) -> ResultRecord {
    let wide = i128::from(n);
    ResultRecord {
        n,
        square: wide * wide,
    }
}

/// Decode a work item payload (a decimal integer).
pub fn parse_item(payload: &str) -> Result<i64> {
    payload.trim().parse().map_err(|_| Error::Malformed {
        payload: payload.to_string(),
    })
}
