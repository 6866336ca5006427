//! The closed set of operations a form serves, and a compact set of them.
//!
//! A schema carries the operations it allows; dispatch refuses anything else
//! before touching storage.

use std::fmt;

/// One client-facing operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Read one record (and its children) by key.
    Get,
    /// Insert a new record.
    Create,
    /// Update an existing record.
    Update,
    /// Delete a record (and its children).
    Delete,
    /// List records matching a filter.
    Filter,
    /// Save many records in one batch.
    Bulk,
}

impl Operation {
    /// Every operation, in declaration order.
    pub const ALL: [Operation; 6] = [
        Operation::Get,
        Operation::Create,
        Operation::Update,
        Operation::Delete,
        Operation::Filter,
        Operation::Bulk,
    ];

    const fn bit(self) -> u8 {
        1 << (self as u8)
    }

    /// Lowercase name used in payloads and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Operation::Get => "get",
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
            Operation::Filter => "filter",
            Operation::Bulk => "bulk",
        }
    }

    /// Parse an operation name (case-insensitive).
    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|op| op.as_str().eq_ignore_ascii_case(s))
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A compact bitset of allowed operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct OperationSet {
    bits: u8,
}

impl OperationSet {
    /// No operation allowed.
    #[must_use]
    pub const fn empty() -> Self {
        Self { bits: 0 }
    }

    /// Every operation allowed.
    #[must_use]
    pub const fn all() -> Self {
        let mut s = Self::empty();
        let mut i = 0;
        while i < Operation::ALL.len() {
            s.bits |= Operation::ALL[i].bit();
            i += 1;
        }
        s
    }

    /// Build a set from a list of operations.
    #[must_use]
    pub fn of(ops: &[Operation]) -> Self {
        let mut s = Self::empty();
        for op in ops {
            s.insert(*op);
        }
        s
    }

    /// Allow an operation.
    pub fn insert(&mut self, op: Operation) {
        self.bits |= op.bit();
    }

    /// Disallow an operation.
    pub fn remove(&mut self, op: Operation) {
        self.bits &= !op.bit();
    }

    /// Check whether an operation is allowed.
    #[must_use]
    pub const fn contains(&self, op: Operation) -> bool {
        self.bits & op.bit() != 0
    }

    /// True if nothing is allowed.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.bits == 0
    }
}
