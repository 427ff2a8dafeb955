use crate::code::Code;
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Opaque identifier attached to every code a batch reserves.
///
/// Used only for bookkeeping and audit; uniqueness is always decided on the
/// code itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BatchId(u64);

impl BatchId {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl Display for BatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// A group of candidate codes reconciled against the store in one call.
///
/// Candidates may repeat; the store accepts each distinct code at most once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    id: BatchId,
    candidates: Vec<Code>,
}

impl Batch {
    pub fn new(id: BatchId, candidates: Vec<Code>) -> Self {
        Self { id, candidates }
    }

    pub fn id(&self) -> BatchId {
        self.id
    }

    pub fn candidates(&self) -> &[Code] {
        &self.candidates
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}
