use crate::error::LedgerError;

/// Sequence slots reserved for one pass: `base`, `base + 1`, ... in
/// job-list order. Computed once before fan-out and never mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequencePlan {
    base: u64,
    len: usize,
}

impl SequencePlan {
    pub fn new(base: u64, len: usize) -> Result<Self, LedgerError> {
        let span = u64::try_from(len.saturating_sub(1))
            .map_err(|_| LedgerError::SequenceOverflow { base, count: len })?;
        base.checked_add(span)
            .ok_or(LedgerError::SequenceOverflow { base, count: len })?;
        Ok(Self { base, len })
    }

    pub fn base(&self) -> u64 {
        self.base
    }

    pub fn slots(&self) -> impl Iterator<Item = u64> {
        let base = self.base;
        (0..self.len).map(move |i| base + i as u64)
    }
}
