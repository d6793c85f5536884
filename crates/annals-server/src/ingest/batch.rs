//! Batch accumulation for ingestion commits

use crate::ingest::parser::ParsedLine;

/// Collects parsed lines until a batch is full
#[derive(Debug)]
pub struct BatchAccumulator {
    capacity: usize,
    pending: Vec<ParsedLine>,
}

impl BatchAccumulator {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            pending: Vec::with_capacity(capacity),
        }
    }

    /// Add a line; returns the full batch when this push fills it
    pub fn push(&mut self, line: ParsedLine) -> Option<Vec<ParsedLine>> {
        self.pending.push(line);
        if self.pending.len() >= self.capacity {
            Some(self.take())
        } else {
            None
        }
    }

    /// Drain whatever is pending (end of stream)
    pub fn take(&mut self) -> Vec<ParsedLine> {
        std::mem::replace(&mut self.pending, Vec::with_capacity(self.capacity))
    }
}
