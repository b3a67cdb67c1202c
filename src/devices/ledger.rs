use std::collections::{HashSet, VecDeque};
use std::fs;
use std::io;
use std::path::Path;
use tracing::warn;

use crate::storage;

pub const LEDGER_FILE: &str = "processed_log_lines.txt";
pub const LEDGER_CAPACITY: usize = 2000;

/// Log lines already folded into device state, oldest first.
#[derive(Debug, Clone, Default)]
pub struct ProcessedLedger {
    order: VecDeque<String>,
    seen: HashSet<String>,
}

impl ProcessedLedger {
    pub fn load(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(raw) => Self::from_lines(raw.lines().map(str::trim).filter(|l| !l.is_empty())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Self::default(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read processed-line ledger.");
                Self::default()
            }
        }
    }

    fn from_lines<'a>(lines: impl Iterator<Item = &'a str>) -> Self {
        let mut ledger = Self::default();
        for line in lines {
            if ledger.seen.insert(line.to_string()) {
                ledger.order.push_back(line.to_string());
            }
        }
        ledger
    }

    pub fn contains(&self, line: &str) -> bool {
        self.seen.contains(line)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Records the lines handled in this pass as the most recent entries,
    /// then evicts the oldest ones beyond `capacity`.
    pub fn merge(&mut self, handled: Vec<String>, capacity: usize) {
        let refreshed: HashSet<&String> = handled.iter().collect();
        let mut order: VecDeque<String> = self
            .order
            .drain(..)
            .filter(|line| !refreshed.contains(line))
            .collect();
        let mut seen: HashSet<String> = order.iter().cloned().collect();

        for line in handled {
            if seen.insert(line.clone()) {
                order.push_back(line);
            }
        }
        while order.len() > capacity {
            if let Some(evicted) = order.pop_front() {
                seen.remove(&evicted);
            }
        }

        self.order = order;
        self.seen = seen;
    }

    pub fn save(&self, path: &Path) -> io::Result<()> {
        let mut body = String::new();
        for line in &self.order {
            body.push_str(line);
            body.push('\n');
        }
        storage::write_atomic(path, body.as_bytes())
    }
}
