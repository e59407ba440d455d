//! Named event totals (allocations, uploads, bytes moved, ...)

use std::collections::BTreeMap;

#[derive(Debug, Default, Clone)]
pub struct Counter {
    totals: BTreeMap<&'static str, u64>,
}

impl Counter {
    pub fn new() -> Self {
        Self {
            totals: BTreeMap::new(),
        }
    }

    pub fn increment(&mut self, name: &'static str, value: u64) {
        *self.totals.entry(name).or_insert(0) += value;
    }

    pub fn get(&self, name: &str) -> u64 {
        self.totals.get(name).copied().unwrap_or(0)
    }

    pub fn reset_all(&mut self) {
        self.totals.clear();
    }

    /// Totals in name order, so log lines are stable between frames.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, u64)> + '_ {
        self.totals.iter().map(|(name, value)| (*name, *value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_accumulates_by_name() {
        let mut counter = Counter::new();
        counter.increment("uploads", 1);
        counter.increment("uploads", 2);
        counter.increment("upload_bytes", 64);

        assert_eq!(counter.get("uploads"), 3);
        assert_eq!(counter.get("upload_bytes"), 64);
        assert_eq!(counter.get("missing"), 0);

        let names: Vec<_> = counter.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["upload_bytes", "uploads"]);

        counter.reset_all();
        assert_eq!(counter.get("uploads"), 0);
    }
}
