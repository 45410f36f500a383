//! Correlation table for in-flight requests.
//!
//! An arena keyed by counter-issued serials: a monotonic counter plus a map
//! from serial to entry. Serials are never reused for the lifetime of the
//! table, so a late response can never be matched to a newer request.

// ============================================================================
// Imports
// ============================================================================

use rustc_hash::FxHashMap;

use crate::identifiers::{Counter, Serial};

// ============================================================================
// CorrelationTable
// ============================================================================

/// Map of live serials to their pending entries.
#[derive(Debug)]
pub struct CorrelationTable<K: Serial, V> {
    /// Issues serials; never rewinds.
    counter: Counter,
    /// Live entries.
    entries: FxHashMap<K, V>,
}

impl<K: Serial, V> Default for CorrelationTable<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Serial, V> CorrelationTable<K, V> {
    /// Creates an empty table. The first issued serial is 1.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            counter: Counter::new(),
            entries: FxHashMap::default(),
        }
    }

    /// Issues the next serial and stores `entry` under it.
    pub fn insert(&mut self, entry: V) -> K {
        let serial = self.counter.issue();
        self.entries.insert(serial, entry);
        serial
    }

    /// Removes and returns the entry for `serial`.
    ///
    /// Returns `None` if the serial was never issued or already settled.
    #[inline]
    pub fn take(&mut self, serial: K) -> Option<V> {
        self.entries.remove(&serial)
    }

    /// Returns the entry for `serial`.
    #[inline]
    #[must_use]
    pub fn get(&self, serial: K) -> Option<&V> {
        self.entries.get(&serial)
    }

    /// Returns the entry for `serial` mutably.
    #[inline]
    pub fn get_mut(&mut self, serial: K) -> Option<&mut V> {
        self.entries.get_mut(&serial)
    }

    /// Removes every entry, ordered by serial.
    ///
    /// The counter is untouched: serials stay unique across drains.
    pub fn drain(&mut self) -> Vec<(K, V)> {
        let mut drained: Vec<_> = self.entries.drain().collect();
        drained.sort_unstable_by_key(|(serial, _)| serial.raw());
        drained
    }

    /// Returns the number of live entries.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no entry is live.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the last issued serial value (0 if none).
    #[inline]
    #[must_use]
    pub fn last_issued(&self) -> u64 {
        self.counter.last()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::identifiers::RpcSerial;

    #[test]
    fn test_insert_issues_increasing_serials() {
        let mut table: CorrelationTable<RpcSerial, &str> = CorrelationTable::new();

        assert_eq!(table.insert("a"), RpcSerial::new(1));
        assert_eq!(table.insert("b"), RpcSerial::new(2));
        assert_eq!(table.len(), 2);
        assert_eq!(table.last_issued(), 2);
    }

    #[test]
    fn test_take_is_exactly_once() {
        let mut table: CorrelationTable<RpcSerial, &str> = CorrelationTable::new();
        let serial = table.insert("a");

        assert_eq!(table.take(serial), Some("a"));
        assert_eq!(table.take(serial), None);
        assert!(table.is_empty());
    }

    #[test]
    fn test_take_unknown_serial() {
        let mut table: CorrelationTable<RpcSerial, &str> = CorrelationTable::new();
        table.insert("a");

        assert_eq!(table.take(RpcSerial::new(99)), None);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_drain_keeps_counter() {
        let mut table: CorrelationTable<RpcSerial, u32> = CorrelationTable::new();
        table.insert(10);
        table.insert(20);
        table.insert(30);

        let drained = table.drain();
        assert_eq!(
            drained,
            vec![
                (RpcSerial::new(1), 10),
                (RpcSerial::new(2), 20),
                (RpcSerial::new(3), 30)
            ]
        );
        assert!(table.is_empty());

        // Serials are never reused after a drain
        assert_eq!(table.insert(40), RpcSerial::new(4));
    }

    #[test]
    fn test_get_mut() {
        let mut table: CorrelationTable<RpcSerial, Vec<u32>> = CorrelationTable::new();
        let serial = table.insert(vec![1]);

        table.get_mut(serial).expect("live entry").push(2);
        assert_eq!(table.get(serial), Some(&vec![1, 2]));
    }
}
