// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use crate::{
    packet::blob::{BwConfig, ClockConfig},
    pipeline::TuningDump,
    split::SplitMode,
};

/// Fixed-depth store indexed by `request_id % depth`.
///
/// A slot answers only for the request that last wrote it, so a lookup for
/// a request that has been overwritten returns `None` rather than another
/// request's data. The caller keeps fewer than `depth` requests in flight.
#[derive(Debug, Clone)]
pub struct ConfigRing<T> {
    slots: Vec<Option<(u64, T)>>,
}

impl<T> ConfigRing<T> {
    pub fn new(depth: usize) -> Self {
        let mut slots = Vec::with_capacity(depth.max(1));
        slots.resize_with(depth.max(1), || None);
        Self { slots }
    }

    fn slot(&self, request_id: u64) -> usize {
        (request_id % self.slots.len() as u64) as usize
    }

    /// Stores `value` for `request_id` and returns whatever the slot held.
    pub fn insert(&mut self, request_id: u64, value: T) -> Option<(u64, T)> {
        let slot = self.slot(request_id);
        self.slots[slot].replace((request_id, value))
    }

    pub fn get(&self, request_id: u64) -> Option<&T> {
        match &self.slots[self.slot(request_id)] {
            Some((id, value)) if *id == request_id => Some(value),
            _ => None,
        }
    }

    /// Value for `request_id`, resetting the slot if it belongs to an
    /// older request.
    pub fn get_or_default(&mut self, request_id: u64) -> &mut T
    where
        T: Default,
    {
        let slot = self.slot(request_id);
        let entry = &mut self.slots[slot];
        if !matches!(entry, Some((id, _)) if *id == request_id) {
            *entry = None;
        }
        &mut entry.get_or_insert_with(|| (request_id, T::default())).1
    }

    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|s| *s = None);
    }
}

/// Configuration submitted for one request, kept for debugging.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestSnapshot {
    pub request_id: u64,
    pub mode: SplitMode,
    /// Packed top-level enable registers
    pub enables: Vec<u32>,
    pub cmd_words: usize,
    pub tuning: TuningDump,
    pub clock: ClockConfig,
    pub bandwidth: BwConfig,
    /// Hang dump descriptor blob when per-frame dumps are enabled
    pub hang_dump: Option<Vec<u8>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_wrap() {
        let mut ring = ConfigRing::new(4);
        ring.insert(1, "a");
        ring.insert(5, "b");
        assert_eq!(ring.get(1), None);
        assert_eq!(ring.get(5), Some(&"b"));
        assert_eq!(ring.get(9), None);
    }

    #[test]
    fn stale_slot_is_reset() {
        let mut ring: ConfigRing<Vec<u32>> = ConfigRing::new(2);
        ring.get_or_default(3).push(7);
        ring.get_or_default(3).push(8);
        assert_eq!(ring.get(3), Some(&vec![7, 8]));
        assert!(ring.get_or_default(5).is_empty());
        assert_eq!(ring.get(3), None);
    }
}
