// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

/// Ping-pong LUT bank of one module instance.
///
/// The hardware reads the active bank while the other one is written, so
/// every LUT rewrite targets the opposite bank. Only a rewrite may toggle;
/// requests that replay the stored LUT keep the current bank.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LutBank {
    current: u8,
    written: bool,
}

impl LutBank {
    /// Bank holding the most recent LUT.
    pub fn current(&self) -> u8 {
        self.current
    }

    /// Selects the bank for a new LUT and returns it. The first rewrite lands
    /// in bank 0.
    pub fn toggle(&mut self) -> u8 {
        if self.written {
            self.current ^= 1;
        } else {
            self.written = true;
        }
        self.current
    }

    /// Continues so that the next [`LutBank::toggle`] selects `next`.
    pub fn resume_at(&mut self, next: u8) {
        self.current = (next & 1) ^ 1;
        self.written = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alternates() {
        let mut bank = LutBank::default();
        let seq: Vec<u8> = (0..5).map(|_| bank.toggle()).collect();
        assert_eq!(seq, [0, 1, 0, 1, 0]);
    }

    #[test]
    fn resume() {
        let mut bank = LutBank::default();
        bank.resume_at(1);
        assert_eq!(bank.toggle(), 1);
        assert_eq!(bank.toggle(), 0);
    }
}
