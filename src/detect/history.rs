use std::collections::VecDeque;

use crate::glyph::Glyph;

/// Number of most recent decodes that must agree before an ACCEPT.
pub const STABLE_WINDOW: usize = 5;

/// Append-only log of decoded glyphs with bounded lookback.
///
/// Only the last `window` entries are retained; the total append count is
/// kept so the stability rule sees the same indices as an unbounded log.
#[derive(Clone, Debug)]
pub struct DebounceHistory {
    window: usize,
    recent: VecDeque<Glyph>,
    appended: u64,
}

impl DebounceHistory {
    pub fn new(window: usize) -> Self {
        let window = window.max(1);
        Self {
            window,
            recent: VecDeque::with_capacity(window),
            appended: 0,
        }
    }

    pub fn append(&mut self, glyph: Glyph) {
        if self.recent.len() == self.window {
            self.recent.pop_front();
        }
        self.recent.push_back(glyph);
        self.appended += 1;
    }

    /// Total glyphs appended this session.
    pub fn len(&self) -> u64 {
        self.appended
    }

    pub fn is_empty(&self) -> bool {
        self.appended == 0
    }

    pub fn latest(&self) -> Option<&Glyph> {
        self.recent.back()
    }

    /// Entry `k` places before the latest one (`0` is the latest).
    pub fn back(&self, k: usize) -> Option<&Glyph> {
        let len = self.recent.len();
        if k >= len {
            return None;
        }
        self.recent.get(len - 1 - k)
    }

    /// True when the latest entry matches enough of its predecessors.
    ///
    /// With `n` the index of the latest entry, `m = min(n, window)` and
    /// entries `n-1 ..= n-(m-1)` are compared. The upper bound is
    /// exclusive, so only `window` entries in total ever take part and two
    /// entries are enough on a fresh history.
    pub fn is_stable(&self) -> bool {
        if self.appended < 2 {
            return false;
        }
        let n = self.appended - 1;
        let m = n.min(self.window as u64) as usize;
        let Some(latest) = self.latest() else {
            return false;
        };
        (1..m).all(|k| self.back(k).is_some_and(|prev| prev == latest))
    }
}

impl Default for DebounceHistory {
    fn default() -> Self {
        Self::new(STABLE_WINDOW)
    }
}
