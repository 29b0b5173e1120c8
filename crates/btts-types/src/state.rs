//! Account-wide update cursor.

use serde::{Deserialize, Serialize};

/// Singleton `{pts, qts, date, seq}` the gap reconciler resumes from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdatesState {
    pub pts: i64,
    pub qts: i64,
    /// Unix seconds
    pub date: i64,
    pub seq: i64,
}

impl UpdatesState {
    pub fn new(pts: i64, qts: i64, date: i64, seq: i64) -> Self {
        Self {
            pts,
            qts,
            date,
            seq,
        }
    }

    /// True before the first successful fetch of the current state.
    pub fn is_zero(&self) -> bool {
        self.pts == 0 && self.qts == 0 && self.date == 0 && self.seq == 0
    }

    /// Advance pts monotonically. Returns true if it moved.
    pub fn advance_pts(&mut self, pts: i64) -> bool {
        if pts > self.pts {
            self.pts = pts;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_zero() {
        assert!(UpdatesState::default().is_zero());
        assert!(!UpdatesState::new(0, 0, 1000, 0).is_zero());
    }

    #[test]
    fn test_advance_pts_is_monotonic() {
        let mut state = UpdatesState::new(10, 0, 0, 0);
        assert!(state.advance_pts(12));
        assert!(!state.advance_pts(11));
        assert_eq!(state.pts, 12);
    }
}
