//! Viewport height tracking for touch platforms
//!
//! On-screen keyboards resize the viewport while they slide in and out.
//! Structural edits issued during that window are held back until the
//! height has been stable for a while.

/// Default window after a significant height change during which the
/// viewport counts as settling
pub const DEFAULT_SETTLE_WINDOW_MS: u64 = 300;

/// Default height change, in pixels, that counts as significant
pub const DEFAULT_HEIGHT_THRESHOLD: f32 = 100.0;

#[derive(Debug, Clone)]
pub struct ViewportMonitor {
    last_height: Option<f32>,
    last_change_ms: Option<u64>,
    settle_window_ms: u64,
    threshold: f32,
}

impl ViewportMonitor {
    pub fn new(settle_window_ms: u64, threshold: f32) -> Self {
        Self {
            last_height: None,
            last_change_ms: None,
            settle_window_ms,
            threshold,
        }
    }

    /// Record a viewport height. Returns true if the change was significant.
    pub fn record(&mut self, height: f32, now_ms: u64) -> bool {
        let significant = self
            .last_height
            .map(|last| (height - last).abs() >= self.threshold)
            .unwrap_or(false);
        self.last_height = Some(height);
        if significant {
            self.last_change_ms = Some(now_ms);
        }
        significant
    }

    /// Whether a significant change happened within the settle window
    pub fn is_settling(&self, now_ms: u64) -> bool {
        self.last_change_ms
            .map(|changed| now_ms.saturating_sub(changed) < self.settle_window_ms)
            .unwrap_or(false)
    }

    /// When the viewport will count as settled, if it is settling now
    pub fn settles_at(&self, now_ms: u64) -> Option<u64> {
        if !self.is_settling(now_ms) {
            return None;
        }
        self.last_change_ms.map(|changed| changed + self.settle_window_ms)
    }
}

impl Default for ViewportMonitor {
    fn default() -> Self {
        Self::new(DEFAULT_SETTLE_WINDOW_MS, DEFAULT_HEIGHT_THRESHOLD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_changes_do_not_settle() {
        let mut monitor = ViewportMonitor::default();
        assert!(!monitor.record(800.0, 0));
        assert!(!monitor.record(760.0, 10));
        assert!(!monitor.is_settling(10));
    }

    #[test]
    fn test_keyboard_resize_settles_after_window() {
        let mut monitor = ViewportMonitor::new(300, 100.0);
        monitor.record(800.0, 0);
        assert!(monitor.record(450.0, 1000));
        assert!(monitor.is_settling(1200));
        assert_eq!(monitor.settles_at(1200), Some(1300));
        assert!(!monitor.is_settling(1300));
        assert_eq!(monitor.settles_at(1300), None);
    }
}
