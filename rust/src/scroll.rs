//! Keeps the message the viewer is looking at fixed while older history is
//! prepended above it.

/// Viewport geometry reported by the host, in its own units (px / points).
#[derive(uniffi::Record, Clone, Copy, Debug, PartialEq, serde::Serialize)]
pub struct ViewportMetrics {
    pub offset: f64,
    pub content_extent: f64,
}

/// Geometry captured right before a prepend fetch started.
#[derive(uniffi::Record, Clone, Copy, Debug, PartialEq, serde::Serialize)]
pub struct ScrollAnchor {
    pub previous_offset: f64,
    pub previous_extent: f64,
}

impl ScrollAnchor {
    /// Offset that keeps the anchor still once the content grew to
    /// `new_extent`: the old offset plus exactly the growth.
    pub fn restored_offset(&self, new_extent: f64) -> f64 {
        (self.previous_offset + (new_extent - self.previous_extent)).max(0.0)
    }
}

#[derive(Debug)]
pub struct ScrollController {
    threshold: f64,
    pending: Option<ScrollAnchor>,
}

impl ScrollController {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            pending: None,
        }
    }

    /// Near the top, more history exists, and no prepend is already running.
    pub fn should_load_older(
        &self,
        viewport: ViewportMetrics,
        has_more: bool,
        prepend_in_flight: bool,
    ) -> bool {
        viewport.offset < self.threshold && has_more && !prepend_in_flight && self.pending.is_none()
    }

    pub fn capture_anchor(&mut self, viewport: ViewportMetrics) -> ScrollAnchor {
        let anchor = ScrollAnchor {
            previous_offset: viewport.offset,
            previous_extent: viewport.content_extent,
        };
        self.pending = Some(anchor);
        anchor
    }

    pub fn pending(&self) -> Option<ScrollAnchor> {
        self.pending
    }

    /// The host applied the restored offset (or nothing was prepended).
    pub fn complete(&mut self) -> Option<ScrollAnchor> {
        self.pending.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(offset: f64) -> ViewportMetrics {
        ViewportMetrics {
            offset,
            content_extent: 800.0,
        }
    }

    #[test]
    fn triggers_only_at_top_with_history_and_idle() {
        let mut c = ScrollController::new(1.0);
        assert!(c.should_load_older(at(0.0), true, false));
        assert!(c.should_load_older(at(0.5), true, false));
        assert!(!c.should_load_older(at(1.0), true, false));
        assert!(!c.should_load_older(at(0.0), false, false));
        assert!(!c.should_load_older(at(0.0), true, true));

        c.capture_anchor(at(0.0));
        assert!(!c.should_load_older(at(0.0), true, false));
        c.complete();
        assert!(c.should_load_older(at(0.0), true, false));
    }

    #[test]
    fn restore_adds_exactly_the_growth() {
        let mut c = ScrollController::new(1.0);
        let anchor = c.capture_anchor(ViewportMetrics {
            offset: 0.0,
            content_extent: 800.0,
        });
        assert_eq!(anchor.restored_offset(1400.0), 600.0);

        let anchor = ScrollAnchor {
            previous_offset: 12.0,
            previous_extent: 800.0,
        };
        assert_eq!(anchor.restored_offset(1000.0), 212.0);
        assert_eq!(anchor.restored_offset(700.0), 0.0);
    }
}
