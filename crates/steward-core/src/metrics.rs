//! Engine counters and their text exposition format.

use serde::{Deserialize, Serialize};

/// Point-in-time engine counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineMetrics {
    /// Total runs recorded.
    pub runs_total: usize,
    /// Total proposals recorded.
    pub proposals_total: usize,
    /// Total snapshots recorded.
    pub snapshots_total: usize,
    /// Drafts currently queued for publish.
    pub publish_queue_total: usize,
    /// Drafts published.
    pub published_total: usize,
}

impl EngineMetrics {
    /// Renders the counters in Prometheus text exposition format.
    #[must_use]
    pub fn render(&self) -> String {
        let gauges = [
            ("steward_runs_total", "Total runs recorded", self.runs_total),
            (
                "steward_proposals_total",
                "Total proposals recorded",
                self.proposals_total,
            ),
            (
                "steward_snapshots_total",
                "Total snapshots recorded",
                self.snapshots_total,
            ),
            (
                "steward_publish_queue_total",
                "Total drafts queued for publish",
                self.publish_queue_total,
            ),
            (
                "steward_published_total",
                "Total drafts published",
                self.published_total,
            ),
        ];

        let mut lines = Vec::with_capacity(gauges.len() * 3 + 1);
        for (name, help, value) in gauges {
            lines.push(format!("# HELP {name} {help}"));
            lines.push(format!("# TYPE {name} gauge"));
            lines.push(format!("{name} {value}"));
        }
        lines.push(String::new());
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_contains_every_gauge() {
        let metrics = EngineMetrics {
            runs_total: 2,
            proposals_total: 5,
            snapshots_total: 1,
            publish_queue_total: 3,
            published_total: 4,
        };
        let text = metrics.render();
        assert!(text.contains("# HELP steward_runs_total Total runs recorded"));
        assert!(text.contains("# TYPE steward_runs_total gauge"));
        assert!(text.contains("steward_runs_total 2"));
        assert!(text.contains("steward_proposals_total 5"));
        assert!(text.contains("steward_snapshots_total 1"));
        assert!(text.contains("steward_publish_queue_total 3"));
        assert!(text.contains("steward_published_total 4"));
        assert!(text.ends_with('\n'));
    }
}
