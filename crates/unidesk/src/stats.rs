//! Event-type breakdown for the month, drawn as a CSS `conic-gradient` pie.

use serde::Serialize;

use crate::types::{CalendarEvent, EventType};

/// Fill used when there is nothing to chart
const EMPTY_PIE_COLOR: &str = "#e5e7eb";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypeShare {
    pub event_type: EventType,
    pub count: usize,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypeBreakdown {
    pub total: usize,
    pub shares: Vec<TypeShare>,
}

pub fn percentage_to_degrees(percentage: f64) -> f64 {
    percentage * 3.6
}

impl TypeBreakdown {
    /// Count events per type, in `EventType::ALL` order, leaving out types with no events
    pub fn from_events(events: &[CalendarEvent]) -> Self {
        let total = events.len();
        let shares = EventType::ALL
            .into_iter()
            .filter_map(|event_type| {
                let count = events.iter().filter(|e| e.event_type == event_type).count();
                (count > 0).then(|| TypeShare {
                    event_type,
                    count,
                    percentage: count as f64 * 100.0 / total as f64,
                })
            })
            .collect();

        Self { total, shares }
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// CSS background for the pie. Stops are cumulative and the last one closes at 360deg.
    pub fn conic_gradient(&self) -> String {
        if self.shares.is_empty() {
            return format!("conic-gradient({EMPTY_PIE_COLOR} 0deg 360deg)");
        }

        let mut start = 0.0;
        let last = self.shares.len() - 1;
        let stops: Vec<String> = self
            .shares
            .iter()
            .enumerate()
            .map(|(idx, share)| {
                let end = if idx == last {
                    360.0
                } else {
                    start + percentage_to_degrees(share.percentage)
                };
                let stop = format!("{} {:.1}deg {:.1}deg", share.event_type.color(), start, end);
                start = end;
                stop
            })
            .collect();

        format!("conic-gradient({})", stops.join(", "))
    }
}
