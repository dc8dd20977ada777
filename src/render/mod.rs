use crate::config::{EdgeTier, RenderConfig};
use crate::dates::{initial_range, scroll_range, week_ranges, ScrollDirection, WeekStart};
use crate::model::{DateEntry, DateRange, PlanDate};
use crate::sync::SyncController;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollEdge {
    Top,
    Bottom,
}

impl ScrollEdge {
    pub fn direction(self) -> ScrollDirection {
        match self {
            Self::Top => ScrollDirection::Up,
            Self::Bottom => ScrollDirection::Down,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RenderRange {
    range: DateRange,
    week_start: WeekStart,
    initial_weeks: u32,
    weeks_before_today: u32,
    optimum_days: i64,
    tiers: Vec<EdgeTier>,
}

impl RenderRange {
    pub fn new(today: PlanDate, config: &RenderConfig) -> Self {
        let mut tiers = config.edge_tiers.clone();
        tiers.sort_by(|a, b| a.within_px.total_cmp(&b.within_px));
        Self {
            range: initial_range(
                today,
                config.week_start,
                config.weeks_before_today,
                config.initial_weeks,
            ),
            week_start: config.week_start,
            initial_weeks: config.initial_weeks,
            weeks_before_today: config.weeks_before_today,
            optimum_days: config.optimum_days(),
            tiers,
        }
    }

    pub fn range(&self) -> DateRange {
        self.range
    }

    pub fn week_start(&self) -> WeekStart {
        self.week_start
    }

    pub fn initial_weeks(&self) -> u32 {
        self.initial_weeks
    }

    pub fn weeks_before_today(&self) -> u32 {
        self.weeks_before_today
    }

    pub fn set(&mut self, range: DateRange) -> DateRange {
        let weeks = week_ranges(range, self.week_start);
        if let (Some(first), Some(last)) = (weeks.first(), weeks.last()) {
            self.range = DateRange::new(first.start, last.end);
        }
        self.range
    }

    /// Weeks per step for a viewport `distance_px` away from an edge, if close enough.
    pub fn step_for(&self, distance_px: f64) -> Option<u32> {
        self.tiers
            .iter()
            .find(|tier| distance_px < tier.within_px)
            .map(|tier| tier.weeks)
    }

    pub fn on_edge(&mut self, edge: ScrollEdge, distance_px: f64) -> Option<DateRange> {
        let weeks = self.step_for(distance_px)?;
        Some(self.scroll(edge.direction(), weeks))
    }

    pub fn scroll(&mut self, direction: ScrollDirection, weeks: u32) -> DateRange {
        self.range = scroll_range(self.range, direction, weeks, self.optimum_days);
        self.range
    }

    pub fn jump_to_today(&mut self, today: PlanDate) -> DateRange {
        self.range = initial_range(
            today,
            self.week_start,
            self.weeks_before_today,
            self.initial_weeks,
        );
        self.range
    }

    pub fn materialize(&self, cache: &SyncController) -> Vec<DateEntry> {
        self.range
            .days()
            .map(|date| {
                cache
                    .entry(date)
                    .cloned()
                    .unwrap_or_else(|| DateEntry::empty(date))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> PlanDate {
        PlanDate::from_ymd(2024, 5, 15).unwrap()
    }

    #[test]
    fn closer_edges_scroll_faster() {
        let render = RenderRange::new(today(), &RenderConfig::default());
        assert_eq!(render.step_for(10.0), Some(3));
        assert_eq!(render.step_for(65.0), Some(2));
        assert_eq!(render.step_for(69.0), Some(1));
        assert_eq!(render.step_for(200.0), None);
    }

    #[test]
    fn edges_extend_in_both_directions() {
        let mut render = RenderRange::new(today(), &RenderConfig::default());
        let initial = render.range();
        let up = render.on_edge(ScrollEdge::Top, 0.0).unwrap();
        assert_eq!(up.start, initial.start.add_days(-21));
        assert!(render.on_edge(ScrollEdge::Bottom, 500.0).is_none());
        let down = render.on_edge(ScrollEdge::Bottom, 68.0).unwrap();
        assert!(down.end > up.end);
    }

    #[test]
    fn jump_recenters_on_today() {
        let mut render = RenderRange::new(today(), &RenderConfig::default());
        let initial = render.range();
        for _ in 0..20 {
            render.on_edge(ScrollEdge::Bottom, 0.0);
        }
        assert!(!render.range().contains(today()));
        assert_eq!(render.jump_to_today(today()), initial);
    }

    #[test]
    fn set_widens_to_weeks() {
        let mut render = RenderRange::new(today(), &RenderConfig::default());
        let range = render.set(DateRange::new(
            PlanDate::from_ymd(2024, 5, 15).unwrap(),
            PlanDate::from_ymd(2024, 5, 16).unwrap(),
        ));
        assert_eq!(range.start, PlanDate::from_ymd(2024, 5, 13).unwrap());
        assert_eq!(range.len_days(), 7);
    }
}
