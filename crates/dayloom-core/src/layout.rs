use std::cmp::Ordering;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, trace};

use crate::clock::{MINUTES_PER_DAY, parse_clock_time};
use crate::dates::add_days;
use crate::task::Occurrence;

/// Grid scale and default durations used when placing blocks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayoutConfig {
    pub pixels_per_minute: f64,
    /// Floor for block height, in minutes of grid time.
    pub min_block_minutes: u32,
    /// Height of one all-day bar.
    pub all_day_bar_px: f64,
    /// Duration given to a task that only has a single time.
    pub instant_minutes: u32,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            pixels_per_minute: 1.0,
            min_block_minutes: 15,
            all_day_bar_px: 24.0,
            instant_minutes: 30,
        }
    }
}

impl LayoutConfig {
    pub fn min_block_px(&self) -> f64 {
        f64::from(self.min_block_minutes) * self.pixels_per_minute
    }
}

/// Which part of an occurrence a block shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Segment {
    Whole,
    /// `start..24:00` on the occurrence's own date.
    FirstHalf,
    /// `00:00..end` on the following date.
    SecondHalf,
}

impl Segment {
    pub fn suffix(&self) -> &'static str {
        match self {
            Segment::Whole => "",
            Segment::FirstHalf => " (1/2)",
            Segment::SecondHalf => " (2/2)",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeBlock {
    pub occurrence_id: String,
    pub label: String,
    pub segment: Segment,
    pub start_minute: u32,
    pub end_minute: u32,
    pub top_px: f64,
    pub height_px: f64,
    pub is_all_day: bool,
    pub is_cross_day: bool,
    pub is_no_task: bool,
    pub is_overlap: bool,
}

impl TimeBlock {
    fn timed(
        occurrence: &Occurrence,
        segment: Segment,
        start_minute: u32,
        end_minute: u32,
        config: &LayoutConfig,
    ) -> Self {
        let ppm = config.pixels_per_minute;
        let span = f64::from(end_minute.saturating_sub(start_minute)) * ppm;
        Self {
            occurrence_id: occurrence.id.clone(),
            label: format!("{}{}", occurrence.title, segment.suffix()),
            segment,
            start_minute,
            end_minute,
            top_px: f64::from(start_minute) * ppm,
            height_px: span.max(config.min_block_px()),
            is_all_day: false,
            is_cross_day: segment != Segment::Whole,
            is_no_task: occurrence.no_task,
            is_overlap: false,
        }
    }

    fn all_day(occurrence: &Occurrence, slot: usize, config: &LayoutConfig) -> Self {
        Self {
            occurrence_id: occurrence.id.clone(),
            label: occurrence.title.clone(),
            segment: Segment::Whole,
            start_minute: 0,
            end_minute: 0,
            top_px: slot as f64 * config.all_day_bar_px,
            height_px: config.all_day_bar_px,
            is_all_day: true,
            is_cross_day: false,
            is_no_task: occurrence.no_task,
            is_overlap: false,
        }
    }

    pub fn bottom_px(&self) -> f64 {
        self.top_px + self.height_px
    }

    /// Half-open pixel interval intersection.
    pub fn intersects(&self, other: &TimeBlock) -> bool {
        self.top_px < other.bottom_px() && self.bottom_px() > other.top_px
    }

    /// Grid minutes covered, ignoring the height floor.
    pub fn covered_minutes(&self) -> u32 {
        self.end_minute.saturating_sub(self.start_minute)
    }
}

/// Lays out the blocks visible on `day`.
///
/// `occurrences` must include the previous day's occurrences so trailing
/// halves of cross-midnight intervals can be found. All-day bars come first;
/// they have no duration, so "longest last" degenerates to a tie and ties
/// are broken by title. Timed blocks follow, ordered by top offset and then
/// height (longest last), overlap-tagged.
#[tracing::instrument(skip(occurrences, config), fields(day = %day, candidates = occurrences.len()))]
pub fn layout_day(occurrences: &[Occurrence], day: NaiveDate, config: &LayoutConfig) -> Vec<TimeBlock> {
    let previous = add_days(day, -1);

    let mut all_day: Vec<&Occurrence> = occurrences
        .iter()
        .filter(|occ| occ.due_date == day && occ.is_all_day())
        .collect();
    all_day.sort_by(|a, b| a.title.cmp(&b.title));

    let mut timed = Vec::new();
    for occurrence in occurrences {
        if occurrence.due_date == day && !occurrence.is_all_day() {
            timed.extend(place_on_own_day(occurrence, config));
        } else if occurrence.due_date == previous {
            timed.extend(place_trailing_half(occurrence, config));
        }
    }

    timed.sort_by(compare_placement);
    tag_overlaps(&mut timed);

    let mut blocks: Vec<TimeBlock> = all_day
        .into_iter()
        .enumerate()
        .map(|(slot, occ)| TimeBlock::all_day(occ, slot, config))
        .collect();
    blocks.extend(timed);

    debug!(blocks = blocks.len(), "laid out day");
    blocks
}

/// Flags every block that intersects a block earlier in the slice.
///
/// Order-dependent: the earlier of two colliding blocks stays unflagged.
pub fn tag_overlaps(blocks: &mut [TimeBlock]) {
    for i in 0..blocks.len() {
        let (placed, rest) = blocks.split_at_mut(i);
        let Some(current) = rest.first_mut() else {
            continue;
        };
        current.is_overlap = placed.iter().any(|earlier| current.intersects(earlier));
    }
}

fn compare_placement(a: &TimeBlock, b: &TimeBlock) -> Ordering {
    a.top_px
        .total_cmp(&b.top_px)
        .then_with(|| a.height_px.total_cmp(&b.height_px))
}

fn place_on_own_day(occurrence: &Occurrence, config: &LayoutConfig) -> Option<TimeBlock> {
    if let (Some(start), Some(end)) = (&occurrence.start_time, &occurrence.end_time) {
        let (Some(start), Some(end)) = (
            parse_clock_time(start).minutes(),
            parse_clock_time(end).minutes(),
        ) else {
            trace!(occurrence = %occurrence.id, "unparseable interval; not placed");
            return None;
        };

        return Some(if end <= start {
            TimeBlock::timed(occurrence, Segment::FirstHalf, start, MINUTES_PER_DAY, config)
        } else {
            TimeBlock::timed(occurrence, Segment::Whole, start, end, config)
        });
    }

    let single = occurrence
        .due_time
        .as_deref()
        .or(occurrence.start_time.as_deref())
        .or(occurrence.end_time.as_deref())?;
    let Some(start) = parse_clock_time(single).minutes() else {
        trace!(occurrence = %occurrence.id, time = %single, "unparseable time; not placed");
        return None;
    };
    let end = start
        .saturating_add(config.instant_minutes)
        .min(MINUTES_PER_DAY);
    Some(TimeBlock::timed(occurrence, Segment::Whole, start, end, config))
}

fn place_trailing_half(occurrence: &Occurrence, config: &LayoutConfig) -> Option<TimeBlock> {
    if !occurrence.is_cross_midnight() {
        return None;
    }
    let end = parse_clock_time(occurrence.end_time.as_deref()?).minutes()?;
    if end == 0 {
        return None;
    }
    Some(TimeBlock::timed(occurrence, Segment::SecondHalf, 0, end, config))
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::task::Task;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn occurrence(id: &str, date: NaiveDate, start: Option<&str>, end: Option<&str>) -> Occurrence {
        let mut task = Task::new(id, id.to_uppercase());
        task.start_time = start.map(str::to_string);
        task.end_time = end.map(str::to_string);
        Occurrence::from_task(&task, date)
    }

    #[test]
    fn places_interval_with_scale() {
        let day = ymd(2024, 4, 1);
        let config = LayoutConfig {
            pixels_per_minute: 2.0,
            ..LayoutConfig::default()
        };
        let blocks = layout_day(&[occurrence("a", day, Some("09:00"), Some("10:30"))], day, &config);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].top_px, 1080.0);
        assert_eq!(blocks[0].height_px, 180.0);
        assert!(!blocks[0].is_overlap);
    }

    #[test]
    fn short_blocks_get_minimum_height() {
        let day = ymd(2024, 4, 1);
        let blocks = layout_day(
            &[occurrence("a", day, Some("09:00"), Some("09:05"))],
            day,
            &LayoutConfig::default(),
        );
        assert_eq!(blocks[0].height_px, 15.0);
        assert_eq!(blocks[0].covered_minutes(), 5);
    }

    #[test]
    fn instant_gets_default_duration() {
        let day = ymd(2024, 4, 1);
        let mut task = Task::new("d", "Deadline");
        task.due_time = Some("5:00 PM".to_string());
        let blocks = layout_day(&[Occurrence::from_task(&task, day)], day, &LayoutConfig::default());
        assert_eq!(blocks[0].start_minute, 17 * 60);
        assert_eq!(blocks[0].end_minute, 17 * 60 + 30);
    }

    #[test]
    fn instant_near_midnight_is_clamped() {
        let day = ymd(2024, 4, 1);
        let mut task = Task::new("d", "Late");
        task.due_time = Some("23:50".to_string());
        let blocks = layout_day(&[Occurrence::from_task(&task, day)], day, &LayoutConfig::default());
        assert_eq!(blocks[0].end_minute, MINUTES_PER_DAY);
    }

    #[test]
    fn oversized_instant_duration_saturates() {
        let day = ymd(2024, 4, 1);
        let config = LayoutConfig {
            instant_minutes: u32::MAX,
            min_block_minutes: u32::MAX,
            ..LayoutConfig::default()
        };
        let mut task = Task::new("d", "Deadline");
        task.due_time = Some("10:00".to_string());
        let blocks = layout_day(&[Occurrence::from_task(&task, day)], day, &config);
        assert_eq!(blocks[0].start_minute, 600);
        assert_eq!(blocks[0].end_minute, MINUTES_PER_DAY);
        assert!(blocks[0].height_px.is_finite());
    }

    #[test]
    fn unparseable_times_are_skipped() {
        let day = ymd(2024, 4, 1);
        let blocks = layout_day(
            &[
                occurrence("a", day, Some("soon"), Some("10:00")),
                occurrence("b", day, Some("09:00"), Some("10:00")),
            ],
            day,
            &LayoutConfig::default(),
        );
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].occurrence_id, "b");
    }

    #[test]
    fn all_day_bars_stack_before_timed_blocks() {
        let day = ymd(2024, 4, 1);
        let blocks = layout_day(
            &[
                occurrence("t", day, Some("00:00"), Some("01:00")),
                occurrence("b", day, None, None),
                occurrence("a", day, None, None),
            ],
            day,
            &LayoutConfig::default(),
        );
        let ids: Vec<_> = blocks.iter().map(|b| b.occurrence_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "t"]);
        assert!(blocks[0].is_all_day && blocks[1].is_all_day);
        assert_eq!(blocks[1].top_px, 24.0);
        assert!(!blocks[2].is_overlap);
    }

    #[test]
    fn cross_midnight_splits_across_days() {
        let day = ymd(2024, 4, 6);
        let next = ymd(2024, 4, 7);
        let occurrences = vec![occurrence("n", day, Some("22:00"), Some("01:00"))];
        let config = LayoutConfig::default();

        let first = layout_day(&occurrences, day, &config);
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].segment, Segment::FirstHalf);
        assert_eq!(first[0].label, "N (1/2)");
        assert_eq!((first[0].start_minute, first[0].end_minute), (22 * 60, MINUTES_PER_DAY));
        assert!(first[0].is_cross_day);

        // Sunday gets Saturday's tail like any other day.
        let second = layout_day(&occurrences, next, &config);
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].segment, Segment::SecondHalf);
        assert_eq!((second[0].start_minute, second[0].end_minute), (0, 60));
    }

    #[test]
    fn ending_at_midnight_has_no_trailing_half() {
        let day = ymd(2024, 4, 1);
        let occurrences = vec![occurrence("n", day, Some("23:00"), Some("00:00"))];
        assert!(layout_day(&occurrences, ymd(2024, 4, 2), &LayoutConfig::default()).is_empty());
    }

    #[test]
    fn ties_put_shorter_block_first() {
        let day = ymd(2024, 4, 1);
        let blocks = layout_day(
            &[
                occurrence("long", day, Some("09:00"), Some("11:00")),
                occurrence("short", day, Some("09:00"), Some("09:30")),
            ],
            day,
            &LayoutConfig::default(),
        );
        assert_eq!(blocks[0].occurrence_id, "short");
        assert!(!blocks[0].is_overlap);
        assert!(blocks[1].is_overlap);
    }

    #[test]
    fn adjacent_blocks_do_not_overlap() {
        let day = ymd(2024, 4, 1);
        let blocks = layout_day(
            &[
                occurrence("a", day, Some("09:00"), Some("10:00")),
                occurrence("b", day, Some("10:00"), Some("11:00")),
            ],
            day,
            &LayoutConfig::default(),
        );
        assert!(blocks.iter().all(|b| !b.is_overlap));
    }

    #[test]
    fn no_task_flag_is_carried() {
        let day = ymd(2024, 4, 1);
        let mut task = Task::new("blocked", "Blocked");
        task.start_time = Some("12:00".to_string());
        task.end_time = Some("13:00".to_string());
        task.no_task = true;
        let blocks = layout_day(&[Occurrence::from_task(&task, day)], day, &LayoutConfig::default());
        assert!(blocks[0].is_no_task);
    }
}
