use serde::Serialize;

use crate::database::DayHourAggregate;
use crate::utils::hour_label;

/// Display order is Monday first.
pub const DAY_LABELS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];
pub const BUCKET_COUNT: usize = 7 * 24;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeatmapCell {
    /// 0 = Monday ... 6 = Sunday.
    pub day: u32,
    pub day_label: &'static str,
    pub hour: u32,
    pub hour_label: String,
    pub avg_wait: Option<i64>,
    pub count: i64,
}

/// Storage day (0 = Sunday) to display day (0 = Monday).
pub fn display_day(storage_day: i64) -> Option<u32> {
    match storage_day {
        0..=6 => Some(((storage_day + 6) % 7) as u32),
        _ => None,
    }
}

/// Expand the sparse stored aggregate into the full 7×24 grid, Monday first,
/// hours ascending within each day.
pub fn build_heatmap(aggregates: &[DayHourAggregate]) -> Vec<HeatmapCell> {
    let mut grid: Vec<HeatmapCell> = (0..7u32)
        .flat_map(|day| {
            (0..24u32).map(move |hour| HeatmapCell {
                day,
                day_label: DAY_LABELS[day as usize],
                hour,
                hour_label: hour_label(hour),
                avg_wait: None,
                count: 0,
            })
        })
        .collect();

    for aggregate in aggregates {
        let Some(day) = display_day(aggregate.day_of_week) else {
            tracing::warn!("Skipping aggregate with invalid day {}", aggregate.day_of_week);
            continue;
        };
        if !(0..24).contains(&aggregate.hour) {
            tracing::warn!("Skipping aggregate with invalid hour {}", aggregate.hour);
            continue;
        }
        let cell = &mut grid[day as usize * 24 + aggregate.hour as usize];
        cell.avg_wait = Some(aggregate.mean);
        cell.count = aggregate.count;
    }

    debug_assert_eq!(grid.len(), BUCKET_COUNT);
    grid
}
