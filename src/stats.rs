//! Read-only statistics and filtering over a history snapshot.

use chrono::NaiveDate;
use serde::Serialize;

use crate::types::{DrawRecord, Zone};

/// Number of recent draws in the front-sum trend.
pub const SUM_TREND_WINDOW: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NumberCount {
    pub number: u8,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SumPoint {
    pub id: String,
    pub date: NaiveDate,
    pub sum: u32,
}

/// Everything the stats view shows, computed in one pass per section.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryStats {
    pub draws: usize,
    pub front: Vec<NumberCount>,
    pub back: Vec<NumberCount>,
    pub sum_trend: Vec<SumPoint>,
    pub mean_front_sum: Option<f64>,
    pub years: Vec<i32>,
}

impl HistoryStats {
    pub fn compute(history: &[DrawRecord]) -> Self {
        Self {
            draws: history.len(),
            front: front_frequency(history),
            back: back_frequency(history),
            sum_trend: sum_trend(history, SUM_TREND_WINDOW),
            mean_front_sum: mean_front_sum(history),
            years: years(history),
        }
    }
}

/// Count every number of a zone, including those never drawn.
/// Sorted by count descending, then number ascending.
pub fn frequency(history: &[DrawRecord], zone: Zone) -> Vec<NumberCount> {
    let mut counts = vec![0usize; zone.max() as usize + 1];
    for draw in history {
        for &n in draw.numbers(zone) {
            counts[n as usize] += 1;
        }
    }

    let mut out: Vec<NumberCount> = (1..=zone.max())
        .map(|number| NumberCount { number, count: counts[number as usize] })
        .collect();
    out.sort_by(|a, b| b.count.cmp(&a.count).then(a.number.cmp(&b.number)));
    out
}

pub fn front_frequency(history: &[DrawRecord]) -> Vec<NumberCount> {
    frequency(history, Zone::Front)
}

pub fn back_frequency(history: &[DrawRecord]) -> Vec<NumberCount> {
    frequency(history, Zone::Back)
}

/// Front sums of the `n` most recent draws, oldest first.
pub fn sum_trend(history: &[DrawRecord], n: usize) -> Vec<SumPoint> {
    history
        .iter()
        .take(n)
        .rev()
        .map(|d| SumPoint { id: d.id().to_string(), date: d.date(), sum: d.front_sum() })
        .collect()
}

pub fn mean_front_sum(history: &[DrawRecord]) -> Option<f64> {
    if history.is_empty() {
        return None;
    }
    let total: u64 = history.iter().map(|d| u64::from(d.front_sum())).sum();
    Some(total as f64 / history.len() as f64)
}

/// Filter by year and a free-text query matched against id and date.
/// A year of `None`, blank or `"All"` disables the year filter.
pub fn filter_history<'a>(
    history: &'a [DrawRecord],
    year: Option<&str>,
    query: Option<&str>,
) -> Vec<&'a DrawRecord> {
    let year = year.map(str::trim).filter(|y| !y.is_empty() && !y.eq_ignore_ascii_case("all"));
    let query = query.map(str::trim).filter(|q| !q.is_empty());

    history
        .iter()
        .filter(|d| {
            let date = d.date_string();
            let year_ok = year.map_or(true, |y| date.starts_with(y));
            let query_ok = query.map_or(true, |q| date.contains(q) || d.id().contains(q));
            year_ok && query_ok
        })
        .collect()
}

/// Distinct draw years, newest first.
pub fn years(history: &[DrawRecord]) -> Vec<i32> {
    let mut years: Vec<i32> = history.iter().map(|d| d.year()).collect();
    years.sort_unstable_by(|a, b| b.cmp(a));
    years.dedup();
    years
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::seed::seed_draws;
    use crate::types::draw;

    fn history() -> Vec<DrawRecord> {
        vec![
            draw("24002", "2024-01-03", [1, 2, 3, 4, 5], [1, 2]),
            draw("24001", "2024-01-01", [1, 2, 3, 4, 6], [1, 3]),
            draw("23150", "2023-12-30", [1, 10, 20, 30, 35], [12, 2]),
        ]
    }

    #[test]
    fn test_front_frequency_order() {
        let freq = front_frequency(&history());
        assert_eq!(freq.len(), 35);
        assert_eq!(freq[0], NumberCount { number: 1, count: 3 });
        assert_eq!(freq[1], NumberCount { number: 2, count: 2 });
        // Ties broken by number.
        let zeros: Vec<u8> = freq.iter().filter(|c| c.count == 0).map(|c| c.number).take(3).collect();
        assert_eq!(zeros, vec![7, 8, 9]);
    }

    #[test]
    fn test_frequency_totals() {
        let h = seed_draws();
        assert_eq!(front_frequency(&h).iter().map(|c| c.count).sum::<usize>(), 5 * h.len());
        assert_eq!(back_frequency(&h).iter().map(|c| c.count).sum::<usize>(), 2 * h.len());
        assert_eq!(back_frequency(&h).len(), 12);
    }

    #[test]
    fn test_sum_trend_is_chronological() {
        let trend = sum_trend(&history(), 2);
        let ids: Vec<&str> = trend.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["24001", "24002"]);
        assert_eq!(trend[1].sum, 15);
        assert_eq!(sum_trend(&history(), 100).len(), 3);
    }

    #[test]
    fn test_mean_front_sum() {
        assert_eq!(mean_front_sum(&[]), None);
        let mean = mean_front_sum(&history()).unwrap();
        assert!((mean - (15.0 + 16.0 + 96.0) / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_filter_by_year() {
        let h = history();
        assert_eq!(filter_history(&h, Some("2024"), None).len(), 2);
        assert_eq!(filter_history(&h, Some("All"), None).len(), 3);
        assert_eq!(filter_history(&h, None, None).len(), 3);
        assert!(filter_history(&h, Some("2019"), None).is_empty());
    }

    #[test]
    fn test_filter_by_query() {
        let h = history();
        let hits = filter_history(&h, None, Some("12-30"));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id(), "23150");
        assert_eq!(filter_history(&h, Some("2024"), Some("2400")).len(), 2);
        assert_eq!(filter_history(&h, Some("2023"), Some("24001")).len(), 0);
    }

    #[test]
    fn test_years_newest_first() {
        assert_eq!(years(&history()), vec![2024, 2023]);
        assert!(years(&[]).is_empty());
    }

    #[test]
    fn test_compute() {
        let stats = HistoryStats::compute(&history());
        assert_eq!(stats.draws, 3);
        assert_eq!(stats.sum_trend.len(), 3);
        assert_eq!(stats.years, vec![2024, 2023]);
    }
}
