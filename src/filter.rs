use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use rayon::prelude::*;
use tracing::{trace, warn};

use crate::record::{Record, value_to_string};

/// Indices into the base record sequence, in base order.
///
/// Wrapped in an `Arc` so a no-op filter can hand back the very same row set
/// and views can share it with the table engine without copying.
pub type Rows = Arc<Vec<usize>>;

// Below this size the rayon fan-out costs more than the scan itself.
const PARALLEL_SEARCH_THRESHOLD: usize = 2048;

pub fn all_rows(records: &[Record]) -> Rows {
    Arc::new((0..records.len()).collect())
}

/// Inclusive calendar-day range. `None` leaves that side unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        DateRange { start, end }
    }

    pub fn unbounded() -> Self {
        DateRange::default()
    }

    /// Builds a range from user typed bounds. A bound that does not parse
    /// is treated as empty.
    pub fn parse(start: &str, end: &str) -> Self {
        DateRange {
            start: Self::parse_bound(start),
            end: Self::parse_bound(end),
        }
    }

    pub fn parse_bound(raw: &str) -> Option<NaiveDate> {
        if raw.trim().is_empty() {
            return None;
        }
        let day = parse_day(raw);
        if day.is_none() {
            warn!("Ignoring malformed date bound {raw:?}");
        }
        day
    }

    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    pub fn contains(&self, day: NaiveDate) -> bool {
        self.start.is_none_or(|start| day >= start) && self.end.is_none_or(|end| day <= end)
    }
}

/// Truncates a date or timestamp string to its calendar day.
///
/// Accepts `YYYY-MM-DD`, RFC 3339 timestamps and the space separated form
/// postgres uses for `timestamp without time zone`. A zoned timestamp keeps
/// the day as written in its own offset.
pub fn parse_day(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    if let Ok(day) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(day);
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.date_naive());
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f%#z", "%Y-%m-%dT%H:%M:%S%.f%#z"] {
        if let Ok(ts) = DateTime::parse_from_str(s, fmt) {
            return Some(ts.date_naive());
        }
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(ts.date());
        }
    }
    None
}

fn record_matches_term(record: &Record, needle: &str) -> bool {
    record
        .fields()
        .filter_map(|(_, value)| value_to_string(value))
        .any(|text| text.to_lowercase().contains(needle))
}

/// Keeps rows where any direct field contains `term`, ignoring case.
/// Embedded relations are not searched.
pub fn filter_by_text(records: &[Record], rows: &Rows, term: &str) -> Rows {
    if term.is_empty() {
        return Arc::clone(rows);
    }
    let needle = term.to_lowercase();

    let matches: Vec<usize> = if rows.len() >= PARALLEL_SEARCH_THRESHOLD {
        rows.par_iter()
            .copied()
            .filter(|&idx| record_matches_term(&records[idx], &needle))
            .collect()
    } else {
        rows.iter()
            .copied()
            .filter(|&idx| record_matches_term(&records[idx], &needle))
            .collect()
    };
    trace!("Text filter {term:?}: {} of {} rows", matches.len(), rows.len());
    Arc::new(matches)
}

/// Keeps rows whose `field` falls inside `range`, compared by calendar day.
///
/// An unbounded range keeps every row. Once any bound is set, rows with a
/// missing or unparseable date are dropped.
pub fn filter_by_date_range(records: &[Record], rows: &Rows, field: &str, range: &DateRange) -> Rows {
    if range.is_unbounded() {
        return Arc::clone(rows);
    }
    let matches: Vec<usize> = rows
        .iter()
        .copied()
        .filter(|&idx| {
            records[idx]
                .resolve_string(field)
                .and_then(|raw| parse_day(&raw))
                .is_some_and(|day| range.contains(day))
        })
        .collect();
    trace!("Date filter {field} {range:?}: {} of {} rows", matches.len(), rows.len());
    Arc::new(matches)
}

/// Keeps rows whose value at `accessor` equals `expected` exactly.
/// An empty or absent `expected` keeps every row.
pub fn filter_by_equality(records: &[Record], rows: &Rows, accessor: &str, expected: Option<&str>) -> Rows {
    let Some(expected) = expected.filter(|e| !e.is_empty()) else {
        return Arc::clone(rows);
    };
    let matches: Vec<usize> = rows
        .iter()
        .copied()
        .filter(|&idx| records[idx].resolve_string(accessor).as_deref() == Some(expected))
        .collect();
    trace!("Equality filter {accessor}={expected:?}: {} of {} rows", matches.len(), rows.len());
    Arc::new(matches)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EqualitySelector {
    pub accessor: String,
    pub expected: Option<String>,
}

/// Every criterion a view filters by, applied together against the base set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterState {
    pub search_term: String,
    pub date_field: String,
    pub date_range: DateRange,
    pub equality: Vec<EqualitySelector>,
}

impl FilterState {
    pub fn new(date_field: impl Into<String>) -> Self {
        FilterState {
            date_field: date_field.into(),
            ..FilterState::default()
        }
    }

    pub fn with_selector(mut self, accessor: impl Into<String>) -> Self {
        self.equality.push(EqualitySelector {
            accessor: accessor.into(),
            expected: None,
        });
        self
    }

    pub fn set_selector(&mut self, accessor: &str, expected: Option<String>) {
        match self.equality.iter_mut().find(|s| s.accessor == accessor) {
            Some(selector) => selector.expected = expected,
            None => self.equality.push(EqualitySelector {
                accessor: accessor.to_string(),
                expected,
            }),
        }
    }

    pub fn selector(&self, accessor: &str) -> Option<&str> {
        self.equality
            .iter()
            .find(|s| s.accessor == accessor)
            .and_then(|s| s.expected.as_deref())
    }

    /// Clears every criterion but keeps which fields are filtered on.
    pub fn reset(&mut self) {
        self.search_term.clear();
        self.date_range = DateRange::unbounded();
        for selector in self.equality.iter_mut() {
            selector.expected = None;
        }
    }

    pub fn is_active(&self) -> bool {
        !self.search_term.is_empty()
            || !self.date_range.is_unbounded()
            || self.equality.iter().any(|s| s.expected.as_deref().is_some_and(|e| !e.is_empty()))
    }
}

/// Recomputes the visible rows from the complete base sequence.
///
/// Never chains off a previous result, so changing one criterion while the
/// others stay put always yields the intersection over all records.
pub fn derive_visible(records: &[Record], state: &FilterState) -> Rows {
    let base = all_rows(records);
    let rows = filter_by_text(records, &base, &state.search_term);
    let rows = filter_by_date_range(records, &rows, &state.date_field, &state.date_range);
    state.equality.iter().fold(rows, |rows, selector| {
        filter_by_equality(records, &rows, &selector.accessor, selector.expected.as_deref())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn records(values: Vec<Value>) -> Vec<Record> {
        values.into_iter().map(|v| Record::try_from(v).expect("object")).collect()
    }

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").expect("date")
    }

    fn picked(records: &[Record], rows: &Rows, field: &str) -> Vec<String> {
        rows.iter().filter_map(|&i| records[i].resolve_string(field)).collect()
    }

    #[test]
    fn date_range_keeps_days_inside_bounds() {
        let data = records(vec![
            json!({"fecha": "2024-01-01"}),
            json!({"fecha": "2024-02-15"}),
            json!({"fecha": "2024-03-01"}),
        ]);
        let range = DateRange::new(Some(day("2024-02-01")), Some(day("2024-02-28")));
        let rows = filter_by_date_range(&data, &all_rows(&data), "fecha", &range);
        assert_eq!(picked(&data, &rows, "fecha"), vec!["2024-02-15"]);
    }

    #[test]
    fn text_search_ignores_case() {
        let data = records(vec![json!({"username": "ana"}), json!({"username": "Beto"})]);
        let rows = filter_by_text(&data, &all_rows(&data), "BET");
        assert_eq!(picked(&data, &rows, "username"), vec!["Beto"]);
    }

    #[test]
    fn empty_term_returns_same_row_set() {
        let data = records(vec![json!({"username": "ana"})]);
        let base = all_rows(&data);
        let rows = filter_by_text(&data, &base, "");
        assert!(Arc::ptr_eq(&base, &rows));
    }

    #[test]
    fn text_search_skips_embedded_relations() {
        let data = records(vec![json!({"id": 1, "profiles": {"username": "ana"}})]);
        let rows = filter_by_text(&data, &all_rows(&data), "ana");
        assert!(rows.is_empty());
    }

    #[test]
    fn text_search_matches_numbers_and_booleans() {
        let data = records(vec![json!({"id": 42, "extintor": true}), json!({"id": 7, "extintor": null})]);
        assert_eq!(filter_by_text(&data, &all_rows(&data), "42").as_slice(), &[0]);
        assert_eq!(filter_by_text(&data, &all_rows(&data), "TRUE").as_slice(), &[0]);
        assert!(filter_by_text(&data, &all_rows(&data), "null").is_empty());
    }

    #[test]
    fn empty_equality_value_keeps_everything() {
        let data = records(vec![json!({"username": "ana"}), json!({"username": "beto"})]);
        let base = all_rows(&data);
        assert!(Arc::ptr_eq(&base, &filter_by_equality(&data, &base, "username", Some(""))));
        assert!(Arc::ptr_eq(&base, &filter_by_equality(&data, &base, "username", None)));
    }

    #[test]
    fn equality_resolves_nested_paths_exactly() {
        let data = records(vec![
            json!({"id": 1, "profiles": {"username": "ana"}}),
            json!({"id": 2, "profiles": null}),
            json!({"id": 3, "profiles": {"username": "Ana"}}),
        ]);
        let rows = filter_by_equality(&data, &all_rows(&data), "profiles.username", Some("ana"));
        assert_eq!(rows.as_slice(), &[0]);
    }

    #[test]
    fn timestamps_compare_by_calendar_day() {
        let data = records(vec![
            json!({"created_at": "2024-02-28T23:59:59.999+00:00"}),
            json!({"created_at": "2024-02-29T00:00:00+00:00"}),
            json!({"created_at": "2024-02-01 08:15:00"}),
        ]);
        let range = DateRange::new(Some(day("2024-02-01")), Some(day("2024-02-28")));
        let rows = filter_by_date_range(&data, &all_rows(&data), "created_at", &range);
        assert_eq!(rows.as_slice(), &[0, 2]);
    }

    #[test]
    fn unparseable_dates_fail_closed_only_when_bounded() {
        let data = records(vec![json!({"fecha": "mañana"}), json!({"fecha": null}), json!({"fecha": "2024-05-05"})]);
        let base = all_rows(&data);
        let open = filter_by_date_range(&data, &base, "fecha", &DateRange::unbounded());
        assert_eq!(open.as_slice(), &[0, 1, 2]);

        let half_open = DateRange::new(None, Some(day("2030-01-01")));
        let rows = filter_by_date_range(&data, &base, "fecha", &half_open);
        assert_eq!(rows.as_slice(), &[2]);
    }

    #[test]
    fn malformed_bounds_are_ignored() {
        let range = DateRange::parse("2024-13-40", "2024-02-28");
        assert_eq!(range.start, None);
        assert_eq!(range.end, Some(day("2024-02-28")));
        assert!(DateRange::parse("", "  ").is_unbounded());
    }

    #[test]
    fn derive_visible_recomputes_from_base() {
        let data = records(vec![
            json!({"placas": "ABC", "fecha": "2024-01-10", "profiles": {"username": "ana"}}),
            json!({"placas": "XYZ", "fecha": "2024-01-20", "profiles": {"username": "beto"}}),
            json!({"placas": "ABD", "fecha": "2024-02-10", "profiles": {"username": "ana"}}),
        ]);
        let mut state = FilterState::new("fecha").with_selector("profiles.username");
        state.search_term = "ab".into();
        assert_eq!(derive_visible(&data, &state).as_slice(), &[0, 2]);

        // Widening the term must bring back rows an earlier result had dropped.
        state.search_term = "".into();
        state.set_selector("profiles.username", Some("beto".into()));
        assert_eq!(derive_visible(&data, &state).as_slice(), &[1]);

        state.reset();
        assert!(!state.is_active());
        assert_eq!(derive_visible(&data, &state).as_slice(), &[0, 1, 2]);
        assert_eq!(state.equality.len(), 1);
    }

    #[test]
    fn large_sets_keep_base_order() {
        let data: Vec<Record> = (0..5000)
            .map(|i| Record::try_from(json!({"n": format!("row-{i}")})).expect("object"))
            .collect();
        let rows = filter_by_text(&data, &all_rows(&data), "9");
        assert!(rows.windows(2).all(|w| w[0] < w[1]));
        assert!(rows.iter().all(|&i| i.to_string().contains('9')));
    }
}
