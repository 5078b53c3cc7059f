//! Property tests for the filter pipeline and the pager.

use std::sync::Arc;

use chrono::NaiveDate;
use flota::filter::{
    DateRange, FilterState, Rows, all_rows, derive_visible, filter_by_date_range, filter_by_equality, filter_by_text,
};
use flota::record::Record;
use flota::table::TableEngine;
use proptest::collection::vec;
use proptest::prelude::*;
use serde_json::json;

const USERS: [&str; 3] = ["ana", "luis", "marta"];

fn record_strategy() -> impl Strategy<Value = Record> {
    (1u32..=12, 1u32..=28, "[a-dA-D ]{0,6}", proptest::option::of(0usize..USERS.len())).prop_map(
        |(month, day, nota, user)| {
            let value = json!({
                "fecha": format!("2024-{month:02}-{day:02}"),
                "nota": nota,
                "user": user.map(|u| USERS[u]),
            });
            Record::try_from(value).expect("object")
        },
    )
}

fn range_strategy() -> impl Strategy<Value = DateRange> {
    let day = proptest::option::of((1u32..=12, 1u32..=28).prop_map(|(m, d)| {
        NaiveDate::from_ymd_opt(2024, m, d).expect("valid day")
    }));
    (day.clone(), day).prop_map(|(start, end)| DateRange::new(start, end))
}

fn is_ordered_subset(rows: &Rows, of: &Rows) -> bool {
    rows.windows(2).all(|w| w[0] < w[1]) && rows.iter().all(|i| of.contains(i))
}

// =============================================================================
// FILTERS
// =============================================================================

proptest! {
    /// Running the same filter over its own output changes nothing.
    #[test]
    fn text_filter_is_idempotent(records in vec(record_strategy(), 0..40), term in "[a-d]{0,2}") {
        let base = all_rows(&records);
        let once = filter_by_text(&records, &base, &term);
        let twice = filter_by_text(&records, &once, &term);
        prop_assert_eq!(once, twice);
    }

    /// Text and date filters can be applied in either order.
    #[test]
    fn text_and_date_filters_commute(
        records in vec(record_strategy(), 0..40),
        term in "[a-d]{0,2}",
        range in range_strategy(),
    ) {
        let base = all_rows(&records);
        let text_first = filter_by_date_range(&records, &filter_by_text(&records, &base, &term), "fecha", &range);
        let date_first = filter_by_text(&records, &filter_by_date_range(&records, &base, "fecha", &range), &term);
        prop_assert_eq!(text_first, date_first);
    }

    /// Every filter keeps a subset of its input in base order.
    #[test]
    fn filters_keep_an_ordered_subset(
        records in vec(record_strategy(), 0..40),
        term in "[a-d]{0,2}",
        range in range_strategy(),
        user in proptest::option::of(0usize..USERS.len()),
    ) {
        let base = all_rows(&records);
        let by_text = filter_by_text(&records, &base, &term);
        let by_date = filter_by_date_range(&records, &base, "fecha", &range);
        let by_user = filter_by_equality(&records, &base, "user", user.map(|u| USERS[u]));
        prop_assert!(is_ordered_subset(&by_text, &base));
        prop_assert!(is_ordered_subset(&by_date, &base));
        prop_assert!(is_ordered_subset(&by_user, &base));
    }

    /// The visible set never depends on what was filtered before.
    #[test]
    fn visible_rows_ignore_filter_history(
        records in vec(record_strategy(), 0..40),
        earlier in "[a-d]{0,2}",
        term in "[a-d]{0,2}",
        range in range_strategy(),
        user in proptest::option::of(0usize..USERS.len()),
    ) {
        let mut state = FilterState::new("fecha").with_selector("user");
        state.search_term = earlier;
        state.date_range = range;
        let _ = derive_visible(&records, &state);

        state.search_term = term.clone();
        state.set_selector("user", user.map(|u| USERS[u].to_string()));
        let visible = derive_visible(&records, &state);

        let base = all_rows(&records);
        let expected: Vec<usize> = base
            .iter()
            .copied()
            .filter(|i| filter_by_text(&records, &base, &term).contains(i))
            .filter(|i| filter_by_date_range(&records, &base, "fecha", &range).contains(i))
            .filter(|i| filter_by_equality(&records, &base, "user", user.map(|u| USERS[u])).contains(i))
            .collect();
        prop_assert_eq!(visible.as_slice(), expected.as_slice());
    }

    /// Clearing every criterion brings back the whole base set.
    #[test]
    fn reset_restores_every_row(
        records in vec(record_strategy(), 0..40),
        term in "[a-d]{0,2}",
        range in range_strategy(),
    ) {
        let mut state = FilterState::new("fecha").with_selector("user");
        state.search_term = term;
        state.date_range = range;
        state.set_selector("user", Some("ana".to_string()));
        state.reset();
        prop_assert!(!state.is_active());
        prop_assert_eq!(derive_visible(&records, &state).len(), records.len());
    }
}

// =============================================================================
// PAGER
// =============================================================================

proptest! {
    /// Walking every page visits each visible row exactly once.
    #[test]
    fn pages_partition_the_rows(total in 0usize..60, page_size in 1usize..10) {
        let mut table = TableEngine::new(Vec::new(), page_size);
        table.set_rows(Arc::new((0..total).collect()));

        let mut seen = Vec::new();
        let mut pages = 1;
        loop {
            prop_assert!(table.page_rows().len() <= page_size);
            seen.extend_from_slice(table.page_rows());
            if !table.can_next_page() {
                break;
            }
            table.next_page();
            pages += 1;
        }
        prop_assert_eq!(seen, (0..total).collect::<Vec<_>>());
        prop_assert_eq!(pages, table.page_count_display());
        prop_assert!(!table.can_next_page());
    }

    /// Shrinking the row set pulls the page index and cursor back in bounds.
    #[test]
    fn shrinking_rows_clamps_the_page(
        total in 1usize..60,
        remaining in 0usize..60,
        page_size in 1usize..10,
        moves in 0usize..8,
    ) {
        let mut table = TableEngine::new(Vec::new(), page_size);
        table.set_rows(Arc::new((0..total).collect()));
        table.last_page();
        for _ in 0..moves {
            table.select_next_row();
        }

        let remaining = remaining.min(total);
        table.set_rows(Arc::new((0..remaining).collect()));
        let index = table.pagination().page_index();
        prop_assert!(index < table.page_count_display());
        prop_assert!(table.cursor().0 <= table.page_rows().len().saturating_sub(1));
        if remaining > 0 {
            prop_assert!(!table.page_rows().is_empty());
        }
    }
}
