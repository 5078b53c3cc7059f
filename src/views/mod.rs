//! Per-screen state. Each view owns its base records, its filter criteria,
//! a table engine over the visible rows and a request tracker. Backend calls
//! run on the fetcher and come back as an [`Outcome`] tagged with the token
//! that was current when they were issued.

use std::sync::Arc;

use crate::auth::Session;
use crate::domain::FlotaResult;
use crate::filter::{DateRange, FilterState, derive_visible};
use crate::record::Record;
use crate::services::VehicleMileage;
use crate::table::{Cell, ColumnDef, RenderedRow, TableEngine};

pub mod auth_form;
pub mod mileage;
pub mod report_detail;
pub mod reports;
pub mod vales;

pub use auth_form::{AuthForm, FormField, FormKind};
pub use mileage::MileageView;
pub use report_detail::{DetailSection, ReportDetailView};
pub use reports::ReportsView;
pub use vales::{ValesData, ValesView};

/// A finished background request on its way back to the ui thread.
pub enum Outcome {
    Reports {
        token: u64,
        result: FlotaResult<Vec<Record>>,
    },
    ReportDetail {
        token: u64,
        result: FlotaResult<(Record, Option<String>)>,
    },
    Vales {
        token: u64,
        result: FlotaResult<ValesData>,
    },
    Mileage {
        token: u64,
        result: FlotaResult<Vec<VehicleMileage>>,
    },
    SignedIn {
        token: u64,
        result: FlotaResult<(Session, Option<Record>)>,
    },
    Registered {
        token: u64,
        result: FlotaResult<String>,
    },
    SignedOut(FlotaResult<()>),
}

/// Base records plus the criteria and table that present them.
pub struct FilteredTable {
    records: Arc<Vec<Record>>,
    filters: FilterState,
    table: TableEngine,
    date_inputs: (String, String),
}

impl FilteredTable {
    pub fn new(columns: Vec<ColumnDef>, page_size: usize, filters: FilterState) -> Self {
        FilteredTable {
            records: Arc::new(Vec::new()),
            filters,
            table: TableEngine::new(columns, page_size),
            date_inputs: (String::new(), String::new()),
        }
    }

    pub fn set_records(&mut self, records: Vec<Record>) {
        self.records = Arc::new(records);
        self.refresh();
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn filters(&self) -> &FilterState {
        &self.filters
    }

    pub fn table(&self) -> &TableEngine {
        &self.table
    }

    pub fn table_mut(&mut self) -> &mut TableEngine {
        &mut self.table
    }

    /// Raw text the user typed for the start and end bounds.
    pub fn date_inputs(&self) -> (&str, &str) {
        (&self.date_inputs.0, &self.date_inputs.1)
    }

    pub fn set_search_term(&mut self, term: &str) {
        self.filters.search_term = term.to_string();
        self.refresh();
    }

    pub fn set_date_start(&mut self, raw: &str) {
        self.date_inputs.0 = raw.trim().to_string();
        self.update_date_range();
    }

    pub fn set_date_end(&mut self, raw: &str) {
        self.date_inputs.1 = raw.trim().to_string();
        self.update_date_range();
    }

    fn update_date_range(&mut self) {
        self.filters.date_range = DateRange::parse(&self.date_inputs.0, &self.date_inputs.1);
        self.refresh();
    }

    pub fn set_selector(&mut self, accessor: &str, expected: Option<String>) {
        self.filters.set_selector(accessor, expected);
        self.refresh();
    }

    pub fn reset_filters(&mut self) {
        self.filters.reset();
        self.date_inputs = (String::new(), String::new());
        self.refresh();
    }

    fn refresh(&mut self) {
        let rows = derive_visible(&self.records, &self.filters);
        self.table.set_rows(rows);
    }

    pub fn page(&self) -> Vec<RenderedRow> {
        self.table.get_page(&self.records)
    }

    pub fn selected_record(&self) -> Option<&Record> {
        self.table.selected_record(&self.records)
    }

    pub fn selected_cell(&self) -> Option<Cell> {
        self.table.selected_cell(&self.records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Vec<Record> {
        [
            json!({"id": 1, "placa": "ABC", "fecha": "2024-01-05"}),
            json!({"id": 2, "placa": "XYZ", "fecha": "2024-02-10"}),
            json!({"id": 3, "placa": "ABD", "fecha": "2024-03-15"}),
        ]
        .into_iter()
        .map(|v| Record::try_from(v).expect("object"))
        .collect()
    }

    #[test]
    fn changing_one_filter_keeps_the_others() {
        let mut view = FilteredTable::new(vec![ColumnDef::new("placa", "Placa")], 4, FilterState::new("fecha"));
        view.set_records(sample());
        view.set_search_term("ab");
        view.set_date_start("2024-02-01");
        assert_eq!(view.table().total_rows(), 1);
        view.set_search_term("");
        assert_eq!(view.table().total_rows(), 2);
        assert_eq!(view.date_inputs(), ("2024-02-01", ""));
    }

    #[test]
    fn search_term_is_kept_as_typed() {
        let records: Vec<Record> = [
            json!({"id": 1, "observaciones": "Sin novedad", "hora_inicio": "08:00:00"}),
            json!({"id": 2, "observaciones": "Llanta", "hora_inicio": "17:08:00"}),
        ]
        .into_iter()
        .map(|v| Record::try_from(v).expect("object"))
        .collect();
        let mut view = FilteredTable::new(vec![ColumnDef::new("id", "ID")], 4, FilterState::new("fecha"));
        view.set_records(records);

        view.set_search_term(" ");
        assert_eq!(view.filters().search_term, " ");
        assert_eq!(view.table().total_rows(), 1);

        view.set_search_term(":08");
        assert_eq!(view.table().total_rows(), 1);
        view.set_search_term("08");
        assert_eq!(view.table().total_rows(), 2);
    }

    #[test]
    fn reset_restores_full_set() {
        let mut view = FilteredTable::new(vec![ColumnDef::new("placa", "Placa")], 4, FilterState::new("fecha"));
        view.set_records(sample());
        view.set_date_end("2024-01-31");
        assert_eq!(view.table().total_rows(), 1);
        view.reset_filters();
        assert_eq!(view.table().total_rows(), 3);
        assert_eq!(view.date_inputs(), ("", ""));
    }
}
