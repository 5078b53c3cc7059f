use std::sync::Arc;

use tracing::{error, info};

use crate::domain::FlotaResult;
use crate::fetch::{Fetcher, RequestTracker};
use crate::filter::FilterState;
use crate::record::Record;
use crate::services;
use crate::store::RecordStore;
use crate::table::{Cell, CellKind, ColumnDef};
use crate::views::{FilteredTable, Outcome};

pub const NO_USER: &str = "Sin usuario";

pub fn report_columns() -> Vec<ColumnDef> {
    vec![
        ColumnDef::new("fecha", "Fecha").kind(CellKind::date()),
        ColumnDef::new("placas_vehiculo", "Número de Placa"),
        ColumnDef::new("hora_inicio", "Hora de Inicio").kind(CellKind::Time),
        ColumnDef::new("hora_finalizacion", "Hora de Finalización").kind(CellKind::Time),
        ColumnDef::new("profiles.username", "Usuario").placeholder(NO_USER),
        ColumnDef::new("id", "Detalles").kind(CellKind::link("Ver ▶")),
    ]
}

/// Inspection report list with free text search and a range on `fecha`.
pub struct ReportsView {
    list: FilteredTable,
    tracker: RequestTracker,
}

impl ReportsView {
    pub fn new(page_size: usize) -> Self {
        ReportsView {
            list: FilteredTable::new(report_columns(), page_size, FilterState::new("fecha")),
            tracker: RequestTracker::default(),
        }
    }

    pub fn list(&self) -> &FilteredTable {
        &self.list
    }

    pub fn list_mut(&mut self) -> &mut FilteredTable {
        &mut self.list
    }

    pub fn is_loading(&self) -> bool {
        self.tracker.is_pending()
    }

    pub fn load(&mut self, store: Arc<dyn RecordStore>, fetcher: &Fetcher<Outcome>) {
        let token = self.tracker.issue();
        fetcher.spawn(move || Outcome::Reports {
            token,
            result: services::fetch_reports(store.as_ref()),
        });
    }

    /// Applies a finished load. Returns the error text for the status line
    /// when the load failed; prior rows stay on screen in that case.
    pub fn apply(&mut self, token: u64, result: FlotaResult<Vec<Record>>) -> Option<String> {
        match self.tracker.accept(token, result)? {
            Ok(records) => {
                info!("Loaded {} reports", records.len());
                self.list.set_records(records);
                None
            }
            Err(e) => {
                error!("Could not load reports: {e}");
                Some(format!("Error cargando reportes: {e}"))
            }
        }
    }

    /// Id of the report behind the selected row, for drill-down.
    pub fn selected_report_id(&self) -> Option<String> {
        match self.list.selected_cell() {
            Some(Cell::Link { target, .. }) => Some(target),
            _ => self.list.selected_record().and_then(Record::id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::FlotaError;
    use serde_json::json;

    fn reports() -> Vec<Record> {
        [
            json!({"id": 7, "fecha": "2024-05-01", "placas_vehiculo": "ABC-1", "hora_inicio": "08:00:00",
                   "hora_finalizacion": "17:30:00", "profiles": {"username": "ana"}}),
            json!({"id": 8, "fecha": "2024-05-02", "placas_vehiculo": "XYZ-9", "hora_inicio": "09:15:00",
                   "hora_finalizacion": null, "profiles": null}),
        ]
        .into_iter()
        .map(|v| Record::try_from(v).expect("object"))
        .collect()
    }

    #[test]
    fn rows_render_with_placeholders() {
        let mut view = ReportsView::new(4);
        view.apply(0, Ok(reports()));
        let page = view.list().page();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].cells[0], Cell::Text("01/05/2024".into()));
        assert_eq!(page[1].cells[3], Cell::Text("N/A".into()));
        assert_eq!(page[1].cells[4], Cell::Text(NO_USER.into()));
        assert_eq!(page[1].key, "8");
    }

    #[test]
    fn failed_reload_keeps_previous_rows() {
        let mut view = ReportsView::new(4);
        view.apply(0, Ok(reports()));
        let token = view.tracker.issue();
        let status = view.apply(
            token,
            Err(FlotaError::StatusError {
                status: 500,
                body: "boom".into(),
            }),
        );
        assert!(status.is_some());
        assert_eq!(view.list().table().total_rows(), 2);
    }

    #[test]
    fn stale_load_is_ignored() {
        let mut view = ReportsView::new(4);
        let old = view.tracker.issue();
        let new = view.tracker.issue();
        assert!(view.apply(new, Ok(reports())).is_none());
        assert!(view.apply(old, Ok(Vec::new())).is_none());
        assert_eq!(view.list().table().total_rows(), 2);
    }

    #[test]
    fn selection_drills_into_report() {
        let mut view = ReportsView::new(4);
        view.apply(0, Ok(reports()));
        view.list_mut().table_mut().select_next_row();
        assert_eq!(view.selected_report_id().as_deref(), Some("8"));
    }
}
