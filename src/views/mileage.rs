use std::sync::Arc;

use tracing::{error, info, warn};

use crate::domain::FlotaResult;
use crate::fetch::{Fetcher, RequestTracker};
use crate::filter::all_rows;
use crate::record::Record;
use crate::services::{self, VehicleMileage};
use crate::store::RecordStore;
use crate::table::{CellKind, ColumnDef, RenderedRow, TableEngine, format_thousands};
use crate::views::Outcome;

fn mileage_columns() -> Vec<ColumnDef> {
    vec![
        ColumnDef::new("placa", "Placa del Vehículo"),
        ColumnDef::new("kilometros", "Kilómetros Recorridos").kind(CellKind::number("km")),
    ]
}

/// Kilometers per plate plus the plates that are due for maintenance.
pub struct MileageView {
    vehicles: Vec<VehicleMileage>,
    records: Vec<Record>,
    alerts: Vec<VehicleMileage>,
    threshold_km: f64,
    table: TableEngine,
    tracker: RequestTracker,
}

impl MileageView {
    pub fn new(page_size: usize, threshold_km: f64) -> Self {
        MileageView {
            vehicles: Vec::new(),
            records: Vec::new(),
            alerts: Vec::new(),
            threshold_km,
            table: TableEngine::new(mileage_columns(), page_size),
            tracker: RequestTracker::default(),
        }
    }

    pub fn vehicles(&self) -> &[VehicleMileage] {
        &self.vehicles
    }

    pub fn alerts(&self) -> &[VehicleMileage] {
        &self.alerts
    }

    pub fn alert_lines(&self) -> Vec<String> {
        self.alerts
            .iter()
            .map(|v| {
                format!(
                    "El vehículo con placa: {} ha recorrido {} km y necesita mantenimiento.",
                    v.plate,
                    format_thousands(v.kilometers)
                )
            })
            .collect()
    }

    pub fn table(&self) -> &TableEngine {
        &self.table
    }

    pub fn table_mut(&mut self) -> &mut TableEngine {
        &mut self.table
    }

    pub fn page(&self) -> Vec<RenderedRow> {
        self.table.get_page(&self.records)
    }

    pub fn selected_record(&self) -> Option<&Record> {
        self.table.selected_record(&self.records)
    }

    pub fn is_loading(&self) -> bool {
        self.tracker.is_pending()
    }

    pub fn load(&mut self, store: Arc<dyn RecordStore>, fetcher: &Fetcher<Outcome>) {
        let token = self.tracker.issue();
        fetcher.spawn(move || Outcome::Mileage {
            token,
            result: services::fetch_vehicle_mileage(store.as_ref()),
        });
    }

    pub fn apply(&mut self, token: u64, result: FlotaResult<Vec<VehicleMileage>>) -> Option<String> {
        match self.tracker.accept(token, result)? {
            Ok(vehicles) => {
                self.alerts = services::maintenance_alerts(&vehicles, self.threshold_km);
                for alert in self.alerts.iter() {
                    warn!("Plate {} is due for maintenance ({} km)", alert.plate, alert.kilometers);
                }
                info!("Mileage for {} vehicles, {} alerts", vehicles.len(), self.alerts.len());
                self.records = vehicles.iter().map(VehicleMileage::to_record).collect();
                self.vehicles = vehicles;
                self.table.set_rows(all_rows(&self.records));
                None
            }
            Err(e) => {
                error!("Could not compute mileage: {e}");
                Some(format!("Error calculando kilometraje: {e}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Cell;

    fn vehicles() -> Vec<VehicleMileage> {
        vec![
            VehicleMileage {
                plate: "ABC-1".into(),
                kilometers: 12_500.0,
            },
            VehicleMileage {
                plate: "XYZ-9".into(),
                kilometers: 300.0,
            },
            VehicleMileage {
                plate: "JKL-3".into(),
                kilometers: 10_000.0,
            },
        ]
    }

    #[test]
    fn alerts_start_at_the_threshold() {
        let mut view = MileageView::new(4, 10_000.0);
        view.apply(0, Ok(vehicles()));
        let plates: Vec<&str> = view.alerts().iter().map(|v| v.plate.as_str()).collect();
        assert_eq!(plates, vec!["ABC-1", "JKL-3"]);
        assert!(view.alert_lines()[0].contains("12,500 km"));
    }

    #[test]
    fn table_lists_every_vehicle() {
        let mut view = MileageView::new(2, 10_000.0);
        view.apply(0, Ok(vehicles()));
        assert_eq!(view.table().page_count_display(), 2);
        let page = view.page();
        assert_eq!(page[0].cells[1], Cell::Text("12,500 km".into()));
        view.table_mut().next_page();
        assert_eq!(view.page()[0].cells[0], Cell::Text("JKL-3".into()));
    }
}
