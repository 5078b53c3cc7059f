//! Data access functions. Each one issues a single query against the record
//! store and hands back normalized records.

use rayon::prelude::*;
use serde_json::json;
use tracing::{debug, error, info};

use crate::domain::{FlotaError, FlotaResult};
use crate::record::Record;
use crate::store::{Query, RecordStore};

pub const INSPECTIONS: &str = "inspections";
pub const VALES: &str = "vales";
pub const PROFILES: &str = "profiles";
pub const SIGNATURES: &str = "signatures";

pub const DEFAULT_MAINTENANCE_THRESHOLD_KM: f64 = 10_000.0;

const PROFILE_EMBED: &str = "profiles:profiles!user_id(username)";

const INSPECTION_DETAIL_COLUMNS: &[&str] = &[
    "id",
    "user_id",
    "user_signature_id",
    "fecha",
    "placas_vehiculo",
    "viseras",
    "espejo_interior",
    "espejo_lateral",
    "cristales_puerta",
    "parabrisas",
    "elevadores_cristales",
    "cerraduras",
    "cinturon_seguridad",
    "volante",
    "luces_delanteras",
    "limpieza_vehiculo",
    "cuartos",
    "luces_frenos",
    "luces_direccionales",
    "luces_intermitentes",
    "freno_pie",
    "freno_mano",
    "nivel_aceite_motor",
    "nivel_aceite_trans",
    "liquido_frenos",
    "llantas",
    "litros_gasolina_gastada",
    "botiquin",
    "extintor",
    "gato_hidraulico",
    "cruceta",
    "lampara_mano",
    "cables_pasacorriente",
    "llanta_refaccion",
    "luces_reflejantes",
    "hora_inicio",
    "hora_finalizacion",
    "observaciones",
    "kilometraje_inicio",
    "kilometraje_final",
];

fn logged<T>(what: &str, result: FlotaResult<T>) -> FlotaResult<T> {
    if let Err(e) = &result {
        error!("Error fetching {what}: {e}");
    }
    result
}

pub fn reports_query() -> Query {
    Query::from(INSPECTIONS).select(&format!(
        "id,fecha,placas_vehiculo,hora_inicio,hora_finalizacion,user_id,{PROFILE_EMBED}"
    ))
}

pub fn fetch_reports(store: &dyn RecordStore) -> FlotaResult<Vec<Record>> {
    logged("reports", store.select(&reports_query()))
}

pub fn fetch_inspection_detail(store: &dyn RecordStore, id: &str) -> FlotaResult<Record> {
    let columns = format!("{},{PROFILE_EMBED}", INSPECTION_DETAIL_COLUMNS.join(","));
    let query = Query::from(INSPECTIONS).select(&columns).eq("id", id);
    logged("inspection details", store.select_single(&query))
}

pub fn fetch_signature(store: &dyn RecordStore, id: &str) -> FlotaResult<Record> {
    let query = Query::from(SIGNATURES).select("id,user_id,signature_url").eq("id", id);
    logged("signature", store.select_single(&query))
}

pub fn fetch_vales(store: &dyn RecordStore) -> FlotaResult<Vec<Record>> {
    let query = Query::from(VALES).select(&format!("id,vale_url,signature_id,created_at,user_id,{PROFILE_EMBED}"));
    logged("vales", store.select(&query))
}

pub fn fetch_profiles(store: &dyn RecordStore) -> FlotaResult<Vec<Record>> {
    let query = Query::from(PROFILES).select("id,username").order("username", true);
    logged("profiles", store.select(&query))
}

pub fn fetch_profile(store: &dyn RecordStore, user_id: &str) -> FlotaResult<Record> {
    let query = Query::from(PROFILES).select("*").eq("id", user_id);
    logged("profile", store.select_single(&query))
}

pub fn fetch_plates(store: &dyn RecordStore) -> FlotaResult<Vec<Record>> {
    let query = Query::from(INSPECTIONS)
        .select("placas_vehiculo")
        .order("placas_vehiculo", true);
    logged("plates", store.select(&query))
}

pub fn fetch_mileage(store: &dyn RecordStore, plate: &str) -> FlotaResult<Vec<Record>> {
    let query = Query::from(INSPECTIONS)
        .select("kilometraje_inicio,kilometraje_final")
        .eq("placas_vehiculo", plate);
    logged("mileage", store.select(&query))
}

pub fn username_taken(store: &dyn RecordStore, username: &str) -> FlotaResult<bool> {
    let query = Query::from(PROFILES).select("id").ilike("username", username);
    Ok(!logged("profiles", store.select(&query))?.is_empty())
}

pub fn upsert_profile(store: &dyn RecordStore, id: &str, username: &str, full_name: &str) -> FlotaResult<()> {
    let record = Record::try_from(json!({
        "id": id,
        "username": username,
        "full_name": full_name,
    }))?;
    logged("profile upsert", store.upsert(PROFILES, &record))
}

#[derive(Debug, Clone, PartialEq)]
pub struct VehicleMileage {
    pub plate: String,
    pub kilometers: f64,
}

impl VehicleMileage {
    pub fn to_record(&self) -> Record {
        let mut record = Record::new();
        record.insert("placa", json!(self.plate));
        record.insert("kilometros", json!(self.kilometers));
        record
    }
}

/// Distinct plates, first occurrence wins.
pub fn unique_plates(rows: &[Record]) -> Vec<String> {
    let mut plates: Vec<String> = Vec::new();
    for plate in rows.iter().filter_map(|r| r.resolve_string("placas_vehiculo")) {
        if !plates.contains(&plate) {
            plates.push(plate);
        }
    }
    plates
}

/// Odometer distance of one inspection, when both readings are present.
pub fn trip_distance(record: &Record) -> Option<f64> {
    let start = record.resolve_f64("kilometraje_inicio")?;
    let end = record.resolve_f64("kilometraje_final")?;
    Some(end - start)
}

/// Sums `final - inicio` over every inspection of a plate.
///
/// Rows missing either reading add nothing. Negative deltas are summed as
/// they come.
pub fn mileage_for(plate: &str, rows: &[Record]) -> VehicleMileage {
    let kilometers = rows.iter().filter_map(trip_distance).sum();
    VehicleMileage {
        plate: plate.to_string(),
        kilometers,
    }
}

/// One plate query, then one mileage query per plate, fanned out on the
/// rayon pool. Any failing query fails the whole summary.
pub fn fetch_vehicle_mileage(store: &dyn RecordStore) -> FlotaResult<Vec<VehicleMileage>> {
    let plates = unique_plates(&fetch_plates(store)?);
    debug!("Computing mileage for {} plates", plates.len());
    let vehicles: Result<Vec<VehicleMileage>, FlotaError> = plates
        .par_iter()
        .map(|plate| fetch_mileage(store, plate).map(|rows| mileage_for(plate, &rows)))
        .collect();
    let vehicles = vehicles?;
    info!("Mileage summary ready for {} vehicles", vehicles.len());
    Ok(vehicles)
}

pub fn maintenance_alerts(vehicles: &[VehicleMileage], threshold_km: f64) -> Vec<VehicleMileage> {
    vehicles
        .iter()
        .filter(|v| v.kilometers >= threshold_km)
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::Value;

    fn records(values: Vec<Value>) -> Vec<Record> {
        values.into_iter().map(|v| Record::try_from(v).expect("object")).collect()
    }

    fn fleet() -> MemoryStore {
        MemoryStore::new().with_table(
            INSPECTIONS,
            records(vec![
                json!({"id": 1, "placas_vehiculo": "XYZ-9", "kilometraje_inicio": 100, "kilometraje_final": 9100}),
                json!({"id": 2, "placas_vehiculo": "ABC-1", "kilometraje_inicio": 0, "kilometraje_final": 500}),
                json!({"id": 3, "placas_vehiculo": "XYZ-9", "kilometraje_inicio": 9100, "kilometraje_final": 10100}),
                json!({"id": 4, "placas_vehiculo": "ABC-1", "kilometraje_inicio": 500, "kilometraje_final": null}),
            ]),
        )
    }

    #[test]
    fn mileage_is_summed_per_plate() {
        let vehicles = fetch_vehicle_mileage(&fleet()).expect("mileage");
        assert_eq!(
            vehicles,
            vec![
                VehicleMileage { plate: "ABC-1".into(), kilometers: 500.0 },
                VehicleMileage { plate: "XYZ-9".into(), kilometers: 10_000.0 },
            ]
        );
        let alerts = maintenance_alerts(&vehicles, DEFAULT_MAINTENANCE_THRESHOLD_KM);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].plate, "XYZ-9");
    }

    #[test]
    fn negative_deltas_are_not_clamped() {
        let rows = records(vec![
            json!({"kilometraje_inicio": 500, "kilometraje_final": 200}),
            json!({"kilometraje_inicio": 0, "kilometraje_final": 1000}),
        ]);
        assert_eq!(mileage_for("A", &rows).kilometers, 700.0);
    }

    #[test]
    fn plates_keep_first_occurrence_order() {
        let rows = records(vec![
            json!({"placas_vehiculo": "B"}),
            json!({"placas_vehiculo": "A"}),
            json!({"placas_vehiculo": "B"}),
            json!({"placas_vehiculo": null}),
        ]);
        assert_eq!(unique_plates(&rows), vec!["B", "A"]);
    }

    #[test]
    fn missing_table_surfaces_as_error() {
        let empty = MemoryStore::new();
        assert!(matches!(fetch_reports(&empty), Err(FlotaError::FixtureMissing(_))));
    }
}
