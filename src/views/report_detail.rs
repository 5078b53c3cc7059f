use std::sync::Arc;

use tracing::{error, info, warn};

use crate::domain::FlotaResult;
use crate::fetch::{Fetcher, RequestTracker};
use crate::record::Record;
use crate::services;
use crate::store::RecordStore;
use crate::table::{Cell, CellKind, ColumnDef, format_thousands, resolve_cell};
use crate::views::Outcome;
use crate::views::reports::NO_USER;

pub struct DetailSection {
    pub title: &'static str,
    pub fields: Vec<(String, String)>,
}

fn flag(accessor: &str, header: &str) -> ColumnDef {
    ColumnDef::new(accessor, header).kind(CellKind::Boolean).placeholder("No")
}

/// Distance of this trip. Both readings must be present and non-zero.
fn traveled() -> CellKind {
    CellKind::custom(|_, record| {
        let start = record.resolve_f64("kilometraje_inicio").filter(|v| *v != 0.0)?;
        let end = record.resolve_f64("kilometraje_final").filter(|v| *v != 0.0)?;
        Some(Cell::Text(format_thousands(end - start)))
    })
}

fn sections() -> Vec<(&'static str, Vec<ColumnDef>)> {
    vec![
        (
            "Información General",
            vec![
                ColumnDef::new("id", "ID"),
                ColumnDef::new("profiles.username", "Usuario").placeholder(NO_USER),
                ColumnDef::new("user_signature_id", "Signature ID"),
                ColumnDef::new("fecha", "Fecha").kind(CellKind::date()),
                ColumnDef::new("hora_inicio", "Hora Inicio").kind(CellKind::Time),
                ColumnDef::new("hora_finalizacion", "Hora Finalización").kind(CellKind::Time),
                ColumnDef::new("placas_vehiculo", "Placas Vehículo"),
                ColumnDef::new("kilometraje_inicio", "Kilometraje Inicio").kind(CellKind::number("")),
                ColumnDef::new("kilometraje_final", "Kilometraje Fin").kind(CellKind::number("")),
                ColumnDef::new("kilometraje_final", "Kilómetros Recorridos").kind(traveled()),
                ColumnDef::new("observaciones", "Observaciones"),
            ],
        ),
        (
            "Estado del Vehículo",
            vec![
                ColumnDef::new("viseras", "Viseras"),
                ColumnDef::new("espejo_interior", "Espejo Interior"),
                ColumnDef::new("espejo_lateral", "Espejo Lateral"),
                ColumnDef::new("cristales_puerta", "Cristales Puerta"),
                ColumnDef::new("parabrisas", "Parabrisas"),
                ColumnDef::new("elevadores_cristales", "Elevadores Cristales"),
                ColumnDef::new("cerraduras", "Cerraduras"),
                ColumnDef::new("cinturon_seguridad", "Cinturón Seguridad"),
                ColumnDef::new("volante", "Volante"),
            ],
        ),
        (
            "Luces",
            vec![
                ColumnDef::new("luces_delanteras", "Delanteras"),
                ColumnDef::new("cuartos", "Cuartos"),
                ColumnDef::new("luces_frenos", "Frenos"),
                ColumnDef::new("luces_direccionales", "Direccionales"),
                ColumnDef::new("luces_intermitentes", "Intermitentes"),
                flag("luces_reflejantes", "Reflejantes"),
            ],
        ),
        (
            "Frenos y Fluidos",
            vec![
                ColumnDef::new("freno_pie", "Freno Pie"),
                ColumnDef::new("freno_mano", "Freno Mano"),
                ColumnDef::new("liquido_frenos", "Líquido Frenos"),
                ColumnDef::new("nivel_aceite_motor", "Nivel Aceite Motor"),
                ColumnDef::new("nivel_aceite_trans", "Nivel Aceite Transmisión"),
                ColumnDef::new("litros_gasolina_gastada", "Litros Gasolina Gastada"),
            ],
        ),
        (
            "Otros",
            vec![
                ColumnDef::new("llantas", "Llantas"),
                ColumnDef::new("limpieza_vehiculo", "Limpieza Vehículo"),
                flag("botiquin", "Botiquín"),
                flag("extintor", "Extintor"),
                flag("gato_hidraulico", "Gato Hidráulico"),
                flag("cruceta", "Cruceta"),
                flag("lampara_mano", "Lámpara Mano"),
                flag("cables_pasacorriente", "Cables Pasacorriente"),
                flag("llanta_refaccion", "Llanta Refacción"),
            ],
        ),
    ]
}

/// Loads the inspection, then its signature when one is referenced.
/// A signature that fails to load only costs the image.
fn load_report(store: &dyn RecordStore, id: &str) -> FlotaResult<(Record, Option<String>)> {
    let report = services::fetch_inspection_detail(store, id)?;
    let signature = match report.resolve_string("user_signature_id") {
        Some(signature_id) => match services::fetch_signature(store, &signature_id) {
            Ok(signature) => signature.resolve_string("signature_url"),
            Err(e) => {
                warn!("Report {id} shows no signature: {e}");
                None
            }
        },
        None => None,
    };
    Ok((report, signature))
}

const SIGNATURE_LINES: usize = 3;

pub struct ReportDetailView {
    id: Option<String>,
    report: Option<Record>,
    signature_url: Option<String>,
    scroll: usize,
    tracker: RequestTracker,
}

impl Default for ReportDetailView {
    fn default() -> Self {
        ReportDetailView::new()
    }
}

impl ReportDetailView {
    pub fn new() -> Self {
        ReportDetailView {
            id: None,
            report: None,
            signature_url: None,
            scroll: 0,
            tracker: RequestTracker::default(),
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn report(&self) -> Option<&Record> {
        self.report.as_ref()
    }

    pub fn signature_url(&self) -> Option<&str> {
        self.signature_url.as_deref()
    }

    pub fn has_signature(&self) -> bool {
        self.report
            .as_ref()
            .is_some_and(|r| r.resolve("user_signature_id").is_some())
    }

    /// The report references a signature that has not arrived.
    pub fn signature_pending(&self) -> bool {
        self.signature_url.is_none() && self.has_signature()
    }

    /// Lines on the detail screen: title, fields and a blank line per
    /// section, plus the signature block after the first section.
    pub fn line_count(&self) -> usize {
        let sections: usize = self.sections().iter().map(|s| s.fields.len() + 2).sum();
        if self.has_signature() { sections + SIGNATURE_LINES } else { sections }
    }

    pub fn is_loading(&self) -> bool {
        self.report.is_none() && self.tracker.is_pending()
    }

    pub fn scroll(&self) -> usize {
        self.scroll
    }

    /// Stops with the last line at the top of the screen.
    pub fn scroll_down(&mut self) {
        if self.scroll + 1 < self.line_count() {
            self.scroll += 1;
        }
    }

    pub fn scroll_up(&mut self) {
        self.scroll = self.scroll.saturating_sub(1);
    }

    pub fn load(&mut self, id: &str, store: Arc<dyn RecordStore>, fetcher: &Fetcher<Outcome>) {
        if self.id.as_deref() != Some(id) {
            self.report = None;
            self.signature_url = None;
            self.scroll = 0;
        }
        self.id = Some(id.to_string());
        let token = self.tracker.issue();
        let id = id.to_string();
        fetcher.spawn(move || Outcome::ReportDetail {
            token,
            result: load_report(store.as_ref(), &id),
        });
    }

    pub fn apply(&mut self, token: u64, result: FlotaResult<(Record, Option<String>)>) -> Option<String> {
        match self.tracker.accept(token, result)? {
            Ok((report, signature)) => {
                info!("Loaded report {:?}", report.id());
                self.report = Some(report);
                self.signature_url = signature;
                None
            }
            Err(e) => {
                error!("Could not load report {:?}: {e}", self.id);
                Some(format!("Error cargando el reporte: {e}"))
            }
        }
    }

    pub fn sections(&self) -> Vec<DetailSection> {
        let Some(report) = &self.report else {
            return Vec::new();
        };
        sections()
            .into_iter()
            .map(|(title, columns)| DetailSection {
                title,
                fields: columns
                    .iter()
                    .map(|c| (c.header.clone(), resolve_cell(report, c).display()))
                    .collect(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn store() -> MemoryStore {
        let inspections = vec![
            Record::try_from(json!({
                "id": 3, "fecha": "2024-04-02", "placas_vehiculo": "ABC-1", "user_id": "u1",
                "user_signature_id": 11, "kilometraje_inicio": 1000, "kilometraje_final": 1250,
                "botiquin": true, "extintor": false, "viseras": "Bien"
            }))
            .expect("object"),
            Record::try_from(json!({"id": 4, "user_signature_id": 99, "kilometraje_inicio": 0, "kilometraje_final": 20}))
                .expect("object"),
        ];
        let signatures = vec![Record::try_from(json!({"id": 11, "user_id": "u1", "signature_url": "https://img/s.png"})).expect("object")];
        let profiles = vec![Record::try_from(json!({"id": "u1", "username": "ana"})).expect("object")];
        MemoryStore::new()
            .with_table(services::INSPECTIONS, inspections)
            .with_table(services::SIGNATURES, signatures)
            .with_table(services::PROFILES, profiles)
    }

    fn field<'a>(sections: &'a [DetailSection], title: &str, label: &str) -> &'a str {
        sections
            .iter()
            .find(|s| s.title == title)
            .and_then(|s| s.fields.iter().find(|(l, _)| l == label))
            .map(|(_, v)| v.as_str())
            .expect("field present")
    }

    #[test]
    fn report_and_signature_load_together() {
        let (report, signature) = load_report(&store(), "3").expect("loads");
        let mut view = ReportDetailView::new();
        view.apply(0, Ok((report, signature)));
        assert_eq!(view.signature_url(), Some("https://img/s.png"));
        let sections = view.sections();
        assert_eq!(sections.len(), 5);
        assert_eq!(field(&sections, "Información General", "Usuario"), "ana");
        assert_eq!(field(&sections, "Información General", "Kilómetros Recorridos"), "250");
        assert_eq!(field(&sections, "Información General", "Kilometraje Inicio"), "1,000");
        assert_eq!(field(&sections, "Otros", "Botiquín"), "Sí");
        assert_eq!(field(&sections, "Otros", "Extintor"), "No");
        assert_eq!(field(&sections, "Otros", "Cruceta"), "No");
        assert_eq!(field(&sections, "Estado del Vehículo", "Volante"), "N/A");
    }

    #[test]
    fn missing_signature_keeps_the_report() {
        let (report, signature) = load_report(&store(), "4").expect("loads");
        assert!(signature.is_none());
        let mut view = ReportDetailView::new();
        view.apply(0, Ok((report, signature)));
        assert!(view.signature_pending());
        let sections = view.sections();
        assert_eq!(field(&sections, "Información General", "Kilómetros Recorridos"), "N/A");
        assert_eq!(field(&sections, "Información General", "Usuario"), NO_USER);
    }

    #[test]
    fn scrolling_stops_at_the_last_line() {
        let (report, signature) = load_report(&store(), "3").expect("loads");
        let mut view = ReportDetailView::new();
        view.scroll_down();
        assert_eq!(view.scroll(), 0);

        view.apply(0, Ok((report, signature)));
        let lines = view.line_count();
        let fields: usize = view.sections().iter().map(|s| s.fields.len()).sum();
        assert_eq!(lines, fields + 2 * view.sections().len() + SIGNATURE_LINES);

        for _ in 0..lines + 10 {
            view.scroll_down();
        }
        assert_eq!(view.scroll(), lines - 1);
        view.scroll_up();
        assert_eq!(view.scroll(), lines - 2);
    }

    #[test]
    fn unknown_report_is_an_error() {
        assert!(load_report(&store(), "404").is_err());
    }
}
