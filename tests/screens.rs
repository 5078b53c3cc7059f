//! Renders whole screens into a test backend.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use flota::auth::{FIXTURE_USERS_TABLE, FixtureAuth};
use flota::config::FlotaConfig;
use flota::domain::Message;
use flota::model::Model;
use flota::routes::Route;
use flota::store::{MemoryStore, Query, RecordStore};
use flota::ui::FlotaUI;
use ratatui::{Terminal, backend::TestBackend};

const WIDTH: u16 = 120;
const HEIGHT: u16 = 30;

fn model() -> Model {
    let dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures");
    let store = MemoryStore::load_dir(&dir).expect("fixtures load");
    let accounts = store.select(&Query::from(FIXTURE_USERS_TABLE)).expect("accounts");
    let auth = FixtureAuth::from_records(&accounts);
    let config = FlotaConfig::default().fixtures_dir(dir);
    Model::init(&config, Arc::new(store), Arc::new(auth), WIDTH as usize, HEIGHT as usize)
}

fn signed_in(route: Route) -> Model {
    let mut model = model();
    model.start(route, Some(("ana@cfe.com.mx".to_string(), "flota123".to_string())));
    settle(&mut model);
    model
}

fn settle(model: &mut Model) {
    for _ in 0..20 {
        if !model.is_waiting() && !model.is_loading() {
            return;
        }
        model.wait_for_fetch(Duration::from_secs(5));
    }
    panic!("requests did not settle");
}

fn render(model: &Model) -> String {
    let mut terminal = Terminal::new(TestBackend::new(WIDTH, HEIGHT)).expect("terminal");
    let mut ui = FlotaUI::new(model.config().max_column_width);
    terminal.draw(|f| ui.draw(model, f)).expect("draw");
    let buffer = terminal.backend().buffer();
    (0..HEIGHT)
        .map(|y| (0..WIDTH).map(|x| buffer[(x, y)].symbol()).collect::<String>())
        .collect::<Vec<_>>()
        .join("\n")
}

#[test]
fn anonymous_start_shows_the_login_form() {
    let mut model = model();
    model.start(Route::Reports, None);
    let screen = render(&model);
    assert!(screen.contains("Iniciar sesión"));
    assert!(screen.contains("Contraseña"));
    assert!(!screen.contains("Página"));
}

#[test]
fn reports_screen_pages_through_rows() {
    let mut model = signed_in(Route::Reports);
    assert_eq!(model.route(), &Route::Reports);

    let screen = render(&model);
    assert!(screen.contains("Página 1 de 2"));
    assert!(screen.contains("Número de Placa"));
    assert!(screen.contains("ABC-123"));
    assert!(screen.contains("ana"));

    model.update(Some(Message::NextPage)).expect("update");
    let screen = render(&model);
    assert!(screen.contains("Página 2 de 2"));
    assert!(screen.contains(flota::views::reports::NO_USER));
}

#[test]
fn mileage_screen_lists_alerts() {
    let model = signed_in(Route::Mileage);
    let screen = render(&model);
    assert!(screen.contains("Kilómetros Recorridos"));
    assert!(screen.contains("El vehículo con placa: ABC-123"));
    assert!(!screen.contains("El vehículo con placa: XYZ-987"));
}

#[test]
fn detail_screen_shows_sections_and_signature() {
    let model = signed_in(Route::ReportDetail("1".to_string()));
    let screen = render(&model);
    assert!(screen.contains("Detalles del Reporte #1"));
    assert!(screen.contains("Información General"));
    assert!(screen.contains("Firma del Usuario"));
    assert!(screen.contains("https://storage.example.com/firmas/ana.png"));
}

#[test]
fn help_popup_draws_over_the_table() {
    let mut model = signed_in(Route::Vales);
    model.update(Some(Message::Help)).expect("update");
    let screen = render(&model);
    assert!(screen.contains("Ayuda"));
    model.update(Some(Message::Exit)).expect("update");
    assert!(model.popup().is_none());
}
