//! Services, auth and config running against fixture directories.

use std::fs;
use std::path::PathBuf;

use flota::auth::{AuthClient, FIXTURE_USERS_TABLE, FixtureAuth};
use flota::config::{Backend, FlotaConfig};
use flota::domain::FlotaError;
use flota::services::{self, maintenance_alerts};
use flota::store::{MemoryStore, Query, RecordStore};
use flota::views::auth_form::{USERNAME_TAKEN, register, sign_in};
use tempfile::tempdir;

fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn store() -> MemoryStore {
    MemoryStore::load_dir(&fixtures_dir()).expect("fixtures load")
}

fn auth(store: &MemoryStore) -> FixtureAuth {
    let accounts = store.select(&Query::from(FIXTURE_USERS_TABLE)).expect("accounts");
    FixtureAuth::from_records(&accounts)
}

#[test]
fn reports_carry_the_author_username() {
    let store = store();
    let reports = services::fetch_reports(&store).expect("reports");
    assert_eq!(reports.len(), 6);

    let first = reports.iter().find(|r| r.id().as_deref() == Some("1")).expect("report 1");
    assert_eq!(first.resolve_string("profiles.username").as_deref(), Some("ana"));

    let orphan = reports.iter().find(|r| r.id().as_deref() == Some("6")).expect("report 6");
    assert_eq!(orphan.resolve_string("profiles.username"), None);
}

#[test]
fn detail_and_signature_resolve() {
    let store = store();
    let detail = services::fetch_inspection_detail(&store, "3").expect("detail");
    assert_eq!(detail.resolve_string("placas_vehiculo").as_deref(), Some("ABC-123"));
    assert_eq!(services::trip_distance(&detail), Some(4900.0));

    let signature_id = detail.resolve_string("user_signature_id").expect("signature id");
    let signature = services::fetch_signature(&store, &signature_id).expect("signature");
    assert_eq!(
        signature.resolve_string("signature_url").as_deref(),
        Some("https://storage.example.com/firmas/ana-2.png")
    );

    match services::fetch_inspection_detail(&store, "999") {
        Err(FlotaError::NotSingleRow { found, .. }) => assert_eq!(found, 0),
        other => panic!("expected NotSingleRow, got {other:?}"),
    }
}

#[test]
fn mileage_sums_every_trip_per_plate() {
    let store = store();
    let vehicles = services::fetch_vehicle_mileage(&store).expect("mileage");
    let plates: Vec<(&str, f64)> = vehicles.iter().map(|v| (v.plate.as_str(), v.kilometers)).collect();
    assert_eq!(plates, vec![("ABC-123", 10_000.0), ("JKL-456", 350.0), ("XYZ-987", 400.0)]);

    let alerts = maintenance_alerts(&vehicles, services::DEFAULT_MAINTENANCE_THRESHOLD_KM);
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].plate, "ABC-123");
}

#[test]
fn fixture_accounts_sign_in_with_profile() {
    let store = store();
    let auth = auth(&store);

    let (session, profile) = sign_in(&store, &auth, "ana@cfe.com.mx", "flota123").expect("sign in");
    assert_eq!(session.user.id, "u1");
    assert_eq!(
        profile.and_then(|p| p.resolve_string("username")).as_deref(),
        Some("ana")
    );

    assert!(matches!(
        sign_in(&store, &auth, "ana@cfe.com.mx", "wrong"),
        Err(FlotaError::AuthError(_))
    ));
}

#[test]
fn registration_creates_a_usable_account() {
    let store = store();
    let auth = auth(&store);

    let username = register(&store, &auth, "cfe.com.mx", "  Pedro ", "Pedro Sol", "secreto").expect("register");
    assert_eq!(username, "pedro");
    assert!(services::username_taken(&store, "pedro").expect("lookup"));

    let (session, profile) = sign_in(&store, &auth, "pedro@cfe.com.mx", "secreto").expect("sign in");
    assert!(auth.get_user(&session).is_ok());
    assert_eq!(
        profile.and_then(|p| p.resolve_string("full_name")).as_deref(),
        Some("Pedro Sol")
    );

    match register(&store, &auth, "cfe.com.mx", "ANA", "Otra Ana", "secreto") {
        Err(FlotaError::AuthError(message)) => assert_eq!(message, USERNAME_TAKEN),
        other => panic!("expected a taken username, got {other:?}"),
    }
}

#[test]
fn only_json_files_become_tables() {
    let dir = tempdir().expect("tempdir");
    fs::write(dir.path().join("profiles.json"), r#"[{"id": "u1", "username": "ana"}]"#).expect("write");
    fs::write(dir.path().join("README.txt"), "not a table").expect("write");

    let store = MemoryStore::load_dir(dir.path()).expect("load");
    assert_eq!(services::fetch_profiles(&store).expect("profiles").len(), 1);
    assert!(matches!(
        services::fetch_vales(&store),
        Err(FlotaError::FixtureMissing(table)) if table == services::VALES
    ));
}

#[test]
fn malformed_fixture_fails_to_load() {
    let dir = tempdir().expect("tempdir");
    fs::write(dir.path().join("vales.json"), "[{\"id\": 1,").expect("write");
    assert!(matches!(
        MemoryStore::load_dir(dir.path()),
        Err(FlotaError::DecodeError(_))
    ));
}

#[test]
fn config_file_selects_the_fixture_backend() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("config.toml");
    let body = format!(
        "fixtures_dir = {:?}\npage_size = 10\nmaintenance_threshold_km = 5000.0\n",
        fixtures_dir().display().to_string()
    );
    fs::write(&path, body).expect("write");

    let config = FlotaConfig::load(path.to_str()).expect("load");
    assert_eq!(config.page_size, 10);
    assert_eq!(config.maintenance_threshold_km, 5000.0);
    assert_eq!(config.backend().expect("backend"), Backend::Fixtures(fixtures_dir()));
    assert!(config.validate().is_ok());
}

#[test]
fn unknown_config_keys_are_rejected() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("config.toml");
    fs::write(&path, "page_sise = 10\n").expect("write");
    assert!(matches!(
        FlotaConfig::load(path.to_str()),
        Err(FlotaError::ConfigParseError(_))
    ));
    assert!(matches!(
        FlotaConfig::load(dir.path().join("missing.toml").to_str()),
        Err(FlotaError::ConfigError(_))
    ));
}
