use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::auth::User;
use crate::domain::FlotaResult;
use crate::fetch::{Fetcher, RequestTracker};
use crate::filter::FilterState;
use crate::record::Record;
use crate::services;
use crate::store::RecordStore;
use crate::table::{Cell, CellKind, ColumnDef};
use crate::views::reports::NO_USER;
use crate::views::{FilteredTable, Outcome};

pub const USER_ACCESSOR: &str = "profiles.username";
pub const ALL_USERS: &str = "Todos los usuarios";

/// Everything one vales load brings back.
#[derive(Debug, Clone, PartialEq)]
pub struct ValesData {
    pub current_username: Option<String>,
    pub vales: Vec<Record>,
    pub signature_url: Option<String>,
    /// Usernames for the selector, current user excluded.
    pub users: Vec<String>,
}

fn vale_columns(signature_url: Option<String>) -> Vec<ColumnDef> {
    vec![
        ColumnDef::new("id", "ID"),
        ColumnDef::new("created_at", "Fecha")
            .kind(CellKind::date())
            .placeholder("Fecha inválida"),
        ColumnDef::new(USER_ACCESSOR, "Usuario").placeholder(NO_USER),
        ColumnDef::new("vale_url", "Vale").kind(CellKind::Image),
        // Every row shows the signature of the first vale.
        ColumnDef::new("signature_id", "Firma")
            .kind(CellKind::custom(move |_, _| {
                signature_url.clone().map(|url| Cell::Image { url })
            }))
            .placeholder("Sin firma"),
    ]
}

fn load_vales(store: &dyn RecordStore, user: Option<&User>) -> FlotaResult<ValesData> {
    let current_username = match user {
        Some(user) => services::fetch_profile(store, &user.id)?.resolve_string("username"),
        None => None,
    };

    let vales = services::fetch_vales(store)?;

    let signature_url = match vales.first().and_then(|v| v.resolve_string("signature_id")) {
        Some(id) => match services::fetch_signature(store, &id) {
            Ok(signature) => signature.resolve_string("signature_url"),
            Err(e) => {
                warn!("Signature {id} of the first vale is unavailable: {e}");
                None
            }
        },
        None => None,
    };

    let users = services::fetch_profiles(store)?
        .iter()
        .filter_map(|p| p.resolve_string("username"))
        .filter(|name| Some(name) != current_username.as_ref())
        .collect();

    Ok(ValesData {
        current_username,
        vales,
        signature_url,
        users,
    })
}

/// Fuel vouchers, filterable by user and by the day they were created.
pub struct ValesView {
    list: FilteredTable,
    users: Vec<String>,
    selected_user: Option<usize>,
    current_username: Option<String>,
    signature_url: Option<String>,
    loaded_for: Option<Option<String>>,
    tracker: RequestTracker,
}

impl ValesView {
    pub fn new(page_size: usize) -> Self {
        ValesView {
            list: FilteredTable::new(
                vale_columns(None),
                page_size,
                FilterState::new("created_at").with_selector(USER_ACCESSOR),
            ),
            users: Vec::new(),
            selected_user: None,
            current_username: None,
            signature_url: None,
            loaded_for: None,
            tracker: RequestTracker::default(),
        }
    }

    pub fn list(&self) -> &FilteredTable {
        &self.list
    }

    pub fn list_mut(&mut self) -> &mut FilteredTable {
        &mut self.list
    }

    pub fn users(&self) -> &[String] {
        &self.users
    }

    pub fn selected_user(&self) -> Option<&str> {
        self.selected_user.and_then(|idx| self.users.get(idx)).map(String::as_str)
    }

    pub fn selected_user_label(&self) -> &str {
        self.selected_user().unwrap_or(ALL_USERS)
    }

    pub fn current_username(&self) -> Option<&str> {
        self.current_username.as_deref()
    }

    pub fn signature_url(&self) -> Option<&str> {
        self.signature_url.as_deref()
    }

    pub fn is_loading(&self) -> bool {
        self.tracker.is_pending()
    }

    /// True when the data on screen was loaded for somebody else.
    pub fn needs_reload(&self, user: Option<&User>) -> bool {
        self.loaded_for.as_ref() != Some(&user.map(|u| u.id.clone()))
    }

    pub fn load(&mut self, user: Option<User>, store: Arc<dyn RecordStore>, fetcher: &Fetcher<Outcome>) {
        self.loaded_for = Some(user.as_ref().map(|u| u.id.clone()));
        let token = self.tracker.issue();
        debug!("Loading vales for {:?} (request {token})", user.as_ref().map(|u| &u.id));
        fetcher.spawn(move || Outcome::Vales {
            token,
            result: load_vales(store.as_ref(), user.as_ref()),
        });
    }

    pub fn apply(&mut self, token: u64, result: FlotaResult<ValesData>) -> Option<String> {
        match self.tracker.accept(token, result)? {
            Ok(data) => {
                info!("Loaded {} vales and {} users", data.vales.len(), data.users.len());
                let selected = self.selected_user().map(str::to_string);
                self.current_username = data.current_username;
                self.users = data.users;
                self.selected_user = selected.and_then(|name| self.users.iter().position(|u| *u == name));
                if self.signature_url != data.signature_url {
                    self.signature_url = data.signature_url;
                    self.list
                        .table_mut()
                        .set_columns(vale_columns(self.signature_url.clone()));
                }
                self.list
                    .set_selector(USER_ACCESSOR, self.selected_user().map(str::to_string));
                self.list.set_records(data.vales);
                None
            }
            Err(e) => {
                error!("Could not load vales: {e}");
                Some(format!("Error cargando vales: {e}"))
            }
        }
    }

    pub fn next_user(&mut self) {
        self.selected_user = match self.selected_user {
            None if !self.users.is_empty() => Some(0),
            Some(idx) if idx + 1 < self.users.len() => Some(idx + 1),
            _ => None,
        };
        self.apply_user();
    }

    pub fn previous_user(&mut self) {
        self.selected_user = match self.selected_user {
            None => self.users.len().checked_sub(1),
            Some(0) => None,
            Some(idx) => Some(idx - 1),
        };
        self.apply_user();
    }

    fn apply_user(&mut self) {
        let user = self.selected_user().map(str::to_string);
        self.list.set_selector(USER_ACCESSOR, user);
    }

    pub fn reset_filters(&mut self) {
        self.selected_user = None;
        self.list.reset_filters();
    }
}
