use arboard::Clipboard;
use ratatui::crossterm::event::KeyEvent;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

use crate::auth::{AuthClient, Session, SessionState, Subscription, User};
use crate::config::FlotaConfig;
use crate::domain::{CMDMode, FlotaResult, HELP_TEXT, Message};
use crate::fetch::Fetcher;
use crate::inputter::{InputResult, Inputter};
use crate::record::Record;
use crate::routes::{Navigation, Route, guard};
use crate::store::RecordStore;
use crate::table::{Cell, TableEngine};
use crate::views::auth_form::REGISTERED;
use crate::views::{
    AuthForm, FilteredTable, FormField, FormKind, MileageView, Outcome, ReportDetailView, ReportsView, ValesView,
};

#[derive(Debug, PartialEq)]
pub enum Status {
    READY,
    LOADING,
    QUITTING,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Modus {
    VIEW,
    POPUP,
    CMDINPUT,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Popup {
    pub title: String,
    pub body: String,
    /// What `y` copies while the popup is open.
    pub payload: Option<String>,
}

#[derive(Default, Clone, Copy, Debug)]
pub struct UILayout {
    pub width: usize,
    pub height: usize,
}

pub struct Model {
    config: FlotaConfig,
    pub status: Status,
    modus: Modus,
    previous_modus: Modus,
    route: Route,
    pending: Option<Route>,
    session: SessionState,
    profile: Option<Record>,
    session_changes: Rc<RefCell<Vec<Option<User>>>>,
    _session_subscription: Subscription,
    store: Arc<dyn RecordStore>,
    auth: Arc<dyn AuthClient>,
    fetcher: Fetcher<Outcome>,
    reports: ReportsView,
    detail: ReportDetailView,
    vales: ValesView,
    mileage: MileageView,
    auth_form: AuthForm,
    clipboard: Option<Clipboard>,
    input: Inputter,
    cmd_mode: Option<CMDMode>,
    last_input: InputResult,
    active_cmdinput: bool,
    popup: Option<Popup>,
    status_message: String,
    last_status_message_update: Instant,
    uilayout: UILayout,
}

impl Model {
    pub fn init(
        config: &FlotaConfig,
        store: Arc<dyn RecordStore>,
        auth: Arc<dyn AuthClient>,
        ui_width: usize,
        ui_height: usize,
    ) -> Self {
        let session = SessionState::new();
        let session_changes: Rc<RefCell<Vec<Option<User>>>> = Rc::default();
        let sink = Rc::clone(&session_changes);
        let subscription = session.subscribe(move |s| sink.borrow_mut().push(s.map(|s| s.user.clone())));

        Self {
            config: config.clone(),
            status: Status::READY,
            modus: Modus::VIEW,
            previous_modus: Modus::VIEW,
            route: Route::Login,
            pending: None,
            session,
            profile: None,
            session_changes,
            _session_subscription: subscription,
            store,
            auth,
            fetcher: Fetcher::new(),
            reports: ReportsView::new(config.page_size),
            detail: ReportDetailView::new(),
            vales: ValesView::new(config.page_size),
            mileage: MileageView::new(config.page_size, config.maintenance_threshold_km),
            auth_form: AuthForm::new(FormKind::Login),
            clipboard: None,
            input: Inputter::default(),
            cmd_mode: None,
            last_input: InputResult::default(),
            active_cmdinput: false,
            popup: None,
            status_message: "Bienvenido a flota".to_string(),
            last_status_message_update: Instant::now(),
            uilayout: UILayout {
                width: ui_width,
                height: ui_height,
            },
        }
    }

    /// Resolves the initial session and opens `route`. With credentials the
    /// route waits until the sign in settles.
    pub fn start(&mut self, route: Route, credentials: Option<(String, String)>) {
        match credentials {
            Some((email, password)) => {
                info!("Signing in {email} on startup");
                self.auth_form.set_value(CMDMode::Email, &email);
                self.auth_form.set_value(CMDMode::Password, &password);
                self.submit_auth_form();
                if self.auth_form.is_submitting() {
                    self.status = Status::LOADING;
                } else {
                    // Nothing went out, so nothing will end the session lookup.
                    warn!("Startup sign in for {email} was not sent");
                    self.session.resolve_anonymous();
                }
            }
            None => self.session.resolve_anonymous(),
        }
        self.navigate(route);
        self.process_session_changes();
    }

    // ------------------------------ Accessors ------------------------------ //

    pub fn config(&self) -> &FlotaConfig {
        &self.config
    }

    pub fn route(&self) -> &Route {
        &self.route
    }

    /// The requested route is on hold until the session lookup finishes.
    pub fn is_waiting(&self) -> bool {
        self.pending.is_some()
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn user_label(&self) -> Option<String> {
        let from_profile = self.profile.as_ref().and_then(|p| p.resolve_string("username"));
        from_profile.or_else(|| {
            self.session
                .current_user()
                .map(|u| u.email.clone().unwrap_or_else(|| u.id.clone()))
        })
    }

    pub fn reports(&self) -> &ReportsView {
        &self.reports
    }

    pub fn detail(&self) -> &ReportDetailView {
        &self.detail
    }

    pub fn vales(&self) -> &ValesView {
        &self.vales
    }

    pub fn mileage(&self) -> &MileageView {
        &self.mileage
    }

    pub fn auth_form(&self) -> &AuthForm {
        &self.auth_form
    }

    pub fn popup(&self) -> Option<&Popup> {
        self.popup.as_ref()
    }

    pub fn status_message(&self) -> &str {
        &self.status_message
    }

    pub fn last_status_message_update(&self) -> Instant {
        self.last_status_message_update
    }

    /// Prompt and current text while the command line is collecting input.
    pub fn cmd_line(&self) -> Option<(CMDMode, &InputResult)> {
        if self.active_cmdinput {
            self.cmd_mode.map(|mode| (mode, &self.last_input))
        } else {
            None
        }
    }

    pub fn raw_keyevents(&self) -> bool {
        self.active_cmdinput
    }

    pub fn quit(&mut self) {
        self.status = Status::QUITTING;
    }

    fn set_status_message(&mut self, message: impl Into<String>) {
        self.status_message = message.into();
        self.last_status_message_update = Instant::now();
        trace!("Status: {}", self.status_message);
    }

    // ----------------------------- Navigation ------------------------------ //

    pub fn navigate(&mut self, route: Route) {
        match guard(route.clone(), &self.session) {
            Navigation::Wait => {
                debug!("Holding {} until the session resolves", route.path());
                self.pending = Some(route);
            }
            Navigation::Redirect(to) => {
                debug!("Redirecting {} -> {}", route.path(), to.path());
                self.navigate(to);
            }
            Navigation::Render(route) => {
                info!("Opening {}", route.path());
                self.pending = None;
                self.route = route.clone();
                self.mount(route);
            }
        }
    }

    /// Fresh data every time a screen is opened.
    fn mount(&mut self, route: Route) {
        let store = Arc::clone(&self.store);
        match route {
            Route::Reports => self.reports.load(store, &self.fetcher),
            Route::ReportDetail(id) => self.detail.load(&id, store, &self.fetcher),
            Route::Vales => {
                let user = self.session.current_user().cloned();
                self.vales.load(user, store, &self.fetcher);
            }
            Route::Mileage => self.mileage.load(store, &self.fetcher),
            Route::Login => self.auth_form.set_kind(FormKind::Login),
            Route::Register => self.auth_form.set_kind(FormKind::Register),
            Route::NotFound => self.set_status_message("Página no encontrada"),
        }
    }

    /// Re-runs the guard after the session changed under the current screen.
    fn reguard(&mut self) {
        if let Some(route) = self.pending.take() {
            self.navigate(route);
            return;
        }
        if !matches!(guard(self.route.clone(), &self.session), Navigation::Render(_)) {
            self.navigate(self.route.clone());
        }
    }

    fn process_session_changes(&mut self) {
        let changes: Vec<Option<User>> = self.session_changes.borrow_mut().drain(..).collect();
        if changes.is_empty() {
            return;
        }
        for user in changes.iter() {
            debug!("Session changed: {:?}", user.as_ref().map(|u| &u.id));
        }
        self.reguard();
        let user = self.session.current_user().cloned();
        if self.route == Route::Vales && self.vales.needs_reload(user.as_ref()) {
            self.vales.load(user, Arc::clone(&self.store), &self.fetcher);
        }
    }

    // ---------------------------- Background work ---------------------------- //

    /// Applies every finished request. Returns true when something arrived.
    pub fn poll_fetches(&mut self) -> bool {
        let outcomes = self.fetcher.drain();
        let changed = !outcomes.is_empty();
        for outcome in outcomes {
            self.apply_outcome(outcome);
        }
        changed
    }

    /// Waits up to `timeout` for one request to finish and applies it.
    pub fn wait_for_fetch(&mut self, timeout: Duration) -> bool {
        match self.fetcher.recv_timeout(timeout) {
            Some(outcome) => {
                self.apply_outcome(outcome);
                true
            }
            None => false,
        }
    }

    pub fn is_loading(&self) -> bool {
        self.reports.is_loading()
            || self.detail.is_loading()
            || self.vales.is_loading()
            || self.mileage.is_loading()
            || self.auth_form.is_submitting()
    }

    fn apply_outcome(&mut self, outcome: Outcome) {
        let failure = match outcome {
            Outcome::Reports { token, result } => self.reports.apply(token, result),
            Outcome::ReportDetail { token, result } => self.detail.apply(token, result),
            Outcome::Vales { token, result } => self.vales.apply(token, result),
            Outcome::Mileage { token, result } => self.mileage.apply(token, result),
            Outcome::SignedIn { token, result } => {
                self.signed_in(token, result);
                None
            }
            Outcome::Registered { token, result } => {
                if self.auth_form.apply_registered(token, result) {
                    self.set_status_message(REGISTERED);
                    self.navigate(Route::Login);
                } else if let Some(e) = self.auth_form.error() {
                    let message = e.to_string();
                    self.set_status_message(message);
                }
                None
            }
            Outcome::SignedOut(result) => {
                if let Err(e) = result {
                    warn!("Sign out was not confirmed by the backend: {e}");
                }
                None
            }
        };
        if let Some(message) = failure {
            self.set_status_message(message);
        }
        if self.status == Status::LOADING && !self.is_loading() {
            self.status = Status::READY;
        }
        self.process_session_changes();
    }

    fn signed_in(&mut self, token: u64, result: FlotaResult<(Session, Option<Record>)>) {
        match self.auth_form.apply_sign_in(token, result) {
            Some((session, profile)) => {
                self.profile = profile;
                self.session.set_session(Some(session));
                let who = self.user_label().unwrap_or_default();
                self.set_status_message(format!("Sesión iniciada como {who}"));
            }
            None => {
                if let Some(e) = self.auth_form.error() {
                    let message = format!("Error al iniciar sesión: {e}");
                    self.set_status_message(message);
                }
                // A failed startup sign in still has to end the session lookup.
                self.session.resolve_anonymous();
            }
        }
    }

    fn submit_auth_form(&mut self) {
        self.auth_form.submit(
            Arc::clone(&self.store),
            Arc::clone(&self.auth),
            &self.config.email_domain,
            &self.fetcher,
        );
        if let Some(e) = self.auth_form.error() {
            let message = e.to_string();
            self.set_status_message(message);
        }
    }

    fn logout(&mut self) {
        let Some(session) = self.session.session().cloned() else {
            return;
        };
        let auth = Arc::clone(&self.auth);
        self.fetcher.spawn(move || Outcome::SignedOut(auth.sign_out(&session)));
        self.store.set_access_token(None);
        self.profile = None;
        self.session.set_session(None);
        self.set_status_message("Sesión cerrada");
        self.process_session_changes();
    }

    // ------------------------------ Update loop ------------------------------ //

    fn ui_resize(&mut self, width: usize, height: usize) {
        trace!(
            "UI was resized! w:{}->{}, h:{}->{}",
            self.uilayout.width, width, self.uilayout.height, height
        );
        self.uilayout = UILayout { width, height };
    }

    pub fn update(&mut self, message: Option<Message>) -> FlotaResult<()> {
        let Some(msg) = message else {
            return Ok(());
        };
        trace!("Update: Modus {:?}, Message {:?}", self.modus, msg);
        match self.modus {
            Modus::CMDINPUT => {
                if let Message::RawKey(key) = msg {
                    self.raw_input(key)
                }
            }
            Modus::POPUP => match msg {
                Message::Quit => self.quit(),
                Message::Resize(width, height) => self.ui_resize(width, height),
                Message::CopyCell => {
                    if let Some(payload) = self.popup.as_ref().and_then(|p| p.payload.clone()) {
                        self.copy_to_clipboard(payload);
                    }
                }
                Message::Exit | Message::Enter | Message::Help => self.close_popup(),
                _ => (),
            },
            Modus::VIEW => match msg {
                Message::Quit => self.quit(),
                Message::Resize(width, height) => self.ui_resize(width, height),
                Message::Help => self.show_popup("Ayuda", HELP_TEXT.to_string(), None),
                Message::Navigate(route) => self.navigate(route),
                Message::Refresh => {
                    self.set_status_message("Recargando ...");
                    self.mount(self.route.clone());
                }
                Message::Logout => self.logout(),
                Message::GotoReport if self.session.is_authenticated() => {
                    self.enter_cmd_mode(CMDMode::GotoReport, "")
                }
                msg => self.route_message(msg),
            },
        }
        Ok(())
    }

    fn route_message(&mut self, msg: Message) {
        match self.route.clone() {
            Route::Reports => match msg {
                Message::Enter => {
                    if let Some(id) = self.reports.selected_report_id() {
                        self.navigate(Route::ReportDetail(id));
                    }
                }
                Message::Search => {
                    let term = self.reports.list().filters().search_term.clone();
                    self.enter_cmd_mode(CMDMode::Search, &term);
                }
                msg => {
                    if !Self::list_message(self.reports.list_mut(), &msg) {
                        self.list_filter_message(msg);
                    }
                }
            },
            Route::Vales => match msg {
                Message::NextUser => self.vales.next_user(),
                Message::PreviousUser => self.vales.previous_user(),
                Message::ResetFilters => {
                    self.vales.reset_filters();
                    self.set_status_message("Filtros reseteados");
                }
                Message::Enter => self.open_selected_image(),
                msg => {
                    if !Self::list_message(self.vales.list_mut(), &msg) {
                        self.list_filter_message(msg);
                    }
                }
            },
            Route::ReportDetail(_) => match msg {
                Message::MoveDown => self.detail.scroll_down(),
                Message::MoveUp => self.detail.scroll_up(),
                Message::Exit => self.navigate(Route::Reports),
                Message::Enter => match self.detail.signature_url().map(str::to_string) {
                    Some(url) => self.show_popup("Firma del Usuario", url.clone(), Some(url)),
                    None if self.detail.signature_pending() => self.set_status_message("Cargando firma..."),
                    None => self.set_status_message("El reporte no tiene firma"),
                },
                Message::CopyCell => {
                    if let Some(url) = self.detail.signature_url().map(str::to_string) {
                        self.copy_to_clipboard(url);
                    }
                }
                _ => (),
            },
            Route::Mileage => {
                Self::table_message(self.mileage.table_mut(), &msg);
            }
            Route::Login | Route::Register => match msg {
                Message::MoveDown | Message::MoveRight => self.auth_form.focus_next(),
                Message::MoveUp | Message::MoveLeft => self.auth_form.focus_previous(),
                Message::Enter => match self.auth_form.focused() {
                    FormField::Submit => self.submit_auth_form(),
                    field => {
                        if let Some(mode) = field.cmd_mode() {
                            let current = if mode.is_secret() {
                                String::new()
                            } else {
                                self.auth_form.value(field).to_string()
                            };
                            self.enter_cmd_mode(mode, &current);
                        }
                    }
                },
                Message::SwitchAuthForm => match self.auth_form.kind() {
                    FormKind::Login => self.navigate(Route::Register),
                    FormKind::Register => self.navigate(Route::Login),
                },
                _ => (),
            },
            Route::NotFound => {
                if matches!(msg, Message::Enter | Message::Exit) {
                    self.navigate(Route::ROOT);
                }
            }
        }
    }

    /// Paging and cursor movement shared by every table screen.
    fn table_message(table: &mut TableEngine, msg: &Message) -> bool {
        match msg {
            Message::MoveDown => table.select_next_row(),
            Message::MoveUp => table.select_previous_row(),
            Message::MoveRight => table.select_next_column(),
            Message::MoveLeft => table.select_previous_column(),
            Message::NextPage => table.next_page(),
            Message::PreviousPage => table.previous_page(),
            Message::FirstPage => table.first_page(),
            Message::LastPage => table.last_page(),
            _ => return false,
        }
        true
    }

    fn list_message(list: &mut FilteredTable, msg: &Message) -> bool {
        Self::table_message(list.table_mut(), msg)
    }

    fn active_list(&self) -> Option<&FilteredTable> {
        match self.route {
            Route::Reports => Some(self.reports.list()),
            Route::Vales => Some(self.vales.list()),
            _ => None,
        }
    }

    fn active_list_mut(&mut self) -> Option<&mut FilteredTable> {
        match self.route {
            Route::Reports => Some(self.reports.list_mut()),
            Route::Vales => Some(self.vales.list_mut()),
            _ => None,
        }
    }

    fn list_filter_message(&mut self, msg: Message) {
        match msg {
            Message::DateStart => {
                let current = self.active_list().map(|l| l.date_inputs().0.to_string()).unwrap_or_default();
                self.enter_cmd_mode(CMDMode::DateStart, &current);
            }
            Message::DateEnd => {
                let current = self.active_list().map(|l| l.date_inputs().1.to_string()).unwrap_or_default();
                self.enter_cmd_mode(CMDMode::DateEnd, &current);
            }
            Message::ResetFilters => {
                if let Some(list) = self.active_list_mut() {
                    list.reset_filters();
                }
                self.set_status_message("Filtros reseteados");
            }
            Message::CopyCell => {
                if let Some(cell) = self.active_list().and_then(FilteredTable::selected_cell) {
                    self.copy_to_clipboard(cell.payload());
                }
            }
            _ => (),
        }
    }

    fn open_selected_image(&mut self) {
        match self.vales.list().selected_cell() {
            Some(Cell::Image { url }) => self.show_popup("Vista previa de la imagen", url.clone(), Some(url)),
            Some(_) => self.set_status_message("Seleccione la columna Vale o Firma para ver la imagen"),
            None => {}
        }
    }

    // ---------------------------- Popup & clipboard ---------------------------- //

    fn show_popup(&mut self, title: &str, body: String, payload: Option<String>) {
        self.previous_modus = self.modus;
        self.modus = Modus::POPUP;
        self.popup = Some(Popup {
            title: title.to_string(),
            body,
            payload,
        });
    }

    fn close_popup(&mut self) {
        trace!("Close popup ...");
        self.modus = self.previous_modus;
        self.previous_modus = Modus::POPUP;
        self.popup = None;
    }

    fn clipboard_set(&mut self, text: String) -> FlotaResult<()> {
        if self.clipboard.is_none() {
            self.clipboard = Some(Clipboard::new()?);
        }
        if let Some(clipboard) = self.clipboard.as_mut() {
            clipboard.set_text(text)?;
        }
        Ok(())
    }

    fn copy_to_clipboard(&mut self, text: String) {
        trace!("Cell content: {}", text);
        match self.clipboard_set(text) {
            Ok(_) => self.set_status_message("Copiado al portapapeles"),
            Err(e) => {
                error!("Error copying to clipboard: {e}");
                self.set_status_message(format!("No se pudo copiar: {e}"));
            }
        }
    }

    // ----------------------------- Command line ----------------------------- //

    fn raw_input(&mut self, key: KeyEvent) {
        if self.active_cmdinput {
            self.last_input = self.input.read(key);
            if self.last_input.finished {
                self.handle_cmd_input();
            }
        }
    }

    fn enter_cmd_mode(&mut self, mode: CMDMode, prefill: &str) {
        trace!("Entering command mode {mode:?} ...");
        self.previous_modus = self.modus;
        self.modus = Modus::CMDINPUT;
        self.cmd_mode = Some(mode);
        self.active_cmdinput = true;
        self.input.clear();
        self.input.set_secret(mode.is_secret());
        self.input.set(prefill);
        self.last_input = self.input.get();
    }

    fn handle_cmd_input(&mut self) {
        self.active_cmdinput = false;
        self.modus = self.previous_modus;
        self.previous_modus = Modus::CMDINPUT;

        let mode = self.cmd_mode.take();
        if self.last_input.canceled {
            trace!("Command input canceled");
            return;
        }
        let cmd_input = self.last_input.input.clone();
        match mode {
            Some(CMDMode::Search) => {
                self.reports.list_mut().set_search_term(&cmd_input);
                let total = self.reports.list().table().total_rows();
                self.set_status_message(format!("{total} reportes coinciden"));
            }
            Some(CMDMode::DateStart) => {
                if let Some(list) = self.active_list_mut() {
                    list.set_date_start(&cmd_input);
                }
            }
            Some(CMDMode::DateEnd) => {
                if let Some(list) = self.active_list_mut() {
                    list.set_date_end(&cmd_input);
                }
            }
            Some(
                mode @ (CMDMode::Email
                | CMDMode::Username
                | CMDMode::FullName
                | CMDMode::Password
                | CMDMode::ConfirmPassword),
            ) => self.auth_form.set_value(mode, &cmd_input),
            Some(CMDMode::GotoReport) => {
                let id = cmd_input.trim().trim_start_matches('#');
                if !id.is_empty() {
                    self.navigate(Route::ReportDetail(id.to_string()));
                }
            }
            None => info!("Cmd mode is none!"),
        }
        self.last_input = InputResult::default();
    }
}
