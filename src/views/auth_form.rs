use std::sync::Arc;

use tracing::{error, info, warn};

use crate::auth::{AuthClient, Session, login_email};
use crate::domain::{CMDMode, FlotaError, FlotaResult};
use crate::fetch::{Fetcher, RequestTracker};
use crate::record::Record;
use crate::services;
use crate::store::RecordStore;
use crate::views::Outcome;

pub const PASSWORD_MISMATCH: &str = "Las contraseñas no coinciden";
pub const USERNAME_TAKEN: &str = "El nombre de usuario ya está registrado";
pub const REGISTERED: &str = "¡Registro exitoso! Por favor verifica tu email";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormKind {
    Login,
    Register,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormField {
    Username,
    FullName,
    Password,
    ConfirmPassword,
    Submit,
}

impl FormField {
    pub fn label(&self) -> &'static str {
        match self {
            FormField::Username => "Usuario",
            FormField::FullName => "Nombre completo",
            FormField::Password => "Contraseña",
            FormField::ConfirmPassword => "Confirmar contraseña",
            FormField::Submit => "Enviar",
        }
    }

    pub fn cmd_mode(&self) -> Option<CMDMode> {
        match self {
            FormField::Username => Some(CMDMode::Username),
            FormField::FullName => Some(CMDMode::FullName),
            FormField::Password => Some(CMDMode::Password),
            FormField::ConfirmPassword => Some(CMDMode::ConfirmPassword),
            FormField::Submit => None,
        }
    }
}

const LOGIN_FIELDS: &[FormField] = &[FormField::Username, FormField::Password, FormField::Submit];
const REGISTER_FIELDS: &[FormField] = &[
    FormField::Username,
    FormField::FullName,
    FormField::Password,
    FormField::ConfirmPassword,
    FormField::Submit,
];

/// Signs in, confirms the user behind the token and fetches their profile.
pub fn sign_in(
    store: &dyn RecordStore,
    auth: &dyn AuthClient,
    email: &str,
    password: &str,
) -> FlotaResult<(Session, Option<Record>)> {
    let mut session = auth.sign_in(email, password)?;
    session.user = auth.get_user(&session)?;
    store.set_access_token(Some(session.access_token.clone()));
    let profile = match services::fetch_profile(store, &session.user.id) {
        Ok(profile) => Some(profile),
        Err(e) => {
            warn!("No profile for {}: {e}", session.user.id);
            None
        }
    };
    Ok((session, profile))
}

/// Creates the account under `{username}@{email_domain}` and its profile row.
/// Returns the normalized username.
pub fn register(
    store: &dyn RecordStore,
    auth: &dyn AuthClient,
    email_domain: &str,
    username: &str,
    full_name: &str,
    password: &str,
) -> FlotaResult<String> {
    let username = username.trim().to_lowercase();
    if username.is_empty() {
        return Err(FlotaError::AuthError("El nombre de usuario es obligatorio".into()));
    }
    if services::username_taken(store, &username)? {
        return Err(FlotaError::AuthError(USERNAME_TAKEN.into()));
    }
    let (user, session) = auth.sign_up(&format!("{username}@{email_domain}"), password)?;
    if let Some(session) = &session {
        store.set_access_token(Some(session.access_token.clone()));
    }
    let upserted = services::upsert_profile(store, &user.id, &username, full_name.trim());
    if session.is_some() {
        store.set_access_token(None);
    }
    upserted?;
    info!("Registered {username} as {}", user.id);
    Ok(username)
}

/// Login and register forms. Text is collected through the command line one
/// field at a time.
pub struct AuthForm {
    kind: FormKind,
    username: String,
    full_name: String,
    password: String,
    confirm_password: String,
    focus: usize,
    error: Option<String>,
    notice: Option<String>,
    tracker: RequestTracker,
}

impl AuthForm {
    pub fn new(kind: FormKind) -> Self {
        AuthForm {
            kind,
            username: String::new(),
            full_name: String::new(),
            password: String::new(),
            confirm_password: String::new(),
            focus: 0,
            error: None,
            notice: None,
            tracker: RequestTracker::default(),
        }
    }

    pub fn kind(&self) -> FormKind {
        self.kind
    }

    /// Switches between login and register, keeping the username.
    pub fn set_kind(&mut self, kind: FormKind) {
        if self.kind != kind {
            self.kind = kind;
            self.focus = 0;
            self.error = None;
            self.password.clear();
            self.confirm_password.clear();
        }
    }

    pub fn fields(&self) -> &'static [FormField] {
        match self.kind {
            FormKind::Login => LOGIN_FIELDS,
            FormKind::Register => REGISTER_FIELDS,
        }
    }

    pub fn focused(&self) -> FormField {
        self.fields().get(self.focus).copied().unwrap_or(FormField::Submit)
    }

    pub fn focus_next(&mut self) {
        self.focus = (self.focus + 1) % self.fields().len();
    }

    pub fn focus_previous(&mut self) {
        let len = self.fields().len();
        self.focus = (self.focus + len - 1) % len;
    }

    pub fn value(&self, field: FormField) -> &str {
        match field {
            FormField::Username => &self.username,
            FormField::FullName => &self.full_name,
            FormField::Password => &self.password,
            FormField::ConfirmPassword => &self.confirm_password,
            FormField::Submit => "",
        }
    }

    /// What the form shows for `field`; secrets are masked.
    pub fn display_value(&self, field: FormField) -> String {
        match field {
            FormField::Password | FormField::ConfirmPassword => "•".repeat(self.value(field).chars().count()),
            _ => self.value(field).to_string(),
        }
    }

    pub fn set_value(&mut self, mode: CMDMode, value: &str) {
        match mode {
            CMDMode::Username | CMDMode::Email => self.username = value.trim().to_string(),
            CMDMode::FullName => self.full_name = value.to_string(),
            CMDMode::Password => self.password = value.to_string(),
            CMDMode::ConfirmPassword => self.confirm_password = value.to_string(),
            _ => return,
        }
        self.error = self.password_error().map(str::to_string);
        if self.focused().cmd_mode() == Some(mode) {
            self.focus_next();
        }
    }

    /// Live check while registering, as soon as a confirmation was typed.
    pub fn password_error(&self) -> Option<&'static str> {
        (self.kind == FormKind::Register
            && !self.confirm_password.is_empty()
            && self.password != self.confirm_password)
            .then_some(PASSWORD_MISMATCH)
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    pub fn is_submitting(&self) -> bool {
        self.tracker.is_pending()
    }

    pub fn submit(
        &mut self,
        store: Arc<dyn RecordStore>,
        auth: Arc<dyn AuthClient>,
        email_domain: &str,
        fetcher: &Fetcher<Outcome>,
    ) {
        if self.is_submitting() {
            return;
        }
        self.notice = None;
        match self.kind {
            FormKind::Login => {
                if self.username.is_empty() || self.password.is_empty() {
                    self.error = Some("Ingrese usuario y contraseña".into());
                    return;
                }
                self.error = None;
                let email = login_email(&self.username, email_domain);
                let password = self.password.clone();
                let token = self.tracker.issue();
                fetcher.spawn(move || Outcome::SignedIn {
                    token,
                    result: sign_in(store.as_ref(), auth.as_ref(), &email, &password),
                });
            }
            FormKind::Register => {
                if self.password != self.confirm_password {
                    self.error = Some(PASSWORD_MISMATCH.into());
                    return;
                }
                self.error = None;
                let (username, full_name, password) =
                    (self.username.clone(), self.full_name.clone(), self.password.clone());
                let domain = email_domain.to_string();
                let token = self.tracker.issue();
                fetcher.spawn(move || Outcome::Registered {
                    token,
                    result: register(store.as_ref(), auth.as_ref(), &domain, &username, &full_name, &password),
                });
            }
        }
    }

    pub fn apply_sign_in(
        &mut self,
        token: u64,
        result: FlotaResult<(Session, Option<Record>)>,
    ) -> Option<(Session, Option<Record>)> {
        match self.tracker.accept(token, result)? {
            Ok(signed_in) => {
                self.password.clear();
                self.focus = 0;
                Some(signed_in)
            }
            Err(e) => {
                error!("Sign in failed: {e}");
                self.error = Some(e.to_string());
                None
            }
        }
    }

    /// On success the form is cleared and switched to login.
    pub fn apply_registered(&mut self, token: u64, result: FlotaResult<String>) -> bool {
        match self.tracker.accept(token, result) {
            Some(Ok(username)) => {
                *self = AuthForm {
                    username,
                    notice: Some(REGISTERED.into()),
                    tracker: std::mem::take(&mut self.tracker),
                    ..AuthForm::new(FormKind::Login)
                };
                true
            }
            Some(Err(e)) => {
                error!("Registration failed: {e}");
                self.error = Some(match e {
                    FlotaError::AuthError(message) => message,
                    other => other.to_string(),
                });
                false
            }
            None => false,
        }
    }
}
