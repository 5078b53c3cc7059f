use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use std::sync::RwLock;
use std::time::Duration;

use reqwest::blocking::{Client, Response};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info, trace, warn};

use crate::domain::{FlotaError, FlotaResult};
use crate::record::Record;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Session {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    pub user: User,
}

/// Identity provider operations the dashboard relies on.
pub trait AuthClient: Send + Sync {
    fn sign_in(&self, email: &str, password: &str) -> FlotaResult<Session>;

    /// Returns a session only when the provider signs the user in right away
    /// (no email confirmation pending), plus the created user.
    fn sign_up(&self, email: &str, password: &str) -> FlotaResult<(User, Option<Session>)>;

    fn get_user(&self, session: &Session) -> FlotaResult<User>;

    fn sign_out(&self, session: &Session) -> FlotaResult<()>;
}

pub struct RestAuth {
    base_url: String,
    anon_key: String,
    client: Client,
}

impl RestAuth {
    pub fn new(base_url: &str, anon_key: &str, timeout: Duration) -> FlotaResult<Self> {
        Ok(RestAuth {
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key: anon_key.to_string(),
            client: Client::builder().timeout(timeout).build()?,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/auth/v1/{path}", self.base_url)
    }
}

// The identity api reports failures under a handful of different keys.
fn auth_error(response: Response) -> FlotaError {
    let status = response.status().as_u16();
    let body: Value = response.json().unwrap_or(Value::Null);
    let message = ["error_description", "msg", "message", "error"]
        .iter()
        .find_map(|key| body.get(*key).and_then(Value::as_str))
        .map(str::to_string)
        .unwrap_or_else(|| format!("status {status}"));
    FlotaError::AuthError(message)
}

impl AuthClient for RestAuth {
    fn sign_in(&self, email: &str, password: &str) -> FlotaResult<Session> {
        debug!("Signing in {email}");
        let response = self
            .client
            .post(self.url("token"))
            .query(&[("grant_type", "password")])
            .header("apikey", &self.anon_key)
            .json(&json!({"email": email, "password": password}))
            .send()?;
        if !response.status().is_success() {
            return Err(auth_error(response));
        }
        let session: Session = response.json()?;
        info!("Signed in as {}", session.user.id);
        Ok(session)
    }

    fn sign_up(&self, email: &str, password: &str) -> FlotaResult<(User, Option<Session>)> {
        debug!("Signing up {email}");
        let response = self
            .client
            .post(self.url("signup"))
            .header("apikey", &self.anon_key)
            .json(&json!({"email": email, "password": password}))
            .send()?;
        if !response.status().is_success() {
            return Err(auth_error(response));
        }
        let body: Value = response.json()?;
        if body.get("access_token").is_some() {
            let session: Session = serde_json::from_value(body)?;
            return Ok((session.user.clone(), Some(session)));
        }
        // Pending confirmation: the body is the bare user object.
        let user: User = serde_json::from_value(body.get("user").cloned().unwrap_or(body))?;
        Ok((user, None))
    }

    fn get_user(&self, session: &Session) -> FlotaResult<User> {
        let response = self
            .client
            .get(self.url("user"))
            .header("apikey", &self.anon_key)
            .bearer_auth(&session.access_token)
            .send()?;
        if !response.status().is_success() {
            return Err(auth_error(response));
        }
        Ok(response.json()?)
    }

    fn sign_out(&self, session: &Session) -> FlotaResult<()> {
        let response = self
            .client
            .post(self.url("logout"))
            .header("apikey", &self.anon_key)
            .bearer_auth(&session.access_token)
            .send()?;
        if !response.status().is_success() {
            return Err(auth_error(response));
        }
        Ok(())
    }
}

struct Account {
    user: User,
    password: String,
}

/// Offline identity provider for fixture mode. Accounts come from the
/// `auth_users` fixture table (`id`, `email`, `password`) and from sign ups
/// made during the run.
#[derive(Default)]
pub struct FixtureAuth {
    accounts: RwLock<HashMap<String, Account>>,
}

pub const FIXTURE_USERS_TABLE: &str = "auth_users";

impl FixtureAuth {
    pub fn new() -> Self {
        FixtureAuth::default()
    }

    pub fn from_records(records: &[Record]) -> Self {
        let auth = FixtureAuth::new();
        for record in records {
            match (
                record.resolve_string("id"),
                record.resolve_string("email"),
                record.resolve_string("password"),
            ) {
                (Some(id), Some(email), Some(password)) => auth.add(&email, &password, &id),
                _ => warn!("Skipping incomplete fixture account {:?}", record.id()),
            }
        }
        auth
    }

    pub fn with_user(self, email: &str, password: &str, id: &str) -> Self {
        self.add(email, password, id);
        self
    }

    fn add(&self, email: &str, password: &str, id: &str) {
        if let Ok(mut accounts) = self.accounts.write() {
            accounts.insert(
                email.to_lowercase(),
                Account {
                    user: User {
                        id: id.to_string(),
                        email: Some(email.to_lowercase()),
                    },
                    password: password.to_string(),
                },
            );
        }
    }

    fn session_for(user: &User) -> Session {
        Session {
            access_token: format!("fixture-{}", user.id),
            refresh_token: None,
            expires_in: None,
            user: user.clone(),
        }
    }
}

fn lock_error<E: std::fmt::Display>(e: E) -> FlotaError {
    FlotaError::AuthError(format!("account lock poisoned: {e}"))
}

impl AuthClient for FixtureAuth {
    fn sign_in(&self, email: &str, password: &str) -> FlotaResult<Session> {
        let accounts = self.accounts.read().map_err(lock_error)?;
        match accounts.get(&email.to_lowercase()) {
            Some(account) if account.password == password => {
                info!("Signed in as {} (fixtures)", account.user.id);
                Ok(FixtureAuth::session_for(&account.user))
            }
            _ => Err(FlotaError::AuthError("Invalid login credentials".into())),
        }
    }

    fn sign_up(&self, email: &str, password: &str) -> FlotaResult<(User, Option<Session>)> {
        let mut accounts = self.accounts.write().map_err(lock_error)?;
        let key = email.to_lowercase();
        if accounts.contains_key(&key) {
            return Err(FlotaError::AuthError("User already registered".into()));
        }
        let user = User {
            id: format!("fixture-user-{}", accounts.len() + 1),
            email: Some(key.clone()),
        };
        accounts.insert(
            key,
            Account {
                user: user.clone(),
                password: password.to_string(),
            },
        );
        Ok((user, None))
    }

    fn get_user(&self, session: &Session) -> FlotaResult<User> {
        let accounts = self.accounts.read().map_err(lock_error)?;
        accounts
            .values()
            .find(|a| FixtureAuth::session_for(&a.user).access_token == session.access_token)
            .map(|a| a.user.clone())
            .ok_or_else(|| FlotaError::AuthError("invalid session".into()))
    }

    fn sign_out(&self, _session: &Session) -> FlotaResult<()> {
        Ok(())
    }
}

/// Usernames are mapped onto synthetic addresses under the fleet domain.
pub fn login_email(input: &str, email_domain: &str) -> String {
    let input = input.trim();
    if input.contains('@') {
        input.to_string()
    } else {
        format!("{}@{email_domain}", input.to_lowercase())
    }
}

type Listener = Rc<dyn Fn(Option<&Session>)>;

struct Listeners {
    next_id: u64,
    entries: Vec<(u64, Listener)>,
}

/// Handle returned by [`SessionState::subscribe`]. Dropping it unsubscribes.
pub struct Subscription {
    id: u64,
    listeners: Weak<RefCell<Listeners>>,
}

impl Subscription {
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(listeners) = self.listeners.upgrade() {
            listeners.borrow_mut().entries.retain(|(id, _)| *id != self.id);
            trace!("Auth listener {} removed", self.id);
        }
    }
}

/// Current session plus change notification.
///
/// Lives on the ui thread only; listeners run synchronously inside
/// [`SessionState::set_session`].
pub struct SessionState {
    session: Option<Session>,
    loading: bool,
    listeners: Rc<RefCell<Listeners>>,
}

impl Default for SessionState {
    fn default() -> Self {
        SessionState::new()
    }
}

impl SessionState {
    pub fn new() -> Self {
        SessionState {
            session: None,
            loading: true,
            listeners: Rc::new(RefCell::new(Listeners {
                next_id: 0,
                entries: Vec::new(),
            })),
        }
    }

    pub fn current_user(&self) -> Option<&User> {
        self.session.as_ref().map(|s| &s.user)
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.is_some()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Marks the initial session lookup as finished without a session.
    pub fn resolve_anonymous(&mut self) {
        if self.loading {
            self.set_session(None);
        }
    }

    pub fn set_session(&mut self, session: Option<Session>) {
        self.session = session;
        self.loading = false;
        // Listeners may subscribe or unsubscribe while being notified.
        let snapshot: Vec<Listener> = self
            .listeners
            .borrow()
            .entries
            .iter()
            .map(|(_, listener)| Rc::clone(listener))
            .collect();
        for listener in snapshot {
            listener(self.session.as_ref());
        }
    }

    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(Option<&Session>) + 'static,
    {
        let mut listeners = self.listeners.borrow_mut();
        let id = listeners.next_id;
        listeners.next_id += 1;
        listeners.entries.push((id, Rc::new(listener)));
        Subscription {
            id,
            listeners: Rc::downgrade(&self.listeners),
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.borrow().entries.len()
    }
}
