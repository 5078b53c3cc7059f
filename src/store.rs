use std::cmp::Ordering;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::RwLock;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde_json::{Map, Value};
use tracing::{debug, info, trace, warn};

use crate::domain::{FlotaError, FlotaResult};
use crate::record::{Record, value_as_f64, value_to_string};

const SINGLE_OBJECT_MEDIA_TYPE: &str = "application/vnd.pgrst.object+json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    Eq(String, String),
    /// Case-insensitive match; `%` matches any run of characters.
    ILike(String, String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub column: String,
    pub ascending: bool,
}

/// One read against a record store table.
///
/// The select list follows the REST data api syntax, including embedded
/// relations such as `profiles:profiles!user_id(username)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub table: String,
    pub select: String,
    pub filters: Vec<Filter>,
    pub order: Option<Order>,
}

impl Query {
    pub fn from(table: &str) -> Self {
        Query {
            table: table.to_string(),
            select: "*".to_string(),
            filters: Vec::new(),
            order: None,
        }
    }

    pub fn select(mut self, columns: &str) -> Self {
        self.select = columns.chars().filter(|c| !c.is_whitespace()).collect();
        self
    }

    pub fn eq(mut self, column: &str, value: impl ToString) -> Self {
        self.filters.push(Filter::Eq(column.to_string(), value.to_string()));
        self
    }

    pub fn ilike(mut self, column: &str, pattern: impl ToString) -> Self {
        self.filters.push(Filter::ILike(column.to_string(), pattern.to_string()));
        self
    }

    pub fn order(mut self, column: &str, ascending: bool) -> Self {
        self.order = Some(Order {
            column: column.to_string(),
            ascending,
        });
        self
    }

    /// Query string pairs in the REST data api dialect.
    pub fn to_params(&self) -> Vec<(String, String)> {
        let mut params = vec![("select".to_string(), self.select.clone())];
        for filter in &self.filters {
            match filter {
                Filter::Eq(column, value) => params.push((column.clone(), format!("eq.{value}"))),
                Filter::ILike(column, pattern) => params.push((column.clone(), format!("ilike.{pattern}"))),
            }
        }
        if let Some(order) = &self.order {
            let direction = if order.ascending { "asc" } else { "desc" };
            params.push(("order".to_string(), format!("{}.{direction}", order.column)));
        }
        params
    }
}

/// Request/response access to the managed relational store.
pub trait RecordStore: Send + Sync {
    fn select(&self, query: &Query) -> FlotaResult<Vec<Record>>;

    /// Like `select`, but fails with [`FlotaError::NotSingleRow`] unless
    /// exactly one row matches.
    fn select_single(&self, query: &Query) -> FlotaResult<Record>;

    fn upsert(&self, table: &str, record: &Record) -> FlotaResult<()>;

    /// Token used for row level security once a user is signed in.
    fn set_access_token(&self, _token: Option<String>) {}
}

// ------------------------------- REST backend ------------------------------- //

pub struct RestStore {
    base_url: String,
    anon_key: String,
    client: Client,
    access_token: RwLock<Option<String>>,
}

impl RestStore {
    pub fn new(base_url: &str, anon_key: &str, timeout: Duration) -> FlotaResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(RestStore {
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key: anon_key.to_string(),
            client,
            access_token: RwLock::new(None),
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{table}", self.base_url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let token = self
            .access_token
            .read()
            .ok()
            .and_then(|t| t.clone())
            .unwrap_or_else(|| self.anon_key.clone());
        request.header("apikey", &self.anon_key).bearer_auth(token)
    }

    fn get(&self, query: &Query, single: bool) -> FlotaResult<Response> {
        let params = query.to_params();
        debug!("GET {} {:?}", query.table, params);
        let mut request = self.authorize(self.client.get(self.table_url(&query.table)).query(&params));
        if single {
            request = request.header("Accept", SINGLE_OBJECT_MEDIA_TYPE);
        }
        Ok(request.send()?)
    }
}

fn error_from_response(response: Response) -> FlotaError {
    let status = response.status().as_u16();
    let body = response.text().unwrap_or_default();
    FlotaError::StatusError { status, body }
}

// The single-object media type answers 406 with "The result contains N rows".
fn rows_in_details(body: &str) -> usize {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("details").and_then(Value::as_str).map(str::to_string))
        .and_then(|details| {
            details
                .split_whitespace()
                .find_map(|word| word.parse::<usize>().ok())
        })
        .unwrap_or(0)
}

impl RecordStore for RestStore {
    fn select(&self, query: &Query) -> FlotaResult<Vec<Record>> {
        let response = self.get(query, false)?;
        if !response.status().is_success() {
            return Err(error_from_response(response));
        }
        let records: Vec<Record> = response.json()?;
        trace!("{} returned {} rows", query.table, records.len());
        Ok(records)
    }

    fn select_single(&self, query: &Query) -> FlotaResult<Record> {
        let response = self.get(query, true)?;
        if response.status() == StatusCode::NOT_ACCEPTABLE {
            let body = response.text().unwrap_or_default();
            return Err(FlotaError::NotSingleRow {
                table: query.table.clone(),
                found: rows_in_details(&body),
            });
        }
        if !response.status().is_success() {
            return Err(error_from_response(response));
        }
        Ok(response.json()?)
    }

    fn upsert(&self, table: &str, record: &Record) -> FlotaResult<()> {
        debug!("UPSERT {table}");
        let response = self
            .authorize(self.client.post(self.table_url(table)))
            .header("Prefer", "resolution=merge-duplicates")
            .json(record)
            .send()?;
        if !response.status().is_success() {
            return Err(error_from_response(response));
        }
        Ok(())
    }

    fn set_access_token(&self, token: Option<String>) {
        match self.access_token.write() {
            Ok(mut guard) => *guard = token,
            Err(e) => warn!("Access token lock poisoned: {e}"),
        }
    }
}

// ------------------------------ Fixture backend ----------------------------- //

#[derive(Debug, Clone, PartialEq)]
enum SelectItem {
    All,
    Column { alias: String, name: String },
    Embed {
        alias: String,
        table: String,
        foreign_key: String,
        items: Vec<SelectItem>,
    },
}

// Splits on commas that are not nested inside an embed's parentheses.
fn split_top_level(select: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, ch) in select.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(&select[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&select[start..]);
    parts.into_iter().filter(|p| !p.is_empty()).collect()
}

fn parse_select(select: &str) -> Vec<SelectItem> {
    split_top_level(select)
        .into_iter()
        .map(|part| {
            if part == "*" {
                return SelectItem::All;
            }
            if let (Some(open), Some(close)) = (part.find('('), part.rfind(')')) {
                let head = &part[..open];
                let inner = &part[open + 1..close];
                let (alias, target) = head.split_once(':').unwrap_or((head, head));
                let (table, foreign_key) = match target.split_once('!') {
                    Some((table, fk)) => (table.to_string(), fk.to_string()),
                    None => (target.to_string(), format!("{}_id", target.trim_end_matches('s'))),
                };
                return SelectItem::Embed {
                    alias: alias.to_string(),
                    table,
                    foreign_key,
                    items: parse_select(inner),
                };
            }
            let (alias, name) = part.split_once(':').unwrap_or((part, part));
            SelectItem::Column {
                alias: alias.to_string(),
                name: name.to_string(),
            }
        })
        .collect()
}

fn ilike_matches(value: &str, pattern: &str) -> bool {
    let value = value.to_lowercase();
    let pattern = pattern.to_lowercase();
    let pieces: Vec<&str> = pattern.split('%').collect();
    if pieces.len() == 1 {
        return value == pattern;
    }
    let mut rest = value.as_str();
    for (i, piece) in pieces.iter().enumerate() {
        if piece.is_empty() {
            continue;
        }
        if i == 0 {
            match rest.strip_prefix(piece) {
                Some(r) => rest = r,
                None => return false,
            }
        } else if i == pieces.len() - 1 {
            return rest.ends_with(piece);
        } else {
            match rest.find(piece) {
                Some(pos) => rest = &rest[pos + piece.len()..],
                None => return false,
            }
        }
    }
    true
}

// Ascending order with nulls last, numbers compared numerically.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => match (a, b) {
            (Value::Number(_), Value::Number(_)) => value_as_f64(a)
                .partial_cmp(&value_as_f64(b))
                .unwrap_or(Ordering::Equal),
            _ => value_to_string(a).cmp(&value_to_string(b)),
        },
    }
}

/// Record store over in-memory tables, loadable from a directory of
/// `<table>.json` files. Evaluates the same query dialect as the REST
/// backend.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<String, Vec<Record>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    pub fn with_table(self, name: &str, records: Vec<Record>) -> Self {
        self.insert_table(name, records);
        self
    }

    pub fn insert_table(&self, name: &str, records: Vec<Record>) {
        match self.tables.write() {
            Ok(mut tables) => {
                tables.insert(name.to_string(), records);
            }
            Err(e) => warn!("Fixture table lock poisoned: {e}"),
        }
    }

    pub fn load_dir(dir: &Path) -> FlotaResult<Self> {
        let store = MemoryStore::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let records: Vec<Record> = serde_json::from_str(&fs::read_to_string(&path)?)?;
            info!("Loaded fixture table {name} with {} rows", records.len());
            store.insert_table(name, records);
        }
        Ok(store)
    }

    fn table(&self, name: &str) -> FlotaResult<Vec<Record>> {
        self.tables
            .read()
            .map_err(|e| FlotaError::ConfigError(format!("fixture lock poisoned: {e}")))?
            .get(name)
            .cloned()
            .ok_or_else(|| FlotaError::FixtureMissing(name.to_string()))
    }

    fn project(&self, record: &Record, items: &[SelectItem]) -> FlotaResult<Record> {
        let mut out = Map::new();
        for item in items {
            match item {
                SelectItem::All => {
                    for (field, value) in record.fields() {
                        out.insert(field.clone(), value.clone());
                    }
                }
                SelectItem::Column { alias, name } => {
                    out.insert(alias.clone(), record.get(name).cloned().unwrap_or(Value::Null));
                }
                SelectItem::Embed {
                    alias,
                    table,
                    foreign_key,
                    items,
                } => {
                    let key = record.resolve_string(foreign_key);
                    let related = match key {
                        Some(key) => self
                            .table(table)?
                            .into_iter()
                            .find(|r| r.id().as_deref() == Some(key.as_str())),
                        None => None,
                    };
                    let value = match related {
                        Some(related) => self.project(&related, items)?.into_value(),
                        None => Value::Null,
                    };
                    out.insert(alias.clone(), value);
                }
            }
        }
        Ok(Record::from(out))
    }
}

impl RecordStore for MemoryStore {
    fn select(&self, query: &Query) -> FlotaResult<Vec<Record>> {
        let mut rows: Vec<Record> = self
            .table(&query.table)?
            .into_iter()
            .filter(|record| {
                query.filters.iter().all(|filter| match filter {
                    Filter::Eq(column, value) => record.resolve_string(column).as_deref() == Some(value.as_str()),
                    Filter::ILike(column, pattern) => record
                        .resolve_string(column)
                        .is_some_and(|v| ilike_matches(&v, pattern)),
                })
            })
            .collect();

        if let Some(order) = &query.order {
            rows.sort_by(|a, b| {
                let ordering = compare_values(a.resolve(&order.column), b.resolve(&order.column));
                if order.ascending { ordering } else { ordering.reverse() }
            });
        }

        let items = parse_select(&query.select);
        rows.iter().map(|record| self.project(record, &items)).collect()
    }

    fn select_single(&self, query: &Query) -> FlotaResult<Record> {
        let mut rows = self.select(query)?;
        if rows.len() != 1 {
            return Err(FlotaError::NotSingleRow {
                table: query.table.clone(),
                found: rows.len(),
            });
        }
        Ok(rows.remove(0))
    }

    fn upsert(&self, table: &str, record: &Record) -> FlotaResult<()> {
        let mut tables = self
            .tables
            .write()
            .map_err(|e| FlotaError::ConfigError(format!("fixture lock poisoned: {e}")))?;
        let rows = tables.entry(table.to_string()).or_default();
        let id = record.id();
        match rows.iter_mut().find(|r| id.is_some() && r.id() == id) {
            Some(existing) => {
                for (field, value) in record.fields() {
                    existing.insert(field.clone(), value.clone());
                }
            }
            None => rows.push(record.clone()),
        }
        Ok(())
    }
}
