use std::io;

use ratatui::crossterm::event::KeyEvent;
use thiserror::Error;

use crate::routes::Route;

// Error type shared by the data access layer, the auth client and the app shell.
#[derive(Debug, Error)]
pub enum FlotaError {
    #[error("io error: {0}")]
    IoError(#[from] io::Error),
    #[error("http request failed: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("backend answered {status}: {body}")]
    StatusError { status: u16, body: String },
    #[error("expected exactly one row from `{table}`, found {found}")]
    NotSingleRow { table: String, found: usize },
    #[error("could not decode backend payload: {0}")]
    DecodeError(#[from] serde_json::Error),
    #[error("invalid configuration: {0}")]
    ConfigError(String),
    #[error("could not parse configuration file: {0}")]
    ConfigParseError(#[from] toml::de::Error),
    #[error("authentication failed: {0}")]
    AuthError(String),
    #[error("fixture for table `{0}` not found")]
    FixtureMissing(String),
    #[error("clipboard unavailable: {0}")]
    ClipboardError(String),
    #[error("record is not a json object")]
    NotARecord,
}

impl From<arboard::Error> for FlotaError {
    fn from(err: arboard::Error) -> Self {
        FlotaError::ClipboardError(err.to_string())
    }
}

pub type FlotaResult<T> = Result<T, FlotaError>;

// What the command line is currently collecting input for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CMDMode {
    Search,
    DateStart,
    DateEnd,
    Email,
    Password,
    ConfirmPassword,
    Username,
    FullName,
    GotoReport,
}

impl CMDMode {
    pub fn prompt(&self) -> &'static str {
        match self {
            CMDMode::Search => "Búsqueda: ",
            CMDMode::DateStart => "Fecha Inicio (AAAA-MM-DD): ",
            CMDMode::DateEnd => "Fecha Fin (AAAA-MM-DD): ",
            CMDMode::Email => "Correo: ",
            CMDMode::Password => "Contraseña: ",
            CMDMode::ConfirmPassword => "Confirmar contraseña: ",
            CMDMode::Username => "Usuario: ",
            CMDMode::FullName => "Nombre completo: ",
            CMDMode::GotoReport => "Reporte #",
        }
    }

    pub fn is_secret(&self) -> bool {
        matches!(self, CMDMode::Password | CMDMode::ConfirmPassword)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Quit,
    MoveUp,
    MoveDown,
    MoveLeft,
    MoveRight,
    NextPage,
    PreviousPage,
    FirstPage,
    LastPage,
    Enter,
    Exit,
    Help,
    Search,
    DateStart,
    DateEnd,
    NextUser,
    PreviousUser,
    ResetFilters,
    Refresh,
    CopyCell,
    Navigate(Route),
    GotoReport,
    SwitchAuthForm,
    Logout,
    Resize(usize, usize),
    RawKey(KeyEvent),
}

pub const HELP_TEXT: &str = "\
 Navegación
   1 / 2 / 3        Reportes / Vales / Kilometraje
   j k ↑ ↓          Mover selección
   h l ← →          Mover columna
   n p PgDn PgUp    Página siguiente / anterior
   g G              Primera / última página
   Enter            Abrir detalle o imagen
   Esc              Volver / cerrar
   Tab / S-Tab      Campo siguiente / anterior
 Filtros
   /                Búsqueda de texto
   [ ]              Fecha inicio / fecha fin
   u U              Usuario siguiente / anterior
   x                Resetear filtros
 Otros
   r                Recargar
   #                Ir al reporte por id
   y                Copiar celda
   R                Alternar inicio de sesión / registro
   L                Cerrar sesión
   ?                Ayuda
   q                Salir";
