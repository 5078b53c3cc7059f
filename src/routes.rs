use crate::auth::SessionState;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Login,
    Register,
    Reports,
    ReportDetail(String),
    Vales,
    Mileage,
    NotFound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteClass {
    /// Only reachable while signed out.
    Guest,
    /// Only reachable while signed in.
    Authenticated,
    Public,
}

/// Outcome of running a route through the session guard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    Render(Route),
    Redirect(Route),
    /// The session lookup has not finished yet; show a spinner.
    Wait,
}

impl Route {
    pub const ROOT: Route = Route::Reports;

    pub fn class(&self) -> RouteClass {
        match self {
            Route::Login | Route::Register => RouteClass::Guest,
            Route::NotFound => RouteClass::Public,
            Route::Reports | Route::ReportDetail(_) | Route::Vales | Route::Mileage => RouteClass::Authenticated,
        }
    }

    pub fn title(&self) -> String {
        match self {
            Route::Login => "Iniciar sesión".to_string(),
            Route::Register => "Registro".to_string(),
            Route::Reports => "Reportes".to_string(),
            Route::ReportDetail(id) => format!("Detalles del Reporte #{id}"),
            Route::Vales => "Vales".to_string(),
            Route::Mileage => "Kilometraje por Vehículo".to_string(),
            Route::NotFound => "404".to_string(),
        }
    }

    pub fn path(&self) -> String {
        match self {
            Route::Login => "/login".to_string(),
            Route::Register => "/register".to_string(),
            Route::Reports => "/reports".to_string(),
            Route::ReportDetail(id) => format!("/reports/{id}"),
            Route::Vales => "/vales".to_string(),
            Route::Mileage => "/mantenimientos".to_string(),
            Route::NotFound => "/404".to_string(),
        }
    }

    pub fn parse(path: &str) -> Route {
        let segments: Vec<&str> = path.trim_matches('/').split('/').filter(|s| !s.is_empty()).collect();
        match segments.as_slice() {
            [] => Route::ROOT,
            ["login"] => Route::Login,
            ["register"] => Route::Register,
            ["reports"] | ["dashboard"] => Route::Reports,
            ["reports", id] => Route::ReportDetail(id.to_string()),
            ["vales"] => Route::Vales,
            ["mantenimientos"] => Route::Mileage,
            _ => Route::NotFound,
        }
    }
}

/// Gates guest-only and authenticated-only routes on the current session.
pub fn guard(route: Route, session: &SessionState) -> Navigation {
    if session.is_loading() && route.class() != RouteClass::Public {
        return Navigation::Wait;
    }
    match (route.class(), session.is_authenticated()) {
        (RouteClass::Authenticated, false) => Navigation::Redirect(Route::Login),
        (RouteClass::Guest, true) => Navigation::Redirect(Route::ROOT),
        _ => Navigation::Render(route),
    }
}
