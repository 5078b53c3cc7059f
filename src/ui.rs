use std::time::Duration;

use ratatui::{
    Frame,
    layout::{Constraint, Flex, Layout, Position, Rect},
    style::{Color, Modifier, Style, Stylize},
    symbols::border,
    text::{Line, Span, Text},
    widgets::{Block, Cell as UICell, Clear, Paragraph, Row, Table, Wrap},
};

use crate::model::{Model, Popup};
use crate::routes::Route;
use crate::table::{Cell, RenderedRow, TableEngine, visible_name};
use crate::views::{FilteredTable, FormField, FormKind};

pub const HEADER_HEIGHT: u16 = 1;
pub const STATUSLINE_HEIGHT: u16 = 1;
pub const FILTERBAR_HEIGHT: u16 = 3;
pub const PAGER_HEIGHT: u16 = 1;
pub const STATUS_MESSAGE_TTL: Duration = Duration::from_secs(8);

const TABS: [(&str, Route); 3] = [
    ("1 Reportes", Route::Reports),
    ("2 Vales", Route::Vales),
    ("3 Kilometraje", Route::Mileage),
];

pub struct FlotaUI {
    max_column_width: usize,
}

impl FlotaUI {
    pub fn new(max_column_width: usize) -> Self {
        Self { max_column_width }
    }

    pub fn draw(&mut self, model: &Model, frame: &mut Frame) {
        let [header, body, statusline] = Layout::vertical([
            Constraint::Length(HEADER_HEIGHT),
            Constraint::Min(0),
            Constraint::Length(STATUSLINE_HEIGHT),
        ])
        .areas(frame.area());

        self.draw_header(model, frame, header);
        if model.is_waiting() {
            Self::draw_centered_text(frame, body, "Cargando...");
        } else {
            match model.route() {
                Route::Reports => self.draw_reports(model, frame, body),
                Route::Vales => self.draw_vales(model, frame, body),
                Route::ReportDetail(_) => Self::draw_detail(model, frame, body),
                Route::Mileage => self.draw_mileage(model, frame, body),
                Route::Login | Route::Register => Self::draw_auth_form(model, frame, body),
                Route::NotFound => {
                    Self::draw_centered_text(frame, body, "404 · Página no encontrada (Enter para volver)")
                }
            }
        }
        Self::draw_statusline(model, frame, statusline);
        if let Some(popup) = model.popup() {
            Self::draw_popup(popup, frame);
        }
    }

    fn draw_header(&self, model: &Model, frame: &mut Frame, area: Rect) {
        let mut spans = vec![" flota ".bold().on_blue(), " ".into()];
        if model.session().is_authenticated() {
            for (label, route) in TABS.iter() {
                let active = model.route() == route
                    || (matches!(model.route(), Route::ReportDetail(_)) && *route == Route::Reports);
                let span = Span::raw(format!(" {label} "));
                spans.push(if active { span.reversed() } else { span });
            }
        }
        spans.push(format!("  {}", model.route().title()).bold());
        if let Some(user) = model.user_label() {
            spans.push(format!("  · {user}").dark_gray());
        }
        frame.render_widget(Line::from(spans), area);
    }

    fn draw_centered_text(frame: &mut Frame, area: Rect, text: &str) {
        let [line] = Layout::vertical([Constraint::Length(1)])
            .flex(Flex::Center)
            .areas(area);
        frame.render_widget(Paragraph::new(text).centered(), line);
    }

    fn filter_field<'a>(label: &'a str, value: &str, placeholder: &'a str) -> Vec<Span<'a>> {
        let value = if value.is_empty() {
            placeholder.to_string().dark_gray()
        } else {
            value.to_string().yellow()
        };
        vec![format!("{label}: ").bold(), value, "   ".into()]
    }

    fn draw_filter_bar(frame: &mut Frame, area: Rect, title: &str, mut spans: Vec<Span>, list: &FilteredTable) {
        let (start, end) = list.date_inputs();
        spans.extend(Self::filter_field("Fecha Inicio [", start, "AAAA-MM-DD"));
        spans.extend(Self::filter_field("Fecha Fin ]", end, "AAAA-MM-DD"));
        let block = Block::bordered().title(format!(" {title} "));
        frame.render_widget(Paragraph::new(Line::from(spans)).block(block), area);
    }

    fn draw_reports(&self, model: &Model, frame: &mut Frame, area: Rect) {
        let view = model.reports();
        let list = view.list();
        let [filters, table, pager] = Self::list_layout(area);
        let search = Self::filter_field("Búsqueda /", &list.filters().search_term, "Buscar en la tabla...");
        Self::draw_filter_bar(frame, filters, "Datos de reportes", search, list);
        self.draw_table(frame, table, list.table(), &list.page(), view.is_loading());
        Self::draw_pager(frame, pager, list.table());
    }

    fn draw_vales(&self, model: &Model, frame: &mut Frame, area: Rect) {
        let view = model.vales();
        let list = view.list();
        let [filters, table, pager] = Self::list_layout(area);
        let user = Self::filter_field("Usuario u/U", view.selected_user_label(), "");
        Self::draw_filter_bar(frame, filters, "Vales  (x resetear filtros)", user, list);
        self.draw_table(frame, table, list.table(), &list.page(), view.is_loading());
        Self::draw_pager(frame, pager, list.table());
    }

    fn list_layout(area: Rect) -> [Rect; 3] {
        Layout::vertical([
            Constraint::Length(FILTERBAR_HEIGHT),
            Constraint::Min(3),
            Constraint::Length(PAGER_HEIGHT),
        ])
        .areas(area)
    }

    fn cell_span(cell: &Cell, width: usize) -> Span<'static> {
        let text = visible_name(&cell.display(), width);
        match cell {
            Cell::Text(_) => Span::raw(text),
            Cell::Image { .. } => text.cyan().underlined(),
            Cell::Link { .. } => text.green().bold(),
        }
    }

    fn draw_table(&self, frame: &mut Frame, area: Rect, table: &TableEngine, page: &[RenderedRow], loading: bool) {
        let widths = table.column_widths(page, self.max_column_width);
        let (cursor_row, cursor_column) = table.cursor();

        let header = Row::new(
            table
                .headers()
                .into_iter()
                .zip(widths.iter())
                .map(|(h, w)| UICell::from(visible_name(h, *w).bold())),
        )
        .style(Style::default().add_modifier(Modifier::UNDERLINED));

        let mut rows: Vec<Row> = page
            .iter()
            .enumerate()
            .map(|(ridx, row)| {
                let cells = row.cells.iter().zip(widths.iter()).enumerate().map(|(cidx, (cell, w))| {
                    let span = Self::cell_span(cell, *w);
                    if ridx == cursor_row && cidx == cursor_column {
                        UICell::from(span).style(Style::default().fg(Color::Black).bg(Color::Yellow))
                    } else {
                        UICell::from(span)
                    }
                });
                let row_ui = Row::new(cells);
                if ridx == cursor_row { row_ui.reversed() } else { row_ui }
            })
            .collect();

        if rows.is_empty() {
            let message = if loading { "Cargando..." } else { "No hay datos" };
            rows.push(Row::new([UICell::from(message.dark_gray())]));
        }

        let constraints = widths.iter().map(|w| Constraint::Length(*w as u16));
        let widget = Table::new(rows, constraints)
            .header(header)
            .column_spacing(1)
            .block(Block::bordered().border_set(border::PLAIN));
        frame.render_widget(widget, area);
    }

    fn draw_pager(frame: &mut Frame, area: Rect, table: &TableEngine) {
        let style_for = |enabled: bool| {
            if enabled {
                Style::default().add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(Color::DarkGray)
            }
        };
        let line = Line::from(vec![
            Span::styled("◀ Anterior (p)", style_for(table.can_previous_page())),
            format!(
                "   Página {} de {}   ",
                table.pagination().page_index() + 1,
                table.page_count_display()
            )
            .into(),
            Span::styled("Siguiente (n) ▶", style_for(table.can_next_page())),
            format!("   {} registros", table.total_rows()).dark_gray(),
        ]);
        frame.render_widget(line.centered(), area);
    }

    fn draw_detail(model: &Model, frame: &mut Frame, area: Rect) {
        let view = model.detail();
        if view.report().is_none() {
            let text = if view.is_loading() { "Cargando..." } else { "Reporte no disponible (Esc para volver)" };
            Self::draw_centered_text(frame, area, text);
            return;
        }

        let mut lines: Vec<Line> = Vec::new();
        for (sidx, section) in view.sections().into_iter().enumerate() {
            lines.push(Line::from(section.title.bold().blue()));
            let label_width = section.fields.iter().map(|(l, _)| l.chars().count()).max().unwrap_or(0);
            for (label, value) in section.fields {
                lines.push(Line::from(vec![
                    format!("  {label:<label_width$}  ").bold(),
                    Span::raw(value),
                ]));
            }
            if sidx == 0 && view.has_signature() {
                lines.push(Line::default());
                lines.push(Line::from("Firma del Usuario".bold().blue()));
                lines.push(match view.signature_url() {
                    Some(url) => Line::from(vec!["  ".into(), url.to_string().cyan().underlined(), "  (Enter para ver)".dark_gray()]),
                    None if view.is_loading() => Line::from("  Cargando firma...".dark_gray()),
                    None => Line::from("  Firma no disponible".dark_gray()),
                });
            }
            lines.push(Line::default());
        }

        let title = format!(" Detalles del Reporte #{} ", view.id().unwrap_or("?"));
        let block = Block::bordered()
            .title(title)
            .title_bottom(Line::from(" Esc volver · j/k desplazar ").centered());
        let paragraph = Paragraph::new(Text::from(lines))
            .block(block)
            .scroll((u16::try_from(view.scroll()).unwrap_or(u16::MAX), 0));
        frame.render_widget(paragraph, area);
    }

    fn draw_mileage(&self, model: &Model, frame: &mut Frame, area: Rect) {
        let view = model.mileage();
        let alerts = view.alert_lines();
        let [alert_area, table, pager] = Layout::vertical([
            Constraint::Length(alerts.len() as u16),
            Constraint::Min(3),
            Constraint::Length(PAGER_HEIGHT),
        ])
        .areas(area);

        let alert_lines: Vec<Line> = alerts
            .into_iter()
            .map(|a| Line::from(vec!["⚠ ".yellow().bold(), a.yellow()]))
            .collect();
        frame.render_widget(Paragraph::new(alert_lines), alert_area);
        self.draw_table(frame, table, view.table(), &view.page(), view.is_loading());
        Self::draw_pager(frame, pager, view.table());
    }

    fn draw_auth_form(model: &Model, frame: &mut Frame, area: Rect) {
        let form = model.auth_form();
        let (title, switch_hint) = match form.kind() {
            FormKind::Login => (" Iniciar sesión ", " R: crear cuenta "),
            FormKind::Register => (" Registro ", " R: ya tengo cuenta "),
        };

        let mut lines: Vec<Line> = Vec::new();
        for field in form.fields() {
            let focused = form.focused() == *field;
            let line = match field {
                FormField::Submit => {
                    let label = if form.is_submitting() { "[ Enviando... ]" } else { "[ Enviar ]" };
                    Line::from(label.bold()).centered()
                }
                _ => Line::from(vec![
                    format!("{:<22}", field.label()).bold(),
                    Span::raw(form.display_value(*field)),
                ]),
            };
            lines.push(if focused { line.reversed() } else { line });
            lines.push(Line::default());
        }
        if let Some(error) = form.error() {
            lines.push(Line::from(error.to_string().red()));
        }
        if let Some(notice) = form.notice() {
            lines.push(Line::from(notice.to_string().green()));
        }

        let height = lines.len() as u16 + 2;
        let [column] = Layout::horizontal([Constraint::Length(60)])
            .flex(Flex::Center)
            .areas(area);
        let [card] = Layout::vertical([Constraint::Length(height)])
            .flex(Flex::Center)
            .areas(column);
        let block = Block::bordered()
            .border_set(border::ROUNDED)
            .title(title)
            .title_bottom(Line::from(vec![" j/k campo · Enter editar ".into(), switch_hint.dark_gray()]).centered());
        frame.render_widget(Paragraph::new(lines).block(block), card);
    }

    fn draw_statusline(model: &Model, frame: &mut Frame, area: Rect) {
        if let Some((mode, input)) = model.cmd_line() {
            let prompt = mode.prompt();
            let line = Line::from(vec![prompt.bold(), Span::raw(input.display())]);
            frame.render_widget(line, area);
            let x = area.x + (prompt.chars().count() + input.curser_pos) as u16;
            frame.set_cursor_position(Position {
                x: x.min(area.right().saturating_sub(1)),
                y: area.y,
            });
            return;
        }
        let [message, hint] = Layout::horizontal([Constraint::Min(0), Constraint::Length(12)]).areas(area);
        if model.last_status_message_update().elapsed() < STATUS_MESSAGE_TTL {
            frame.render_widget(Line::from(model.status_message().to_string()), message);
        }
        frame.render_widget(Line::from("? ayuda ".dark_gray()).right_aligned(), hint);
    }

    fn draw_popup(popup: &Popup, frame: &mut Frame) {
        let [column] = Layout::horizontal([Constraint::Percentage(70)])
            .flex(Flex::Center)
            .areas(frame.area());
        let [area] = Layout::vertical([Constraint::Percentage(60)])
            .flex(Flex::Center)
            .areas(column);
        let hint = if popup.payload.is_some() { " Esc cerrar · y copiar " } else { " Esc cerrar " };
        let block = Block::bordered()
            .border_set(border::THICK)
            .title(format!(" {} ", popup.title))
            .title_bottom(Line::from(hint).centered());
        frame.render_widget(Clear, area);
        frame.render_widget(
            Paragraph::new(popup.body.as_str()).wrap(Wrap { trim: false }).block(block),
            area,
        );
    }
}
