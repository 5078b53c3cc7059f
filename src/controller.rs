use std::time::Duration;
use tracing::trace;

use ratatui::crossterm::event::{self, Event, KeyCode, KeyModifiers};

use crate::domain::{FlotaResult, Message};
use crate::model::Model;
use crate::routes::Route;

pub struct Controller {
    event_poll_time: u64,
}

impl Controller {
    pub fn new(event_poll_time: u64) -> Self {
        Self { event_poll_time }
    }

    pub fn handle_event(&self, model: &Model) -> FlotaResult<Option<Message>> {
        if event::poll(Duration::from_millis(self.event_poll_time))? {
            match event::read()? {
                Event::Key(key) if key.kind == event::KeyEventKind::Press => {
                    if model.raw_keyevents() {
                        return Ok(Some(Message::RawKey(key)));
                    }
                    return Ok(Self::handle_key(key));
                }
                Event::Resize(width, height) => {
                    return Ok(Some(Message::Resize(width as usize, height as usize)));
                }
                _ => {}
            }
        }
        Ok(None)
    }

    pub fn handle_key(key: event::KeyEvent) -> Option<Message> {
        let message = match (key.code, key.modifiers) {
            (KeyCode::Char('c'), KeyModifiers::CONTROL) => Some(Message::Quit),
            (KeyCode::Char('q'), _) => Some(Message::Quit),
            (KeyCode::Char('1'), _) => Some(Message::Navigate(Route::Reports)),
            (KeyCode::Char('2'), _) => Some(Message::Navigate(Route::Vales)),
            (KeyCode::Char('3'), _) => Some(Message::Navigate(Route::Mileage)),
            (KeyCode::Char('j') | KeyCode::Down, _) => Some(Message::MoveDown),
            (KeyCode::Char('k') | KeyCode::Up, _) => Some(Message::MoveUp),
            (KeyCode::Char('h') | KeyCode::Left, _) => Some(Message::MoveLeft),
            (KeyCode::Char('l') | KeyCode::Right, _) => Some(Message::MoveRight),
            (KeyCode::Tab, _) => Some(Message::MoveDown),
            (KeyCode::BackTab, _) => Some(Message::MoveUp),
            (KeyCode::Char('n') | KeyCode::PageDown, _) => Some(Message::NextPage),
            (KeyCode::Char('p') | KeyCode::PageUp, _) => Some(Message::PreviousPage),
            (KeyCode::Char('g') | KeyCode::Home, _) => Some(Message::FirstPage),
            (KeyCode::Char('G') | KeyCode::End, _) => Some(Message::LastPage),
            (KeyCode::Enter, _) => Some(Message::Enter),
            (KeyCode::Esc, _) => Some(Message::Exit),
            (KeyCode::Char('/'), _) => Some(Message::Search),
            (KeyCode::Char('['), _) => Some(Message::DateStart),
            (KeyCode::Char(']'), _) => Some(Message::DateEnd),
            (KeyCode::Char('u'), _) => Some(Message::NextUser),
            (KeyCode::Char('U'), _) => Some(Message::PreviousUser),
            (KeyCode::Char('x'), _) => Some(Message::ResetFilters),
            (KeyCode::Char('r'), _) => Some(Message::Refresh),
            (KeyCode::Char('#'), _) => Some(Message::GotoReport),
            (KeyCode::Char('y'), _) => Some(Message::CopyCell),
            (KeyCode::Char('R'), _) => Some(Message::SwitchAuthForm),
            (KeyCode::Char('L'), _) => Some(Message::Logout),
            (KeyCode::Char('?'), _) => Some(Message::Help),
            _ => None,
        };
        trace!("Mapped: {key:?} => {message:?}");
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::crossterm::event::KeyEvent;

    fn key(code: KeyCode) -> Option<Message> {
        Controller::handle_key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    #[test]
    fn keys_map_to_messages() {
        assert_eq!(key(KeyCode::Char('q')), Some(Message::Quit));
        assert_eq!(key(KeyCode::Char('2')), Some(Message::Navigate(Route::Vales)));
        assert_eq!(key(KeyCode::PageDown), Some(Message::NextPage));
        assert_eq!(key(KeyCode::Char('[')), Some(Message::DateStart));
        assert_eq!(key(KeyCode::Char('z')), None);
        assert_eq!(
            Controller::handle_key(KeyEvent::new(KeyCode::Char('G'), KeyModifiers::SHIFT)),
            Some(Message::LastPage)
        );
    }
}
