use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseEvent, MouseEventKind};
use ratatui::layout::Rect;

use crate::app::{App, FocusPane, InputMode, Popup};
use crate::tui::AppEvent;

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

pub fn handle_event(app: &mut App, event: AppEvent) {
    match event {
        AppEvent::Key(key) => handle_key(app, key),
        AppEvent::Mouse(mouse) => handle_mouse(app, mouse),
        AppEvent::Resize(_, _) => app.scroll_chat_to_bottom(),
        AppEvent::Tick => app.tick_animation(),
        AppEvent::Chat { cycle, update } => app.apply_chat(cycle, update),
        AppEvent::Bookings(result) => app.apply_bookings(result),
        AppEvent::BookingAction { action, result } => app.apply_booking_action(action, result),
    }
}

fn handle_key(app: &mut App, key: KeyEvent) {
    // Global keys that work in any mode
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return;
    }

    if app.popup.is_some() {
        handle_popup(app, key);
        return;
    }

    match app.input_mode {
        InputMode::Normal => handle_normal_mode(app, key),
        InputMode::Editing => handle_editing_mode(app, key),
    }
}

fn handle_normal_mode(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('q') => app.should_quit = true,

        // Tab cycles: Input -> Chat -> Bookings -> Input
        KeyCode::Tab => {
            app.focus = match app.focus {
                FocusPane::Input => FocusPane::Chat,
                FocusPane::Chat => FocusPane::Bookings,
                FocusPane::Bookings => FocusPane::Input,
            };
            if app.focus == FocusPane::Input {
                app.input_mode = InputMode::Editing;
                app.chat_cursor = app.chat_input.chars().count();
            }
        }
        KeyCode::Char('i') | KeyCode::Char('/') => {
            app.focus = FocusPane::Input;
            app.input_mode = InputMode::Editing;
            app.chat_cursor = app.chat_input.chars().count();
        }

        KeyCode::Char('m') => app.toggle_chat_mode(),
        KeyCode::Char('x') => app.cancel_chat(),
        KeyCode::Char('r') => app.load_bookings(),
        KeyCode::Esc => app.notification = None,

        KeyCode::Char('j') | KeyCode::Down => match app.focus {
            FocusPane::Chat => app.chat_scroll = app.chat_scroll.saturating_add(1),
            FocusPane::Bookings => app.bookings_nav_down(),
            FocusPane::Input => {}
        },
        KeyCode::Char('k') | KeyCode::Up => match app.focus {
            FocusPane::Chat => app.chat_scroll = app.chat_scroll.saturating_sub(1),
            FocusPane::Bookings => app.bookings_nav_up(),
            FocusPane::Input => {}
        },
        KeyCode::Char('G') if app.focus == FocusPane::Chat => app.scroll_chat_to_bottom(),

        // Booking actions (only when Bookings is focused)
        KeyCode::Enter if app.focus == FocusPane::Bookings => app.open_details(),
        KeyCode::Char('s') if app.focus == FocusPane::Bookings => app.open_seat_selector(),
        KeyCode::Char('C') if app.focus == FocusPane::Bookings => app.open_cancel_confirm(),

        _ => {}
    }
}

fn handle_editing_mode(app: &mut App, key: KeyEvent) {
    // The input box is disabled while a reply streams
    let busy = app.session.is_busy();
    if busy && matches!(key.code, KeyCode::Char(_) | KeyCode::Backspace | KeyCode::Delete) {
        return;
    }

    match key.code {
        KeyCode::Esc => {
            app.input_mode = InputMode::Normal;
        }
        KeyCode::Tab => {
            app.input_mode = InputMode::Normal;
            app.focus = FocusPane::Chat;
        }
        KeyCode::Enter => app.submit_chat(),
        KeyCode::Backspace => {
            if app.chat_cursor > 0 {
                app.chat_cursor -= 1;
                let byte_pos = char_to_byte_index(&app.chat_input, app.chat_cursor);
                app.chat_input.remove(byte_pos);
            }
        }
        KeyCode::Delete => {
            let char_count = app.chat_input.chars().count();
            if app.chat_cursor < char_count {
                let byte_pos = char_to_byte_index(&app.chat_input, app.chat_cursor);
                app.chat_input.remove(byte_pos);
            }
        }
        KeyCode::Left => {
            app.chat_cursor = app.chat_cursor.saturating_sub(1);
        }
        KeyCode::Right => {
            let char_count = app.chat_input.chars().count();
            app.chat_cursor = (app.chat_cursor + 1).min(char_count);
        }
        KeyCode::Home => {
            app.chat_cursor = 0;
        }
        KeyCode::End => {
            app.chat_cursor = app.chat_input.chars().count();
        }
        KeyCode::Char(c) => {
            let byte_pos = char_to_byte_index(&app.chat_input, app.chat_cursor);
            app.chat_input.insert(byte_pos, c);
            app.chat_cursor += 1;
        }
        _ => {}
    }
}

fn handle_popup(app: &mut App, key: KeyEvent) {
    let Some(popup) = app.popup.as_mut() else {
        return;
    };

    match popup {
        Popup::Details(_) => match key.code {
            KeyCode::Esc | KeyCode::Char('q') | KeyCode::Enter => app.close_popup(),
            KeyCode::Char('s') => app.open_seat_selector(),
            _ => {}
        },
        Popup::Seat(dialog) => {
            if dialog.submitting {
                return;
            }
            match key.code {
                KeyCode::Esc | KeyCode::Char('q') => app.close_popup(),
                KeyCode::Char('k') | KeyCode::Up => dialog.map.move_up(),
                KeyCode::Char('j') | KeyCode::Down => dialog.map.move_down(),
                KeyCode::Char('h') | KeyCode::Left => dialog.map.move_left(),
                KeyCode::Char('l') | KeyCode::Right => dialog.map.move_right(),
                KeyCode::Char(' ') => dialog.map.select(),
                KeyCode::Enter => app.confirm_seat(),
                _ => {}
            }
        }
        Popup::ConfirmCancel(_) => match key.code {
            KeyCode::Char('y') | KeyCode::Char('Y') => app.confirm_cancel(),
            KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => app.close_popup(),
            _ => {}
        },
    }
}

fn point_in_rect(x: u16, y: u16, rect: Rect) -> bool {
    x >= rect.x && x < rect.x + rect.width && y >= rect.y && y < rect.y + rect.height
}

fn handle_mouse(app: &mut App, mouse: MouseEvent) {
    let x = mouse.column;
    let y = mouse.row;

    let in_chat = app.chat_area.map(|r| point_in_rect(x, y, r)).unwrap_or(false);
    let in_bookings = app.bookings_area.map(|r| point_in_rect(x, y, r)).unwrap_or(false);

    match mouse.kind {
        MouseEventKind::ScrollDown => {
            if in_chat {
                app.chat_scroll = app.chat_scroll.saturating_add(3);
            } else if in_bookings {
                app.bookings_nav_down();
            }
        }
        MouseEventKind::ScrollUp => {
            if in_chat {
                app.chat_scroll = app.chat_scroll.saturating_sub(3);
            } else if in_bookings {
                app.bookings_nav_up();
            }
        }
        _ => {}
    }
}
