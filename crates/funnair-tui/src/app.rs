use funnair_core::{
    ActionResponse, ApiError, BookingClient, BookingDetails, ChatId, ChatMessage, ChatMode, ChatSession, SeatMap, Step, StreamItem, SubmitError,
};
use ratatui::layout::Rect;
use ratatui::widgets::TableState;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::tui::{AppEvent, BookingAction, ChatUpdate};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusPane {
    Chat,
    Input,
    Bookings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Info,
    Error,
}

#[derive(Debug, Clone)]
pub struct Notification {
    pub kind: NotificationKind,
    pub text: String,
}

/// Seat dialog for one booking
#[derive(Debug, Clone)]
pub struct SeatDialog {
    pub booking: BookingDetails,
    pub map: SeatMap,
    pub submitting: bool,
}

#[derive(Debug, Clone)]
pub enum Popup {
    Details(BookingDetails),
    Seat(SeatDialog),
    ConfirmCancel(BookingDetails),
}

pub struct App {
    // Core state
    pub should_quit: bool,
    pub input_mode: InputMode,
    pub focus: FocusPane,

    // Chat state
    pub session: ChatSession,
    pub chat_mode: ChatMode,
    pub chat_input: String,
    pub chat_cursor: usize,
    pub chat_scroll: u16,
    pub chat_height: u16,
    pub chat_width: u16,
    pub stream_cancel: Option<CancellationToken>,

    // Bookings state
    pub bookings: Vec<BookingDetails>,
    pub bookings_state: TableState,
    pub bookings_loading: bool,

    pub popup: Option<Popup>,
    pub notification: Option<Notification>,
    pub animation_frame: u8,

    // Pane areas from the last draw, for mouse hit-testing
    pub chat_area: Option<Rect>,
    pub bookings_area: Option<Rect>,

    client: BookingClient,
    events: UnboundedSender<AppEvent>,
}

impl App {
    pub fn new(client: BookingClient, chat_id: ChatId, events: UnboundedSender<AppEvent>) -> Self {
        Self {
            should_quit: false,
            input_mode: InputMode::Editing,
            focus: FocusPane::Input,

            session: ChatSession::new(chat_id),
            chat_mode: ChatMode::Assistant,
            chat_input: String::new(),
            chat_cursor: 0,
            chat_scroll: 0,
            chat_height: 0,
            chat_width: 0,
            stream_cancel: None,

            bookings: Vec::new(),
            bookings_state: TableState::default(),
            bookings_loading: false,

            popup: None,
            notification: None,
            animation_frame: 0,

            chat_area: None,
            bookings_area: None,

            client,
            events,
        }
    }

    pub fn client(&self) -> &BookingClient {
        &self.client
    }

    pub fn notify(&mut self, kind: NotificationKind, text: impl Into<String>) {
        self.notification = Some(Notification {
            kind,
            text: text.into(),
        });
    }

    // Chat methods

    /// Send the input box as a chat message and start streaming the reply
    pub fn submit_chat(&mut self) {
        let message = match self.session.submit(&self.chat_input) {
            Ok(message) => message,
            Err(SubmitError::Busy) => {
                self.notify(NotificationKind::Info, "Wait for the current reply to finish (x to cancel)");
                return;
            }
            Err(SubmitError::Empty) => return,
        };

        self.chat_input.clear();
        self.chat_cursor = 0;
        self.notification = None;
        self.scroll_chat_to_bottom();

        let cancel = CancellationToken::new();
        self.stream_cancel = Some(cancel.clone());

        tokio::spawn(pump_chat(
            self.client.clone(),
            self.chat_mode,
            message,
            *self.session.chat_id(),
            cancel,
            self.session.cycle(),
            self.events.clone(),
        ));
    }

    /// Apply one update from a streaming task
    pub fn apply_chat(&mut self, cycle: u64, update: ChatUpdate) {
        if cycle != self.session.cycle() {
            debug!(cycle, current = self.session.cycle(), "dropping update from an old stream");
            return;
        }

        let step = match update {
            ChatUpdate::Started => {
                if self.session.begin_response() {
                    Step::Updated
                } else {
                    Step::Ignored
                }
            }
            ChatUpdate::Item(item) => self.session.apply_item(item),
            ChatUpdate::Failed(err) => self.session.apply_error(&err),
            ChatUpdate::Ended => self.session.apply_end(),
        };

        match step {
            Step::Updated => self.scroll_chat_to_bottom(),
            Step::Completed => {
                self.stream_cancel = None;
                self.scroll_chat_to_bottom();
                // the assistant may have changed a booking
                self.load_bookings();
            }
            Step::Failed | Step::Cancelled => {
                self.stream_cancel = None;
                self.scroll_chat_to_bottom();
            }
            Step::Ignored => {}
        }
    }

    /// Stop the reply that is streaming, if any
    pub fn cancel_chat(&mut self) {
        if let Some(token) = self.stream_cancel.take() {
            token.cancel();
            if self.session.cancel() == Step::Cancelled {
                self.notify(NotificationKind::Info, "Reply cancelled");
            }
        }
    }

    pub fn toggle_chat_mode(&mut self) {
        self.chat_mode = self.chat_mode.toggle();
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.session.is_reply_pending() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    /// Scroll chat so the newest line is visible
    pub fn scroll_chat_to_bottom(&mut self) {
        // Use actual chat width for wrap calculation, default to 50 if not set
        let wrap_width = if self.chat_width > 0 {
            self.chat_width as usize
        } else {
            50
        };

        let total_lines = transcript_height(self.session.transcript().messages(), wrap_width);

        let visible_height = if self.chat_height > 0 {
            self.chat_height
        } else {
            20
        };

        self.chat_scroll = total_lines.saturating_sub(visible_height);
    }

    // Bookings methods

    pub fn load_bookings(&mut self) {
        self.bookings_loading = true;
        let client = self.client.clone();
        let tx = self.events.clone();
        tokio::spawn(async move {
            let result = client.get_bookings().await;
            let _ = tx.send(AppEvent::Bookings(result));
        });
    }

    pub fn apply_bookings(&mut self, result: Result<Vec<BookingDetails>, ApiError>) {
        self.bookings_loading = false;
        match result {
            Ok(bookings) => {
                info!(count = bookings.len(), "bookings loaded");
                self.bookings = bookings;
                let selected = match self.bookings_state.selected() {
                    _ if self.bookings.is_empty() => None,
                    Some(i) => Some(i.min(self.bookings.len() - 1)),
                    None => Some(0),
                };
                self.bookings_state.select(selected);
            }
            Err(err) => self.notify(NotificationKind::Error, err.user_message()),
        }
    }

    pub fn bookings_nav_down(&mut self) {
        let len = self.bookings.len();
        if len > 0 {
            let i = self.bookings_state.selected().unwrap_or(0);
            self.bookings_state.select(Some((i + 1).min(len - 1)));
        }
    }

    pub fn bookings_nav_up(&mut self) {
        let i = self.bookings_state.selected().unwrap_or(0);
        self.bookings_state.select(Some(i.saturating_sub(1)));
    }

    pub fn selected_booking(&self) -> Option<&BookingDetails> {
        self.bookings_state.selected().and_then(|i| self.bookings.get(i))
    }

    pub fn open_details(&mut self) {
        if let Some(booking) = self.selected_booking().cloned() {
            self.popup = Some(Popup::Details(booking));
        }
    }

    pub fn open_seat_selector(&mut self) {
        let booking = match &self.popup {
            Some(Popup::Details(booking)) => Some(booking.clone()),
            _ => self.selected_booking().cloned(),
        };
        if let Some(booking) = booking {
            let map = SeatMap::new(&booking.seat_number);
            self.popup = Some(Popup::Seat(SeatDialog {
                booking,
                map,
                submitting: false,
            }));
        }
    }

    pub fn open_cancel_confirm(&mut self) {
        if let Some(booking) = self.selected_booking().cloned() {
            self.popup = Some(Popup::ConfirmCancel(booking));
        }
    }

    pub fn close_popup(&mut self) {
        self.popup = None;
    }

    /// Request the seat picked in the seat dialog
    pub fn confirm_seat(&mut self) {
        let Some(Popup::Seat(dialog)) = &mut self.popup else {
            return;
        };
        if dialog.submitting {
            return;
        }
        let Some(seat) = dialog.map.confirm() else {
            return;
        };
        dialog.submitting = true;

        let booking = dialog.booking.clone();
        let client = self.client.clone();
        let tx = self.events.clone();
        tokio::spawn(async move {
            let result = client
                .change_seat(&booking.booking_number, &booking.first_name, &booking.last_name, &seat)
                .await;
            let _ = tx.send(AppEvent::BookingAction {
                action: BookingAction::ChangeSeat,
                result,
            });
        });
    }

    /// Cancel the booking shown in the confirmation popup
    pub fn confirm_cancel(&mut self) {
        let Some(Popup::ConfirmCancel(booking)) = self.popup.take() else {
            return;
        };

        let client = self.client.clone();
        let tx = self.events.clone();
        tokio::spawn(async move {
            let result = client
                .cancel_booking(&booking.booking_number, &booking.first_name, &booking.last_name)
                .await;
            let _ = tx.send(AppEvent::BookingAction {
                action: BookingAction::Cancel,
                result,
            });
        });
    }

    pub fn apply_booking_action(&mut self, action: BookingAction, result: Result<ActionResponse, ApiError>) {
        match result {
            Ok(reply) => {
                if action == BookingAction::ChangeSeat {
                    self.popup = None;
                }
                self.notify(NotificationKind::Info, reply.message);
                self.load_bookings();
            }
            Err(err) => {
                if let Some(Popup::Seat(dialog)) = &mut self.popup {
                    dialog.submitting = false;
                }
                self.notify(NotificationKind::Error, err.user_message());
            }
        }
    }

    /// Stop background work before the terminal is restored
    pub fn shutdown(&mut self) {
        if let Some(token) = self.stream_cancel.take() {
            token.cancel();
        }
    }
}

/// Rendered height of the transcript at `wrap_width` columns, saturating at `u16::MAX`
fn transcript_height(messages: &[ChatMessage], wrap_width: usize) -> u16 {
    let wrap_width = wrap_width.max(1);
    let mut total_lines: u16 = 0;

    for msg in messages {
        total_lines = total_lines.saturating_add(1); // Header line ("You  2:07 PM")
        let content = if msg.content.is_empty() { "..." } else { msg.content.as_str() };
        for line in content.lines() {
            // Use character count, not byte length, for proper UTF-8 handling
            let wrapped = line.chars().count() / wrap_width + 1;
            total_lines = total_lines.saturating_add(u16::try_from(wrapped).unwrap_or(u16::MAX));
        }
        total_lines = total_lines.saturating_add(1); // Blank line after message
    }
    total_lines
}

/// Stream one reply and forward every decoder item to the event loop
async fn pump_chat(
    client: BookingClient,
    mode: ChatMode,
    message: String,
    chat_id: ChatId,
    cancel: CancellationToken,
    cycle: u64,
    tx: UnboundedSender<AppEvent>,
) {
    let send = |update| tx.send(AppEvent::Chat { cycle, update }).is_ok();

    if !send(ChatUpdate::Started) {
        return;
    }

    let mut decoder = match client.chat_stream(mode, &message, &chat_id, cancel).await {
        Ok(decoder) => decoder,
        Err(err) => {
            send(ChatUpdate::Failed(err));
            return;
        }
    };

    loop {
        let update = match decoder.next().await {
            Some(Ok(item)) => ChatUpdate::Item(item),
            Some(Err(err)) => ChatUpdate::Failed(err),
            None => ChatUpdate::Ended,
        };
        let last = !matches!(update, ChatUpdate::Item(StreamItem::Fragment(_)));
        if !send(update) || last {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use funnair_core::{BookingStatus, ChatPhase, ChatRole, ERROR_REPLY};
    use tokio::sync::mpsc;

    fn booking(number: &str, seat: &str) -> BookingDetails {
        BookingDetails {
            booking_number: number.to_string(),
            ticket_number: format!("FN{}000", number),
            first_name: "Frank".to_string(),
            last_name: "Li".to_string(),
            date: "2025-03-05".to_string(),
            booking_status: BookingStatus::Confirmed,
            from_airport: "LAX".to_string(),
            to_airport: "HEL".to_string(),
            seat_number: seat.to_string(),
            booking_class: "ECONOMY".to_string(),
        }
    }

    fn stream_error() -> ApiError {
        ApiError::Stream(Box::new(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")))
    }

    fn test_app() -> (App, mpsc::UnboundedReceiver<AppEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        // port 9 (discard) is never served in tests; spawned requests just fail
        let client = BookingClient::new("http://127.0.0.1:9");
        (App::new(client, ChatId::new(), tx), rx)
    }

    fn fragment(s: &str) -> ChatUpdate {
        ChatUpdate::Item(StreamItem::Fragment(s.to_string()))
    }

    fn last_content(app: &App) -> String {
        app.session.transcript().last().unwrap().content.clone()
    }

    #[tokio::test]
    async fn test_submit_then_stream_updates() {
        let (mut app, _rx) = test_app();
        app.chat_input = "Show my bookings".to_string();
        app.submit_chat();
        assert!(app.chat_input.is_empty());
        assert_eq!(app.session.transcript().len(), 1);
        assert!(app.stream_cancel.is_some());

        let cycle = app.session.cycle();
        app.apply_chat(cycle, ChatUpdate::Started);
        assert_eq!(app.session.transcript().len(), 2);
        assert_eq!(last_content(&app), "");

        app.apply_chat(cycle, fragment("Your "));
        assert_eq!(last_content(&app), "Your ");
        app.apply_chat(cycle, fragment("booking is CONFIRMED."));
        assert_eq!(last_content(&app), "Your booking is CONFIRMED.");

        app.apply_chat(cycle, ChatUpdate::Item(StreamItem::Done));
        assert_eq!(app.session.phase(), ChatPhase::Idle);
        assert!(app.stream_cancel.is_none());
        // completion reloads bookings
        assert!(app.bookings_loading);
    }

    #[tokio::test]
    async fn test_submit_rejected_while_streaming() {
        let (mut app, _rx) = test_app();
        app.chat_input = "first".to_string();
        app.submit_chat();

        app.chat_input = "second".to_string();
        app.submit_chat();
        assert_eq!(app.chat_input, "second");
        assert_eq!(app.session.transcript().len(), 1);
        assert!(matches!(app.notification, Some(Notification { kind: NotificationKind::Info, .. })));
    }

    #[tokio::test]
    async fn test_failure_shows_error_reply_without_refresh() {
        let (mut app, _rx) = test_app();
        app.chat_input = "hi".to_string();
        app.submit_chat();
        let cycle = app.session.cycle();
        app.apply_chat(cycle, ChatUpdate::Started);
        app.apply_chat(cycle, fragment("He"));
        app.apply_chat(cycle, fragment("llo"));

        app.apply_chat(cycle, ChatUpdate::Failed(stream_error()));
        assert_eq!(last_content(&app), ERROR_REPLY);
        assert_eq!(app.session.phase(), ChatPhase::Error);
        assert!(!app.bookings_loading);
    }

    #[tokio::test]
    async fn test_stale_cycle_is_dropped() {
        let (mut app, _rx) = test_app();
        app.chat_input = "first".to_string();
        app.submit_chat();
        let old = app.session.cycle();
        app.apply_chat(old, ChatUpdate::Started);
        app.cancel_chat();
        assert!(app.stream_cancel.is_none());

        app.chat_input = "second".to_string();
        app.submit_chat();
        let current = app.session.cycle();
        app.apply_chat(current, ChatUpdate::Started);

        app.apply_chat(old, fragment("from the old stream"));
        assert_eq!(last_content(&app), "");

        app.apply_chat(current, fragment("fresh"));
        assert_eq!(last_content(&app), "fresh");
        let roles: Vec<ChatRole> = app.session.transcript().messages().iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![ChatRole::User, ChatRole::User, ChatRole::Assistant]);
    }

    #[test]
    fn test_transcript_height_counts_wrapped_lines() {
        let messages = vec![ChatMessage::user("hello"), ChatMessage::assistant("")];
        // header + "hello" + blank, header + "..." + blank
        assert_eq!(transcript_height(&messages, 50), 6);

        let long = vec![ChatMessage::assistant("x".repeat(120))];
        assert_eq!(transcript_height(&long, 50), 1 + 3 + 1);
    }

    #[test]
    fn test_transcript_height_saturates() {
        let huge = vec![ChatMessage::assistant("y".repeat(200_000)); 4];
        assert_eq!(transcript_height(&huge, 1), u16::MAX);
    }

    #[tokio::test]
    async fn test_apply_bookings_clamps_selection() {
        let (mut app, _rx) = test_app();
        app.apply_bookings(Ok(vec![booking("101", "7A"), booking("102", "3C"), booking("103", "1A")]));
        assert_eq!(app.bookings_state.selected(), Some(0));

        app.bookings_nav_down();
        app.bookings_nav_down();
        app.bookings_nav_down();
        assert_eq!(app.selected_booking().unwrap().booking_number, "103");

        app.apply_bookings(Ok(vec![booking("101", "7A")]));
        assert_eq!(app.bookings_state.selected(), Some(0));

        app.apply_bookings(Ok(Vec::new()));
        assert_eq!(app.bookings_state.selected(), None);
        assert!(app.selected_booking().is_none());
    }

    #[tokio::test]
    async fn test_bookings_error_keeps_old_rows() {
        let (mut app, _rx) = test_app();
        app.apply_bookings(Ok(vec![booking("101", "7A")]));
        app.apply_bookings(Err(ApiError::Request {
            status: reqwest::StatusCode::INTERNAL_SERVER_ERROR,
            detail: "Failed to fetch bookings".to_string(),
        }));
        assert_eq!(app.bookings.len(), 1);
        let note = app.notification.as_ref().unwrap();
        assert_eq!(note.kind, NotificationKind::Error);
        assert_eq!(note.text, "Failed to fetch bookings");
    }

    #[tokio::test]
    async fn test_seat_change_flow() {
        let (mut app, _rx) = test_app();
        app.apply_bookings(Ok(vec![booking("101", "7A")]));
        app.open_details();
        app.open_seat_selector();

        let Some(Popup::Seat(dialog)) = &mut app.popup else {
            panic!("seat dialog should be open");
        };
        assert_eq!(dialog.map.cursor().id(), "7A");
        dialog.map.move_down();
        dialog.map.select();

        app.confirm_seat();
        assert!(matches!(&app.popup, Some(Popup::Seat(d)) if d.submitting));

        app.apply_booking_action(
            BookingAction::ChangeSeat,
            Err(ApiError::Request {
                status: reqwest::StatusCode::BAD_REQUEST,
                detail: "Seat 8A is not available".to_string(),
            }),
        );
        assert!(matches!(&app.popup, Some(Popup::Seat(d)) if !d.submitting));
        assert_eq!(app.notification.as_ref().unwrap().text, "Seat 8A is not available");

        app.apply_booking_action(
            BookingAction::ChangeSeat,
            Ok(ActionResponse {
                success: true,
                message: "Seat changed to 8A".to_string(),
            }),
        );
        assert!(app.popup.is_none());
        assert!(app.bookings_loading);
    }

    #[tokio::test]
    async fn test_cancel_confirm_closes_popup() {
        let (mut app, _rx) = test_app();
        app.apply_bookings(Ok(vec![booking("101", "7A")]));
        app.open_cancel_confirm();
        assert!(matches!(app.popup, Some(Popup::ConfirmCancel(_))));
        app.confirm_cancel();
        assert!(app.popup.is_none());
    }
}
