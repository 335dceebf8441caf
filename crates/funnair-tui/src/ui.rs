use funnair_core::{BookingDetails, BookingStatus, ChatRole, SeatMap};
use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table, Wrap},
};

use crate::app::{App, FocusPane, InputMode, NotificationKind, Popup, SeatDialog};

/// Render `**bold**` runs in an assistant line; an unmatched `**` stays literal
fn styled_reply_line(text: &str) -> Line<'static> {
    let parts: Vec<&str> = text.split("**").collect();
    // an even number of parts means the last ** was never closed
    let closed = parts.len() % 2 == 1;

    let mut spans = Vec::with_capacity(parts.len());
    for (i, part) in parts.iter().enumerate() {
        let bold = i % 2 == 1;
        if bold && !closed && i == parts.len() - 1 {
            spans.push(Span::raw(format!("**{}", part)));
        } else if bold && !part.is_empty() {
            spans.push(Span::styled(part.to_string(), Style::default().add_modifier(Modifier::BOLD)));
        } else if !part.is_empty() {
            spans.push(Span::raw(part.to_string()));
        }
    }
    Line::from(spans)
}

fn status_color(status: BookingStatus) -> Color {
    match status {
        BookingStatus::Confirmed => Color::Green,
        BookingStatus::Completed => Color::Blue,
        BookingStatus::Cancelled => Color::Red,
    }
}

fn centered_rect(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width.saturating_sub(4));
    let height = height.min(area.height.saturating_sub(2));
    Rect::new(
        area.x + area.width.saturating_sub(width) / 2,
        area.y + area.height.saturating_sub(height) / 2,
        width,
        height,
    )
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    // Main layout: header, body, footer
    let [header_area, body_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);

    let [chat_column, bookings_area] = Layout::horizontal([
        Constraint::Percentage(55),
        Constraint::Percentage(45),
    ])
    .areas(body_area);

    render_chat(app, frame, chat_column);
    render_bookings(app, frame, bookings_area);
    render_footer(app, frame, footer_area);

    match &app.popup {
        Some(Popup::Details(booking)) => render_details(booking, frame, area),
        Some(Popup::Seat(dialog)) => render_seat_map(dialog, frame, area),
        Some(Popup::ConfirmCancel(booking)) => render_confirm_cancel(booking, frame, area),
        None => {}
    }
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let title = Line::from(vec![
        Span::styled(" Funnair ", Style::default().fg(Color::Cyan).bold()),
        Span::styled(
            format!("{} ", app.client().base_url()),
            Style::default().fg(Color::Gray),
        ),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::Gray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    // A pending notification takes over the footer
    if let Some(note) = &app.notification {
        let style = match note.kind {
            NotificationKind::Info => Style::default().bg(Color::Blue).fg(Color::White),
            NotificationKind::Error => Style::default().bg(Color::Red).fg(Color::White),
        };
        let footer = Paragraph::new(Line::from(vec![
            Span::styled(format!(" {} ", note.text), style),
            Span::styled(" Esc dismiss ", Style::default().fg(Color::DarkGray)),
        ]));
        frame.render_widget(footer, area);
        return;
    }

    let mode_style = match app.input_mode {
        InputMode::Normal => Style::default().bg(Color::Blue).fg(Color::White),
        InputMode::Editing => Style::default().bg(Color::Yellow).fg(Color::Black),
    };
    let mode_text = match app.input_mode {
        InputMode::Normal => " NORMAL ",
        InputMode::Editing => " INSERT ",
    };

    // Key style: dark background with bright text for visibility on both light/dark terminals
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);
    let hint = |key: &'static str, label: &'static str| {
        [Span::styled(key, key_style), Span::styled(label, label_style)]
    };

    let mut spans = vec![Span::styled(mode_text, mode_style), Span::raw(" ")];
    let hints: Vec<[Span; 2]> = match (app.input_mode, app.focus) {
        (InputMode::Editing, _) => vec![hint(" Enter ", " send "), hint(" Esc ", " normal ")],
        (InputMode::Normal, FocusPane::Bookings) => vec![
            hint(" j/k ", " select "),
            hint(" Enter ", " details "),
            hint(" s ", " seat "),
            hint(" C ", " cancel booking "),
            hint(" r ", " reload "),
        ],
        (InputMode::Normal, _) => vec![
            hint(" i ", " type "),
            hint(" j/k ", " scroll "),
            hint(" m ", " mode "),
            hint(" x ", " stop reply "),
        ],
    };
    for pair in hints {
        spans.extend(pair);
    }
    if app.input_mode == InputMode::Normal {
        spans.extend(hint(" Tab ", " focus "));
        spans.extend(hint(" q ", " quit "));
    }

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn render_chat(app: &mut App, frame: &mut Frame, area: Rect) {
    let [chat_area, input_area] = Layout::vertical([
        Constraint::Min(0),
        Constraint::Length(3),
    ])
    .areas(area);

    // Store area for mouse hit-testing
    app.chat_area = Some(chat_area);

    // Inner size minus borders
    let width_changed = app.chat_width != chat_area.width.saturating_sub(2);
    app.chat_height = chat_area.height.saturating_sub(2);
    app.chat_width = chat_area.width.saturating_sub(2);
    if width_changed && app.session.is_busy() {
        app.scroll_chat_to_bottom();
    }

    let border_color = if app.focus == FocusPane::Chat { Color::Cyan } else { Color::DarkGray };
    let chat_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(format!(" {} ", app.chat_mode.display_name()));

    let messages = app.session.transcript().messages();
    let chat_text = if messages.is_empty() {
        Text::from(vec![
            Line::from(Span::styled(
                "Hi! I can look up, change or cancel your Funnair bookings.",
                Style::default().fg(Color::DarkGray),
            )),
            Line::from(Span::styled(
                "Press m to ask about fares and policies instead.",
                Style::default().fg(Color::DarkGray),
            )),
        ])
    } else {
        let mut lines: Vec<Line> = Vec::new();
        let last = messages.len() - 1;

        for (i, msg) in messages.iter().enumerate() {
            let name_style = match msg.role {
                ChatRole::User => Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                ChatRole::Assistant => Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
            };
            lines.push(Line::from(vec![
                Span::styled(msg.role.display_name(), name_style),
                Span::styled(format!("  {}", msg.time_label()), Style::default().fg(Color::DarkGray)),
            ]));

            if msg.content.is_empty() {
                // Animated ellipsis while the reply is pending
                let dots = if i == last && app.session.is_reply_pending() {
                    ".".repeat(app.animation_frame as usize + 1)
                } else {
                    "...".to_string()
                };
                lines.push(Line::from(Span::styled(
                    dots,
                    Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
                )));
            } else {
                for line in msg.content.lines() {
                    match msg.role {
                        ChatRole::User => lines.push(Line::from(line.to_string())),
                        ChatRole::Assistant => lines.push(styled_reply_line(line)),
                    }
                }
            }
            lines.push(Line::default());
        }

        Text::from(lines)
    };

    let chat = Paragraph::new(chat_text)
        .block(chat_block)
        .wrap(Wrap { trim: false })
        .scroll((app.chat_scroll, 0));
    frame.render_widget(chat, chat_area);

    let input_focused = app.focus == FocusPane::Input || app.input_mode == InputMode::Editing;
    let input_enabled = !app.session.is_busy();
    let input_color = if input_focused && input_enabled { Color::Yellow } else { Color::DarkGray };
    let title = if app.session.is_busy() {
        " Message (Esc then x stops the reply) "
    } else {
        " Message "
    };
    let input_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(input_color))
        .title(title);

    // Horizontal scroll keeps the cursor inside the box
    let inner_width = input_area.width.saturating_sub(2) as usize;
    let cursor_pos = app.chat_cursor;
    let scroll_offset = if inner_width > 0 && cursor_pos >= inner_width {
        cursor_pos - inner_width + 1
    } else {
        0
    };
    let visible_text: String = app
        .chat_input
        .chars()
        .skip(scroll_offset)
        .take(inner_width)
        .collect();

    let text_color = if input_enabled { Color::Cyan } else { Color::DarkGray };
    let input = Paragraph::new(visible_text)
        .style(Style::default().fg(text_color))
        .block(input_block);
    frame.render_widget(input, input_area);

    if app.input_mode == InputMode::Editing && input_enabled && app.popup.is_none() {
        let cursor_x = (cursor_pos - scroll_offset) as u16;
        frame.set_cursor_position((input_area.x + cursor_x + 1, input_area.y + 1));
    }
}

fn render_bookings(app: &mut App, frame: &mut Frame, area: Rect) {
    app.bookings_area = Some(area);

    let border_color = if app.focus == FocusPane::Bookings { Color::Cyan } else { Color::DarkGray };
    let title = if app.bookings_loading {
        " Bookings (loading...) ".to_string()
    } else {
        format!(" Bookings ({}) ", app.bookings.len())
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(title);

    if app.bookings.is_empty() {
        let text = if app.bookings_loading { "" } else { "No bookings found." };
        let empty = Paragraph::new(Span::styled(text, Style::default().fg(Color::DarkGray))).block(block);
        frame.render_widget(empty, area);
        return;
    }

    let header = Row::new([
        "Booking #", "Ticket #", "First Name", "Last Name", "Date", "Status", "From", "To", "Class",
    ])
    .style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD));

    let rows: Vec<Row> = app
        .bookings
        .iter()
        .map(|b| {
            Row::new(vec![
                Cell::from(b.booking_number.clone()),
                Cell::from(b.short_ticket()),
                Cell::from(b.first_name.clone()),
                Cell::from(b.last_name.clone()),
                Cell::from(b.short_date()),
                Cell::from(Span::styled(
                    b.booking_status.as_str(),
                    Style::default().fg(status_color(b.booking_status)),
                )),
                Cell::from(b.from_airport.clone()),
                Cell::from(b.to_airport.clone()),
                Cell::from(b.class_label().to_string()),
            ])
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(9),
            Constraint::Length(8),
            Constraint::Min(6),
            Constraint::Min(6),
            Constraint::Length(12),
            Constraint::Length(9),
            Constraint::Length(4),
            Constraint::Length(4),
            Constraint::Length(8),
        ],
    )
    .header(header)
    .block(block)
    .highlight_style(
        Style::default()
            .bg(Color::Blue)
            .fg(Color::White)
            .add_modifier(Modifier::BOLD),
    )
    .highlight_symbol("> ");

    frame.render_stateful_widget(table, area, &mut app.bookings_state);
}

fn render_details(booking: &BookingDetails, frame: &mut Frame, area: Rect) {
    let popup_area = centered_rect(area, 52, 13);
    frame.render_widget(Clear, popup_area);

    let label = Style::default().fg(Color::DarkGray);
    let field = |name: &'static str, value: String| {
        Line::from(vec![Span::styled(format!(" {:<10}", name), label), Span::raw(value)])
    };

    let lines = vec![
        Line::from(Span::styled(
            format!(" {} ", booking.route()),
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        )),
        Line::default(),
        field("Passenger", booking.passenger_name()),
        field("Booking", booking.booking_number.clone()),
        field("Ticket", booking.short_ticket()),
        field("Date", booking.long_date()),
        field("Class", booking.class_label().to_string()),
        field("Seat", booking.seat_number.clone()),
        Line::from(vec![
            Span::styled(format!(" {:<10}", "Status"), label),
            Span::styled(
                booking.booking_status.as_str(),
                Style::default().fg(status_color(booking.booking_status)).bold(),
            ),
        ]),
        Line::default(),
        Line::from(Span::styled(" s change seat  Esc close", label)),
    ];

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(" Booking details ");
    frame.render_widget(Paragraph::new(lines).block(block), popup_area);
}

fn render_seat_map(dialog: &SeatDialog, frame: &mut Frame, area: Rect) {
    let map: &SeatMap = &dialog.map;
    // header, 12 rows, spacer, legend, status, borders
    let popup_area = centered_rect(area, 40, 20);
    frame.render_widget(Clear, popup_area);

    let mut lines = vec![Line::from(Span::styled(
        "      A  B  C    D  E  F",
        Style::default().fg(Color::DarkGray),
    ))];

    for row in SeatMap::rows() {
        let mut spans = vec![Span::styled(
            format!("  {:>2} ", row[0].row),
            Style::default().fg(Color::DarkGray),
        )];
        for (col, seat) in row.iter().enumerate() {
            if col == 3 {
                // aisle
                spans.push(Span::raw("  "));
            }
            let mut style = if map.is_selected(*seat) {
                Style::default().fg(Color::Black).bg(Color::Yellow)
            } else if map.is_current(*seat) {
                Style::default().fg(Color::Black).bg(Color::Green)
            } else {
                Style::default().fg(Color::White)
            };
            if map.cursor() == *seat {
                style = style.add_modifier(Modifier::REVERSED | Modifier::BOLD);
            }
            spans.push(Span::styled(format!("[{}]", seat.letter), style));
        }
        lines.push(Line::from(spans));
    }

    lines.push(Line::default());
    lines.push(Line::from(vec![
        Span::styled(" current ", Style::default().fg(Color::Black).bg(Color::Green)),
        Span::raw(" "),
        Span::styled(" selected ", Style::default().fg(Color::Black).bg(Color::Yellow)),
    ]));

    let status = if dialog.submitting {
        Span::styled(" Changing seat...", Style::default().fg(Color::Yellow).add_modifier(Modifier::ITALIC))
    } else {
        match map.confirm() {
            Some(seat) => Span::styled(
                format!(" Seat {}  Enter confirm  Esc close", seat),
                Style::default().fg(Color::DarkGray),
            ),
            None => Span::styled(" Space picks a seat", Style::default().fg(Color::DarkGray)),
        }
    };
    lines.push(Line::from(status));

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(format!(
            " Seat for booking {} (now {}) ",
            dialog.booking.booking_number,
            map.current_seat()
        ));
    frame.render_widget(Paragraph::new(lines).block(block), popup_area);
}

fn render_confirm_cancel(booking: &BookingDetails, frame: &mut Frame, area: Rect) {
    let popup_area = centered_rect(area, 48, 6);
    frame.render_widget(Clear, popup_area);

    let text = vec![
        Line::from(format!(" Cancel booking {}?", booking.booking_number)),
        Line::from(Span::styled(
            format!(" {}, {}", booking.route(), booking.short_date()),
            Style::default().fg(Color::DarkGray),
        )),
        Line::default(),
        Line::from(vec![
            Span::styled(" y ", Style::default().bg(Color::Red).fg(Color::White)),
            Span::raw(" cancel it  "),
            Span::styled(" n ", Style::default().bg(Color::DarkGray).fg(Color::White)),
            Span::raw(" keep it"),
        ]),
    ];

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Red))
        .title(" Cancel booking ");
    frame.render_widget(
        Paragraph::new(text).block(block).wrap(Wrap { trim: false }),
        popup_area,
    );
}
