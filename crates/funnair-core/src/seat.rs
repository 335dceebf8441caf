//! Seat map for the seat-selection dialog

pub const ROWS: u8 = 12;
pub const SEAT_LETTERS: [char; 6] = ['A', 'B', 'C', 'D', 'E', 'F'];

/// A seat position in the cabin grid (row is 1-based)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Seat {
    pub row: u8,
    pub letter: char,
}

impl Seat {
    /// Parse ids like `"7A"`. Seats outside the grid are `None`.
    pub fn parse(id: &str) -> Option<Self> {
        let id = id.trim();
        let letter = id.chars().last()?.to_ascii_uppercase();
        let row: u8 = id[..id.len() - letter.len_utf8()].parse().ok()?;
        if row == 0 || row > ROWS || !SEAT_LETTERS.contains(&letter) {
            return None;
        }
        Some(Self { row, letter })
    }

    pub fn id(&self) -> String {
        format!("{}{}", self.row, self.letter)
    }

    fn column(&self) -> usize {
        SEAT_LETTERS.iter().position(|&l| l == self.letter).unwrap_or(0)
    }
}

/// State of the seat dialog: the booking's current seat, the cursor, and
/// the seat picked so far
#[derive(Debug, Clone)]
pub struct SeatMap {
    current: String,
    cursor: Seat,
    selected: Option<Seat>,
}

impl SeatMap {
    /// A current seat outside the grid (e.g. `19A`) is shown but not pre-selected,
    /// so nothing can be confirmed until a grid seat is picked.
    pub fn new(current_seat: &str) -> Self {
        let current = Seat::parse(current_seat);
        Self {
            current: current_seat.to_string(),
            cursor: current.unwrap_or(Seat { row: 1, letter: SEAT_LETTERS[0] }),
            selected: current,
        }
    }

    pub fn current_seat(&self) -> &str {
        &self.current
    }

    pub fn cursor(&self) -> Seat {
        self.cursor
    }

    pub fn selected(&self) -> Option<Seat> {
        self.selected
    }

    pub fn is_current(&self, seat: Seat) -> bool {
        seat.id() == self.current
    }

    pub fn is_selected(&self, seat: Seat) -> bool {
        self.selected == Some(seat)
    }

    pub fn move_up(&mut self) {
        self.cursor.row = self.cursor.row.saturating_sub(1).max(1);
    }

    pub fn move_down(&mut self) {
        self.cursor.row = (self.cursor.row + 1).min(ROWS);
    }

    pub fn move_left(&mut self) {
        let col = self.cursor.column().saturating_sub(1);
        self.cursor.letter = SEAT_LETTERS[col];
    }

    pub fn move_right(&mut self) {
        let col = (self.cursor.column() + 1).min(SEAT_LETTERS.len() - 1);
        self.cursor.letter = SEAT_LETTERS[col];
    }

    /// Pick the seat under the cursor
    pub fn select(&mut self) {
        self.selected = Some(self.cursor);
    }

    /// Seat id to request, if one is picked
    pub fn confirm(&self) -> Option<String> {
        self.selected.map(|s| s.id())
    }

    /// Every seat, row by row
    pub fn rows() -> impl Iterator<Item = Vec<Seat>> {
        (1..=ROWS).map(|row| {
            SEAT_LETTERS
                .iter()
                .map(|&letter| Seat { row, letter })
                .collect()
        })
    }
}
