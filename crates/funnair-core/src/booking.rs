use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A booking as returned by `GET /api/bookings`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingDetails {
    pub booking_number: String,
    pub ticket_number: String,
    pub first_name: String,
    pub last_name: String,
    /// ISO date (`YYYY-MM-DD`), kept as sent
    pub date: String,
    pub booking_status: BookingStatus,
    pub from_airport: String,
    pub to_airport: String,
    pub seat_number: String,
    pub booking_class: String,
}

impl BookingDetails {
    pub fn passenger_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    pub fn route(&self) -> String {
        format!("{} → {}", self.from_airport, self.to_airport)
    }

    /// First 8 characters of the ticket number, as shown in the grid
    pub fn short_ticket(&self) -> String {
        self.ticket_number.chars().take(8).collect()
    }

    pub fn short_date(&self) -> String {
        format_date_short(&self.date)
    }

    pub fn long_date(&self) -> String {
        format_date_long(&self.date)
    }

    pub fn class_label(&self) -> &str {
        class_label(&self.booking_class)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BookingStatus {
    Confirmed,
    Cancelled,
    Completed,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Confirmed => "CONFIRMED",
            BookingStatus::Cancelled => "CANCELLED",
            BookingStatus::Completed => "COMPLETED",
        }
    }
}

/// Body of `POST /api/bookings/change`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeBookingRequest {
    pub booking_number: String,
    pub first_name: String,
    pub last_name: String,
    pub new_date: String,
    pub from_airport: String,
    pub to_airport: String,
}

/// Body of `POST /api/bookings/cancel`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelBookingRequest {
    pub booking_number: String,
    pub first_name: String,
    pub last_name: String,
}

/// Reply to a booking mutation
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ActionResponse {
    pub success: bool,
    pub message: String,
}

/// Booking class label for display. Unknown classes come back unchanged.
pub fn class_label(class: &str) -> &str {
    match class {
        "ECONOMY" => "Economy",
        "PREMIUM_ECONOMY" => "Premium",
        "BUSINESS" => "Business",
        other => other,
    }
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    // Some backends send a full timestamp; only the date part matters
    let date_part = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}

/// `Mar 5, 2025`, or the raw string if it isn't a date
pub fn format_date_short(raw: &str) -> String {
    parse_date(raw)
        .map(|d| d.format("%b %-d, %Y").to_string())
        .unwrap_or_else(|| raw.to_string())
}

/// `Wednesday, March 5, 2025`, or the raw string if it isn't a date
pub fn format_date_long(raw: &str) -> String {
    parse_date(raw)
        .map(|d| d.format("%A, %B %-d, %Y").to_string())
        .unwrap_or_else(|| raw.to_string())
}
