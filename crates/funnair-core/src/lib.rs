pub mod api;
pub mod booking;
pub mod config;
pub mod error;
pub mod seat;
pub mod state;
pub mod stream;
pub mod transcript;

// Re-export main types for convenience
pub use api::{BookingClient, ChatMode, ChatStream, HealthStatus};
pub use booking::{ActionResponse, BookingDetails, BookingStatus, ChangeBookingRequest};
pub use config::Config;
pub use error::ApiError;
pub use seat::{Seat, SeatMap};
pub use state::{ChatId, ChatMessage, ChatRole};
pub use stream::{StreamDecoder, StreamEnd, StreamItem};
pub use transcript::{exchange, ChatPhase, ChatSession, Step, SubmitError, Transcript, ERROR_REPLY};
