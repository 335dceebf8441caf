use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use futures_util::Stream;
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::booking::{ActionResponse, BookingDetails, CancelBookingRequest, ChangeBookingRequest};
use crate::error::{detail_or, ApiError};
use crate::state::ChatId;
use crate::stream::StreamDecoder;

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, reqwest::Error>> + Send>>;

/// Decoder over a chat response body
pub type ChatStream = StreamDecoder<ByteStream>;

#[derive(Serialize)]
struct ChatRequest<'a> {
    message: &'a str,
    chat_id: &'a ChatId,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub service: String,
}

/// Which chat endpoint to talk to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatMode {
    /// `/api/chat/stream`: the booking assistant with tool access
    Assistant,
    /// `/api/chat/rag`: policy questions answered from retrieved documents
    Policy,
}

impl ChatMode {
    fn path(&self) -> &'static str {
        match self {
            ChatMode::Assistant => "/api/chat/stream",
            ChatMode::Policy => "/api/chat/rag",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ChatMode::Assistant => "Assistant",
            ChatMode::Policy => "Policies",
        }
    }

    pub fn toggle(self) -> Self {
        match self {
            ChatMode::Assistant => ChatMode::Policy,
            ChatMode::Policy => ChatMode::Assistant,
        }
    }
}

#[derive(Clone)]
pub struct BookingClient {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl BookingClient {
    pub fn new(base_url: &str) -> Self {
        Self::with_timeout(base_url, Duration::from_secs(30))
    }

    /// `timeout` applies to booking calls only; chat streams run until they end
    pub fn with_timeout(base_url: &str, timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn health(&self) -> Result<HealthStatus, ApiError> {
        let request = self.client.get(self.url("/health"));
        let response = self.send(request, "Booking service is unavailable").await?;
        Ok(response.json().await?)
    }

    pub async fn get_bookings(&self) -> Result<Vec<BookingDetails>, ApiError> {
        let request = self.client.get(self.url("/api/bookings"));
        let response = self.send(request, "Failed to fetch bookings").await?;
        Ok(response.json().await?)
    }

    pub async fn get_booking(
        &self,
        booking_number: &str,
        first_name: &str,
        last_name: &str,
    ) -> Result<BookingDetails, ApiError> {
        let request = self
            .client
            .get(self.url(&format!("/api/bookings/{}", booking_number)))
            .query(&[
                ("booking_number", booking_number),
                ("first_name", first_name),
                ("last_name", last_name),
            ]);
        let response = self.send(request, "Booking not found").await?;
        Ok(response.json().await?)
    }

    pub async fn change_booking(&self, change: &ChangeBookingRequest) -> Result<ActionResponse, ApiError> {
        let request = self.client.post(self.url("/api/bookings/change")).json(change);
        let response = self.send(request, "Failed to change booking").await?;
        Ok(response.json().await?)
    }

    pub async fn cancel_booking(
        &self,
        booking_number: &str,
        first_name: &str,
        last_name: &str,
    ) -> Result<ActionResponse, ApiError> {
        let body = CancelBookingRequest {
            booking_number: booking_number.to_string(),
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
        };
        let request = self.client.post(self.url("/api/bookings/cancel")).json(&body);
        let response = self.send(request, "Failed to cancel booking").await?;
        Ok(response.json().await?)
    }

    pub async fn change_seat(
        &self,
        booking_number: &str,
        first_name: &str,
        last_name: &str,
        seat_number: &str,
    ) -> Result<ActionResponse, ApiError> {
        let request = self
            .client
            .post(self.url(&format!("/api/bookings/{}/seat", booking_number)))
            .query(&[
                ("first_name", first_name),
                ("last_name", last_name),
                ("seat_number", seat_number),
            ]);
        let response = self.send(request, "Failed to change seat").await?;
        Ok(response.json().await?)
    }

    /// Start a chat response. Fragments are pulled from the returned decoder;
    /// firing `cancel` stops it reading the body.
    pub async fn chat_stream(
        &self,
        mode: ChatMode,
        message: &str,
        chat_id: &ChatId,
        cancel: CancellationToken,
    ) -> Result<ChatStream, ApiError> {
        info!(%chat_id, endpoint = mode.path(), "starting chat stream");

        let body = ChatRequest { message, chat_id };
        let request = self.client.post(self.url(mode.path())).json(&body);

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ApiError::Cancelled),
            response = request.send() => response?,
        };
        let response = check_status(response, "Failed to get chat response").await?;

        let bytes: ByteStream = Box::pin(response.bytes_stream());
        Ok(StreamDecoder::new(bytes, cancel))
    }

    /// Policy question against the retrieval endpoint
    pub async fn chat_rag_stream(
        &self,
        message: &str,
        chat_id: &ChatId,
        cancel: CancellationToken,
    ) -> Result<ChatStream, ApiError> {
        self.chat_stream(ChatMode::Policy, message, chat_id, cancel).await
    }

    async fn send(&self, request: RequestBuilder, fallback: &str) -> Result<Response, ApiError> {
        let response = request.timeout(self.timeout).send().await?;
        check_status(response, fallback).await
    }
}

async fn check_status(response: Response, fallback: &str) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let detail = detail_or(&body, fallback);
    warn!(%status, %detail, "booking service request failed");
    Err(ApiError::Request { status, detail })
}
