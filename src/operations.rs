use crate::{
    backend::{ApiBackend, ApiRequest},
    client::ApiClient,
    error::ApiError,
    response::decode,
    session::SessionToken,
    types::{
        BookingRequest, BookingResult, CancelRequest, CancelResult, LotSlotRequest,
        PaymentConfirmation, PaymentIntent, PaymentIntentRequest, SlotOccupied, SlotOnly,
        UserProfile,
    },
};
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Url;
use serde::{de::DeserializeOwned, Serialize};
use tracing::{error, info};
use validator::Validate;

pub const BOOKING_FAILED: &str = "Booking failed";
pub const CANCELLATION_FAILED: &str = "Cancellation failed";
pub const NO_AVAILABLE_SLOT: &str = "No available slot";
pub const PAYMENT_FAILED: &str = "Payment failed";

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

impl<B: ApiBackend> ApiClient<B> {
    /// Books the first slot the server allocates for the requested window.
    ///
    /// Sent at most once. The returned booking is exactly what the server
    /// confirmed, including the QR payload.
    pub async fn book(
        &self,
        token: &SessionToken,
        request: &BookingRequest,
    ) -> Result<BookingResult, ApiError> {
        request
            .validate()
            .map_err(|err| ApiError::Invalid(err.to_string()))?;
        let booking: BookingResult = self
            .command(self.endpoint("/book"), Some(token), Some(request), BOOKING_FAILED)
            .await?;
        info!(row = booking.slot.row, col = booking.slot.col, "Booking confirmed");
        Ok(booking)
    }

    pub async fn cancel(
        &self,
        token: &SessionToken,
        request: &CancelRequest,
    ) -> Result<CancelResult, ApiError> {
        let result: CancelResult = self
            .command(
                self.endpoint("/cancel"),
                Some(token),
                Some(request),
                CANCELLATION_FAILED,
            )
            .await?;
        info!(row = request.row, col = request.col, "Booking cancelled");
        Ok(result)
    }

    /// Reserves a specific slot of a lot. The success body is passed through as is.
    pub async fn reserve_slot(
        &self,
        token: &SessionToken,
        request: &LotSlotRequest,
    ) -> Result<serde_json::Value, ApiError> {
        self.command(
            self.endpoint("/api/bookings"),
            Some(token),
            Some(request),
            BOOKING_FAILED,
        )
        .await
    }

    pub async fn find_slot(
        &self,
        token: &SessionToken,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<SlotOnly, ApiError> {
        let mut url = self.endpoint("/find-slot");
        url.query_pairs_mut()
            .append_pair("start", &timestamp(start))
            .append_pair("end", &timestamp(end));
        self.command(url, Some(token), None::<&()>, NO_AVAILABLE_SLOT)
            .await
    }

    pub async fn slot_occupied(
        &self,
        token: &SessionToken,
        slot: &str,
        at: DateTime<Utc>,
    ) -> Result<SlotOccupied, ApiError> {
        let mut url = self.endpoint("/slot-occupied");
        url.query_pairs_mut()
            .append_pair("slot", slot)
            .append_pair("at", &timestamp(at));
        self.fetch_json(url, token).await
    }

    pub async fn profile(&self, token: &SessionToken) -> Result<UserProfile, ApiError> {
        self.fetch_json(self.endpoint("/auth/me"), token).await
    }

    pub async fn create_payment_intent(
        &self,
        request: &PaymentIntentRequest,
    ) -> Result<PaymentIntent, ApiError> {
        self.command(
            self.endpoint("/payments/create-intent"),
            None,
            Some(request),
            PAYMENT_FAILED,
        )
        .await
    }

    pub async fn confirm_payment(
        &self,
        confirmation: &PaymentConfirmation,
    ) -> Result<serde_json::Value, ApiError> {
        self.command(
            self.endpoint("/payments/confirm"),
            None,
            Some(confirmation),
            PAYMENT_FAILED,
        )
        .await
    }

    async fn command<P, T>(
        &self,
        url: Url,
        token: Option<&SessionToken>,
        payload: Option<&P>,
        fallback: &str,
    ) -> Result<T, ApiError>
    where
        P: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let path = url.path().to_string();
        let mut request = ApiRequest::post(url);
        if let Some(token) = token {
            request = request.bearer(token);
        }
        if let Some(payload) = payload {
            request = request.json(payload)?;
        }

        let raw = self.backend().send(request).await?;
        decode(raw)?.into_result(fallback).map_err(|err| {
            error!(%err, %path, "Command rejected");
            err
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::backend::Method;
    use crate::testutils::{json_response, mock_client, text_response};
    use chrono::TimeZone;
    use serde_json::json;

    fn booking_request() -> BookingRequest {
        BookingRequest {
            start: Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap(),
            hours: 2,
            days: 0,
            months: 0,
            plate: "ABC123".into(),
        }
    }

    fn booking_body() -> serde_json::Value {
        json!({
            "slot": {"row": 1, "col": 3},
            "start": "2024-01-01T10:00:00Z",
            "end": "2024-01-01T12:00:00Z",
            "qr": "iVBORw0KGgoAAAANSUhEUgAA"
        })
    }

    #[tokio::test]
    async fn test_book_returns_server_booking_unmodified() {
        let (client, backend) = mock_client();
        backend.respond("/book", json_response(200, booking_body()));
        let token = SessionToken::new("abc");

        let booking = client.book(&token, &booking_request()).await.unwrap();

        assert_eq!(serde_json::to_value(&booking).unwrap(), booking_body());
        let request = backend.last_request();
        assert_eq!(request.method, Method::Post);
        assert_eq!(request.url.path(), "/book");
        assert_eq!(request.token, Some(token));
        assert_eq!(
            request.body.unwrap(),
            json!({"start": "2024-01-01T10:00:00Z", "hours": 2, "days": 0, "months": 0, "plate": "ABC123"})
        );
    }

    #[test_case::test_case(json_response(400, json!({"detail": "No free slot in window"})), "No free slot in window" ; "json detail")]
    #[test_case::test_case(text_response(502, "Bad Gateway"), "Bad Gateway" ; "text body")]
    #[test_case::test_case(json_response(500, json!({})), "Booking failed" ; "no detail")]
    #[test_case::test_case(text_response(500, ""), "Booking failed" ; "empty body")]
    #[tokio::test]
    async fn test_book_failure_message(response: crate::response::RawResponse, expected: &str) {
        let (client, backend) = mock_client();
        backend.respond("/book", response);

        let err = client
            .book(&SessionToken::new("abc"), &booking_request())
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), expected);
        // No retry.
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn test_book_rejects_empty_plate_locally() {
        let (client, backend) = mock_client();
        let mut request = booking_request();
        request.plate.clear();

        let err = client
            .book(&SessionToken::new("abc"), &request)
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::Invalid(_)));
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn test_book_transport_error_is_not_retried() {
        let (client, backend) = mock_client();
        backend.fail("/book", ApiError::Transport("connection refused".into()));

        let err = client
            .book(&SessionToken::new("abc"), &booking_request())
            .await
            .unwrap_err();

        assert_eq!(err, ApiError::Transport("connection refused".into()));
        assert_eq!(backend.calls(), 1);
    }

    #[test_case::test_case(json_response(200, json!({"message": "Cancelled successfully"})), Ok("Cancelled successfully") ; "success")]
    #[test_case::test_case(json_response(400, json!({"detail": "Booking not found"})), Err("Booking not found") ; "json detail")]
    #[test_case::test_case(text_response(500, "Internal Server Error"), Err("Internal Server Error") ; "text body")]
    #[test_case::test_case(json_response(400, json!({"detail": ""})), Err("Cancellation failed") ; "fallback")]
    #[tokio::test]
    async fn test_cancel(response: crate::response::RawResponse, expected: Result<&str, &str>) {
        let (client, backend) = mock_client();
        backend.respond("/cancel", response);
        let booking: BookingResult = serde_json::from_value(booking_body()).unwrap();

        let result = client
            .cancel(
                &SessionToken::new("abc"),
                &CancelRequest::for_booking(&booking, "ABC123"),
            )
            .await;

        match expected {
            Ok(message) => assert_eq!(result.unwrap().message, message),
            Err(message) => assert_eq!(result.unwrap_err().to_string(), message),
        }
        assert_eq!(
            backend.last_request().body.unwrap(),
            json!({"row": 1, "col": 3, "start": "2024-01-01T10:00:00Z", "end": "2024-01-01T12:00:00Z", "plate": "ABC123"})
        );
    }

    #[tokio::test]
    async fn test_reserve_slot_uses_lot_and_slot() {
        let (client, backend) = mock_client();
        backend.respond(
            "/api/bookings",
            json_response(201, json!({"booking_id": "b-1"})),
        );

        let reply = client
            .reserve_slot(
                &SessionToken::new("abc"),
                &LotSlotRequest {
                    lot_id: "lot-1".into(),
                    slot_id: "A2".into(),
                },
            )
            .await
            .unwrap();

        assert_eq!(reply, json!({"booking_id": "b-1"}));
        assert_eq!(
            backend.last_request().body.unwrap(),
            json!({"lot_id": "lot-1", "slot_id": "A2"})
        );
    }

    #[tokio::test]
    async fn test_reserve_slot_reports_server_message() {
        let (client, backend) = mock_client();
        backend.respond(
            "/api/bookings",
            json_response(409, json!({"message": "Slot taken"})),
        );

        let err = client
            .reserve_slot(
                &SessionToken::new("abc"),
                &LotSlotRequest {
                    lot_id: "lot-1".into(),
                    slot_id: "A2".into(),
                },
            )
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "Slot taken");
    }

    #[tokio::test]
    async fn test_find_slot_sends_window_as_query() {
        let (client, backend) = mock_client();
        backend.respond(
            "/find-slot",
            json_response(404, json!({"detail": "No available slot"})),
        );
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();

        let err = client
            .find_slot(&SessionToken::new("abc"), start, end)
            .await
            .unwrap_err();

        assert_eq!(err.status(), Some(404));
        let request = backend.last_request();
        assert!(request.body.is_none());
        assert_eq!(
            request.url.query(),
            Some("start=2024-01-01T10%3A00%3A00Z&end=2024-01-01T12%3A00%3A00Z")
        );
    }

    #[tokio::test]
    async fn test_profile_and_slot_status() {
        let (client, backend) = mock_client();
        backend.respond(
            "/auth/me",
            json_response(200, json!({"userId": "driver@example.com", "loyaltyPoints": 0})),
        );
        backend.respond("/slot-occupied", json_response(200, json!({"occupied": true})));
        let token = SessionToken::new("abc");

        let profile = client.profile(&token).await.unwrap();
        assert_eq!(profile.user_id, "driver@example.com");

        let status = client
            .slot_occupied(&token, "1-3", Utc::now())
            .await
            .unwrap();
        assert!(status.occupied);
        assert_eq!(backend.last_request().method, Method::Get);
    }

    #[tokio::test]
    async fn test_payment_intent_is_unauthenticated() {
        let (client, backend) = mock_client();
        backend.respond(
            "/payments/create-intent",
            json_response(200, json!({"client_secret": "pi_secret"})),
        );

        let intent = client
            .create_payment_intent(&PaymentIntentRequest::new(1250))
            .await
            .unwrap();

        assert_eq!(intent.client_secret, "pi_secret");
        let request = backend.last_request();
        assert!(request.token.is_none());
        assert_eq!(
            request.body.unwrap(),
            json!({"amount_cents": 1250, "currency": "usd"})
        );
    }

    #[tokio::test]
    async fn test_payment_confirmation_failure() {
        let (client, backend) = mock_client();
        backend.respond(
            "/payments/confirm",
            json_response(400, json!({"detail": "Payment not succeeded"})),
        );

        let err = client
            .confirm_payment(&PaymentConfirmation {
                payment_intent_id: "pi_1".into(),
                booking_id: "b-1".into(),
            })
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "Payment not succeeded");
    }
}
