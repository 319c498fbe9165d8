use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fmt};
use validator::Validate;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slot {
    pub slot_id: String,
    pub occupied: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lot {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub slots: Vec<Slot>,
}

impl Lot {
    pub fn free_slots(&self) -> Vec<&Slot> {
        self.slots.iter().filter(|slot| !slot.occupied).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotPosition {
    pub row: u32,
    pub col: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct BookingRequest {
    pub start: DateTime<Utc>,
    pub hours: u32,
    pub days: u32,
    pub months: u32,
    #[validate(length(min = 1, message = "plate must not be empty"))]
    pub plate: String,
}

/// Confirmed booking as issued by the server.
///
/// `start`, `end` and `qr` are kept exactly as received so they can be shown
/// and later sent back for cancellation without reformatting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingResult {
    pub slot: SlotPosition,
    pub start: String,
    pub end: String,
    pub qr: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancelRequest {
    pub row: u32,
    pub col: u32,
    pub start: String,
    pub end: String,
    pub plate: String,
}

impl CancelRequest {
    pub fn for_booking(booking: &BookingResult, plate: impl Into<String>) -> Self {
        Self {
            row: booking.slot.row,
            col: booking.slot.col,
            start: booking.start.clone(),
            end: booking.end.clone(),
            plate: plate.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancelResult {
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occupancy {
    pub occupied: u32,
    pub total: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreeSlots {
    pub free: u32,
    pub total: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotOccupied {
    pub occupied: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotOnly {
    pub slot: SlotPosition,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(rename = "loyaltyPoints")]
    pub loyalty_points: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LotSlotRequest {
    pub lot_id: String,
    pub slot_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentIntentRequest {
    pub amount_cents: u64,
    pub currency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, String>>,
}

impl PaymentIntentRequest {
    pub fn new(amount_cents: u64) -> Self {
        Self {
            amount_cents,
            currency: "usd".into(),
            metadata: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub client_secret: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentConfirmation {
    pub payment_intent_id: String,
    pub booking_id: String,
}

#[derive(Clone, Serialize, Deserialize, Validate)]
pub struct Credentials {
    #[validate(email(message = "email address is not valid"))]
    pub email: String,
    #[validate(length(min = 1, message = "password must not be empty"))]
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
}
