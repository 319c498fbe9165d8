use crate::{
    auth::{AuthError, AuthFlow, Registration},
    availability::{lot_availability, LotAvailability},
    backend::ApiBackend,
    client::ApiClient,
    configuration_handler::ConfigurationHandler,
    error::ApiError,
    queries::ParkingQueries,
    query::QueryState,
    session::{Session, SessionError, SessionToken},
    types::{
        BookingRequest, CancelRequest, Credentials, LotSlotRequest, PaymentConfirmation,
        PaymentIntentRequest,
    },
};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::{fmt::Write, sync::Arc};
use thiserror::Error;
use tracing::error;

#[derive(Debug, Parser)]
#[command(name = "park-and-ride", about = "Reserve parking slots from the command line")]
pub struct Cli {
    #[command(flatten)]
    pub configuration: ConfigurationHandler,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Args)]
pub struct CredentialArgs {
    #[arg(long)]
    pub email: String,

    #[arg(long, env = "PARK_AND_RIDE_PASSWORD", hide_env_values = true)]
    pub password: String,
}

impl From<CredentialArgs> for Credentials {
    fn from(args: CredentialArgs) -> Self {
        Credentials {
            email: args.email,
            password: args.password,
        }
    }
}

#[derive(Debug, Args)]
pub struct BookArgs {
    /// Start of the booking, RFC 3339 (e.g. 2024-01-01T10:00:00Z)
    #[arg(long)]
    pub start: DateTime<Utc>,

    #[arg(long, default_value_t = 0)]
    pub hours: u32,

    #[arg(long, default_value_t = 0)]
    pub days: u32,

    #[arg(long, default_value_t = 0)]
    pub months: u32,

    #[arg(long)]
    pub plate: String,
}

#[derive(Debug, Args)]
pub struct CancelArgs {
    #[arg(long)]
    pub row: u32,

    #[arg(long)]
    pub col: u32,

    /// Start exactly as returned by `book`
    #[arg(long)]
    pub start: String,

    /// End exactly as returned by `book`
    #[arg(long)]
    pub end: String,

    #[arg(long)]
    pub plate: String,
}

#[derive(Debug, Subcommand)]
pub enum PayCommand {
    /// Create a payment intent
    Intent {
        #[arg(long)]
        amount_cents: u64,

        #[arg(long, default_value = "usd")]
        currency: String,
    },
    /// Confirm a payment for a booking
    Confirm {
        #[arg(long)]
        intent: String,

        #[arg(long)]
        booking: String,
    },
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Log in and store the session token
    Login(CredentialArgs),
    /// Create an account
    Register(CredentialArgs),
    /// Forget the stored session token
    Logout,
    /// Show the logged in user
    Me,
    /// List all parking lots
    Lots,
    /// Show the free slots of one lot
    Lot { lot_id: String },
    /// Reserve a specific slot of a lot
    Reserve { lot_id: String, slot_id: String },
    /// Occupied and total slot count at a point in time (default: now)
    Occupancy {
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },
    /// Free and total slot count at a point in time (default: now)
    FreeSlots {
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },
    /// Whether a slot is occupied at a point in time (default: now)
    SlotOccupied {
        #[arg(long)]
        slot: String,

        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },
    /// Ask the server for a slot free during a window
    FindSlot {
        #[arg(long)]
        start: DateTime<Utc>,

        #[arg(long)]
        end: DateTime<Utc>,
    },
    /// Book a slot and receive its QR code
    Book(BookArgs),
    /// Cancel a booking
    Cancel(CancelArgs),
    /// Payments
    #[command(subcommand)]
    Pay(PayCommand),
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error("Not logged in")]
    NotLoggedIn,

    #[error("Could not connect to server")]
    Connection,

    #[error("Invalid server response")]
    InvalidResponse,

    #[error(transparent)]
    Api(ApiError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("Failed to render output: {0}")]
    Output(String),
}

impl From<ApiError> for CliError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Transport(_) => {
                error!(?err, "Request could not be sent");
                CliError::Connection
            }
            ApiError::Decode(_) => {
                error!(?err, "Response could not be decoded");
                CliError::InvalidResponse
            }
            err => CliError::Api(err),
        }
    }
}

pub struct App<B: ApiBackend> {
    client: ApiClient<B>,
    queries: ParkingQueries<B>,
    auth: AuthFlow<B>,
    session: Session,
}

impl<B: ApiBackend> App<B> {
    pub fn new(client: ApiClient<B>, session: Session) -> Self {
        Self {
            queries: ParkingQueries::new(client.clone()),
            auth: AuthFlow::new(client.clone(), session.clone()),
            client,
            session,
        }
    }

    pub fn queries(&self) -> &ParkingQueries<B> {
        &self.queries
    }

    /// Runs one command and returns the text to print.
    pub async fn run(&self, command: Command) -> Result<String, CliError> {
        match command {
            Command::Login(args) => {
                if self.auth.enter()?.is_some() {
                    return Ok("Already logged in".into());
                }
                self.auth.login(&args.into()).await?;
                Ok("Logged in".into())
            }
            Command::Register(args) => match self.auth.register(&args.into()).await? {
                Registration::LoggedIn(_) => Ok("Registration successful! You are logged in.".into()),
                Registration::LoginRequired => {
                    Ok("Registration successful! Please log in.".into())
                }
            },
            Command::Logout => {
                self.auth.logout()?;
                Ok("Logged out".into())
            }
            Command::Me => {
                let token = self.token()?;
                pretty(&self.client.profile(&token).await?)
            }
            Command::Lots => {
                let token = self.token()?;
                let lots = settled(self.queries.lots(Some(&token)).load().await)?;
                if lots.is_empty() {
                    return Ok("No lots available".into());
                }
                pretty(&*lots)
            }
            Command::Lot { lot_id } => {
                let token = self.token()?;
                let lots = settled(self.queries.lots(Some(&token)).load().await)?;
                Ok(render_availability(lot_availability(&lots, &lot_id)))
            }
            Command::Reserve { lot_id, slot_id } => {
                let token = self.token()?;
                let reply = self
                    .client
                    .reserve_slot(&token, &LotSlotRequest { lot_id, slot_id })
                    .await?;
                self.queries.after_booking();
                Ok(format!("Booked!\n{}", pretty(&reply)?))
            }
            Command::Occupancy { at } => {
                let token = self.token()?;
                let at = at.unwrap_or_else(Utc::now);
                pretty(&*settled(self.queries.occupancy(at, Some(&token)).load().await)?)
            }
            Command::FreeSlots { at } => {
                let token = self.token()?;
                let at = at.unwrap_or_else(Utc::now);
                pretty(&*settled(self.queries.free_slots(at, Some(&token)).load().await)?)
            }
            Command::SlotOccupied { slot, at } => {
                let token = self.token()?;
                let at = at.unwrap_or_else(Utc::now);
                pretty(&self.client.slot_occupied(&token, &slot, at).await?)
            }
            Command::FindSlot { start, end } => {
                let token = self.token()?;
                pretty(&self.client.find_slot(&token, start, end).await?)
            }
            Command::Book(args) => {
                let token = self.token()?;
                let request = BookingRequest {
                    start: args.start,
                    hours: args.hours,
                    days: args.days,
                    months: args.months,
                    plate: args.plate,
                };
                let booking = self.client.book(&token, &request).await?;
                self.queries.after_booking();
                pretty(&booking)
            }
            Command::Cancel(args) => {
                let token = self.token()?;
                let request = CancelRequest {
                    row: args.row,
                    col: args.col,
                    start: args.start,
                    end: args.end,
                    plate: args.plate,
                };
                let result = self.client.cancel(&token, &request).await?;
                self.queries.after_booking();
                Ok(result.message)
            }
            Command::Pay(PayCommand::Intent {
                amount_cents,
                currency,
            }) => {
                let request = PaymentIntentRequest {
                    currency,
                    ..PaymentIntentRequest::new(amount_cents)
                };
                pretty(&self.client.create_payment_intent(&request).await?)
            }
            Command::Pay(PayCommand::Confirm { intent, booking }) => {
                let confirmation = PaymentConfirmation {
                    payment_intent_id: intent,
                    booking_id: booking,
                };
                pretty(&self.client.confirm_payment(&confirmation).await?)
            }
        }
    }

    fn token(&self) -> Result<SessionToken, CliError> {
        self.session.token()?.ok_or(CliError::NotLoggedIn)
    }
}

fn settled<T>(state: QueryState<T>) -> Result<Arc<T>, CliError> {
    if let Some(err) = state.error {
        return Err(err.into());
    }
    state.data.ok_or(CliError::NotLoggedIn)
}

fn pretty<T: Serialize + ?Sized>(value: &T) -> Result<String, CliError> {
    serde_json::to_string_pretty(value).map_err(|err| CliError::Output(err.to_string()))
}

fn render_availability(availability: LotAvailability<'_>) -> String {
    match availability {
        LotAvailability::NoLots => "No lots available".into(),
        LotAvailability::LotNotFound => "Lot not found".into(),
        LotAvailability::NoFreeSlots(lot) => {
            format!("Book a Slot in {}\nSorry, no free slots right now.", lot.name)
        }
        LotAvailability::Free(lot, slots) => {
            let mut output = format!("Book a Slot in {}", lot.name);
            for slot in slots {
                let _ = write!(output, "\n  Slot {}", slot.slot_id);
            }
            output
        }
    }
}
