// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

use clap::Parser;
use csv::{ReaderBuilder, Trim, Writer};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process;
use ticket_checkout::{
    Booking, CheckoutConfig, CheckoutEngine, EventId, InventoryError, MemoryStore, PaymentInfo,
    PaymentStatus, SessionCarts, SessionId, TicketType, TicketTypeId, TicketTypeInfo, UserId,
};
use thiserror::Error;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

/// Ticket Checkout - Replay cart sessions against an inventory
///
/// Loads ticket types from one CSV, replays add/remove/checkout actions from
/// another, and writes the committed bookings to stdout.
#[derive(Parser, Debug)]
#[command(name = "ticket-checkout")]
#[command(about = "Replays cart sessions and prints committed bookings", long_about = None)]
struct Args {
    /// Path to CSV file with ticket types
    ///
    /// Expected format: ticket_type,event,name,price,available
    #[arg(value_name = "INVENTORY")]
    inventory: PathBuf,

    /// Path to CSV file with session actions
    ///
    /// Expected format: action,session,user,event,ticket_type,quantity,
    /// payment_method,first_name,last_name,email,phone
    #[arg(value_name = "SESSIONS")]
    sessions: PathBuf,

    /// Fee added to every booking
    #[arg(long, env = CheckoutConfig::SERVICE_FEE_VAR, default_value_t = CheckoutConfig::DEFAULT_SERVICE_FEE)]
    service_fee: Decimal,

    /// Also write the remaining inventory to this CSV file
    #[arg(long, value_name = "FILE")]
    ledger: Option<PathBuf>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = match CheckoutConfig::new(args.service_fee) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            process::exit(1);
        }
    };

    let store = match open(&args.inventory)
        .map_err(LoadError::from)
        .and_then(|f| load_inventory(BufReader::new(f)))
    {
        Ok(store) => store,
        Err(e) => {
            eprintln!("Error loading inventory '{}': {}", args.inventory.display(), e);
            process::exit(1);
        }
    };
    let engine = CheckoutEngine::with_store(store, config);

    let sessions = match open(&args.sessions) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Error opening file '{}': {}", args.sessions.display(), e);
            process::exit(1);
        }
    };
    if let Err(e) = replay_sessions(&engine, BufReader::new(sessions)) {
        eprintln!("Error replaying sessions: {}", e);
        process::exit(1);
    }

    if let Err(e) = write_bookings(&engine, std::io::stdout()) {
        eprintln!("Error writing output: {}", e);
        process::exit(1);
    }

    if let Some(path) = args.ledger {
        let result = File::create(&path)
            .map_err(csv::Error::from)
            .and_then(|f| write_ledger(&engine, f));
        if let Err(e) = result {
            eprintln!("Error writing ledger '{}': {}", path.display(), e);
            process::exit(1);
        }
    }
}

fn open(path: &Path) -> Result<File, csv::Error> {
    File::open(path).map_err(csv::Error::from)
}

/// Why an inventory file could not be loaded.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error(transparent)]
    Csv(#[from] csv::Error),

    /// A row parsed but does not describe a valid ticket type
    #[error("line {line}: {source}")]
    TicketType {
        line: u64,
        #[source]
        source: InventoryError,
    },
}

/// Loads ticket types into a fresh in-memory store.
///
/// # CSV Format
///
/// ```csv
/// ticket_type,event,name,price,available
/// 7,1,General admission,45.00,200
/// ```
///
/// # Errors
///
/// Unlike session replay, any malformed inventory row is fatal, and so is
/// a negative price.
pub fn load_inventory<R: Read>(reader: R) -> Result<MemoryStore, LoadError> {
    let mut rdr = ReaderBuilder::new()
        .trim(Trim::All)
        .has_headers(true)
        .from_reader(reader);
    let headers = rdr.headers()?.clone();

    let mut ticket_types = Vec::new();
    for result in rdr.records() {
        let record = result?;
        let info: TicketTypeInfo = record.deserialize(Some(&headers))?;
        let ticket_type = TicketType::try_from(info).map_err(|source| LoadError::TicketType {
            line: record.position().map_or(0, |p| p.line()),
            source,
        })?;
        ticket_types.push(ticket_type);
    }
    Ok(MemoryStore::with_ticket_types(ticket_types))
}

/// Raw CSV record for one session action.
#[derive(Debug, Deserialize)]
struct SessionRecord {
    action: String,
    session: u64,
    #[serde(deserialize_with = "csv::invalid_option")]
    user: Option<u32>,
    #[serde(deserialize_with = "csv::invalid_option")]
    event: Option<u32>,
    #[serde(deserialize_with = "csv::invalid_option")]
    ticket_type: Option<u32>,
    #[serde(deserialize_with = "csv::invalid_option")]
    quantity: Option<u32>,
    #[serde(default)]
    payment_method: String,
    #[serde(default)]
    first_name: String,
    #[serde(default)]
    last_name: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    phone: String,
}

/// A session action after field validation.
#[derive(Debug)]
enum SessionAction {
    Add {
        session: SessionId,
        event_id: EventId,
        ticket_type_id: TicketTypeId,
        quantity: u32,
    },
    Remove {
        session: SessionId,
        ticket_type_id: TicketTypeId,
    },
    Checkout {
        session: SessionId,
        user_id: UserId,
        payment: PaymentInfo,
    },
}

impl SessionRecord {
    /// Returns `None` for unknown actions or missing required fields.
    fn into_action(self) -> Option<SessionAction> {
        let session = SessionId(self.session);

        match self.action.to_lowercase().as_str() {
            "add" => Some(SessionAction::Add {
                session,
                event_id: EventId(self.event?),
                ticket_type_id: TicketTypeId(self.ticket_type?),
                quantity: self.quantity?,
            }),
            "remove" => Some(SessionAction::Remove {
                session,
                ticket_type_id: TicketTypeId(self.ticket_type?),
            }),
            "checkout" => Some(SessionAction::Checkout {
                session,
                user_id: UserId(self.user?),
                payment: PaymentInfo {
                    payment_method: self.payment_method,
                    first_name: self.first_name,
                    last_name: self.last_name,
                    email: self.email,
                    phone: self.phone,
                },
            }),
            _ => None,
        }
    }
}

/// Replays session actions in file order.
///
/// Malformed rows and rejected actions are logged and skipped, so one bad
/// session never stops the others.
///
/// # Errors
///
/// Returns a CSV error if the reader fails.
pub fn replay_sessions<R: Read>(
    engine: &CheckoutEngine<MemoryStore>,
    reader: R,
) -> Result<SessionCarts, csv::Error> {
    let carts = SessionCarts::new();

    let mut rdr = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .has_headers(true)
        .from_reader(reader);

    for (row, result) in rdr.deserialize::<SessionRecord>().enumerate() {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                warn!(row, error = %e, "skipping malformed row");
                continue;
            }
        };
        let Some(action) = record.into_action() else {
            warn!(row, "skipping invalid session action");
            continue;
        };

        match action {
            SessionAction::Add {
                session,
                event_id,
                ticket_type_id,
                quantity,
            } => {
                let result = carts.with_cart(session, |cart| {
                    engine.add_to_cart(cart, event_id, ticket_type_id, quantity)
                });
                if let Err(e) = result {
                    warn!(row, %session, ticket_type = %ticket_type_id, error = %e, "add rejected");
                }
            }
            SessionAction::Remove {
                session,
                ticket_type_id,
            } => {
                carts.with_cart(session, |cart| cart.remove(ticket_type_id));
            }
            SessionAction::Checkout {
                session,
                user_id,
                payment,
            } => {
                let result =
                    carts.with_cart(session, |cart| engine.checkout_cart(user_id, cart, &payment));
                match result {
                    Ok(booking_id) => debug!(row, %session, booking = %booking_id, "checked out"),
                    Err(e) => warn!(row, %session, error = %e, "checkout rejected"),
                }
            }
        }
    }

    Ok(carts)
}

/// Booking output row.
#[derive(Debug, Serialize)]
struct BookingRow<'a> {
    booking: u64,
    user: u32,
    event: u32,
    total: Decimal,
    status: PaymentStatus,
    method: &'a str,
    tickets: u32,
}

impl<'a> From<&'a Booking> for BookingRow<'a> {
    fn from(booking: &'a Booking) -> Self {
        BookingRow {
            booking: booking.id.0,
            user: booking.user_id.0,
            event: booking.event_id.0,
            total: booking.total_amount.round_dp(2),
            status: booking.payment_status,
            method: &booking.payment_method,
            tickets: booking.ticket_count(),
        }
    }
}

/// Writes committed bookings in commit order.
///
/// # CSV Format
///
/// ```csv
/// booking,user,event,total,status,method,tickets
/// 1,10,1,92.50,paid,card,2
/// ```
///
/// # Errors
///
/// Returns a CSV error if writing fails.
pub fn write_bookings<W: Write>(
    engine: &CheckoutEngine<MemoryStore>,
    writer: W,
) -> Result<(), csv::Error> {
    let mut wtr = Writer::from_writer(writer);

    for booking in engine.store().bookings().drain_committed() {
        wtr.serialize(BookingRow::from(booking.as_ref()))?;
    }

    wtr.flush()?;
    Ok(())
}

/// Writes every ticket type with its remaining quantity, in id order.
///
/// # Errors
///
/// Returns a CSV error if writing fails.
pub fn write_ledger<W: Write>(
    engine: &CheckoutEngine<MemoryStore>,
    writer: W,
) -> Result<(), csv::Error> {
    let mut wtr = Writer::from_writer(writer);

    for ticket_type in engine.store().ledger().ticket_types() {
        wtr.serialize(&ticket_type)?;
    }

    wtr.flush()?;
    Ok(())
}
