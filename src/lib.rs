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

//! # Ticket Checkout
//!
//! This library provides the checkout core of an event-ticketing site:
//! session carts, an inventory ledger that never oversells, and an engine
//! that turns a cart into a booking atomically.
//!
//! ## Core Components
//!
//! - [`CheckoutEngine`]: Validates, reserves, commits, or rolls everything back
//! - [`InventoryLedger`]: Per ticket type quantities with conditional decrement
//! - [`Cart`]: Session-scoped cart lines with prices locked at add time
//! - [`BookingStore`]: Committed bookings and their booked tickets
//! - [`CheckoutStore`]: The storage boundary the engine is written against
//! - [`CheckoutError`]: Why a checkout failed, with nothing left half-done
//!
//! ## Example
//!
//! ```
//! use ticket_checkout::{
//!     Cart, CheckoutConfig, CheckoutEngine, EventId, MemoryStore, PaymentInfo, TicketType,
//!     TicketTypeId, UserId,
//! };
//! use rust_decimal_macros::dec;
//!
//! let store = MemoryStore::with_ticket_types([TicketType::new(
//!     TicketTypeId(7),
//!     EventId(1),
//!     "General admission",
//!     dec!(45.00),
//!     200,
//! )
//! .unwrap()]);
//! let engine = CheckoutEngine::with_store(store, CheckoutConfig::default());
//!
//! let mut cart = Cart::new();
//! engine.add_to_cart(&mut cart, EventId(1), TicketTypeId(7), 2).unwrap();
//!
//! let payment = PaymentInfo {
//!     payment_method: "card".into(),
//!     first_name: "Ada".into(),
//!     last_name: "Lovelace".into(),
//!     email: "ada@example.com".into(),
//!     phone: "555-0100".into(),
//! };
//! let booking_id = engine.checkout_cart(UserId(1), &mut cart, &payment).unwrap();
//!
//! let booking = engine.store().booking(&booking_id).unwrap();
//! assert_eq!(booking.total_amount, dec!(92.50));
//! assert_eq!(engine.store().available(&TicketTypeId(7)), Some(198));
//! assert!(cart.is_empty());
//! ```
//!
//! ## Thread Safety
//!
//! The engine can be shared across threads. A checkout locks the ticket
//! types in its cart together, in ascending id order. Checkouts that share a
//! ticket type serialize on its lock; disjoint ones proceed in parallel.

mod base;
pub mod booking;
mod booking_store;
pub mod cart;
mod config;
mod engine;
pub mod error;
pub mod inventory;
pub mod response;
mod store;
pub mod ticket_type;

pub use base::{BookingId, EventId, SessionId, TicketTypeId, UserId};
pub use booking::{BookedTicket, Booking, Contact, NewBookedTicket, NewBooking, PaymentInfo, PaymentStatus};
pub use booking_store::BookingStore;
pub use cart::{Cart, CartLine, CartSnapshot, SessionCarts};
pub use config::CheckoutConfig;
pub use engine::CheckoutEngine;
pub use error::{CartError, CheckoutError, ConfigError, InventoryError, StorageError};
pub use inventory::{InventoryLedger, Reservation};
pub use response::CheckoutResponse;
pub use store::{CheckoutStore, MemoryStore};
pub use ticket_type::{TicketType, TicketTypeInfo};
