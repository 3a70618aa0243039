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

//! Bookings, booked tickets and the payment details captured at checkout.

use crate::base::{BookingId, EventId, TicketTypeId, UserId};
use crate::error::CheckoutError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Payment state of a booking.
///
/// Payment capture happens outside this crate, so every booking is
/// recorded as [`PaymentStatus::Paid`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Paid,
}

/// Payment method and contact details submitted at checkout.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PaymentInfo {
    #[serde(default)]
    pub payment_method: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
}

impl PaymentInfo {
    /// Checks that every field is filled in.
    ///
    /// Fields are checked in a fixed order and the first blank one is
    /// reported. Whitespace-only values count as blank.
    ///
    /// # Errors
    ///
    /// [`CheckoutError::MissingField`] naming the first blank field.
    pub fn validate(&self) -> Result<(), CheckoutError> {
        let fields = [
            ("payment_method", &self.payment_method),
            ("first_name", &self.first_name),
            ("last_name", &self.last_name),
            ("email", &self.email),
            ("phone", &self.phone),
        ];
        match fields.into_iter().find(|(_, value)| value.trim().is_empty()) {
            Some((name, _)) => Err(CheckoutError::MissingField(name)),
            None => Ok(()),
        }
    }
}

/// One persisted line of a booking.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BookedTicket {
    pub booking_id: BookingId,
    pub ticket_type_id: TicketTypeId,
    pub quantity: u32,
    /// Unit price locked in when the ticket was added to the cart.
    pub price: Decimal,
}

impl BookedTicket {
    pub fn line_total(&self) -> Decimal {
        self.price * Decimal::from(self.quantity)
    }
}

/// A committed purchase.
///
/// `total_amount` always equals the sum of the booked tickets' line totals
/// plus the service fee that applied at checkout.
///
/// A booking carries a single event id, the event of the first cart line,
/// even when the cart held tickets for several events. The booked tickets
/// still record every ticket type that was bought.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Booking {
    pub id: BookingId,
    pub user_id: UserId,
    pub event_id: EventId,
    pub total_amount: Decimal,
    pub service_fee: Decimal,
    pub payment_status: PaymentStatus,
    pub payment_method: String,
    pub contact: Contact,
    pub created_at: DateTime<Utc>,
    pub tickets: Vec<BookedTicket>,
}

impl Booking {
    pub fn subtotal(&self) -> Decimal {
        self.tickets.iter().map(BookedTicket::line_total).sum()
    }

    /// Number of admissions across all lines.
    pub fn ticket_count(&self) -> u32 {
        self.tickets.iter().map(|t| t.quantity).sum()
    }
}

/// Buyer contact captured with the booking.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Contact {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
}

impl From<&PaymentInfo> for Contact {
    fn from(payment: &PaymentInfo) -> Self {
        Contact {
            first_name: payment.first_name.trim().to_string(),
            last_name: payment.last_name.trim().to_string(),
            email: payment.email.trim().to_string(),
            phone: payment.phone.trim().to_string(),
        }
    }
}

/// A booking that has been priced and reserved but not yet committed.
///
/// The store assigns the [`BookingId`] when it commits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBooking {
    pub user_id: UserId,
    pub event_id: EventId,
    pub total_amount: Decimal,
    pub service_fee: Decimal,
    pub payment_method: String,
    pub contact: Contact,
    pub created_at: DateTime<Utc>,
    pub lines: Vec<NewBookedTicket>,
}

/// Line of a [`NewBooking`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewBookedTicket {
    pub ticket_type_id: TicketTypeId,
    pub quantity: u32,
    pub price: Decimal,
}

impl NewBooking {
    /// Stamps the draft with its id.
    pub fn into_booking(self, id: BookingId) -> Booking {
        Booking {
            id,
            user_id: self.user_id,
            event_id: self.event_id,
            total_amount: self.total_amount,
            service_fee: self.service_fee,
            payment_status: PaymentStatus::Paid,
            payment_method: self.payment_method,
            contact: self.contact,
            created_at: self.created_at,
            tickets: self
                .lines
                .into_iter()
                .map(|line| BookedTicket {
                    booking_id: id,
                    ticket_type_id: line.ticket_type_id,
                    quantity: line.quantity,
                    price: line.price,
                })
                .collect(),
        }
    }
}
