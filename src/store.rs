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

//! Persistence boundary of the checkout engine.
//!
//! [`CheckoutStore`] is everything the engine needs from storage: per ticket
//! type conditional decrements, their compensation, and a single write that
//! makes a booking durable. A store that only promises per-row atomicity gets
//! [`CheckoutStore::reserve_all`] for free, built from `try_reserve` and
//! `release`. A store that can lock several rows at once overrides it, so
//! that concurrent checkouts never see each other's uncommitted holds.

use crate::base::{BookingId, TicketTypeId, UserId};
use crate::booking::{Booking, NewBooking};
use crate::booking_store::BookingStore;
use crate::error::{InventoryError, StorageError};
use crate::inventory::{InventoryLedger, Reservation};
use crate::ticket_type::{TicketType, TicketTypeInfo};
use std::sync::Arc;
use tracing::error;

/// Storage operations used by [`CheckoutEngine`](crate::CheckoutEngine).
pub trait CheckoutStore: Send + Sync {
    /// Reads a ticket type. The returned availability is advisory.
    fn ticket_type(&self, id: TicketTypeId) -> Result<Option<TicketTypeInfo>, StorageError>;

    /// Atomically checks and decrements one ticket type.
    fn try_reserve(&self, id: TicketTypeId, quantity: u32) -> Result<Reservation, InventoryError>;

    /// Reserves every `(ticket type, quantity)` line, or none of them.
    ///
    /// The default reserves line by line and releases what it took, newest
    /// first, at the first refusal. Until then the partial holds are visible
    /// to other checkouts.
    ///
    /// # Errors
    ///
    /// The first refusal. A release that fails during cleanup replaces it
    /// with [`InventoryError::Storage`].
    fn reserve_all(&self, lines: &[(TicketTypeId, u32)]) -> Result<Vec<Reservation>, InventoryError> {
        let mut reserved: Vec<Reservation> = Vec::with_capacity(lines.len());
        for &(id, quantity) in lines {
            let cause = match self.try_reserve(id, quantity) {
                Ok(reservation) => {
                    reserved.push(reservation);
                    continue;
                }
                Err(cause) => cause,
            };

            let mut outcome = cause;
            for reservation in reserved.iter().rev() {
                if let Err(err) = self.release(reservation) {
                    error!(
                        ticket_type = %reservation.ticket_type_id,
                        quantity = reservation.quantity,
                        %err,
                        "could not release partial reservation"
                    );
                    outcome = InventoryError::Storage(err);
                }
            }
            return Err(outcome);
        }
        Ok(reserved)
    }

    /// Undoes a reservation that will not be committed.
    fn release(&self, reservation: &Reservation) -> Result<(), StorageError>;

    /// Makes the booking and its booked tickets durable in one write.
    fn commit(&self, booking: NewBooking) -> Result<BookingId, StorageError>;
}

impl<S: CheckoutStore + ?Sized> CheckoutStore for Arc<S> {
    fn ticket_type(&self, id: TicketTypeId) -> Result<Option<TicketTypeInfo>, StorageError> {
        (**self).ticket_type(id)
    }

    fn try_reserve(&self, id: TicketTypeId, quantity: u32) -> Result<Reservation, InventoryError> {
        (**self).try_reserve(id, quantity)
    }

    fn reserve_all(&self, lines: &[(TicketTypeId, u32)]) -> Result<Vec<Reservation>, InventoryError> {
        (**self).reserve_all(lines)
    }

    fn release(&self, reservation: &Reservation) -> Result<(), StorageError> {
        (**self).release(reservation)
    }

    fn commit(&self, booking: NewBooking) -> Result<BookingId, StorageError> {
        (**self).commit(booking)
    }
}

/// In-process store backed by an [`InventoryLedger`] and a [`BookingStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    ledger: InventoryLedger,
    bookings: BookingStore,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store selling the given ticket types.
    pub fn with_ticket_types(ticket_types: impl IntoIterator<Item = TicketType>) -> Self {
        Self {
            ledger: ticket_types.into_iter().collect(),
            bookings: BookingStore::new(),
        }
    }

    pub fn ledger(&self) -> &InventoryLedger {
        &self.ledger
    }

    pub fn bookings(&self) -> &BookingStore {
        &self.bookings
    }

    pub fn booking(&self, id: &BookingId) -> Option<Arc<Booking>> {
        self.bookings.get(id)
    }

    pub fn bookings_for_user(&self, user_id: UserId) -> Vec<Arc<Booking>> {
        self.bookings.for_user(user_id)
    }

    pub fn available(&self, id: &TicketTypeId) -> Option<u32> {
        self.ledger.available(id)
    }
}

impl CheckoutStore for MemoryStore {
    fn ticket_type(&self, id: TicketTypeId) -> Result<Option<TicketTypeInfo>, StorageError> {
        Ok(self.ledger.ticket_type(&id))
    }

    fn try_reserve(&self, id: TicketTypeId, quantity: u32) -> Result<Reservation, InventoryError> {
        self.ledger.try_reserve(id, quantity)
    }

    fn reserve_all(&self, lines: &[(TicketTypeId, u32)]) -> Result<Vec<Reservation>, InventoryError> {
        self.ledger.try_reserve_all(lines)
    }

    fn release(&self, reservation: &Reservation) -> Result<(), StorageError> {
        self.ledger
            .release(reservation)
            .map_err(|e| StorageError::Unavailable(e.to_string()))
    }

    fn commit(&self, booking: NewBooking) -> Result<BookingId, StorageError> {
        self.bookings.insert(booking)
    }
}
