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

//! Checkout engine.
//!
//! The [`CheckoutEngine`] turns a cart snapshot into a committed booking.
//!
//! # Checkout Steps
//!
//! 1. **Validate**: every payment/contact field is present and the cart is
//!    not empty. Nothing touches the store before this passes.
//! 2. **Price**: subtotal of the cart-recorded prices plus the service fee.
//!    A total that does not fit in a decimal is refused here.
//! 3. **Reserve**: every line is reserved against the store in one
//!    [`CheckoutStore::reserve_all`] call. A refusal leaves nothing reserved.
//! 4. **Commit**: the booking and its booked tickets are written in one call.
//!    A failed commit releases every reservation.
//!
//! # Thread Safety
//!
//! The engine holds no mutable state of its own. With a [`MemoryStore`] a
//! checkout locks the stock of every ticket type in its cart together, always
//! in ascending id order, so concurrent checkouts cannot deadlock and never
//! see each other's uncommitted reservations. Checkouts on disjoint ticket
//! types never wait on each other.

use crate::base::{BookingId, EventId, TicketTypeId, UserId};
use crate::booking::{Contact, NewBookedTicket, NewBooking, PaymentInfo};
use crate::cart::{Cart, CartLine, CartSnapshot};
use crate::config::CheckoutConfig;
use crate::error::{CartError, CheckoutError, InventoryError};
use crate::inventory::Reservation;
use crate::store::{CheckoutStore, MemoryStore};
use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{debug, error, info, warn};

/// Reservations taken so far by one checkout.
///
/// Ends either in [`UnitOfWork::commit`] or [`UnitOfWork::rollback`];
/// there is no implicit rollback on drop.
#[must_use = "a unit of work must be committed or rolled back"]
struct UnitOfWork<'a, S: CheckoutStore + ?Sized> {
    store: &'a S,
    reservations: Vec<Reservation>,
}

impl<'a, S: CheckoutStore + ?Sized> UnitOfWork<'a, S> {
    fn begin(store: &'a S) -> Self {
        Self {
            store,
            reservations: Vec::new(),
        }
    }

    fn reserve(&mut self, snapshot: &CartSnapshot) -> Result<(), CheckoutError> {
        let lines: Vec<(TicketTypeId, u32)> = snapshot
            .iter()
            .map(|line| (line.ticket_type_id, line.quantity))
            .collect();

        match self.store.reserve_all(&lines) {
            Ok(reservations) => {
                for reservation in &reservations {
                    debug!(
                        ticket_type = %reservation.ticket_type_id,
                        quantity = reservation.quantity,
                        remaining = reservation.remaining,
                        "reserved"
                    );
                }
                self.reservations = reservations;
                Ok(())
            }
            Err(InventoryError::Insufficient {
                ticket_type_id,
                requested,
                remaining,
            }) => {
                warn!(
                    ticket_type = %ticket_type_id,
                    requested,
                    remaining,
                    "not enough tickets"
                );
                Err(CheckoutError::InsufficientInventory { ticket_type_id })
            }
            Err(InventoryError::UnknownTicketType(ticket_type_id)) => {
                warn!(ticket_type = %ticket_type_id, "ticket type no longer on sale");
                Err(CheckoutError::InsufficientInventory { ticket_type_id })
            }
            // Only a snapshot built by hand can carry a zero quantity
            Err(InventoryError::InvalidQuantity) => {
                match snapshot.iter().find(|line| line.quantity == 0) {
                    Some(line) => Err(CheckoutError::InsufficientInventory {
                        ticket_type_id: line.ticket_type_id,
                    }),
                    None => Err(CheckoutError::EmptyCart),
                }
            }
            Err(err @ (InventoryError::NegativePrice(_) | InventoryError::OverRelease { .. })) => {
                error!(%err, "reservation failed");
                Err(CheckoutError::Infrastructure(err.to_string()))
            }
            Err(InventoryError::Storage(err)) => {
                error!(%err, "reservation failed");
                Err(err.into())
            }
        }
    }

    fn commit(self, booking: NewBooking) -> Result<BookingId, CheckoutError> {
        match self.store.commit(booking) {
            Ok(id) => Ok(id),
            Err(err) => {
                error!(%err, "booking commit failed");
                let cause = CheckoutError::from(err);
                Err(self.rollback(cause))
            }
        }
    }

    /// Releases every reservation, newest first, and hands `cause` back.
    ///
    /// A release that fails turns the outcome into an infrastructure error:
    /// the ledger can no longer be trusted to match the bookings.
    fn rollback(self, cause: CheckoutError) -> CheckoutError {
        let mut outcome = cause;
        for reservation in self.reservations.iter().rev() {
            if let Err(err) = self.store.release(reservation) {
                error!(
                    ticket_type = %reservation.ticket_type_id,
                    quantity = reservation.quantity,
                    %err,
                    "rollback could not release reservation"
                );
                outcome = CheckoutError::from(err);
            }
        }
        outcome
    }
}

/// Checkout transaction engine over a [`CheckoutStore`].
///
/// # Invariants
///
/// - A ticket type's available quantity never goes negative.
/// - A committed booking holds one booked ticket per cart line, priced as
///   the cart recorded it, and its total is subtotal plus service fee.
/// - A failed checkout leaves the store and the cart as they were.
#[derive(Debug)]
pub struct CheckoutEngine<S = MemoryStore> {
    store: S,
    config: CheckoutConfig,
}

impl CheckoutEngine<MemoryStore> {
    /// Creates an engine over an empty in-memory store with the default
    /// configuration.
    pub fn new() -> Self {
        Self::with_store(MemoryStore::new(), CheckoutConfig::default())
    }
}

impl Default for CheckoutEngine<MemoryStore> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: CheckoutStore> CheckoutEngine<S> {
    pub fn with_store(store: S, config: CheckoutConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &CheckoutConfig {
        &self.config
    }

    /// Adds tickets to a cart after an advisory availability check.
    ///
    /// Name and price are copied from the ticket type now and stay fixed in
    /// the cart.
    ///
    /// # Errors
    ///
    /// - [`CartError::TicketTypeNotFound`] - Unknown ticket type, or it
    ///   belongs to a different event.
    /// - [`CartError::InvalidQuantity`] / [`CartError::ExceedsAvailable`] -
    ///   See [`Cart::add_or_merge`].
    /// - [`CartError::Storage`] - The ticket type could not be read.
    pub fn add_to_cart(
        &self,
        cart: &mut Cart,
        event_id: EventId,
        ticket_type_id: TicketTypeId,
        quantity: u32,
    ) -> Result<(), CartError> {
        let ticket_type = self
            .store
            .ticket_type(ticket_type_id)?
            .filter(|t| t.event_id == event_id)
            .ok_or(CartError::TicketTypeNotFound)?;

        let line = CartLine::new(
            event_id,
            ticket_type_id,
            ticket_type.name,
            ticket_type.price,
            quantity,
        );
        cart.add_or_merge(line, ticket_type.available)
    }

    /// Changes a line's quantity after an advisory availability check.
    ///
    /// # Errors
    ///
    /// See [`Cart::update_quantity`]. A ticket type that has disappeared
    /// counts as zero available.
    pub fn update_cart_quantity(
        &self,
        cart: &mut Cart,
        ticket_type_id: TicketTypeId,
        quantity: u32,
    ) -> Result<(), CartError> {
        let available = self
            .store
            .ticket_type(ticket_type_id)?
            .map_or(0, |t| t.available);
        cart.update_quantity(ticket_type_id, quantity, available)
    }

    /// Books every line of `snapshot` for `user_id`, or nothing at all.
    ///
    /// # Errors
    ///
    /// - [`CheckoutError::MissingField`] - A payment/contact field is blank.
    /// - [`CheckoutError::EmptyCart`] - `snapshot` has no lines.
    /// - [`CheckoutError::AmountOverflow`] - The total does not fit in a
    ///   decimal. Checked before the store is touched.
    /// - [`CheckoutError::InsufficientInventory`] - A line could not be
    ///   reserved; names the first such ticket type.
    /// - [`CheckoutError::Infrastructure`] - The store failed.
    pub fn checkout(
        &self,
        user_id: UserId,
        snapshot: &CartSnapshot,
        payment: &PaymentInfo,
    ) -> Result<BookingId, CheckoutError> {
        payment.validate()?;
        let Some(first) = snapshot.first() else {
            return Err(CheckoutError::EmptyCart);
        };

        let total = self.quote(snapshot).ok_or(CheckoutError::AmountOverflow)?;

        // One event per booking: the first line's event stands for the cart.
        let draft = NewBooking {
            user_id,
            event_id: first.event_id,
            total_amount: total,
            service_fee: self.config.service_fee(),
            payment_method: payment.payment_method.trim().to_string(),
            contact: Contact::from(payment),
            created_at: Utc::now(),
            lines: snapshot
                .iter()
                .map(|line| NewBookedTicket {
                    ticket_type_id: line.ticket_type_id,
                    quantity: line.quantity,
                    price: line.price,
                })
                .collect(),
        };

        // A refused reserve_all holds nothing, so there is nothing to roll back
        let mut work = UnitOfWork::begin(&self.store);
        work.reserve(snapshot)?;

        let booking_id = work.commit(draft)?;
        info!(
            booking = %booking_id,
            user = %user_id,
            event = %first.event_id,
            lines = snapshot.len(),
            %total,
            "booking committed"
        );
        Ok(booking_id)
    }

    /// Checks out a cart and clears it once the booking is committed.
    ///
    /// # Errors
    ///
    /// See [`CheckoutEngine::checkout`]. The cart is untouched on error.
    pub fn checkout_cart(
        &self,
        user_id: UserId,
        cart: &mut Cart,
        payment: &PaymentInfo,
    ) -> Result<BookingId, CheckoutError> {
        let booking_id = self.checkout(user_id, &cart.snapshot(), payment)?;
        cart.clear();
        Ok(booking_id)
    }

    /// Total a checkout of `snapshot` would charge right now, or `None` if
    /// it does not fit in a decimal.
    pub fn quote(&self, snapshot: &CartSnapshot) -> Option<Decimal> {
        snapshot.subtotal()?.checked_add(self.config.service_fee())
    }
}
