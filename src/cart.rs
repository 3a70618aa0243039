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

//! Session carts.
//!
//! A [`Cart`] is plain session state: it holds prices and names as they were
//! when each ticket was added and checks availability only as a courtesy.
//! The inventory ledger re-checks everything at checkout.
//!
//! # Example
//!
//! ```
//! use rust_decimal_macros::dec;
//! use ticket_checkout::{Cart, CartLine, EventId, TicketTypeId};
//!
//! let mut cart = Cart::new();
//! let line = CartLine::new(EventId(1), TicketTypeId(7), "General", dec!(45.00), 2);
//! cart.add_or_merge(line, 200).unwrap();
//! assert_eq!(cart.subtotal(), Some(dec!(90.00)));
//! ```

use crate::base::{EventId, SessionId, TicketTypeId};
use crate::error::CartError;
use dashmap::DashMap;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::ops::Deref;
use std::sync::Arc;

/// One ticket type selection waiting to be bought.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CartLine {
    pub event_id: EventId,
    pub ticket_type_id: TicketTypeId,
    /// Ticket type name when the line was added.
    pub name: String,
    /// Unit price when the line was added; checkout charges this price.
    pub price: Decimal,
    pub quantity: u32,
}

impl CartLine {
    pub fn new(
        event_id: EventId,
        ticket_type_id: TicketTypeId,
        name: impl Into<String>,
        price: Decimal,
        quantity: u32,
    ) -> Self {
        Self {
            event_id,
            ticket_type_id,
            name: name.into(),
            price,
            quantity,
        }
    }

    /// Price times quantity, or `None` if it does not fit in a decimal.
    pub fn line_total(&self) -> Option<Decimal> {
        self.price.checked_mul(Decimal::from(self.quantity))
    }
}

fn checked_subtotal<'a>(lines: impl IntoIterator<Item = &'a CartLine>) -> Option<Decimal> {
    lines
        .into_iter()
        .try_fold(Decimal::ZERO, |sum, line| sum.checked_add(line.line_total()?))
}

/// Ordered cart lines, at most one per ticket type.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct Cart {
    lines: Vec<CartLine>,
}

impl Cart {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a line, or adds its quantity to the existing line for the same
    /// ticket type.
    ///
    /// `advisory_available` is the availability read when the item was
    /// added. It only lets the user fail fast; it is not a reservation.
    /// On a merge the existing line keeps its name and price.
    ///
    /// # Errors
    ///
    /// - [`CartError::InvalidQuantity`] - `line.quantity` is zero.
    /// - [`CartError::ExceedsAvailable`] - The merged quantity is above
    ///   `advisory_available`. The cart is unchanged.
    /// - [`CartError::AmountOverflow`] - The new subtotal would not fit in a
    ///   decimal. The cart is unchanged.
    pub fn add_or_merge(&mut self, line: CartLine, advisory_available: u32) -> Result<(), CartError> {
        if line.quantity == 0 {
            return Err(CartError::InvalidQuantity);
        }

        let (current, price) = self
            .line(line.ticket_type_id)
            .map_or((0, line.price), |l| (l.quantity, l.price));
        let requested = current.saturating_add(line.quantity);
        if requested > advisory_available {
            return Err(CartError::ExceedsAvailable {
                requested,
                available: advisory_available,
            });
        }
        self.check_subtotal(line.ticket_type_id, price, requested)?;

        match self.line_mut(line.ticket_type_id) {
            Some(existing) => existing.quantity = requested,
            None => self.lines.push(line),
        }
        Ok(())
    }

    /// Sets the quantity of an existing line. Zero removes the line.
    ///
    /// # Errors
    ///
    /// - [`CartError::LineNotFound`] - No line for `ticket_type_id`.
    /// - [`CartError::ExceedsAvailable`] - `quantity` is above
    ///   `advisory_available`.
    /// - [`CartError::AmountOverflow`] - The new subtotal would not fit in a
    ///   decimal.
    pub fn update_quantity(
        &mut self,
        ticket_type_id: TicketTypeId,
        quantity: u32,
        advisory_available: u32,
    ) -> Result<(), CartError> {
        let price = self
            .line(ticket_type_id)
            .map(|l| l.price)
            .ok_or(CartError::LineNotFound(ticket_type_id))?;

        if quantity == 0 {
            self.remove(ticket_type_id);
            return Ok(());
        }
        if quantity > advisory_available {
            return Err(CartError::ExceedsAvailable {
                requested: quantity,
                available: advisory_available,
            });
        }
        self.check_subtotal(ticket_type_id, price, quantity)?;

        if let Some(line) = self.line_mut(ticket_type_id) {
            line.quantity = quantity;
        }
        Ok(())
    }

    fn line(&self, ticket_type_id: TicketTypeId) -> Option<&CartLine> {
        self.lines.iter().find(|l| l.ticket_type_id == ticket_type_id)
    }

    fn line_mut(&mut self, ticket_type_id: TicketTypeId) -> Option<&mut CartLine> {
        self.lines.iter_mut().find(|l| l.ticket_type_id == ticket_type_id)
    }

    /// Fails if the cart with `ticket_type_id` set to `quantity` units at
    /// `price` would have a subtotal beyond what a decimal holds.
    fn check_subtotal(
        &self,
        ticket_type_id: TicketTypeId,
        price: Decimal,
        quantity: u32,
    ) -> Result<(), CartError> {
        let others = checked_subtotal(
            self.lines
                .iter()
                .filter(|l| l.ticket_type_id != ticket_type_id),
        );
        others
            .zip(price.checked_mul(Decimal::from(quantity)))
            .and_then(|(others, line)| others.checked_add(line))
            .map(|_| ())
            .ok_or(CartError::AmountOverflow)
    }

    /// Removes the line for `ticket_type_id`, if any.
    pub fn remove(&mut self, ticket_type_id: TicketTypeId) {
        self.lines.retain(|l| l.ticket_type_id != ticket_type_id);
    }

    /// Copies the lines for checkout.
    pub fn snapshot(&self) -> CartSnapshot {
        CartSnapshot(self.lines.as_slice().into())
    }

    /// Empties the cart. Only called once a checkout has committed.
    pub fn clear(&mut self) {
        self.lines.clear();
    }

    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    /// Sum of the line totals, or `None` if it does not fit in a decimal.
    pub fn subtotal(&self) -> Option<Decimal> {
        checked_subtotal(&self.lines)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Immutable, cheaply cloneable copy of a cart's lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartSnapshot(Arc<[CartLine]>);

impl CartSnapshot {
    /// Sum of the line totals, or `None` if it does not fit in a decimal.
    pub fn subtotal(&self) -> Option<Decimal> {
        checked_subtotal(self.0.iter())
    }
}

impl Deref for CartSnapshot {
    type Target = [CartLine];

    fn deref(&self) -> &[CartLine] {
        &self.0
    }
}

impl From<Vec<CartLine>> for CartSnapshot {
    fn from(lines: Vec<CartLine>) -> Self {
        CartSnapshot(lines.into())
    }
}

/// Carts keyed by session.
///
/// Each closure passed to [`SessionCarts::with_cart`] has exclusive access
/// to that one session's cart; other sessions are unaffected.
///
/// Every cart sits behind its own mutex. The map only hands out the shared
/// handle, so a long closure such as a checkout holds its session's lock and
/// no map shard.
#[derive(Debug, Default)]
pub struct SessionCarts {
    carts: DashMap<SessionId, Arc<Mutex<Cart>>>,
}

impl SessionCarts {
    pub fn new() -> Self {
        Self::default()
    }

    fn handle(&self, session: &SessionId) -> Option<Arc<Mutex<Cart>>> {
        self.carts.get(session).map(|c| Arc::clone(c.value()))
    }

    /// Runs `f` on the session's cart, creating an empty one if needed.
    ///
    /// Calls for the same session run one at a time.
    pub fn with_cart<R>(&self, session: SessionId, f: impl FnOnce(&mut Cart) -> R) -> R {
        let cart = Arc::clone(self.carts.entry(session).or_default().value());
        let mut cart = cart.lock();
        f(&mut cart)
    }

    /// Copy of the session's lines; empty for unknown sessions.
    pub fn snapshot(&self, session: &SessionId) -> CartSnapshot {
        match self.handle(session) {
            Some(cart) => {
                let cart = cart.lock();
                cart.snapshot()
            }
            None => Vec::new().into(),
        }
    }

    /// Drops the session's cart, e.g. on logout.
    pub fn discard(&self, session: &SessionId) -> Option<Cart> {
        let (_, cart) = self.carts.remove(session)?;
        let mut cart = cart.lock();
        Some(std::mem::take(&mut *cart))
    }

    pub fn len(&self) -> usize {
        self.carts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.carts.is_empty()
    }
}
