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

//! Ticket types and their sellable quantity.
//!
//! # Example
//!
//! ```
//! use rust_decimal_macros::dec;
//! use ticket_checkout::{EventId, TicketType, TicketTypeId};
//!
//! let vip = TicketType::new(TicketTypeId(7), EventId(1), "VIP", dec!(45.00), 200)?;
//! assert_eq!(vip.available(), 200);
//! # Ok::<(), ticket_checkout::InventoryError>(())
//! ```

use crate::base::{EventId, TicketTypeId};
use crate::error::InventoryError;
use crate::inventory::Reservation;
use parking_lot::{Mutex, MutexGuard};
use rust_decimal::Decimal;
use serde::ser::{Serialize, SerializeStruct, Serializer};
use serde::Deserialize;
use tracing::warn;

//  available ──reserve(n)──► available - n, sold + n
//      ▲                              │
//      └────────release(n)────────────┘   (only for reservations that never committed)
#[derive(Debug)]
struct Stock {
    available: u32,
    sold: u32,
}

impl Stock {
    fn assert_invariants(&self, capacity: u32) {
        debug_assert_eq!(
            self.available.checked_add(self.sold),
            Some(capacity),
            "Invariant violated: available {} + sold {} != capacity {}",
            self.available,
            self.sold,
            capacity
        );
    }

    /// Takes `quantity` units, returning what is left afterwards.
    fn take(&mut self, quantity: u32) -> Option<u32> {
        let remaining = self.available.checked_sub(quantity)?;
        self.available = remaining;
        self.sold += quantity;
        Some(remaining)
    }

    /// Puts back up to `quantity` units previously taken and returns how
    /// many actually went back. Never more than `sold`.
    fn put_back(&mut self, quantity: u32) -> u32 {
        let returned = quantity.min(self.sold);
        self.sold -= returned;
        self.available += returned;
        returned
    }
}

/// A purchasable admission category for one event.
///
/// The descriptive fields are fixed at creation; only the stock is mutable
/// and it lives behind its own lock so reservations against one ticket type
/// serialize without touching any other.
#[derive(Debug)]
pub struct TicketType {
    id: TicketTypeId,
    event_id: EventId,
    name: String,
    price: Decimal,
    capacity: u32,
    stock: Mutex<Stock>,
}

impl TicketType {
    const PRICE_PRECISION: u32 = 2;

    /// Creates a ticket type with `available` units on sale.
    ///
    /// # Errors
    ///
    /// [`InventoryError::NegativePrice`] if `price` is below zero.
    pub fn new(
        id: TicketTypeId,
        event_id: EventId,
        name: impl Into<String>,
        price: Decimal,
        available: u32,
    ) -> Result<Self, InventoryError> {
        if price < Decimal::ZERO {
            return Err(InventoryError::NegativePrice(id));
        }
        Ok(Self {
            id,
            event_id,
            name: name.into(),
            price,
            capacity: available,
            stock: Mutex::new(Stock {
                available,
                sold: 0,
            }),
        })
    }

    pub fn id(&self) -> TicketTypeId {
        self.id
    }

    pub fn event_id(&self) -> EventId {
        self.event_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn price(&self) -> Decimal {
        self.price
    }

    /// Units still sellable.
    pub fn available(&self) -> u32 {
        self.stock.lock().available
    }

    /// Units taken by reservations that have not been released.
    pub fn sold(&self) -> u32 {
        self.stock.lock().sold
    }

    /// Conditionally decrements the available quantity.
    ///
    /// The check and the decrement happen under one lock acquisition.
    /// Returns the post-decrement quantity.
    ///
    /// # Errors
    ///
    /// - [`InventoryError::InvalidQuantity`] - `quantity` is zero.
    /// - [`InventoryError::Insufficient`] - fewer than `quantity` units remain;
    ///   nothing is changed.
    pub fn reserve(&self, quantity: u32) -> Result<u32, InventoryError> {
        if quantity == 0 {
            return Err(InventoryError::InvalidQuantity);
        }
        let mut stock = self.stock.lock();
        let remaining = stock.take(quantity).ok_or(InventoryError::Insufficient {
            ticket_type_id: self.id,
            requested: quantity,
            remaining: stock.available,
        })?;
        stock.assert_invariants(self.capacity);
        Ok(remaining)
    }

    /// Returns `quantity` units from a reservation that did not commit.
    ///
    /// # Errors
    ///
    /// [`InventoryError::OverRelease`] if fewer than `quantity` units are
    /// outstanding. What is outstanding still goes back on sale.
    pub fn release(&self, quantity: u32) -> Result<(), InventoryError> {
        let mut stock = self.stock.lock();
        let returned = stock.put_back(quantity);
        stock.assert_invariants(self.capacity);
        if returned < quantity {
            warn!(
                ticket_type = %self.id,
                quantity,
                returned,
                "released more tickets than were outstanding"
            );
            return Err(InventoryError::OverRelease {
                ticket_type_id: self.id,
                quantity,
                returned,
            });
        }
        Ok(())
    }

    /// Reserves several lines across ticket types as one step.
    ///
    /// Each stock lock is taken once, in ascending id order, and all of them
    /// stay held until every line has been checked against the running
    /// demand for its ticket type. Nothing is taken unless every line fits.
    /// Callers must pass one `TicketType` per id.
    ///
    /// Returns one [`Reservation`] per ticket type, sorted by id.
    ///
    /// # Errors
    ///
    /// - [`InventoryError::InvalidQuantity`] - A line asks for zero units.
    /// - [`InventoryError::Insufficient`] - The first line, in the given
    ///   order, that does not fit. `requested` is that line's quantity.
    pub(crate) fn reserve_together(
        lines: &[(&TicketType, u32)],
    ) -> Result<Vec<Reservation>, InventoryError> {
        if lines.iter().any(|&(_, quantity)| quantity == 0) {
            return Err(InventoryError::InvalidQuantity);
        }

        let mut order: Vec<&TicketType> = lines.iter().map(|&(t, _)| t).collect();
        order.sort_by_key(|t| t.id);
        order.dedup_by_key(|t| t.id);

        // Ascending id order for every caller, so no two checkouts can wait
        // on each other in a cycle.
        let mut stocks: Vec<MutexGuard<'_, Stock>> =
            order.iter().map(|t| t.stock.lock()).collect();
        let mut demand = vec![0u32; order.len()];

        for &(ticket_type, quantity) in lines {
            let Ok(slot) = order.binary_search_by_key(&ticket_type.id, |t| t.id) else {
                continue;
            };
            let remaining = stocks[slot].available.saturating_sub(demand[slot]);
            if quantity > remaining {
                return Err(InventoryError::Insufficient {
                    ticket_type_id: ticket_type.id,
                    requested: quantity,
                    remaining,
                });
            }
            demand[slot] += quantity;
        }

        let mut reservations = Vec::with_capacity(order.len());
        for ((ticket_type, stock), quantity) in order.iter().zip(stocks.iter_mut()).zip(demand) {
            let remaining = stock.available - quantity;
            stock.available = remaining;
            stock.sold += quantity;
            stock.assert_invariants(ticket_type.capacity);
            reservations.push(Reservation {
                ticket_type_id: ticket_type.id,
                quantity,
                remaining,
            });
        }
        Ok(reservations)
    }

    /// Copies the current state out of the lock.
    pub fn info(&self) -> TicketTypeInfo {
        TicketTypeInfo {
            id: self.id,
            event_id: self.event_id,
            name: self.name.clone(),
            price: self.price,
            available: self.available(),
        }
    }
}

/// Point-in-time, unlocked copy of a [`TicketType`].
///
/// `available` is advisory: the ledger may have changed by the time it is read.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, serde::Serialize)]
pub struct TicketTypeInfo {
    #[serde(rename = "ticket_type")]
    pub id: TicketTypeId,
    #[serde(rename = "event")]
    pub event_id: EventId,
    pub name: String,
    pub price: Decimal,
    pub available: u32,
}

impl TryFrom<TicketTypeInfo> for TicketType {
    type Error = InventoryError;

    fn try_from(info: TicketTypeInfo) -> Result<Self, Self::Error> {
        TicketType::new(info.id, info.event_id, info.name, info.price, info.available)
    }
}

impl Serialize for TicketType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let available = self.available();
        let mut state = serializer.serialize_struct("TicketType", 5)?;
        state.serialize_field("ticket_type", &self.id)?;
        state.serialize_field("event", &self.event_id)?;
        state.serialize_field("name", &self.name)?;
        state.serialize_field("price", &self.price.round_dp(Self::PRICE_PRECISION))?;
        state.serialize_field("available", &available)?;
        state.end()
    }
}
