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

//! Inventory ledger.
//!
//! The [`InventoryLedger`] holds every [`TicketType`] and answers one question
//! authoritatively: can `n` more units of this ticket type be sold right now?
//!
//! # Thread Safety
//!
//! Ticket types live in a [`DashMap`] as shared handles, so lookups for
//! different ticket types rarely contend. A handle is cloned out before its
//! stock is locked, which means no map shard stays locked while a
//! reservation waits on stock. Each ticket type guards its stock with its own
//! mutex, and [`InventoryLedger::try_reserve`] holds that mutex for the whole
//! check-and-decrement. [`InventoryLedger::try_reserve_all`] locks several
//! stocks at once, always in ascending id order.

use crate::base::TicketTypeId;
use crate::error::InventoryError;
use crate::ticket_type::{TicketType, TicketTypeInfo};
use dashmap::DashMap;
use std::collections::btree_map::{BTreeMap, Entry};
use std::sync::Arc;
use tracing::debug;

/// Proof that units were taken from the ledger.
///
/// A reservation either ends up in a committed booking or is handed back
/// with [`InventoryLedger::release`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "an unreleased reservation keeps its units out of sale"]
pub struct Reservation {
    pub ticket_type_id: TicketTypeId,
    pub quantity: u32,
    /// Units left right after this reservation was applied.
    pub remaining: u32,
}

/// Per ticket type sellable quantities.
#[derive(Debug, Default)]
pub struct InventoryLedger {
    ticket_types: DashMap<TicketTypeId, Arc<TicketType>>,
}

impl InventoryLedger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self {
            ticket_types: DashMap::new(),
        }
    }

    /// Adds a ticket type, replacing any previous one with the same id.
    pub fn register(&self, ticket_type: TicketType) {
        debug!(
            ticket_type = %ticket_type.id(),
            event = %ticket_type.event_id(),
            available = ticket_type.available(),
            "registered ticket type"
        );
        self.ticket_types.insert(ticket_type.id(), Arc::new(ticket_type));
    }

    fn handle(&self, ticket_type_id: TicketTypeId) -> Result<Arc<TicketType>, InventoryError> {
        self.ticket_types
            .get(&ticket_type_id)
            .map(|t| Arc::clone(t.value()))
            .ok_or(InventoryError::UnknownTicketType(ticket_type_id))
    }

    /// Atomically checks availability and decrements it.
    ///
    /// # Errors
    ///
    /// - [`InventoryError::UnknownTicketType`] - No such ticket type.
    /// - [`InventoryError::InvalidQuantity`] - `quantity` is zero.
    /// - [`InventoryError::Insufficient`] - Not enough units; nothing changed.
    pub fn try_reserve(
        &self,
        ticket_type_id: TicketTypeId,
        quantity: u32,
    ) -> Result<Reservation, InventoryError> {
        let remaining = self.handle(ticket_type_id)?.reserve(quantity)?;
        Ok(Reservation {
            ticket_type_id,
            quantity,
            remaining,
        })
    }

    /// Reserves every `(ticket type, quantity)` line, or none of them.
    ///
    /// No other reservation can observe a partial result: all the stocks
    /// involved are locked together before anything is checked. Lines for
    /// the same ticket type are added up. Returns one reservation per ticket
    /// type, sorted by id.
    ///
    /// # Errors
    ///
    /// - [`InventoryError::InvalidQuantity`] - A line asks for zero units.
    /// - [`InventoryError::UnknownTicketType`] - The first unknown ticket
    ///   type, in line order.
    /// - [`InventoryError::Insufficient`] - The first line that does not fit;
    ///   nothing changed.
    pub fn try_reserve_all(
        &self,
        lines: &[(TicketTypeId, u32)],
    ) -> Result<Vec<Reservation>, InventoryError> {
        let mut handles = BTreeMap::new();
        for &(ticket_type_id, _) in lines {
            if let Entry::Vacant(slot) = handles.entry(ticket_type_id) {
                slot.insert(self.handle(ticket_type_id)?);
            }
        }

        let mut demand = Vec::with_capacity(lines.len());
        for (ticket_type_id, quantity) in lines {
            if let Some(ticket_type) = handles.get(ticket_type_id) {
                demand.push((ticket_type.as_ref(), *quantity));
            }
        }
        TicketType::reserve_together(&demand)
    }

    /// Hands the units of an uncommitted reservation back.
    ///
    /// # Errors
    ///
    /// - [`InventoryError::UnknownTicketType`] - The ticket type is gone.
    /// - [`InventoryError::OverRelease`] - The ticket type was replaced after
    ///   the reservation was made, so fewer units were outstanding than the
    ///   reservation holds.
    pub fn release(&self, reservation: &Reservation) -> Result<(), InventoryError> {
        self.handle(reservation.ticket_type_id)?
            .release(reservation.quantity)
    }

    /// Units currently sellable, or `None` for an unknown ticket type.
    pub fn available(&self, ticket_type_id: &TicketTypeId) -> Option<u32> {
        self.ticket_types.get(ticket_type_id).map(|t| t.available())
    }

    /// Unlocked copy of a ticket type.
    pub fn ticket_type(&self, ticket_type_id: &TicketTypeId) -> Option<TicketTypeInfo> {
        self.ticket_types.get(ticket_type_id).map(|t| t.info())
    }

    /// Copies of every ticket type, sorted by id.
    pub fn ticket_types(&self) -> Vec<TicketTypeInfo> {
        let mut all: Vec<TicketTypeInfo> = self.ticket_types.iter().map(|t| t.info()).collect();
        all.sort_by_key(|t| t.id);
        all
    }

    pub fn len(&self) -> usize {
        self.ticket_types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ticket_types.is_empty()
    }
}

impl FromIterator<TicketType> for InventoryLedger {
    fn from_iter<I: IntoIterator<Item = TicketType>>(iter: I) -> Self {
        let ledger = InventoryLedger::new();
        for ticket_type in iter {
            ledger.register(ticket_type);
        }
        ledger
    }
}
