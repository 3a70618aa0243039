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

//! Error types for carts, inventory, storage and checkout.

use crate::base::TicketTypeId;
use thiserror::Error;

/// Faults raised by the persistence layer behind a [`CheckoutStore`](crate::CheckoutStore).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// The store could not be reached or timed out
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// The booking could not be made durable
    #[error("commit failed: {0}")]
    CommitFailed(String),
}

/// Inventory ledger errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InventoryError {
    /// Ticket type is not registered in the ledger
    #[error("unknown ticket type {0}")]
    UnknownTicketType(TicketTypeId),

    /// Reservation quantity is zero
    #[error("invalid quantity (must be positive)")]
    InvalidQuantity,

    /// Fewer units remain than were requested.
    ///
    /// `remaining` is diagnostic only: the ledger may change again before
    /// the caller reads it.
    #[error("not enough tickets for ticket type {ticket_type_id}: requested {requested}, remaining {remaining}")]
    Insufficient {
        ticket_type_id: TicketTypeId,
        requested: u32,
        remaining: u32,
    },

    /// Ticket type was defined with a price below zero
    #[error("ticket type {0} has a negative price")]
    NegativePrice(TicketTypeId),

    /// More units were handed back than the ticket type has sold.
    ///
    /// Happens when a ticket type is replaced while a reservation against
    /// the old one is still open. Only `returned` units went back on sale.
    #[error("ticket type {ticket_type_id}: released {quantity} but only {returned} were outstanding")]
    OverRelease {
        ticket_type_id: TicketTypeId,
        quantity: u32,
        returned: u32,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Cart mutation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CartError {
    /// Quantity is zero
    #[error("invalid quantity (must be positive)")]
    InvalidQuantity,

    /// Merged quantity is above what was available when the item was added
    #[error("total quantity {requested} exceeds available tickets ({available})")]
    ExceedsAvailable { requested: u32, available: u32 },

    /// Ticket type does not exist or belongs to another event
    #[error("ticket type not found")]
    TicketTypeNotFound,

    /// Line is not in the cart
    #[error("ticket type {0} is not in the cart")]
    LineNotFound(TicketTypeId),

    /// The cart's subtotal would not fit in a decimal
    #[error("cart total is too large")]
    AmountOverflow,

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Checkout failures.
///
/// Every variant leaves the booking store, the inventory ledger and the cart
/// exactly as they were before the call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CheckoutError {
    /// A required payment or contact field is empty
    #[error("field {0} is required")]
    MissingField(&'static str),

    /// Checkout was called with no cart lines
    #[error("your cart is empty")]
    EmptyCart,

    /// The authoritative re-check at reservation time failed for this line
    #[error("not enough tickets available for ticket type {ticket_type_id}")]
    InsufficientInventory { ticket_type_id: TicketTypeId },

    /// Subtotal plus service fee does not fit in a decimal
    #[error("order total is too large")]
    AmountOverflow,

    /// Storage fault; safe to retry since nothing was committed
    #[error("infrastructure error: {0}")]
    Infrastructure(String),
}

impl CheckoutError {
    /// Returns `true` when the failure was caused by the caller's input
    /// rather than by the server.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, CheckoutError::Infrastructure(_))
    }
}

impl From<StorageError> for CheckoutError {
    fn from(err: StorageError) -> Self {
        CheckoutError::Infrastructure(err.to_string())
    }
}

/// Configuration errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Service fee is not a decimal number
    #[error("invalid service fee {0:?}")]
    InvalidServiceFee(String),

    /// Service fee is below zero
    #[error("service fee must not be negative")]
    NegativeServiceFee,
}
