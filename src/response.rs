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

//! Caller-facing checkout result.
//!
//! ```json
//! {"success": true, "booking_id": 12}
//! {"success": false, "message": "field email is required"}
//! ```

use crate::base::BookingId;
use crate::error::CheckoutError;
use serde::{Deserialize, Serialize};

/// Body returned to the caller of a checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub booking_id: Option<BookingId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl CheckoutResponse {
    pub fn booked(booking_id: BookingId) -> Self {
        Self {
            success: true,
            booking_id: Some(booking_id),
            message: None,
        }
    }

    pub fn failed(error: &CheckoutError) -> Self {
        Self {
            success: false,
            booking_id: None,
            message: Some(error.to_string()),
        }
    }

    /// Builds the body and its HTTP status from a checkout result.
    pub fn from_result(result: &Result<BookingId, CheckoutError>) -> (u16, Self) {
        match result {
            Ok(id) => (200, Self::booked(*id)),
            Err(err) => (status_code(err), Self::failed(err)),
        }
    }
}

/// HTTP status for a checkout failure.
///
/// | Error | Status |
/// |-------|--------|
/// | MissingField | 400 |
/// | EmptyCart | 400 |
/// | AmountOverflow | 400 |
/// | InsufficientInventory | 409 |
/// | Infrastructure | 500 |
pub fn status_code(error: &CheckoutError) -> u16 {
    match error {
        CheckoutError::MissingField(_)
        | CheckoutError::EmptyCart
        | CheckoutError::AmountOverflow => 400,
        CheckoutError::InsufficientInventory { .. } => 409,
        CheckoutError::Infrastructure(_) => 500,
    }
}
