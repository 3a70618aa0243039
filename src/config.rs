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

//! Checkout configuration.

use crate::error::ConfigError;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::str::FromStr;

/// Settings the checkout engine reads once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckoutConfig {
    service_fee: Decimal,
}

impl CheckoutConfig {
    /// Environment variable holding the service fee.
    pub const SERVICE_FEE_VAR: &'static str = "SERVICE_FEE";

    /// Fee added to every booking when none is configured.
    pub const DEFAULT_SERVICE_FEE: Decimal = dec!(2.50);

    /// # Errors
    ///
    /// [`ConfigError::NegativeServiceFee`] if `service_fee` is below zero.
    pub fn new(service_fee: Decimal) -> Result<Self, ConfigError> {
        if service_fee < Decimal::ZERO {
            return Err(ConfigError::NegativeServiceFee);
        }
        Ok(Self { service_fee })
    }

    /// Reads `SERVICE_FEE` from the process environment.
    ///
    /// # Errors
    ///
    /// See [`CheckoutConfig::from_lookup`].
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key/value source.
    ///
    /// A missing or blank service fee falls back to
    /// [`CheckoutConfig::DEFAULT_SERVICE_FEE`].
    ///
    /// # Errors
    ///
    /// - [`ConfigError::InvalidServiceFee`] - Value is not a decimal.
    /// - [`ConfigError::NegativeServiceFee`] - Value is below zero.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        match lookup(Self::SERVICE_FEE_VAR) {
            Some(raw) if !raw.trim().is_empty() => {
                let fee = Decimal::from_str(raw.trim())
                    .map_err(|_| ConfigError::InvalidServiceFee(raw.clone()))?;
                Self::new(fee)
            }
            _ => Ok(Self::default()),
        }
    }

    pub fn service_fee(&self) -> Decimal {
        self.service_fee
    }
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            service_fee: Self::DEFAULT_SERVICE_FEE,
        }
    }
}
