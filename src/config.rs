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

//! Ledger configuration.

use clap::ValueEnum;
use std::fmt;

/// How seat checks account for other parties at the same table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum CapacityPolicy {
    /// A party is checked against the table ceiling on its own. Other
    /// guests at the table are not counted when registering or arriving.
    #[default]
    PerParty,
    /// A party is checked together with every present party at the table,
    /// so the table as a whole never exceeds its ceiling.
    TableOccupancy,
}

impl fmt::Display for CapacityPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PerParty => write!(f, "per-party"),
            Self::TableOccupancy => write!(f, "table-occupancy"),
        }
    }
}

/// Where tables and guests are kept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum StoreKind {
    /// In process; lost on exit.
    #[default]
    Memory,
    /// In a PostgreSQL database.
    Postgres,
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Memory => write!(f, "memory"),
            Self::Postgres => write!(f, "postgres"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedgerConfig {
    pub capacity_policy: CapacityPolicy,
}

impl LedgerConfig {
    pub fn with_policy(capacity_policy: CapacityPolicy) -> Self {
        Self { capacity_policy }
    }
}
