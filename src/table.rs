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

//! Tables and their seating ceilings.
//!
//! # Example
//!
//! ```
//! use seating_ledger_rs::{NewTable, Table, TableId};
//!
//! let table = Table::from_new(TableId(1), NewTable::new(10, 2));
//! assert_eq!(table.ceiling(), 12);
//! ```

use crate::base::TableId;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// A validated table waiting to be stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTable {
    pub capacity: u32,
    pub allowed_extras: u32,
    pub created_at: DateTime<Utc>,
}

impl NewTable {
    pub fn new(capacity: u32, allowed_extras: u32) -> Self {
        Self {
            capacity,
            allowed_extras,
            created_at: Utc::now(),
        }
    }
}

/// A stored table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Table {
    pub id: TableId,
    pub capacity: u32,
    pub allowed_extras: u32,
    #[serde(skip)]
    pub created_at: DateTime<Utc>,
    /// Reserved; no operation removes tables.
    #[serde(skip)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Table {
    pub fn from_new(id: TableId, new: NewTable) -> Self {
        Self {
            id,
            capacity: new.capacity,
            allowed_extras: new.allowed_extras,
            created_at: new.created_at,
            deleted_at: None,
        }
    }

    /// Maximum total occupancy: `capacity + allowed_extras`.
    pub fn ceiling(&self) -> u64 {
        u64::from(self.capacity) + u64::from(self.allowed_extras)
    }
}

/// Seats taken and left at a single table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableOccupancy {
    #[serde(flatten)]
    pub table: Table,
    pub occupied: u64,
    /// `ceiling - occupied`, not clamped at zero.
    pub available: i64,
}

impl TableOccupancy {
    pub fn new(table: Table, occupied: u64) -> Self {
        let available = table.ceiling() as i64 - occupied as i64;
        Self {
            table,
            occupied,
            available,
        }
    }
}
