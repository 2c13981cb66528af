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

//! Guests and their accompanying parties.

use crate::base::{GuestId, TableId};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// A validated guest registration waiting to be stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewGuest {
    pub name: String,
    pub table_id: TableId,
    pub accompanying_guests: u32,
    pub created_at: DateTime<Utc>,
}

impl NewGuest {
    pub fn new(name: impl Into<String>, table_id: TableId, accompanying_guests: u32) -> Self {
        Self {
            name: name.into(),
            table_id,
            accompanying_guests,
            created_at: Utc::now(),
        }
    }
}

/// A stored guest.
///
/// `accompanying_guests` is the full party size the ledger accounts seats
/// with, and is replaced by the new running total on every arrival.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Guest {
    #[serde(skip)]
    pub id: GuestId,
    pub name: String,
    #[serde(rename = "table")]
    pub table_id: TableId,
    pub accompanying_guests: u32,
    #[serde(skip)]
    pub created_at: DateTime<Utc>,
    /// Set when the guest leaves.
    #[serde(skip)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Guest {
    pub fn from_new(id: GuestId, new: NewGuest) -> Self {
        Self {
            id,
            name: new.name,
            table_id: new.table_id,
            accompanying_guests: new.accompanying_guests,
            created_at: new.created_at,
            deleted_at: None,
        }
    }

    pub fn has_left(&self) -> bool {
        self.deleted_at.is_some()
    }
}
