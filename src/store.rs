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

//! Storage for tables and guests.
//!
//! [`SeatingStore`] is the access pattern the [`Ledger`](crate::Ledger) needs
//! from persistence. [`MemoryStore`] implements it over concurrent maps with
//! a row lock per table; [`PgStore`](crate::postgres::PgStore) over PostgreSQL.

use crate::base::{GuestId, TableId};
use crate::error::StoreError;
use crate::guest::{Guest, NewGuest};
use crate::table::{NewTable, Table};
use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::{Mutex, RawMutex};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

/// Data access required by the ledger.
///
/// Lookups and listings of guests never return guests that have left.
pub trait SeatingStore: Send + Sync {
    /// Exclusive lock over one table's seating, released on drop.
    type TableLock;

    fn insert_table(&self, table: &NewTable) -> Result<TableId, StoreError>;

    /// Stores a guest.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DuplicateName`] if a guest who has not left
    /// already holds the name. The check and the insert are atomic.
    fn insert_guest(&self, guest: &NewGuest) -> Result<GuestId, StoreError>;

    fn table_by_id(&self, id: TableId) -> Result<Option<Table>, StoreError>;

    fn guest_by_name(&self, name: &str) -> Result<Option<Guest>, StoreError>;

    /// Overwrites the party size of the named guest. Returns affected rows.
    fn update_guest_accompanying(&self, name: &str, count: u32) -> Result<u64, StoreError>;

    /// Marks the named guest as departed. Returns affected rows.
    fn soft_delete_guest(&self, name: &str) -> Result<u64, StoreError>;

    /// All tables, ordered by id.
    fn list_tables(&self) -> Result<Vec<Table>, StoreError>;

    /// All present guests, in registration order.
    fn list_guests(&self) -> Result<Vec<Guest>, StoreError>;

    /// Present guests seated at one table, in registration order.
    fn list_guests_at_table(&self, table_id: TableId) -> Result<Vec<Guest>, StoreError>;

    /// Blocks until the table's row lock is held.
    fn lock_table(&self, table_id: TableId) -> Result<Self::TableLock, StoreError>;
}

/// Held in-process lock on one table.
pub struct TableGuard {
    _guard: ArcMutexGuard<RawMutex, ()>,
}

/// One mutex per table, created on first use.
#[derive(Debug, Default)]
pub struct TableLocks {
    locks: DashMap<TableId, Arc<Mutex<()>>>,
}

impl TableLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks until the table's mutex is held.
    pub fn lock(&self, table_id: TableId) -> TableGuard {
        // Clone the Arc out first so no map shard stays locked while we block.
        let lock = Arc::clone(self.locks.entry(table_id).or_default().value());
        TableGuard {
            _guard: lock.lock_arc(),
        }
    }
}

/// In-memory [`SeatingStore`].
#[derive(Debug)]
pub struct MemoryStore {
    tables: DashMap<TableId, Table>,
    guests: DashMap<GuestId, Guest>,
    /// Names of present guests, for O(1) lookup and duplicate detection.
    names: DashMap<String, GuestId>,
    table_locks: TableLocks,
    next_table_id: AtomicU32,
    next_guest_id: AtomicU32,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tables: DashMap::new(),
            guests: DashMap::new(),
            names: DashMap::new(),
            table_locks: TableLocks::new(),
            next_table_id: AtomicU32::new(1),
            next_guest_id: AtomicU32::new(1),
        }
    }

    fn present_guest_id(&self, name: &str) -> Option<GuestId> {
        self.names.get(name).map(|id| *id.value())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SeatingStore for MemoryStore {
    type TableLock = TableGuard;

    fn insert_table(&self, table: &NewTable) -> Result<TableId, StoreError> {
        let id = TableId(self.next_table_id.fetch_add(1, Ordering::SeqCst));
        self.tables.insert(id, Table::from_new(id, table.clone()));
        Ok(id)
    }

    fn insert_guest(&self, guest: &NewGuest) -> Result<GuestId, StoreError> {
        // Entry API holds the name's shard until the guest row is written.
        match self.names.entry(guest.name.clone()) {
            Entry::Occupied(_) => Err(StoreError::DuplicateName(guest.name.clone())),
            Entry::Vacant(entry) => {
                let id = GuestId(self.next_guest_id.fetch_add(1, Ordering::SeqCst));
                self.guests.insert(id, Guest::from_new(id, guest.clone()));
                entry.insert(id);
                Ok(id)
            }
        }
    }

    fn table_by_id(&self, id: TableId) -> Result<Option<Table>, StoreError> {
        Ok(self.tables.get(&id).map(|table| table.value().clone()))
    }

    fn guest_by_name(&self, name: &str) -> Result<Option<Guest>, StoreError> {
        let Some(id) = self.present_guest_id(name) else {
            return Ok(None);
        };
        Ok(self
            .guests
            .get(&id)
            .filter(|guest| !guest.has_left())
            .map(|guest| guest.value().clone()))
    }

    fn update_guest_accompanying(&self, name: &str, count: u32) -> Result<u64, StoreError> {
        let Some(id) = self.present_guest_id(name) else {
            return Ok(0);
        };
        match self.guests.get_mut(&id) {
            Some(mut guest) if !guest.has_left() => {
                guest.accompanying_guests = count;
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    fn soft_delete_guest(&self, name: &str) -> Result<u64, StoreError> {
        let Some((_, id)) = self.names.remove(name) else {
            return Ok(0);
        };
        match self.guests.get_mut(&id) {
            Some(mut guest) if !guest.has_left() => {
                guest.deleted_at = Some(Utc::now());
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    fn list_tables(&self) -> Result<Vec<Table>, StoreError> {
        let mut tables: Vec<Table> = self.tables.iter().map(|t| t.value().clone()).collect();
        tables.sort_by_key(|table| table.id);
        Ok(tables)
    }

    fn list_guests(&self) -> Result<Vec<Guest>, StoreError> {
        let mut guests: Vec<Guest> = self
            .guests
            .iter()
            .filter(|guest| !guest.has_left())
            .map(|guest| guest.value().clone())
            .collect();
        guests.sort_by_key(|guest| guest.id);
        Ok(guests)
    }

    fn list_guests_at_table(&self, table_id: TableId) -> Result<Vec<Guest>, StoreError> {
        let mut guests = self.list_guests()?;
        guests.retain(|guest| guest.table_id == table_id);
        Ok(guests)
    }

    fn lock_table(&self, table_id: TableId) -> Result<TableGuard, StoreError> {
        Ok(self.table_locks.lock(table_id))
    }
}
