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

//! The capacity ledger: seating rules over a [`SeatingStore`].

use crate::base::{GuestId, TableId};
use crate::config::{CapacityPolicy, LedgerConfig};
use crate::error::{LedgerError, StoreError};
use crate::guest::{Guest, NewGuest};
use crate::store::{MemoryStore, SeatingStore};
use crate::table::{NewTable, Table, TableOccupancy};
use std::collections::HashMap;
use tracing::{Span, debug, info, info_span, warn};

/// Applies seating operations to a store while keeping every table within
/// `capacity + allowed_extras`.
///
/// The ledger holds no mutable state of its own. Operations that change a
/// table's occupancy run under that table's row lock from the store, so
/// concurrent arrivals at one table are serialized while different tables
/// proceed in parallel.
pub struct Ledger<S: SeatingStore = MemoryStore> {
    store: S,
    config: LedgerConfig,
    /// Entered by every operation; carries the caller's logging context.
    span: Span,
}

impl Ledger<MemoryStore> {
    /// Creates a ledger over an empty in-memory store.
    pub fn in_memory() -> Self {
        Self::new(MemoryStore::new())
    }
}

impl<S: SeatingStore> Ledger<S> {
    pub fn new(store: S) -> Self {
        Self::with_config(store, LedgerConfig::default())
    }

    pub fn with_config(store: S, config: LedgerConfig) -> Self {
        Self {
            store,
            config,
            span: info_span!("ledger", policy = %config.capacity_policy),
        }
    }

    /// Replaces the span operations are recorded under.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Creates a table.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidCapacity`] - capacity is not a positive integer.
    /// - [`LedgerError::InvalidAllowedExtras`] - allowed extras is negative.
    pub fn create_table(&self, capacity: i64, allowed_extras: i64) -> Result<Table, LedgerError> {
        let _enter = self.span.enter();

        let capacity = u32::try_from(capacity)
            .ok()
            .filter(|capacity| *capacity > 0)
            .ok_or(LedgerError::InvalidCapacity)?;
        let allowed_extras =
            u32::try_from(allowed_extras).map_err(|_| LedgerError::InvalidAllowedExtras)?;

        let id = self
            .store
            .insert_table(&NewTable::new(capacity, allowed_extras))?;
        let table = self
            .store
            .table_by_id(id)?
            .ok_or_else(|| LedgerError::Inconsistent(format!("table {id} missing after insert")))?;

        info!(table = %id, capacity, allowed_extras, "table created");
        Ok(table)
    }

    /// Puts a guest and their party on the guest list for a table.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::EmptyName`] - name is blank.
    /// - [`LedgerError::InvalidPartySize`] - party size is not a positive integer.
    /// - [`LedgerError::TableNotFound`] - the table does not exist.
    /// - [`LedgerError::CapacityExceeded`] - the party does not fit the table.
    /// - [`LedgerError::DuplicateGuest`] - a present guest already has this name.
    pub fn register_guest(
        &self,
        name: &str,
        table_id: TableId,
        accompanying_guests: i64,
    ) -> Result<Guest, LedgerError> {
        let _enter = self.span.enter();

        validate_name(name)?;
        let party = u32::try_from(accompanying_guests)
            .ok()
            .filter(|party| *party > 0)
            .ok_or(LedgerError::InvalidPartySize)?;

        let table = self
            .store
            .table_by_id(table_id)?
            .ok_or(LedgerError::TableNotFound(table_id))?;

        let _seated = self.store.lock_table(table.id)?;
        self.ensure_fits(&table, None, u64::from(party))?;

        let new_guest = NewGuest::new(name, table.id, party);
        let id = self
            .store
            .insert_guest(&new_guest)
            .map_err(|err| match err {
                StoreError::DuplicateName(name) => LedgerError::DuplicateGuest(name),
                other => LedgerError::Storage(other),
            })?;

        info!(guest = name, table = %table.id, party, "guest registered");
        Ok(Guest::from_new(id, new_guest))
    }

    /// Records more of a guest's party arriving.
    ///
    /// The stored party size becomes `accompanying_guests + additional`. The
    /// returned guest is read back after the update and carries the new total.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidAdditionalGuests`] - `additional` is negative.
    /// - [`LedgerError::GuestNotFound`] - no present guest has this name.
    /// - [`LedgerError::CapacityExceeded`] - the new total does not fit; nothing is written.
    /// - [`LedgerError::Inconsistent`] - the guest's table is missing.
    pub fn guest_arrives(&self, name: &str, additional: i64) -> Result<Guest, LedgerError> {
        let _enter = self.span.enter();

        validate_name(name)?;
        let additional =
            u32::try_from(additional).map_err(|_| LedgerError::InvalidAdditionalGuests)?;

        let (guest, _seated) = self.lock_guest_table(name)?;
        let table = self.store.table_by_id(guest.table_id)?.ok_or_else(|| {
            LedgerError::Inconsistent(format!(
                "guest {name} is seated at missing table {}",
                guest.table_id
            ))
        })?;

        let new_total = u64::from(guest.accompanying_guests) + u64::from(additional);
        self.ensure_fits(&table, Some(guest.id), new_total)?;
        let new_total =
            u32::try_from(new_total).map_err(|_| LedgerError::InvalidAdditionalGuests)?;

        if self.store.update_guest_accompanying(name, new_total)? == 0 {
            return Err(LedgerError::Inconsistent(format!(
                "guest {name} vanished while holding table {} lock",
                table.id
            )));
        }

        let guest = self.store.guest_by_name(name)?.ok_or_else(|| {
            LedgerError::Inconsistent(format!("guest {name} missing after arrival"))
        })?;

        info!(guest = name, table = %table.id, additional, total = new_total, "guest arrived");
        Ok(guest)
    }

    /// Removes a guest and their whole party from the venue.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::GuestNotFound`] - no present guest has this name,
    ///   including a guest who already left.
    pub fn guest_leaves(&self, name: &str) -> Result<(), LedgerError> {
        let _enter = self.span.enter();

        validate_name(name)?;
        let (guest, _seated) = self.lock_guest_table(name)?;

        if self.store.soft_delete_guest(name)? == 0 {
            return Err(LedgerError::GuestNotFound(name.to_string()));
        }

        info!(guest = name, table = %guest.table_id, "guest left");
        Ok(())
    }

    /// Empty seats across the venue.
    ///
    /// Recomputed on every call as the sum of all table ceilings minus the
    /// party sizes of present guests. Not clamped at zero.
    pub fn available_seats(&self) -> Result<i64, LedgerError> {
        let _enter = self.span.enter();

        let guests = self.store.list_guests()?;
        let tables = self.store.list_tables()?;

        let ceiling: i64 = tables.iter().map(|table| table.ceiling() as i64).sum();
        let seated: i64 = guests
            .iter()
            .map(|guest| i64::from(guest.accompanying_guests))
            .sum();

        debug!(ceiling, seated, "available seats computed");
        Ok(ceiling - seated)
    }

    /// Present guests, in registration order.
    pub fn list_guests(&self) -> Result<Vec<Guest>, LedgerError> {
        let _enter = self.span.enter();
        Ok(self.store.list_guests()?)
    }

    /// Guests currently at the venue.
    ///
    /// There is no separate arrival flag, so this is the same set as
    /// [`Ledger::list_guests`].
    pub fn list_arrived_guests(&self) -> Result<Vec<Guest>, LedgerError> {
        self.list_guests()
    }

    /// Occupied and remaining seats per table, ordered by table id.
    pub fn table_occupancy(&self) -> Result<Vec<TableOccupancy>, LedgerError> {
        let _enter = self.span.enter();

        let mut occupied: HashMap<TableId, u64> = HashMap::new();
        for guest in self.store.list_guests()? {
            *occupied.entry(guest.table_id).or_default() += u64::from(guest.accompanying_guests);
        }

        Ok(self
            .store
            .list_tables()?
            .into_iter()
            .map(|table| {
                let seated = occupied.get(&table.id).copied().unwrap_or(0);
                TableOccupancy::new(table, seated)
            })
            .collect())
    }

    fn find_guest(&self, name: &str) -> Result<Guest, LedgerError> {
        self.store
            .guest_by_name(name)?
            .ok_or_else(|| LedgerError::GuestNotFound(name.to_string()))
    }

    /// Locks the table of the named guest and returns the guest as read
    /// under that lock.
    ///
    /// The table is picked from an unlocked read, so the guest may have left
    /// and registered elsewhere before the lock is held. In that case the
    /// lock is released and the guest's new table is locked instead.
    fn lock_guest_table(&self, name: &str) -> Result<(Guest, S::TableLock), LedgerError> {
        let mut table_id = self.find_guest(name)?.table_id;
        loop {
            let seated = self.store.lock_table(table_id)?;
            let guest = self.find_guest(name)?;
            if guest.table_id == table_id {
                return Ok((guest, seated));
            }

            debug!(guest = name, from = %table_id, to = %guest.table_id, "guest moved tables, relocking");
            drop(seated);
            table_id = guest.table_id;
        }
    }

    /// Checks that `party` more seats fit at `table`. Must run under the
    /// table's lock. `replacing` names a guest whose current seats are being
    /// superseded by `party` and must not be counted twice.
    fn ensure_fits(
        &self,
        table: &Table,
        replacing: Option<GuestId>,
        party: u64,
    ) -> Result<(), LedgerError> {
        let others: u64 = match self.config.capacity_policy {
            CapacityPolicy::PerParty => 0,
            CapacityPolicy::TableOccupancy => self
                .store
                .list_guests_at_table(table.id)?
                .iter()
                .filter(|guest| Some(guest.id) != replacing)
                .map(|guest| u64::from(guest.accompanying_guests))
                .sum(),
        };

        let requested = others + party;
        let ceiling = table.ceiling();
        if requested > ceiling {
            warn!(table = %table.id, requested, ceiling, "seats unavailable");
            return Err(LedgerError::CapacityExceeded {
                table: table.id,
                requested,
                ceiling,
            });
        }
        Ok(())
    }
}

impl Default for Ledger<MemoryStore> {
    fn default() -> Self {
        Self::in_memory()
    }
}

fn validate_name(name: &str) -> Result<(), LedgerError> {
    if name.trim().is_empty() {
        return Err(LedgerError::EmptyName);
    }
    Ok(())
}
