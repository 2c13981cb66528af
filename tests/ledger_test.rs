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

//! Ledger public API integration tests.

use seating_ledger_rs::{
    CapacityPolicy, ErrorKind, Guest, GuestId, Ledger, LedgerConfig, LedgerError, MemoryStore,
    NewGuest, NewTable, SeatingStore, StoreError, Table, TableId,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

fn occupancy_ledger() -> Ledger {
    Ledger::with_config(
        MemoryStore::new(),
        LedgerConfig::with_policy(CapacityPolicy::TableOccupancy),
    )
}

// === Tables ===

#[test]
fn create_table_returns_stored_table() {
    let ledger = Ledger::in_memory();
    let table = ledger.create_table(10, 2).unwrap();

    assert_eq!(table.id, TableId(1));
    assert_eq!(table.capacity, 10);
    assert_eq!(table.allowed_extras, 2);
    assert_eq!(table.ceiling(), 12);
    assert!(table.deleted_at.is_none());
}

#[test]
fn create_table_with_zero_extras() {
    let ledger = Ledger::in_memory();
    let table = ledger.create_table(1, 0).unwrap();
    assert_eq!(table.ceiling(), 1);
}

#[test]
fn create_table_rejects_non_positive_capacity() {
    let ledger = Ledger::in_memory();
    assert_eq!(ledger.create_table(0, 2), Err(LedgerError::InvalidCapacity));
    assert_eq!(ledger.create_table(-5, 2), Err(LedgerError::InvalidCapacity));
    assert!(ledger.store().list_tables().unwrap().is_empty());
}

#[test]
fn create_table_rejects_negative_extras() {
    let ledger = Ledger::in_memory();
    let result = ledger.create_table(4, -1);
    assert_eq!(result, Err(LedgerError::InvalidAllowedExtras));
    assert_eq!(result.unwrap_err().kind(), ErrorKind::Validation);
    assert!(ledger.store().list_tables().unwrap().is_empty());
}

// === Registration ===

#[test]
fn register_guest_returns_guest() {
    let ledger = Ledger::in_memory();
    let table = ledger.create_table(10, 2).unwrap();

    let guest = ledger.register_guest("Alice", table.id, 5).unwrap();
    assert_eq!(guest.name, "Alice");
    assert_eq!(guest.table_id, table.id);
    assert_eq!(guest.accompanying_guests, 5);
    assert!(!guest.has_left());

    let stored = ledger.store().guest_by_name("Alice").unwrap().unwrap();
    assert_eq!(stored, guest);
}

#[test]
fn register_guest_up_to_ceiling() {
    let ledger = Ledger::in_memory();
    let table = ledger.create_table(10, 2).unwrap();
    assert!(ledger.register_guest("Alice", table.id, 12).is_ok());
}

#[test]
fn register_guest_rejects_non_positive_party() {
    let ledger = Ledger::in_memory();
    let table = ledger.create_table(10, 2).unwrap();

    assert_eq!(
        ledger.register_guest("Alice", table.id, 0),
        Err(LedgerError::InvalidPartySize)
    );
    assert_eq!(
        ledger.register_guest("Alice", table.id, -3),
        Err(LedgerError::InvalidPartySize)
    );
    assert!(ledger.list_guests().unwrap().is_empty());
}

#[test]
fn register_guest_unknown_table() {
    let ledger = Ledger::in_memory();
    let result = ledger.register_guest("Alice", TableId(99), 2);
    assert_eq!(result, Err(LedgerError::TableNotFound(TableId(99))));
    assert_eq!(result.unwrap_err().kind(), ErrorKind::NotFound);
}

#[test]
fn register_guest_beyond_ceiling_creates_nothing() {
    let ledger = Ledger::in_memory();
    let table = ledger.create_table(10, 2).unwrap();

    let result = ledger.register_guest("Alice", table.id, 13);
    assert_eq!(
        result,
        Err(LedgerError::CapacityExceeded {
            table: table.id,
            requested: 13,
            ceiling: 12
        })
    );
    assert_eq!(result.unwrap_err().kind(), ErrorKind::CapacityExceeded);
    assert!(ledger.store().guest_by_name("Alice").unwrap().is_none());
    assert_eq!(ledger.available_seats().unwrap(), 12);
}

#[test]
fn register_duplicate_name_is_rejected() {
    let ledger = Ledger::in_memory();
    let table = ledger.create_table(10, 2).unwrap();
    ledger.register_guest("Alice", table.id, 2).unwrap();

    assert_eq!(
        ledger.register_guest("Alice", table.id, 3),
        Err(LedgerError::DuplicateGuest("Alice".into()))
    );
    assert_eq!(ledger.available_seats().unwrap(), 10);
}

#[test]
fn name_can_be_reused_after_leaving() {
    let ledger = Ledger::in_memory();
    let table = ledger.create_table(10, 2).unwrap();
    ledger.register_guest("Alice", table.id, 2).unwrap();
    ledger.guest_leaves("Alice").unwrap();

    let again = ledger.register_guest("Alice", table.id, 4).unwrap();
    assert_eq!(again.accompanying_guests, 4);
    assert_eq!(ledger.list_guests().unwrap().len(), 1);
}

#[test]
fn per_party_policy_allows_overbooking_a_table() {
    let ledger = Ledger::in_memory();
    let table = ledger.create_table(4, 0).unwrap();
    ledger.register_guest("Alice", table.id, 4).unwrap();
    ledger.register_guest("Bob", table.id, 4).unwrap();

    // Overbooking shows up in the aggregate, unclamped.
    assert_eq!(ledger.available_seats().unwrap(), -4);
}

#[test]
fn table_occupancy_policy_counts_other_parties() {
    let ledger = occupancy_ledger();
    let table = ledger.create_table(4, 1).unwrap();
    ledger.register_guest("Alice", table.id, 3).unwrap();

    assert_eq!(
        ledger.register_guest("Bob", table.id, 3),
        Err(LedgerError::CapacityExceeded {
            table: table.id,
            requested: 6,
            ceiling: 5
        })
    );
    assert!(ledger.register_guest("Bob", table.id, 2).is_ok());
    assert_eq!(ledger.available_seats().unwrap(), 0);
}

#[test]
fn table_occupancy_ignores_other_tables() {
    let ledger = occupancy_ledger();
    let first = ledger.create_table(4, 0).unwrap();
    let second = ledger.create_table(4, 0).unwrap();
    ledger.register_guest("Alice", first.id, 4).unwrap();
    assert!(ledger.register_guest("Bob", second.id, 4).is_ok());
}

// === Arrivals ===

#[test]
fn arrival_adds_to_running_total() {
    let ledger = Ledger::in_memory();
    let table = ledger.create_table(10, 2).unwrap();
    ledger.register_guest("Alice", table.id, 2).unwrap();

    let alice = ledger.guest_arrives("Alice", 3).unwrap();
    assert_eq!(alice.accompanying_guests, 5);
    let alice = ledger.guest_arrives("Alice", 4).unwrap();
    assert_eq!(alice.accompanying_guests, 9);

    let stored = ledger.store().guest_by_name("Alice").unwrap().unwrap();
    assert_eq!(stored.accompanying_guests, 9);
}

#[test]
fn arrival_with_zero_confirms_without_change() {
    let ledger = Ledger::in_memory();
    let table = ledger.create_table(10, 2).unwrap();
    ledger.register_guest("Alice", table.id, 12).unwrap();

    let alice = ledger.guest_arrives("Alice", 0).unwrap();
    assert_eq!(alice.accompanying_guests, 12);
}

#[test]
fn arrival_beyond_ceiling_leaves_count_unchanged() {
    let ledger = Ledger::in_memory();
    let table = ledger.create_table(10, 2).unwrap();
    ledger.register_guest("Alice", table.id, 10).unwrap();

    let result = ledger.guest_arrives("Alice", 3);
    assert_eq!(
        result,
        Err(LedgerError::CapacityExceeded {
            table: table.id,
            requested: 13,
            ceiling: 12
        })
    );

    let stored = ledger.store().guest_by_name("Alice").unwrap().unwrap();
    assert_eq!(stored.accompanying_guests, 10);
    assert_eq!(ledger.available_seats().unwrap(), 2);
}

#[test]
fn arrival_rejects_negative_additional() {
    let ledger = Ledger::in_memory();
    let table = ledger.create_table(10, 2).unwrap();
    ledger.register_guest("Alice", table.id, 5).unwrap();

    assert_eq!(
        ledger.guest_arrives("Alice", -1),
        Err(LedgerError::InvalidAdditionalGuests)
    );
}

#[test]
fn arrival_of_unknown_guest() {
    let ledger = Ledger::in_memory();
    assert_eq!(
        ledger.guest_arrives("Nobody", 1),
        Err(LedgerError::GuestNotFound("Nobody".into()))
    );
}

#[test]
fn arrival_under_table_occupancy_counts_neighbours() {
    let ledger = occupancy_ledger();
    let table = ledger.create_table(10, 0).unwrap();
    ledger.register_guest("Alice", table.id, 4).unwrap();
    ledger.register_guest("Bob", table.id, 4).unwrap();

    assert!(matches!(
        ledger.guest_arrives("Alice", 3),
        Err(LedgerError::CapacityExceeded { requested: 11, .. })
    ));
    assert_eq!(ledger.guest_arrives("Alice", 2).unwrap().accompanying_guests, 6);
}

// === Departures ===

#[test]
fn departed_guest_disappears_everywhere() {
    let ledger = Ledger::in_memory();
    let table = ledger.create_table(10, 2).unwrap();
    ledger.register_guest("Alice", table.id, 5).unwrap();
    ledger.register_guest("Bob", table.id, 2).unwrap();

    ledger.guest_leaves("Alice").unwrap();

    let names: Vec<String> = ledger
        .list_guests()
        .unwrap()
        .into_iter()
        .map(|g| g.name)
        .collect();
    assert_eq!(names, vec!["Bob".to_string()]);
    assert_eq!(ledger.list_arrived_guests().unwrap().len(), 1);
    assert_eq!(ledger.available_seats().unwrap(), 10);
    assert_eq!(
        ledger.guest_arrives("Alice", 1),
        Err(LedgerError::GuestNotFound("Alice".into()))
    );
}

#[test]
fn leaving_twice_is_not_found() {
    let ledger = Ledger::in_memory();
    let table = ledger.create_table(10, 2).unwrap();
    ledger.register_guest("Alice", table.id, 5).unwrap();

    ledger.guest_leaves("Alice").unwrap();
    let result = ledger.guest_leaves("Alice");
    assert_eq!(result, Err(LedgerError::GuestNotFound("Alice".into())));
    assert_eq!(result.unwrap_err().kind(), ErrorKind::NotFound);
}

#[test]
fn unknown_guest_cannot_leave() {
    let ledger = Ledger::in_memory();
    assert_eq!(
        ledger.guest_leaves("Nobody"),
        Err(LedgerError::GuestNotFound("Nobody".into()))
    );
}

// === Aggregates and listings ===

#[test]
fn available_seats_on_empty_venue() {
    let ledger = Ledger::in_memory();
    assert_eq!(ledger.available_seats().unwrap(), 0);
}

#[test]
fn available_seats_sums_all_tables() {
    let ledger = Ledger::in_memory();
    let first = ledger.create_table(10, 2).unwrap();
    let second = ledger.create_table(6, 0).unwrap();
    ledger.register_guest("Alice", first.id, 5).unwrap();
    ledger.register_guest("Bob", second.id, 6).unwrap();

    assert_eq!(ledger.available_seats().unwrap(), 18 - 11);
}

#[test]
fn guest_lists_are_in_registration_order() {
    let ledger = Ledger::in_memory();
    let table = ledger.create_table(10, 2).unwrap();
    for name in ["Carol", "Alice", "Bob"] {
        ledger.register_guest(name, table.id, 1).unwrap();
    }

    let names: Vec<String> = ledger
        .list_guests()
        .unwrap()
        .into_iter()
        .map(|g| g.name)
        .collect();
    assert_eq!(names, vec!["Carol", "Alice", "Bob"]);
    assert_eq!(ledger.list_arrived_guests().unwrap(), ledger.list_guests().unwrap());
}

#[test]
fn evening_end_to_end() {
    let ledger = Ledger::in_memory();
    let table = ledger.create_table(10, 2).unwrap();

    ledger.register_guest("Alice", table.id, 5).unwrap();
    assert_eq!(ledger.available_seats().unwrap(), 7);

    ledger.guest_arrives("Alice", 5).unwrap();
    assert_eq!(ledger.available_seats().unwrap(), 2);

    ledger.guest_leaves("Alice").unwrap();
    assert_eq!(ledger.available_seats().unwrap(), 12);

    let result = ledger.register_guest("Bob", table.id, 13);
    assert_eq!(result.unwrap_err().kind(), ErrorKind::CapacityExceeded);
    assert_eq!(ledger.available_seats().unwrap(), 12);
}

// === Store failures ===

/// Wraps a [`MemoryStore`] and fails every call while `down` is set.
#[derive(Default)]
struct FlakyStore {
    inner: MemoryStore,
    down: AtomicBool,
    /// Drops the table behind every guest lookup while set.
    lose_tables: AtomicBool,
}

impl FlakyStore {
    fn check(&self) -> Result<(), StoreError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection refused".into()));
        }
        Ok(())
    }
}

impl SeatingStore for FlakyStore {
    type TableLock = <MemoryStore as SeatingStore>::TableLock;

    fn insert_table(&self, table: &NewTable) -> Result<TableId, StoreError> {
        self.check()?;
        self.inner.insert_table(table)
    }

    fn insert_guest(&self, guest: &NewGuest) -> Result<GuestId, StoreError> {
        self.check()?;
        self.inner.insert_guest(guest)
    }

    fn table_by_id(&self, id: TableId) -> Result<Option<Table>, StoreError> {
        self.check()?;
        if self.lose_tables.load(Ordering::SeqCst) {
            return Ok(None);
        }
        self.inner.table_by_id(id)
    }

    fn guest_by_name(&self, name: &str) -> Result<Option<Guest>, StoreError> {
        self.check()?;
        self.inner.guest_by_name(name)
    }

    fn update_guest_accompanying(&self, name: &str, count: u32) -> Result<u64, StoreError> {
        self.check()?;
        self.inner.update_guest_accompanying(name, count)
    }

    fn soft_delete_guest(&self, name: &str) -> Result<u64, StoreError> {
        self.check()?;
        self.inner.soft_delete_guest(name)
    }

    fn list_tables(&self) -> Result<Vec<Table>, StoreError> {
        self.check()?;
        self.inner.list_tables()
    }

    fn list_guests(&self) -> Result<Vec<Guest>, StoreError> {
        self.check()?;
        self.inner.list_guests()
    }

    fn list_guests_at_table(&self, table_id: TableId) -> Result<Vec<Guest>, StoreError> {
        self.check()?;
        self.inner.list_guests_at_table(table_id)
    }

    fn lock_table(&self, table_id: TableId) -> Result<Self::TableLock, StoreError> {
        self.check()?;
        self.inner.lock_table(table_id)
    }
}

#[test]
fn store_failures_are_internal() {
    let ledger = Ledger::new(FlakyStore::default());
    let table = ledger.create_table(10, 2).unwrap();
    ledger.register_guest("Alice", table.id, 5).unwrap();

    ledger.store().down.store(true, Ordering::SeqCst);

    for err in [
        ledger.create_table(1, 0).unwrap_err(),
        ledger.register_guest("Bob", table.id, 1).unwrap_err(),
        ledger.guest_arrives("Alice", 1).unwrap_err(),
        ledger.guest_leaves("Alice").unwrap_err(),
        ledger.available_seats().unwrap_err(),
        ledger.list_guests().unwrap_err(),
    ] {
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert!(matches!(err, LedgerError::Storage(StoreError::Unavailable(_))));
    }

    ledger.store().down.store(false, Ordering::SeqCst);
    assert_eq!(ledger.available_seats().unwrap(), 7);
}

#[test]
fn arrival_at_missing_table_is_inconsistent() {
    let ledger = Ledger::new(FlakyStore::default());
    let table = ledger.create_table(10, 2).unwrap();
    ledger.register_guest("Alice", table.id, 5).unwrap();

    ledger.store().lose_tables.store(true, Ordering::SeqCst);
    let err = ledger.guest_arrives("Alice", 1).unwrap_err();
    assert!(matches!(err, LedgerError::Inconsistent(_)));
    assert_eq!(err.kind(), ErrorKind::Internal);

    ledger.store().lose_tables.store(false, Ordering::SeqCst);
    assert_eq!(
        ledger.store().guest_by_name("Alice").unwrap().unwrap().accompanying_guests,
        5
    );
}

// === Guest changing tables during an operation ===

/// Wraps a [`MemoryStore`]. While `armed` is set, the next lock on table 1
/// first moves Alice to table 2, as if she left and registered again in
/// between. Records which table lock is held whenever a guest row is written.
#[derive(Default)]
struct RelocatingStore {
    inner: MemoryStore,
    armed: AtomicBool,
    held: Arc<Mutex<Vec<TableId>>>,
    writes: Mutex<Vec<Option<TableId>>>,
}

struct RecordedLock {
    table: TableId,
    held: Arc<Mutex<Vec<TableId>>>,
    _inner: <MemoryStore as SeatingStore>::TableLock,
}

impl Drop for RecordedLock {
    fn drop(&mut self) {
        self.held.lock().retain(|table| *table != self.table);
    }
}

impl RelocatingStore {
    fn record_write(&self) {
        let held = self.held.lock().last().copied();
        self.writes.lock().push(held);
    }
}

impl SeatingStore for RelocatingStore {
    type TableLock = RecordedLock;

    fn insert_table(&self, table: &NewTable) -> Result<TableId, StoreError> {
        self.inner.insert_table(table)
    }

    fn insert_guest(&self, guest: &NewGuest) -> Result<GuestId, StoreError> {
        self.inner.insert_guest(guest)
    }

    fn table_by_id(&self, id: TableId) -> Result<Option<Table>, StoreError> {
        self.inner.table_by_id(id)
    }

    fn guest_by_name(&self, name: &str) -> Result<Option<Guest>, StoreError> {
        self.inner.guest_by_name(name)
    }

    fn update_guest_accompanying(&self, name: &str, count: u32) -> Result<u64, StoreError> {
        self.record_write();
        self.inner.update_guest_accompanying(name, count)
    }

    fn soft_delete_guest(&self, name: &str) -> Result<u64, StoreError> {
        self.record_write();
        self.inner.soft_delete_guest(name)
    }

    fn list_tables(&self) -> Result<Vec<Table>, StoreError> {
        self.inner.list_tables()
    }

    fn list_guests(&self) -> Result<Vec<Guest>, StoreError> {
        self.inner.list_guests()
    }

    fn list_guests_at_table(&self, table_id: TableId) -> Result<Vec<Guest>, StoreError> {
        self.inner.list_guests_at_table(table_id)
    }

    fn lock_table(&self, table_id: TableId) -> Result<RecordedLock, StoreError> {
        if table_id == TableId(1) && self.armed.swap(false, Ordering::SeqCst) {
            self.inner.soft_delete_guest("Alice")?;
            self.inner
                .insert_guest(&NewGuest::new("Alice", TableId(2), 1))?;
        }

        let inner = self.inner.lock_table(table_id)?;
        self.held.lock().push(table_id);
        Ok(RecordedLock {
            table: table_id,
            held: Arc::clone(&self.held),
            _inner: inner,
        })
    }
}

fn relocating_ledger() -> Ledger<RelocatingStore> {
    let ledger = Ledger::with_config(
        RelocatingStore::default(),
        LedgerConfig::with_policy(CapacityPolicy::TableOccupancy),
    );
    let first = ledger.create_table(4, 0).unwrap();
    let second = ledger.create_table(4, 0).unwrap();
    assert_eq!((first.id, second.id), (TableId(1), TableId(2)));
    ledger.register_guest("Alice", first.id, 2).unwrap();
    ledger.store().armed.store(true, Ordering::SeqCst);
    ledger
}

#[test]
fn arrival_follows_guest_to_new_table() {
    let ledger = relocating_ledger();

    let alice = ledger.guest_arrives("Alice", 1).unwrap();
    assert_eq!(alice.table_id, TableId(2));
    assert_eq!(alice.accompanying_guests, 2);

    assert_eq!(*ledger.store().writes.lock(), vec![Some(TableId(2))]);
    assert!(ledger.store().held.lock().is_empty());
}

#[test]
fn departure_follows_guest_to_new_table() {
    let ledger = relocating_ledger();

    ledger.guest_leaves("Alice").unwrap();
    assert_eq!(*ledger.store().writes.lock(), vec![Some(TableId(2))]);
    assert!(ledger.list_guests().unwrap().is_empty());
    assert_eq!(ledger.available_seats().unwrap(), 8);
}

#[test]
fn arrival_checks_occupancy_of_new_table() {
    let ledger = relocating_ledger();
    ledger.register_guest("Bob", TableId(2), 3).unwrap();

    // Alice now holds 1 seat at table 2 next to Bob's 3; one more does not fit.
    let err = ledger.guest_arrives("Alice", 1).unwrap_err();
    assert_eq!(
        err,
        LedgerError::CapacityExceeded {
            table: TableId(2),
            requested: 5,
            ceiling: 4
        }
    );
    assert!(ledger.store().writes.lock().is_empty());
}
