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

//! PostgreSQL-backed [`SeatingStore`].
//!
//! Tables and guests live in the `tables` and `guests` relations created by
//! the migrations under `migrations/`. Departed guests keep their row with
//! `deleted_at` set; a partial unique index keeps names unique among guests
//! who have not left.
//!
//! # Locking
//!
//! [`SeatingStore::lock_table`] opens a transaction and selects the table row
//! `FOR UPDATE`, so ledgers in different processes sharing one database
//! serialize on the same table. Lock transactions draw from their own pool,
//! separate from the one queries run on, so a lock holder never waits for a
//! connection another lock holder has taken.
//!
//! # Blocking
//!
//! The ledger is synchronous. Every store call, and dropping a
//! [`PgTableLock`], drives its query to completion on the runtime the store
//! was connected from. Call the ledger from a plain thread or from
//! `tokio::task::spawn_blocking`, never directly from async code.
//!
//! # Example
//!
//! ```no_run
//! use seating_ledger_rs::Ledger;
//! use seating_ledger_rs::postgres::PgStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = PgStore::connect("postgres://localhost/seating", 10).await?;
//! store.migrate().await?;
//! let ledger = std::sync::Arc::new(Ledger::new(store));
//!
//! let seats = tokio::task::spawn_blocking(move || ledger.available_seats()).await??;
//! println!("{seats} seats empty");
//! # Ok(())
//! # }
//! ```

use crate::base::{GuestId, TableId};
use crate::error::StoreError;
use crate::guest::{Guest, NewGuest};
use crate::store::{SeatingStore, TableGuard, TableLocks};
use crate::table::{NewTable, Table};
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{FromRow, Postgres, Transaction};
use std::future::Future;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

#[derive(FromRow)]
struct TableRow {
    id: i64,
    capacity: i64,
    allowed_extras: i64,
    created_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl TryFrom<TableRow> for Table {
    type Error = StoreError;

    fn try_from(row: TableRow) -> Result<Self, StoreError> {
        Ok(Table {
            id: TableId(column(row.id, "tables.id")?),
            capacity: column(row.capacity, "tables.capacity")?,
            allowed_extras: column(row.allowed_extras, "tables.allowed_extras")?,
            created_at: row.created_at,
            deleted_at: row.deleted_at,
        })
    }
}

#[derive(FromRow)]
struct GuestRow {
    id: i64,
    name: String,
    table_id: i64,
    accompanying_guests: i64,
    created_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl TryFrom<GuestRow> for Guest {
    type Error = StoreError;

    fn try_from(row: GuestRow) -> Result<Self, StoreError> {
        Ok(Guest {
            id: GuestId(column(row.id, "guests.id")?),
            name: row.name,
            table_id: TableId(column(row.table_id, "guests.table_id")?),
            accompanying_guests: column(row.accompanying_guests, "guests.accompanying_guests")?,
            created_at: row.created_at,
            deleted_at: row.deleted_at,
        })
    }
}

fn column(value: i64, name: &str) -> Result<u32, StoreError> {
    u32::try_from(value).map_err(|_| StoreError::Corrupt(format!("{name} out of range: {value}")))
}

fn collect<R, T>(rows: Vec<R>) -> Result<Vec<T>, StoreError>
where
    T: TryFrom<R, Error = StoreError>,
{
    rows.into_iter().map(T::try_from).collect()
}

fn unavailable(err: sqlx::Error) -> StoreError {
    StoreError::Unavailable(err.to_string())
}

/// Held row lock on a [`PgStore`] table.
///
/// Dropping it rolls the lock transaction back on the store's runtime, so it
/// must not be dropped inside async code.
pub struct PgTableLock {
    tx: Option<Transaction<'static, Postgres>>,
    runtime: Handle,
    /// Released after the row lock.
    _local: TableGuard,
}

impl Drop for PgTableLock {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            // Nothing is written through the lock transaction.
            if let Err(err) = self.runtime.block_on(tx.rollback()) {
                warn!(error = %err, "releasing table row lock failed");
            }
        }
    }
}

/// [`SeatingStore`] over a PostgreSQL database.
pub struct PgStore {
    pool: PgPool,
    lock_pool: PgPool,
    /// Keeps threads of this process from each parking a lock connection
    /// on the same row.
    local: TableLocks,
    runtime: Handle,
}

impl PgStore {
    /// Connects with up to `max_connections` for queries and as many again
    /// for table locks.
    ///
    /// Must be called from within a multi-threaded tokio runtime; the store
    /// runs its queries on that runtime afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the database cannot be reached.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(unavailable)?;
        let lock_pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(unavailable)?;

        info!(max_connections, "connected to postgres");
        Ok(Self::from_pools(pool, lock_pool, Handle::current()))
    }

    /// Builds a store over existing pools. Queries run on `runtime`.
    pub fn from_pools(pool: PgPool, lock_pool: PgPool, runtime: Handle) -> Self {
        Self {
            pool,
            lock_pool,
            local: TableLocks::new(),
            runtime,
        }
    }

    /// Creates or upgrades the schema.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if a migration fails.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Unavailable(format!("migration failed: {e}")))?;
        Ok(())
    }

    fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }
}

impl SeatingStore for PgStore {
    type TableLock = PgTableLock;

    fn insert_table(&self, table: &NewTable) -> Result<TableId, StoreError> {
        let (id,): (i64,) = self
            .block_on(
                sqlx::query_as(
                    r"
                    INSERT INTO tables (capacity, allowed_extras, created_at)
                    VALUES ($1, $2, $3)
                    RETURNING id
                    ",
                )
                .bind(i64::from(table.capacity))
                .bind(i64::from(table.allowed_extras))
                .bind(table.created_at)
                .fetch_one(&self.pool),
            )
            .map_err(unavailable)?;
        Ok(TableId(column(id, "tables.id")?))
    }

    fn insert_guest(&self, guest: &NewGuest) -> Result<GuestId, StoreError> {
        let (id,): (i64,) = self
            .block_on(
                sqlx::query_as(
                    r"
                    INSERT INTO guests (name, table_id, accompanying_guests, created_at)
                    VALUES ($1, $2, $3, $4)
                    RETURNING id
                    ",
                )
                .bind(&guest.name)
                .bind(i64::from(guest.table_id.0))
                .bind(i64::from(guest.accompanying_guests))
                .bind(guest.created_at)
                .fetch_one(&self.pool),
            )
            .map_err(|err| {
                if let sqlx::Error::Database(db) = &err {
                    if db.is_unique_violation() {
                        return StoreError::DuplicateName(guest.name.clone());
                    }
                }
                unavailable(err)
            })?;
        Ok(GuestId(column(id, "guests.id")?))
    }

    fn table_by_id(&self, id: TableId) -> Result<Option<Table>, StoreError> {
        self.block_on(
            sqlx::query_as::<_, TableRow>(
                r"
                SELECT id, capacity, allowed_extras, created_at, deleted_at
                FROM tables
                WHERE id = $1
                ",
            )
            .bind(i64::from(id.0))
            .fetch_optional(&self.pool),
        )
        .map_err(unavailable)?
        .map(Table::try_from)
        .transpose()
    }

    fn guest_by_name(&self, name: &str) -> Result<Option<Guest>, StoreError> {
        self.block_on(
            sqlx::query_as::<_, GuestRow>(
                r"
                SELECT id, name, table_id, accompanying_guests, created_at, deleted_at
                FROM guests
                WHERE name = $1 AND deleted_at IS NULL
                ",
            )
            .bind(name)
            .fetch_optional(&self.pool),
        )
        .map_err(unavailable)?
        .map(Guest::try_from)
        .transpose()
    }

    fn update_guest_accompanying(&self, name: &str, count: u32) -> Result<u64, StoreError> {
        let result = self
            .block_on(
                sqlx::query(
                    r"
                    UPDATE guests
                    SET accompanying_guests = $1
                    WHERE name = $2 AND deleted_at IS NULL
                    ",
                )
                .bind(i64::from(count))
                .bind(name)
                .execute(&self.pool),
            )
            .map_err(unavailable)?;
        Ok(result.rows_affected())
    }

    fn soft_delete_guest(&self, name: &str) -> Result<u64, StoreError> {
        let result = self
            .block_on(
                sqlx::query(
                    r"
                    UPDATE guests
                    SET deleted_at = now()
                    WHERE name = $1 AND deleted_at IS NULL
                    ",
                )
                .bind(name)
                .execute(&self.pool),
            )
            .map_err(unavailable)?;
        Ok(result.rows_affected())
    }

    fn list_tables(&self) -> Result<Vec<Table>, StoreError> {
        let rows = self
            .block_on(
                sqlx::query_as::<_, TableRow>(
                    r"
                    SELECT id, capacity, allowed_extras, created_at, deleted_at
                    FROM tables
                    ORDER BY id
                    ",
                )
                .fetch_all(&self.pool),
            )
            .map_err(unavailable)?;
        collect(rows)
    }

    fn list_guests(&self) -> Result<Vec<Guest>, StoreError> {
        let rows = self
            .block_on(
                sqlx::query_as::<_, GuestRow>(
                    r"
                    SELECT id, name, table_id, accompanying_guests, created_at, deleted_at
                    FROM guests
                    WHERE deleted_at IS NULL
                    ORDER BY id
                    ",
                )
                .fetch_all(&self.pool),
            )
            .map_err(unavailable)?;
        collect(rows)
    }

    fn list_guests_at_table(&self, table_id: TableId) -> Result<Vec<Guest>, StoreError> {
        let rows = self
            .block_on(
                sqlx::query_as::<_, GuestRow>(
                    r"
                    SELECT id, name, table_id, accompanying_guests, created_at, deleted_at
                    FROM guests
                    WHERE table_id = $1 AND deleted_at IS NULL
                    ORDER BY id
                    ",
                )
                .bind(i64::from(table_id.0))
                .fetch_all(&self.pool),
            )
            .map_err(unavailable)?;
        collect(rows)
    }

    fn lock_table(&self, table_id: TableId) -> Result<PgTableLock, StoreError> {
        let local = self.local.lock(table_id);

        let tx = self
            .block_on(async {
                let mut tx = self.lock_pool.begin().await?;
                sqlx::query("SELECT id FROM tables WHERE id = $1 FOR UPDATE")
                    .bind(i64::from(table_id.0))
                    .fetch_optional(&mut *tx)
                    .await?;
                Ok::<_, sqlx::Error>(tx)
            })
            .map_err(unavailable)?;

        debug!(table = %table_id, "table row locked");
        Ok(PgTableLock {
            tx: Some(tx),
            runtime: self.runtime.clone(),
            _local: local,
        })
    }
}
