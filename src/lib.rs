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

//! # Seating Ledger
//!
//! This library keeps the guest list and table seating of an event venue:
//! tables with a capacity and an allowance of extra seats, guests registered
//! against a table, and their parties arriving and leaving. No table is ever
//! seated beyond `capacity + allowed_extras`.
//!
//! ## Core Components
//!
//! - [`Ledger`]: Applies the seating rules over a store
//! - [`SeatingStore`]: Data access the ledger needs; [`MemoryStore`] keeps it in
//!   process, [`postgres::PgStore`] in PostgreSQL
//! - [`Table`] / [`Guest`]: Stored records
//! - [`LedgerError`]: Classified failures ([`ErrorKind`])
//! - [`http::router`]: JSON-over-HTTP binding
//!
//! ## Example
//!
//! ```
//! use seating_ledger_rs::Ledger;
//!
//! let ledger = Ledger::in_memory();
//!
//! let table = ledger.create_table(10, 2).unwrap();
//! ledger.register_guest("Alice", table.id, 5).unwrap();
//! assert_eq!(ledger.available_seats().unwrap(), 7);
//!
//! let alice = ledger.guest_arrives("Alice", 5).unwrap();
//! assert_eq!(alice.accompanying_guests, 10);
//! assert_eq!(ledger.available_seats().unwrap(), 2);
//!
//! ledger.guest_leaves("Alice").unwrap();
//! assert_eq!(ledger.available_seats().unwrap(), 12);
//! ```
//!
//! ## Thread Safety
//!
//! The ledger is `Sync` and meant to be shared behind an `Arc`. Changes to a
//! table's occupancy are serialized by the store's per-table lock; operations
//! on different tables run in parallel.
//!
//! Ledger calls block while waiting for a table lock, and with
//! [`postgres::PgStore`] on the database. From async code, run them on
//! `tokio::task::spawn_blocking` as [`http::router`] does.

mod base;
pub mod config;
pub mod error;
mod guest;
pub mod http;
mod ledger;
pub mod logging;
pub mod postgres;
pub mod replay;
pub mod store;
mod table;

pub use base::{GuestId, TableId};
pub use config::{CapacityPolicy, LedgerConfig, StoreKind};
pub use error::{ErrorKind, LedgerError, StoreError};
pub use guest::{Guest, NewGuest};
pub use ledger::Ledger;
pub use store::{MemoryStore, SeatingStore};
pub use table::{NewTable, Table, TableOccupancy};
