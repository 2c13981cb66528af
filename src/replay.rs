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

//! Replaying a seating plan from CSV.
//!
//! Input format: `op,name,table,capacity,allowed_extras,guests`
//!
//! | op | fields used |
//! |----|-------------|
//! | `table` | `capacity`, `allowed_extras` |
//! | `register` | `name`, `table`, `guests` |
//! | `arrive` | `name`, `guests` |
//! | `leave` | `name` |
//!
//! Rows that cannot be parsed and operations the ledger rejects are skipped.

use crate::base::TableId;
use crate::error::LedgerError;
use crate::ledger::Ledger;
use crate::store::SeatingStore;
use csv::{ReaderBuilder, Trim, Writer};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug)]
pub enum ReplayError {
    #[error("csv: {0}")]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Counts of what happened to each row.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReplaySummary {
    pub applied: usize,
    pub rejected: usize,
    pub skipped: usize,
}

#[derive(Debug, Deserialize)]
struct CsvRecord {
    op: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    table: Option<u32>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    capacity: Option<i64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    allowed_extras: Option<i64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    guests: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Operation {
    CreateTable { capacity: i64, allowed_extras: i64 },
    Register { name: String, table: TableId, guests: i64 },
    Arrive { name: String, guests: i64 },
    Leave { name: String },
}

impl CsvRecord {
    /// Returns `None` for unknown ops or missing required fields.
    fn into_operation(self) -> Option<Operation> {
        match self.op.to_lowercase().as_str() {
            "table" => Some(Operation::CreateTable {
                capacity: self.capacity?,
                allowed_extras: self.allowed_extras.unwrap_or(0),
            }),
            "register" => Some(Operation::Register {
                name: self.name?,
                table: TableId(self.table?),
                guests: self.guests?,
            }),
            "arrive" => Some(Operation::Arrive {
                name: self.name?,
                guests: self.guests.unwrap_or(0),
            }),
            "leave" => Some(Operation::Leave { name: self.name? }),
            _ => None,
        }
    }
}

fn apply<S: SeatingStore>(ledger: &Ledger<S>, operation: Operation) -> Result<(), LedgerError> {
    match operation {
        Operation::CreateTable {
            capacity,
            allowed_extras,
        } => ledger.create_table(capacity, allowed_extras).map(drop),
        Operation::Register {
            name,
            table,
            guests,
        } => ledger.register_guest(&name, table, guests).map(drop),
        Operation::Arrive { name, guests } => ledger.guest_arrives(&name, guests).map(drop),
        Operation::Leave { name } => ledger.guest_leaves(&name),
    }
}

/// Applies every row of `reader` to the ledger in order.
///
/// # Errors
///
/// Only failures of the reader itself abort the replay; bad rows and
/// rejected operations are counted and skipped.
pub fn replay<R: Read, S: SeatingStore>(
    ledger: &Ledger<S>,
    reader: R,
) -> Result<ReplaySummary, ReplayError> {
    let mut summary = ReplaySummary::default();

    let mut rdr = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .has_headers(true)
        .from_reader(reader);

    for (index, result) in rdr.deserialize::<CsvRecord>().enumerate() {
        let line = index + 2;
        let record = match result {
            Ok(record) => record,
            Err(err) if err.is_io_error() => return Err(err.into()),
            Err(err) => {
                warn!(line, error = %err, "skipping malformed row");
                summary.skipped += 1;
                continue;
            }
        };

        let Some(operation) = record.into_operation() else {
            warn!(line, "skipping row with unknown op or missing fields");
            summary.skipped += 1;
            continue;
        };

        match apply(ledger, operation) {
            Ok(()) => summary.applied += 1,
            Err(err) => {
                warn!(line, error = %err, "operation rejected");
                summary.rejected += 1;
            }
        }
    }

    Ok(summary)
}

#[derive(Debug, Serialize)]
struct ReportRow {
    table: TableId,
    capacity: u32,
    allowed_extras: u32,
    occupied: u64,
    available: i64,
}

/// Writes one CSV row per table with its occupied and remaining seats.
pub fn write_report<W: Write, S: SeatingStore>(
    ledger: &Ledger<S>,
    writer: W,
) -> Result<(), ReplayError> {
    let mut wtr = Writer::from_writer(writer);

    for occupancy in ledger.table_occupancy()? {
        wtr.serialize(ReportRow {
            table: occupancy.table.id,
            capacity: occupancy.table.capacity,
            allowed_extras: occupancy.table.allowed_extras,
            occupied: occupancy.occupied,
            available: occupancy.available,
        })?;
    }

    wtr.flush().map_err(csv::Error::from)?;
    Ok(())
}
