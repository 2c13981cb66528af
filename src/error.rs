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

//! Error types for seating operations.

use crate::base::TableId;
use thiserror::Error;

/// Message returned to callers in place of internal failure details.
pub const RETRY_LATER: &str = "unable to complete the request at this time, please retry later";

/// Coarse classification of a [`LedgerError`].
///
/// The HTTP layer maps each kind onto a status code; nothing in the core
/// retries on any of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed or out-of-range input.
    Validation,
    /// Referenced table or guest does not exist.
    NotFound,
    /// The requested party does not fit the table.
    CapacityExceeded,
    /// Storage failure or inconsistent stored data.
    Internal,
}

/// Failures reported by a [`SeatingStore`](crate::store::SeatingStore).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// An active guest already holds this name
    #[error("guest name already registered: {0}")]
    DuplicateName(String),

    /// Backend could not serve the request
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A stored row holds a value the ledger cannot represent
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

/// Seating ledger errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Table capacity is zero, negative or out of range
    #[error("invalid capacity (must be a positive integer)")]
    InvalidCapacity,

    /// Allowed extras is negative or out of range
    #[error("invalid allowed extras (must be a non-negative integer)")]
    InvalidAllowedExtras,

    /// Guest name is empty
    #[error("guest name is empty")]
    EmptyName,

    /// Party size at registration is zero, negative or out of range
    #[error("accompanying guests must be a positive integer")]
    InvalidPartySize,

    /// Additional guests on arrival is negative or out of range
    #[error("additional accompanying guests must be a non-negative integer")]
    InvalidAdditionalGuests,

    /// An active guest is already registered under this name
    #[error("guest {0} is already on the guest list")]
    DuplicateGuest(String),

    /// Referenced table does not exist
    #[error("table {0} does not exist")]
    TableNotFound(TableId),

    /// No active guest with this name
    #[error("guest with name {0} not found")]
    GuestNotFound(String),

    /// Seating the party would exceed the table ceiling
    #[error("no seats available for table {table}: {requested} requested, ceiling is {ceiling}")]
    CapacityExceeded {
        table: TableId,
        requested: u64,
        ceiling: u64,
    },

    /// Stored data contradicts itself (e.g. a guest at a missing table)
    #[error("inconsistent seating data: {0}")]
    Inconsistent(String),

    /// Store failure
    #[error("storage failure: {0}")]
    Storage(#[from] StoreError),
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidCapacity
            | Self::InvalidAllowedExtras
            | Self::EmptyName
            | Self::InvalidPartySize
            | Self::InvalidAdditionalGuests
            | Self::DuplicateGuest(_) => ErrorKind::Validation,
            Self::TableNotFound(_) | Self::GuestNotFound(_) => ErrorKind::NotFound,
            Self::CapacityExceeded { .. } => ErrorKind::CapacityExceeded,
            Self::Inconsistent(_) | Self::Storage(_) => ErrorKind::Internal,
        }
    }

    /// Message safe to hand back to a caller. Internal details stay server-side.
    pub fn public_message(&self) -> String {
        match self.kind() {
            ErrorKind::Internal => RETRY_LATER.to_string(),
            _ => self.to_string(),
        }
    }
}
