// crates/securetrack-store-sqlite/src/codec.rs
// ============================================================================
// Module: Record Codec
// Description: Column <-> record conversion and per-table statement text.
// Purpose: Keep typed records and stored rows in lockstep with the registry.
// Dependencies: rusqlite, securetrack-core
// ============================================================================

//! ## Overview
//! Each record type implements [`Entity`], which names its table, lists its
//! columns in registry order, encodes itself into positional values, and
//! decodes a row by column name. Decoding never writes and fails with
//! [`SqliteStoreError::Decode`] on any stored value that does not fit the
//! typed field, including unknown status labels.
//!
//! Nullable columns decode to `None` and `None` encodes to `NULL`; no
//! sentinel values are used.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::str;

use rusqlite::Row;
use rusqlite::types::Value;
use rusqlite::types::ValueRef;
use securetrack_core::CommandLog;
use securetrack_core::CommandStatus;
use securetrack_core::EmergencyContact;
use securetrack_core::IntruderLog;
use securetrack_core::RecordId;

use crate::error::SqliteStoreError;
use crate::schema::COMMAND_LOG_COLUMNS;
use crate::schema::ColumnSpec;
use crate::schema::EMERGENCY_CONTACT_COLUMNS;
use crate::schema::INTRUDER_LOG_COLUMNS;
use crate::schema::Table;

// ============================================================================
// SECTION: Entity
// ============================================================================

/// A record type stored as one row of one table.
pub trait Entity: Sized + Send + 'static {
    /// Backing table.
    const TABLE: Table;

    /// Columns in registry order. The first column is the primary key.
    fn columns() -> &'static [ColumnSpec];

    /// Returns the record id (0 when unassigned).
    fn id(&self) -> RecordId;

    /// Encodes the record in [`Entity::columns`] order.
    fn to_values(&self) -> Vec<Value>;

    /// Decodes a row selected with every column of the table.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Decode`] when a stored value does not fit.
    fn from_row(row: &Row<'_>) -> Result<Self, SqliteStoreError>;
}

impl Entity for EmergencyContact {
    const TABLE: Table = Table::EmergencyContacts;

    fn columns() -> &'static [ColumnSpec] {
        EMERGENCY_CONTACT_COLUMNS
    }

    fn id(&self) -> RecordId {
        self.id
    }

    fn to_values(&self) -> Vec<Value> {
        vec![
            Value::Integer(self.id),
            Value::Text(self.name.clone()),
            Value::Text(self.phone_number.clone()),
            Value::Integer(i64::from(self.is_primary)),
            Value::Integer(self.created_at),
            Value::Integer(self.updated_at),
        ]
    }

    fn from_row(row: &Row<'_>) -> Result<Self, SqliteStoreError> {
        let table = Self::TABLE;
        Ok(Self {
            id: read_i64(row, table, "id")?,
            name: read_text(row, table, "name")?,
            phone_number: read_text(row, table, "phoneNumber")?,
            is_primary: read_bool(row, table, "isPrimary")?,
            created_at: read_i64(row, table, "createdAt")?,
            updated_at: read_i64(row, table, "updatedAt")?,
        })
    }
}

impl Entity for CommandLog {
    const TABLE: Table = Table::CommandLogs;

    fn columns() -> &'static [ColumnSpec] {
        COMMAND_LOG_COLUMNS
    }

    fn id(&self) -> RecordId {
        self.id
    }

    fn to_values(&self) -> Vec<Value> {
        vec![
            Value::Integer(self.id),
            Value::Text(self.command.clone()),
            Value::Text(self.sender_number.clone()),
            Value::Integer(self.timestamp),
            encode_status(self.status),
            encode_opt_text(self.result_message.as_deref()),
            encode_opt_f64(self.location_lat),
            encode_opt_f64(self.location_lng),
        ]
    }

    fn from_row(row: &Row<'_>) -> Result<Self, SqliteStoreError> {
        let table = Self::TABLE;
        Ok(Self {
            id: read_i64(row, table, "id")?,
            command: read_text(row, table, "command")?,
            sender_number: read_text(row, table, "senderNumber")?,
            timestamp: read_i64(row, table, "timestamp")?,
            status: read_status(row, table, "status")?,
            result_message: read_opt_text(row, table, "resultMessage")?,
            location_lat: read_opt_f64(row, table, "locationLat")?,
            location_lng: read_opt_f64(row, table, "locationLng")?,
        })
    }
}

impl Entity for IntruderLog {
    const TABLE: Table = Table::IntruderLogs;

    fn columns() -> &'static [ColumnSpec] {
        INTRUDER_LOG_COLUMNS
    }

    fn id(&self) -> RecordId {
        self.id
    }

    fn to_values(&self) -> Vec<Value> {
        vec![
            Value::Integer(self.id),
            Value::Text(self.image_path.clone()),
            Value::Integer(self.timestamp),
            Value::Text(self.location.clone()),
        ]
    }

    fn from_row(row: &Row<'_>) -> Result<Self, SqliteStoreError> {
        let table = Self::TABLE;
        Ok(Self {
            id: read_i64(row, table, "id")?,
            image_path: read_text(row, table, "imagePath")?,
            timestamp: read_i64(row, table, "timestamp")?,
            location: read_text(row, table, "location")?,
        })
    }
}

// ============================================================================
// SECTION: Statements
// ============================================================================

/// Conflict handling for inserts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnConflict {
    /// Fail the statement on a duplicate id.
    Abort,
    /// Replace the existing row.
    Replace,
}

impl OnConflict {
    /// Returns the SQL conflict clause keyword.
    const fn keyword(self) -> &'static str {
        match self {
            Self::Abort => "ABORT",
            Self::Replace => "REPLACE",
        }
    }
}

/// Builds the insert statement; an id of 0 binds as `NULL` and is assigned.
#[must_use]
pub fn insert_sql<E: Entity>(conflict: OnConflict) -> String {
    let columns = E::columns();
    let names: Vec<String> = columns.iter().map(|column| format!("`{}`", column.name)).collect();
    let placeholders: Vec<&str> = columns
        .iter()
        .map(|column| if column.primary_key { "nullif(?, 0)" } else { "?" })
        .collect();
    format!(
        "INSERT OR {} INTO `{}` ({}) VALUES ({})",
        conflict.keyword(),
        E::TABLE.name(),
        names.join(","),
        placeholders.join(",")
    )
}

/// Builds the full-row update statement; the id binds last.
#[must_use]
pub fn update_sql<E: Entity>() -> String {
    let assignments: Vec<String> =
        E::columns().iter().map(|column| format!("`{}` = ?", column.name)).collect();
    format!(
        "UPDATE OR ABORT `{}` SET {} WHERE `{}` = ?",
        E::TABLE.name(),
        assignments.join(","),
        primary_key::<E>()
    )
}

/// Builds the delete-by-id statement.
#[must_use]
pub fn delete_sql<E: Entity>() -> String {
    format!("DELETE FROM `{}` WHERE `{}` = ?", E::TABLE.name(), primary_key::<E>())
}

/// Builds the select-by-id statement.
#[must_use]
pub fn select_by_id_sql<E: Entity>() -> String {
    format!("SELECT * FROM `{}` WHERE `{}` = ?", E::TABLE.name(), primary_key::<E>())
}

/// Returns the primary key column name.
fn primary_key<E: Entity>() -> &'static str {
    E::columns().iter().find(|column| column.primary_key).map_or("id", |column| column.name)
}

/// Update parameters: every column followed by the id.
#[must_use]
pub fn update_values<E: Entity>(record: &E) -> Vec<Value> {
    let mut values = record.to_values();
    values.push(Value::Integer(record.id()));
    values
}

// ============================================================================
// SECTION: Encoding
// ============================================================================

/// Encodes a status as its storage label.
#[must_use]
pub fn encode_status(status: CommandStatus) -> Value {
    Value::Text(status.as_str().to_string())
}

/// Encodes optional text.
fn encode_opt_text(value: Option<&str>) -> Value {
    value.map_or(Value::Null, |text| Value::Text(text.to_string()))
}

/// Encodes an optional real.
fn encode_opt_f64(value: Option<f64>) -> Value {
    value.map_or(Value::Null, Value::Real)
}

// ============================================================================
// SECTION: Decoding
// ============================================================================

/// Builds a decode error for the named column.
fn decode_error(table: Table, column: &str, value: ValueRef<'_>) -> SqliteStoreError {
    SqliteStoreError::Decode {
        table: table.name().to_string(),
        column: column.to_string(),
        value: describe(value),
    }
}

/// Renders a stored value for error messages.
fn describe(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => "NULL".to_string(),
        ValueRef::Integer(number) => number.to_string(),
        ValueRef::Real(number) => number.to_string(),
        ValueRef::Text(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        ValueRef::Blob(bytes) => format!("<blob {} bytes>", bytes.len()),
    }
}

/// Reads a non-null integer.
fn read_i64(row: &Row<'_>, table: Table, column: &str) -> Result<i64, SqliteStoreError> {
    match row.get_ref(column)? {
        ValueRef::Integer(number) => Ok(number),
        other => Err(decode_error(table, column, other)),
    }
}

/// Reads a 0/1 integer flag.
fn read_bool(row: &Row<'_>, table: Table, column: &str) -> Result<bool, SqliteStoreError> {
    match row.get_ref(column)? {
        ValueRef::Integer(number) => Ok(number != 0),
        other => Err(decode_error(table, column, other)),
    }
}

/// Reads non-null text.
fn read_text(row: &Row<'_>, table: Table, column: &str) -> Result<String, SqliteStoreError> {
    read_opt_text(row, table, column)?.ok_or_else(|| decode_error(table, column, ValueRef::Null))
}

/// Reads nullable text.
fn read_opt_text(
    row: &Row<'_>,
    table: Table,
    column: &str,
) -> Result<Option<String>, SqliteStoreError> {
    match row.get_ref(column)? {
        ValueRef::Null => Ok(None),
        ValueRef::Text(bytes) => str::from_utf8(bytes)
            .map(|text| Some(text.to_string()))
            .map_err(|_| decode_error(table, column, ValueRef::Text(bytes))),
        other => Err(decode_error(table, column, other)),
    }
}

/// Reads a nullable real.
fn read_opt_f64(
    row: &Row<'_>,
    table: Table,
    column: &str,
) -> Result<Option<f64>, SqliteStoreError> {
    match row.get_ref(column)? {
        ValueRef::Null => Ok(None),
        ValueRef::Real(number) => Ok(Some(number)),
        other => Err(decode_error(table, column, other)),
    }
}

/// Reads a status label; unknown labels are a hard error.
fn read_status(
    row: &Row<'_>,
    table: Table,
    column: &str,
) -> Result<CommandStatus, SqliteStoreError> {
    let label = read_text(row, table, column)?;
    label.parse::<CommandStatus>().map_err(|_| SqliteStoreError::Decode {
        table: table.name().to_string(),
        column: column.to_string(),
        value: label,
    })
}
