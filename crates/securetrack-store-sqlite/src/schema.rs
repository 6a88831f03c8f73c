// crates/securetrack-store-sqlite/src/schema.rs
// ============================================================================
// Module: Schema Registry
// Description: Declared tables, columns, and the schema fingerprint.
// Purpose: Describe the on-disk contract and detect drift against it.
// Dependencies: rusqlite, sha2
// ============================================================================

//! ## Overview
//! The registry is the single source of truth for table shapes. Create
//! statements, insert/update column lists, structural validation, and the
//! fingerprint stored in the marker table are all derived from it.
//!
//! The fingerprint covers table names and column shapes only, not the
//! version number, so a shape change without a version bump is still
//! detected.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;

use rusqlite::Connection;
use sha2::Digest;
use sha2::Sha256;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Marker table name shared with existing device data files.
pub const MASTER_TABLE: &str = "room_master_table";
/// Row id of the single marker record.
pub const MASTER_ROW_ID: i64 = 42;
/// Current schema version.
pub const SCHEMA_VERSION: i64 = 1;

// ============================================================================
// SECTION: Tables
// ============================================================================

/// Tables managed by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Table {
    /// `emergency_contacts`.
    EmergencyContacts,
    /// `command_logs`.
    CommandLogs,
    /// `intruder_logs`.
    IntruderLogs,
}

impl Table {
    /// Number of managed tables.
    pub const COUNT: usize = 3;
    /// Every managed table.
    pub const ALL: [Self; Self::COUNT] =
        [Self::EmergencyContacts, Self::CommandLogs, Self::IntruderLogs];

    /// Returns the on-disk table name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::EmergencyContacts => "emergency_contacts",
            Self::CommandLogs => "command_logs",
            Self::IntruderLogs => "intruder_logs",
        }
    }

    /// Returns a dense index for per-table bookkeeping.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::EmergencyContacts => 0,
            Self::CommandLogs => 1,
            Self::IntruderLogs => 2,
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// SECTION: Columns
// ============================================================================

/// Declared storage type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    /// 64-bit integer (also used for booleans and timestamps).
    Integer,
    /// UTF-8 text.
    Text,
    /// 64-bit float.
    Real,
}

impl ColumnType {
    /// Returns the SQL type keyword.
    #[must_use]
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::Integer => "INTEGER",
            Self::Text => "TEXT",
            Self::Real => "REAL",
        }
    }
}

/// A declared column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSpec {
    /// Column name on disk.
    pub name: &'static str,
    /// Storage type.
    pub column_type: ColumnType,
    /// Whether the column rejects NULL.
    pub not_null: bool,
    /// Whether this is the auto-increment primary key.
    pub primary_key: bool,
}

impl ColumnSpec {
    /// Auto-increment integer primary key.
    #[must_use]
    pub const fn id(name: &'static str) -> Self {
        Self {
            name,
            column_type: ColumnType::Integer,
            not_null: true,
            primary_key: true,
        }
    }

    /// Non-null column.
    #[must_use]
    pub const fn required(name: &'static str, column_type: ColumnType) -> Self {
        Self {
            name,
            column_type,
            not_null: true,
            primary_key: false,
        }
    }

    /// Nullable column.
    #[must_use]
    pub const fn nullable(name: &'static str, column_type: ColumnType) -> Self {
        Self {
            name,
            column_type,
            not_null: false,
            primary_key: false,
        }
    }

    /// Returns the column definition used in `CREATE TABLE`.
    fn definition(&self) -> String {
        let mut out = format!("`{}` {}", self.name, self.column_type.as_sql());
        if self.primary_key {
            out.push_str(" PRIMARY KEY AUTOINCREMENT");
        }
        if self.not_null {
            out.push_str(" NOT NULL");
        }
        out
    }
}

/// `emergency_contacts` columns.
pub const EMERGENCY_CONTACT_COLUMNS: &[ColumnSpec] = &[
    ColumnSpec::id("id"),
    ColumnSpec::required("name", ColumnType::Text),
    ColumnSpec::required("phoneNumber", ColumnType::Text),
    ColumnSpec::required("isPrimary", ColumnType::Integer),
    ColumnSpec::required("createdAt", ColumnType::Integer),
    ColumnSpec::required("updatedAt", ColumnType::Integer),
];

/// `command_logs` columns.
pub const COMMAND_LOG_COLUMNS: &[ColumnSpec] = &[
    ColumnSpec::id("id"),
    ColumnSpec::required("command", ColumnType::Text),
    ColumnSpec::required("senderNumber", ColumnType::Text),
    ColumnSpec::required("timestamp", ColumnType::Integer),
    ColumnSpec::required("status", ColumnType::Text),
    ColumnSpec::nullable("resultMessage", ColumnType::Text),
    ColumnSpec::nullable("locationLat", ColumnType::Real),
    ColumnSpec::nullable("locationLng", ColumnType::Real),
];

/// `intruder_logs` columns.
pub const INTRUDER_LOG_COLUMNS: &[ColumnSpec] = &[
    ColumnSpec::id("id"),
    ColumnSpec::required("imagePath", ColumnType::Text),
    ColumnSpec::required("timestamp", ColumnType::Integer),
    ColumnSpec::required("location", ColumnType::Text),
];

// ============================================================================
// SECTION: Table Specs
// ============================================================================

/// Declared shape of one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSpec {
    /// Table identity.
    pub table: Table,
    /// Columns in declaration order.
    pub columns: Vec<ColumnSpec>,
}

impl TableSpec {
    /// Creates a table spec.
    #[must_use]
    pub fn new(table: Table, columns: &[ColumnSpec]) -> Self {
        Self {
            table,
            columns: columns.to_vec(),
        }
    }

    /// Returns the `CREATE TABLE IF NOT EXISTS` statement.
    #[must_use]
    pub fn create_sql(&self) -> String {
        let columns: Vec<String> = self.columns.iter().map(ColumnSpec::definition).collect();
        format!("CREATE TABLE IF NOT EXISTS `{}` ({})", self.table.name(), columns.join(", "))
    }

    /// Returns the `DROP TABLE IF EXISTS` statement.
    #[must_use]
    pub fn drop_sql(&self) -> String {
        format!("DROP TABLE IF EXISTS `{}`", self.table.name())
    }

    /// Returns the shape validation expects to find on disk.
    #[must_use]
    pub fn expected_info(&self) -> TableInfo {
        let mut columns = BTreeMap::new();
        for column in &self.columns {
            columns.insert(
                column.name.to_string(),
                ColumnInfo {
                    column_type: column.column_type.as_sql().to_string(),
                    not_null: column.not_null,
                    primary_key_position: i64::from(column.primary_key),
                },
            );
        }
        TableInfo {
            name: self.table.name().to_string(),
            columns,
        }
    }
}

// ============================================================================
// SECTION: Registry
// ============================================================================

/// Versioned set of table specs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaRegistry {
    /// Schema version stored in `PRAGMA user_version`.
    version: i64,
    /// Managed tables.
    tables: Vec<TableSpec>,
}

impl SchemaRegistry {
    /// Creates a registry from explicit table specs.
    #[must_use]
    pub const fn new(version: i64, tables: Vec<TableSpec>) -> Self {
        Self {
            version,
            tables,
        }
    }

    /// Returns the device store schema at [`SCHEMA_VERSION`].
    #[must_use]
    pub fn securetrack() -> Self {
        Self::new(
            SCHEMA_VERSION,
            vec![
                TableSpec::new(Table::EmergencyContacts, EMERGENCY_CONTACT_COLUMNS),
                TableSpec::new(Table::CommandLogs, COMMAND_LOG_COLUMNS),
                TableSpec::new(Table::IntruderLogs, INTRUDER_LOG_COLUMNS),
            ],
        )
    }

    /// Returns the schema version.
    #[must_use]
    pub const fn version(&self) -> i64 {
        self.version
    }

    /// Returns the managed table specs.
    #[must_use]
    pub fn tables(&self) -> &[TableSpec] {
        &self.tables
    }

    /// Returns the managed table identities.
    #[must_use]
    pub fn table_ids(&self) -> Vec<Table> {
        self.tables.iter().map(|spec| spec.table).collect()
    }

    /// Returns the content fingerprint (lowercase hex SHA-256).
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for spec in &self.tables {
            hasher.update(spec.table.name().as_bytes());
            hasher.update(b"(");
            for column in &spec.columns {
                hasher.update(column.definition().as_bytes());
                hasher.update(b";");
            }
            hasher.update(b")\n");
        }
        hex_encode(&hasher.finalize())
    }
}

/// Encodes bytes as a lowercase hex string.
fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(char::from(HEX[usize::from(byte >> 4)]));
        out.push(char::from(HEX[usize::from(byte & 0x0f)]));
    }
    out
}

// ============================================================================
// SECTION: Table Info
// ============================================================================

/// Observed or expected shape of a single column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    /// Declared type, uppercased.
    pub column_type: String,
    /// NOT NULL flag.
    pub not_null: bool,
    /// 1-based primary key position, 0 when not part of the key.
    pub primary_key_position: i64,
}

/// Structural description of a table used for validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableInfo {
    /// Table name.
    pub name: String,
    /// Columns keyed by name.
    pub columns: BTreeMap<String, ColumnInfo>,
}

impl TableInfo {
    /// Reads the on-disk shape of `table`. A missing table has no columns.
    ///
    /// # Errors
    ///
    /// Returns [`rusqlite::Error`] when the pragma query fails.
    pub fn read(connection: &Connection, table: &str) -> rusqlite::Result<Self> {
        let mut statement = connection
            .prepare("SELECT name, type, \"notnull\", pk FROM pragma_table_info(?1)")?;
        let mut rows = statement.query([table])?;
        let mut columns = BTreeMap::new();
        while let Some(row) = rows.next()? {
            let name: String = row.get(0)?;
            let column_type: String = row.get(1)?;
            let not_null: i64 = row.get(2)?;
            let primary_key_position: i64 = row.get(3)?;
            columns.insert(
                name,
                ColumnInfo {
                    column_type: column_type.to_ascii_uppercase(),
                    not_null: not_null != 0,
                    primary_key_position,
                },
            );
        }
        Ok(Self {
            name: table.to_string(),
            columns,
        })
    }

    /// Describes how `found` differs from `self`, one line per column.
    #[must_use]
    pub fn diff(&self, found: &Self) -> String {
        let mut lines = Vec::new();
        for (name, expected) in &self.columns {
            match found.columns.get(name) {
                None => lines.push(format!("  missing column `{name}` ({expected})")),
                Some(actual) if actual != expected => {
                    lines.push(format!("  column `{name}`: expected {expected}, found {actual}"));
                }
                Some(_) => {}
            }
        }
        for (name, actual) in &found.columns {
            if !self.columns.contains_key(name) {
                lines.push(format!("  unexpected column `{name}` ({actual})"));
            }
        }
        format!(" Expected:\n{self}\n Found:\n{found}\n Diff:\n{}", lines.join("\n"))
    }
}

impl fmt::Display for ColumnInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}",
            self.column_type,
            if self.not_null { " NOT NULL" } else { "" },
            if self.primary_key_position > 0 { " PRIMARY KEY" } else { "" }
        )
    }
}

impl fmt::Display for TableInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TableInfo{{name='{}', columns={{", self.name)?;
        for (index, (name, column)) in self.columns.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{name}: {column}")?;
        }
        f.write_str("}}")
    }
}
