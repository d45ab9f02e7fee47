use crate::{
    schema::index::{GlobalIndexDescriptor, LocalIndexDescriptor},
    value::WireType,
};
use std::{fmt, thread, time::Duration};
use thiserror::Error as ThisError;

///
/// TableStatus
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TableStatus {
    Active,
    Creating,
    Updating,
    Deleting,
    Other(String),
}

impl fmt::Display for TableStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "ACTIVE"),
            Self::Creating => write!(f, "CREATING"),
            Self::Updating => write!(f, "UPDATING"),
            Self::Deleting => write!(f, "DELETING"),
            Self::Other(s) => write!(f, "{s}"),
        }
    }
}

///
/// AttributeDefinition
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AttributeDefinition {
    pub name: String,
    pub wire_type: WireType,
}

///
/// KeySchema
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct KeySchema {
    pub hash: AttributeDefinition,
    pub range: Option<AttributeDefinition>,
}

///
/// Throughput
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Throughput {
    pub read_capacity_units: u64,
    pub write_capacity_units: u64,
}

impl Default for Throughput {
    fn default() -> Self {
        Self {
            read_capacity_units: 10,
            write_capacity_units: 5,
        }
    }
}

///
/// TableDescription
///

#[derive(Clone, Debug)]
pub struct TableDescription {
    pub status: TableStatus,
    pub key_schema: KeySchema,
    pub index_names: Vec<String>,
    pub item_count: u64,
}

///
/// TableError
///
/// Fatal, raised only on the table-administration path.
///

#[derive(Debug, ThisError)]
pub enum TableError {
    #[error("table not found: {name}")]
    TableNotFound { name: String },

    #[error("unknown table status '{status}'")]
    UnknownTableStatus { status: String },
}

///
/// TableAdministrator
///
/// Table provisioning/DDL, called only at connection establishment and
/// never mid-operation.
///

pub trait TableAdministrator {
    fn exists(&self, name: &str) -> bool;

    fn describe(&self, name: &str) -> Result<TableDescription, TableError>;

    #[allow(clippy::too_many_arguments)]
    fn create(
        &self,
        name: &str,
        attribute_definitions: &[AttributeDefinition],
        key_schema: &KeySchema,
        local_indexes: &[LocalIndexDescriptor],
        global_indexes: &[GlobalIndexDescriptor],
        throughput: Throughput,
    ) -> Result<(), TableError>;

    fn delete(&self, name: &str) -> Result<(), TableError>;
}

/// Poll interval while a table settles into ACTIVE.
const SETTLE_INTERVAL: Duration = Duration::from_secs(1);

/// Wait for an existing table to become usable, creating it when the
/// policy allows. Mirrors the connection-establishment protocol: an
/// existing table is awaited through CREATING/UPDATING, a DELETING table
/// is awaited and recreated, and any unrecognized status is fatal.
#[allow(clippy::too_many_arguments)]
pub fn establish(
    admin: &dyn TableAdministrator,
    name: &str,
    attribute_definitions: &[AttributeDefinition],
    key_schema: &KeySchema,
    local_indexes: &[LocalIndexDescriptor],
    global_indexes: &[GlobalIndexDescriptor],
    throughput: Throughput,
    create_policy: bool,
) -> Result<(), TableError> {
    if !admin.exists(name) {
        if !create_policy {
            return Err(TableError::TableNotFound {
                name: name.to_string(),
            });
        }
        return admin.create(
            name,
            attribute_definitions,
            key_schema,
            local_indexes,
            global_indexes,
            throughput,
        );
    }

    loop {
        match admin.describe(name)?.status {
            TableStatus::Active => return Ok(()),
            TableStatus::Creating | TableStatus::Updating => {
                thread::sleep(SETTLE_INTERVAL);
            }
            TableStatus::Deleting => {
                while admin.exists(name) {
                    thread::sleep(SETTLE_INTERVAL);
                }
                return admin.create(
                    name,
                    attribute_definitions,
                    key_schema,
                    local_indexes,
                    global_indexes,
                    throughput,
                );
            }
            TableStatus::Other(status) => {
                return Err(TableError::UnknownTableStatus { status });
            }
        }
    }
}
