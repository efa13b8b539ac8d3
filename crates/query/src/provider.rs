//! Table resolution.
//!
//! The engine never opens storage itself: a [`TableProvider`] hands out
//! [`TableReader`]s, and a reader exposes the table's schema and the
//! serialized buffers currently making up the table.

use bytes::Bytes;
use hashbrown::HashMap;
use std::fmt;
use std::sync::Arc;
use strata_core::Result;
use strata_dynparquet::{DynamicSchema, SerializedBuffer};

/// Read access to one table.
pub trait TableReader: Send + Sync + fmt::Debug {
    /// Returns the table name.
    fn name(&self) -> &str;

    /// Returns the table schema.
    fn schema(&self) -> &DynamicSchema;

    /// Returns the buffers to scan, in scan order.
    fn buffers(&self) -> Vec<Arc<SerializedBuffer>>;
}

/// Resolves table names to readers.
pub trait TableProvider: Send + Sync {
    /// Returns the table named `name`, if any.
    fn get_table(&self, name: &str) -> Option<Arc<dyn TableReader>>;
}

/// A table held entirely in memory.
#[derive(Debug)]
pub struct MemTable {
    name: String,
    schema: DynamicSchema,
    buffers: Vec<Arc<SerializedBuffer>>,
}

impl MemTable {
    /// Creates an empty table.
    pub fn new(name: impl Into<String>, schema: DynamicSchema) -> Self {
        Self {
            name: name.into(),
            schema,
            buffers: Vec::new(),
        }
    }

    /// Appends an opened buffer.
    pub fn insert(&mut self, buffer: SerializedBuffer) {
        self.buffers.push(Arc::new(buffer));
    }

    /// Opens and appends a buffer from Parquet bytes.
    pub fn insert_bytes(&mut self, data: Bytes) -> Result<()> {
        self.insert(SerializedBuffer::from_bytes(data)?);
        Ok(())
    }

    /// Builder-style [`insert_bytes`](Self::insert_bytes).
    pub fn with_bytes(mut self, data: Bytes) -> Result<Self> {
        self.insert_bytes(data)?;
        Ok(self)
    }
}

impl TableReader for MemTable {
    fn name(&self) -> &str {
        &self.name
    }

    fn schema(&self) -> &DynamicSchema {
        &self.schema
    }

    fn buffers(&self) -> Vec<Arc<SerializedBuffer>> {
        self.buffers.clone()
    }
}

/// Provider over a fixed set of registered tables.
///
/// Tables are registered before the provider is shared with an engine.
#[derive(Debug, Default)]
pub struct MemTableProvider {
    tables: HashMap<String, Arc<dyn TableReader>>,
}

impl MemTableProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a table under its own name, replacing any previous one.
    pub fn register(&mut self, table: Arc<dyn TableReader>) {
        self.tables.insert(table.name().to_string(), table);
    }

    /// Builder-style [`register`](Self::register).
    pub fn with_table(mut self, table: impl TableReader + 'static) -> Self {
        self.register(Arc::new(table));
        self
    }
}

impl TableProvider for MemTableProvider {
    fn get_table(&self, name: &str) -> Option<Arc<dyn TableReader>> {
        self.tables.get(name).cloned()
    }
}
