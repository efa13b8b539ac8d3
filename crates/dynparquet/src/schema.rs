//! Dynamic schema definitions.

use crate::dynamic_columns::DynamicColumns;
use arrow::array::{new_null_array, ArrayRef};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use std::sync::Arc;
use strata_core::{Error, Result};

/// Separator between a dynamic group and a member in a concrete column name.
pub const DYNAMIC_SEPARATOR: char = '.';

/// Returns the concrete column name of a dynamic group member.
pub fn dynamic_column_name(group: &str, member: &str) -> String {
    format!("{}{}{}", group, DYNAMIC_SEPARATOR, member)
}

/// Splits a concrete column name into `(group, member)` if it names a
/// dynamic member.
pub fn split_dynamic_column_name(name: &str) -> Option<(&str, &str)> {
    name.split_once(DYNAMIC_SEPARATOR)
}

/// A column definition in a dynamic schema.
///
/// A dynamic definition stands for a group of columns sharing its type;
/// the concrete members are only known per physical unit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnDefinition {
    name: String,
    data_type: DataType,
    nullable: bool,
    dynamic: bool,
}

impl ColumnDefinition {
    /// Creates a static, non-nullable column definition.
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: false,
            dynamic: false,
        }
    }

    /// Creates a dynamic group definition. Members are always nullable.
    pub fn dynamic(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: true,
            dynamic: true,
        }
    }

    /// Sets whether this column is nullable. Ignored for dynamic groups.
    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable || self.dynamic;
        self
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn data_type(&self) -> &DataType {
        &self.data_type
    }

    #[inline]
    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    #[inline]
    pub fn is_dynamic(&self) -> bool {
        self.dynamic
    }

    /// Returns the Arrow field for a concrete column of this definition.
    pub fn field(&self, name: impl Into<String>) -> Field {
        Field::new(name, self.data_type.clone(), self.nullable)
    }
}

/// Schema of a logical table whose column set varies per physical unit.
///
/// Immutable once built and shared read-only by every query on the table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DynamicSchema {
    name: String,
    columns: Vec<ColumnDefinition>,
}

impl DynamicSchema {
    /// Starts building a schema named `name`.
    pub fn builder(name: impl Into<String>) -> Result<DynamicSchemaBuilder> {
        DynamicSchemaBuilder::new(name)
    }

    /// Schema used by examples and tests: a set of profiling samples with a
    /// dynamic `labels` group.
    pub fn sample() -> Self {
        let columns = vec![
            ColumnDefinition::new("example_type", DataType::Utf8),
            ColumnDefinition::dynamic("labels", DataType::Utf8),
            ColumnDefinition::new("stacktrace", DataType::Utf8),
            ColumnDefinition::new("timestamp", DataType::Int64),
            ColumnDefinition::new("value", DataType::Int64),
        ];
        Self {
            name: "sample".to_string(),
            columns,
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns all definitions in declaration order.
    #[inline]
    pub fn columns(&self) -> &[ColumnDefinition] {
        &self.columns
    }

    /// Returns the definition named exactly `name`.
    pub fn column(&self, name: &str) -> Option<&ColumnDefinition> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Returns the static definitions.
    pub fn static_columns(&self) -> impl Iterator<Item = &ColumnDefinition> {
        self.columns.iter().filter(|c| !c.dynamic)
    }

    /// Returns the dynamic group definitions.
    pub fn dynamic_groups(&self) -> impl Iterator<Item = &ColumnDefinition> {
        self.columns.iter().filter(|c| c.dynamic)
    }

    /// Returns true if `name` is a dynamic group of this schema.
    pub fn is_dynamic_group(&self, name: &str) -> bool {
        self.column(name).map(|c| c.dynamic).unwrap_or(false)
    }

    /// Resolves a concrete column name to its definition.
    ///
    /// `name` is either a static column or `group.member` for a member of a
    /// dynamic group. Any member name resolves; whether it is realized is a
    /// property of the physical unit, not of the schema.
    pub fn find_column(&self, name: &str) -> Option<&ColumnDefinition> {
        if let Some(column) = self.column(name) {
            return if column.dynamic { None } else { Some(column) };
        }
        let (group, member) = split_dynamic_column_name(name)?;
        if member.is_empty() {
            return None;
        }
        self.column(group).filter(|c| c.dynamic)
    }

    /// Returns the concrete Arrow schema for a realized membership.
    ///
    /// Definitions appear in declaration order; a dynamic group expands to
    /// its realized members in mapping order and contributes nothing when
    /// the mapping has no entry for it.
    pub fn concrete_schema(&self, dynamic_columns: &DynamicColumns) -> SchemaRef {
        let mut fields = Vec::with_capacity(self.columns.len());
        for column in &self.columns {
            if column.dynamic {
                for member in dynamic_columns.get(&column.name).unwrap_or_default() {
                    fields.push(column.field(dynamic_column_name(&column.name, member)));
                }
            } else {
                fields.push(column.field(column.name.clone()));
            }
        }
        Arc::new(Schema::new(fields))
    }
}

/// Builder for [`DynamicSchema`].
#[derive(Debug)]
pub struct DynamicSchemaBuilder {
    name: String,
    columns: Vec<ColumnDefinition>,
}

impl DynamicSchemaBuilder {
    /// Creates a new schema builder.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        Self::check_naming_rules(&name)?;
        Ok(Self {
            name,
            columns: Vec::new(),
        })
    }

    /// Validates a name follows naming rules.
    fn check_naming_rules(name: &str) -> Result<()> {
        let mut chars = name.chars();
        let first = match chars.next() {
            Some(c) => c,
            None => return Err(Error::invalid_schema("Name cannot be empty")),
        };
        if !first.is_ascii_alphabetic() && first != '_' {
            return Err(Error::invalid_schema(format!(
                "Name must start with letter or underscore: {}",
                name
            )));
        }
        if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(Error::invalid_schema(format!(
                "Name contains invalid characters: {}",
                name
            )));
        }
        Ok(())
    }

    /// Adds a column definition.
    pub fn add(mut self, column: ColumnDefinition) -> Result<Self> {
        Self::check_naming_rules(column.name())?;
        if self.columns.iter().any(|c| c.name() == column.name()) {
            return Err(Error::invalid_schema(format!(
                "Column already exists: {}",
                column.name()
            )));
        }
        self.columns.push(column);
        Ok(self)
    }

    /// Adds a static, non-nullable column.
    pub fn add_column(self, name: impl Into<String>, data_type: DataType) -> Result<Self> {
        self.add(ColumnDefinition::new(name, data_type))
    }

    /// Adds a static, nullable column.
    pub fn add_nullable_column(self, name: impl Into<String>, data_type: DataType) -> Result<Self> {
        self.add(ColumnDefinition::new(name, data_type).nullable(true))
    }

    /// Adds a dynamic column group.
    pub fn add_dynamic_column(self, name: impl Into<String>, data_type: DataType) -> Result<Self> {
        self.add(ColumnDefinition::dynamic(name, data_type))
    }

    /// Builds the schema.
    pub fn build(self) -> Result<DynamicSchema> {
        if self.columns.is_empty() {
            return Err(Error::invalid_schema(format!(
                "Schema {} has no columns",
                self.name
            )));
        }
        Ok(DynamicSchema {
            name: self.name,
            columns: self.columns,
        })
    }
}

/// Reshapes `batch` to `target`, matching columns by name.
///
/// Columns missing from `batch` become all-null columns. Columns of `batch`
/// that `target` does not name are dropped.
pub fn conform_batch(batch: &RecordBatch, target: &SchemaRef) -> Result<RecordBatch> {
    if batch.schema().as_ref() == target.as_ref() {
        return Ok(batch.clone());
    }
    let num_rows = batch.num_rows();
    let columns = target
        .fields()
        .iter()
        .map(|field| match batch.column_by_name(field.name()) {
            Some(column) if column.data_type() == field.data_type() => Ok(column.clone()),
            Some(column) => Err(Error::invalid_schema(format!(
                "column {} has type {}, expected {}",
                field.name(),
                column.data_type(),
                field.data_type()
            ))),
            None if field.is_nullable() => Ok(new_null_array(field.data_type(), num_rows)),
            None => Err(Error::invalid_schema(format!(
                "non-nullable column {} is missing",
                field.name()
            ))),
        })
        .collect::<Result<Vec<ArrayRef>>>()?;
    let options = RecordBatchOptions::new().with_row_count(Some(num_rows));
    Ok(RecordBatch::try_new_with_options(
        target.clone(),
        columns,
        &options,
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Array, Int64Array, StringArray};

    fn labels(members: &[&str]) -> DynamicColumns {
        DynamicColumns::new()
            .with_group("labels", members.iter().copied())
            .unwrap()
    }

    #[test]
    fn test_schema_builder() {
        let schema = DynamicSchema::builder("samples")
            .unwrap()
            .add_column("stacktrace", DataType::Utf8)
            .unwrap()
            .add_dynamic_column("labels", DataType::Utf8)
            .unwrap()
            .add_nullable_column("value", DataType::Int64)
            .unwrap()
            .build()
            .unwrap();

        assert_eq!(schema.name(), "samples");
        assert_eq!(schema.columns().len(), 3);
        assert_eq!(schema.static_columns().count(), 2);
        assert!(schema.is_dynamic_group("labels"));
        assert!(!schema.is_dynamic_group("value"));
        assert!(schema.column("value").unwrap().is_nullable());
    }

    #[test]
    fn test_group_name_collides_with_static_column() {
        let result = DynamicSchema::builder("samples")
            .unwrap()
            .add_column("labels", DataType::Utf8)
            .unwrap()
            .add_dynamic_column("labels", DataType::Utf8);
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_names() {
        assert!(DynamicSchema::builder("").is_err());
        let builder = DynamicSchema::builder("t").unwrap();
        assert!(builder.add_column("labels.test", DataType::Utf8).is_err());
        let builder = DynamicSchema::builder("t").unwrap();
        assert!(builder.add_column("1value", DataType::Int64).is_err());
        assert!(DynamicSchema::builder("t").unwrap().build().is_err());
    }

    #[test]
    fn test_find_column() {
        let schema = DynamicSchema::sample();
        assert_eq!(schema.find_column("value").unwrap().name(), "value");
        assert_eq!(schema.find_column("labels.test").unwrap().name(), "labels");
        assert!(schema.find_column("labels").is_none());
        assert!(schema.find_column("labels.").is_none());
        assert!(schema.find_column("value.x").is_none());
        assert!(schema.find_column("missing").is_none());
    }

    #[test]
    fn test_concrete_schema_expands_members_in_place() {
        let schema = DynamicSchema::sample();
        let concrete = schema.concrete_schema(&labels(&["test", "node"]));
        let names: Vec<&str> = concrete.fields().iter().map(|f| f.name().as_str()).collect();
        assert_eq!(
            names,
            ["example_type", "labels.test", "labels.node", "stacktrace", "timestamp", "value"]
        );
        assert!(concrete.field_with_name("labels.test").unwrap().is_nullable());
        assert!(!concrete.field_with_name("value").unwrap().is_nullable());

        let bare = schema.concrete_schema(&DynamicColumns::new());
        assert_eq!(bare.fields().len(), 4);
    }

    #[test]
    fn test_conform_batch_fills_nulls() {
        let source = Arc::new(Schema::new(vec![
            Field::new("value", DataType::Int64, false),
            Field::new("labels.a", DataType::Utf8, true),
        ]));
        let batch = RecordBatch::try_new(
            source,
            vec![
                Arc::new(Int64Array::from(vec![1, 2])),
                Arc::new(StringArray::from(vec![Some("x"), None])),
            ],
        )
        .unwrap();
        let target = Arc::new(Schema::new(vec![
            Field::new("labels.a", DataType::Utf8, true),
            Field::new("labels.b", DataType::Utf8, true),
            Field::new("value", DataType::Int64, false),
        ]));

        let conformed = conform_batch(&batch, &target).unwrap();
        assert_eq!(conformed.num_rows(), 2);
        assert_eq!(conformed.column(1).null_count(), 2);
        assert_eq!(conformed.schema(), target);
    }

    #[test]
    fn test_conform_batch_rejects_type_change() {
        let source = Arc::new(Schema::new(vec![Field::new("value", DataType::Utf8, true)]));
        let batch =
            RecordBatch::try_new(source, vec![Arc::new(StringArray::from(vec!["1"]))]).unwrap();
        let target = Arc::new(Schema::new(vec![Field::new("value", DataType::Int64, true)]));
        assert!(conform_batch(&batch, &target).is_err());
    }
}
