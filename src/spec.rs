//! Table specifications
//!
//! A table is never built or changed directly. Callers compose a
//! `TableSpec` out of validated leaf specifications and hand it to a
//! visitor: `Table::from_spec` builds a table from it, `Table::apply`
//! mutates one, and `UnderlyingTableVisitor` turns the same tree into DDL.
//!
//! ```no_run
//! use runtara_table_store::{CreateFieldInput, CreateTableInput, Table, new_table_spec};
//!
//! # fn example() -> runtara_table_store::Result<()> {
//! let input = CreateTableInput::new("Contacts")
//!     .with_field(CreateFieldInput::new("Name", "string").required());
//! let spec = new_table_spec(&input)?;
//! let table = Table::from_spec(&spec)?;
//! # Ok(())
//! # }
//! ```

use crate::error::{Result, TableError};
use crate::field::{CreateFieldInput, Field, FieldId};
use crate::filter::RootFilter;
use crate::form::WithTableForms;
use crate::schema::TableSchema;
use crate::table::{CreateTableInput, Table, TableEmoji, TableId, TableName};
use crate::view::{ViewId, WithTableViews};

/// Predicate over a candidate value
pub trait Specification<T: ?Sized> {
    fn is_satisfied_by(&self, candidate: &T) -> bool;
}

// ============================================================================
// Leaf specifications
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct WithTableName(TableName);

impl WithTableName {
    pub fn from_string(name: &str) -> Result<Self> {
        Ok(Self(TableName::create(name)?))
    }

    pub fn name(&self) -> &TableName {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WithTableId(TableId);

impl WithTableId {
    /// Use the supplied id, or generate one
    pub fn from_string(id: Option<&str>) -> Result<Self> {
        let id = match id {
            Some(id) => TableId::from_string(id)?,
            None => TableId::create(),
        };
        Ok(Self(id))
    }

    pub fn id(&self) -> &TableId {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WithTableSchema(TableSchema);

impl WithTableSchema {
    pub fn from(inputs: &[CreateFieldInput]) -> Result<Self> {
        Ok(Self(TableSchema::from_inputs(inputs)?))
    }

    pub fn new(schema: TableSchema) -> Self {
        Self(schema)
    }

    pub fn schema(&self) -> &TableSchema {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WithTableEmoji(TableEmoji);

impl WithTableEmoji {
    /// Use the supplied emoji, or the default one
    pub fn from_string(emoji: Option<&str>) -> Result<Self> {
        let emoji = match emoji {
            Some(emoji) => TableEmoji::create(emoji)?,
            None => TableEmoji::default(),
        };
        Ok(Self(emoji))
    }

    pub fn emoji(&self) -> &TableEmoji {
        &self.0
    }
}

/// Add a field to an existing table
#[derive(Debug, Clone)]
pub struct WithNewField(Field);

impl WithNewField {
    pub fn new(field: Field) -> Self {
        Self(field)
    }

    pub fn from(input: &CreateFieldInput) -> Result<Self> {
        Ok(Self(Field::create(input)?))
    }

    pub fn field(&self) -> &Field {
        &self.0
    }
}

/// Remove a field from an existing table
#[derive(Debug, Clone)]
pub struct WithoutField(FieldId);

impl WithoutField {
    pub fn new(field_id: FieldId) -> Self {
        Self(field_id)
    }

    pub fn field_id(&self) -> &FieldId {
        &self.0
    }
}

/// Replace a field with a new version of the same id
#[derive(Debug, Clone)]
pub struct WithUpdatedField {
    previous: Field,
    next: Field,
}

impl WithUpdatedField {
    pub fn new(previous: Field, next: Field) -> Result<Self> {
        if previous.id() != next.id() {
            return Err(TableError::invalid_schema(format!(
                "cannot update field '{}' with field '{}'",
                previous.id(),
                next.id()
            )));
        }
        Ok(Self { previous, next })
    }

    pub fn previous(&self) -> &Field {
        &self.previous
    }

    pub fn next(&self) -> &Field {
        &self.next
    }
}

/// Set or clear the filter of a view
#[derive(Debug, Clone)]
pub struct WithViewFilter {
    view_id: ViewId,
    filter: Option<RootFilter>,
}

impl WithViewFilter {
    pub fn new(view_id: ViewId, filter: Option<RootFilter>) -> Self {
        Self { view_id, filter }
    }

    pub fn view_id(&self) -> &ViewId {
        &self.view_id
    }

    pub fn filter(&self) -> Option<&RootFilter> {
        self.filter.as_ref()
    }
}

// ============================================================================
// Composite
// ============================================================================

/// Composable table specification
#[derive(Debug, Clone)]
pub enum TableSpec {
    Name(WithTableName),
    Id(WithTableId),
    Schema(WithTableSchema),
    Views(WithTableViews),
    Forms(WithTableForms),
    Emoji(WithTableEmoji),
    NewField(WithNewField),
    WithoutField(WithoutField),
    UpdatedField(WithUpdatedField),
    ViewFilter(WithViewFilter),
    And(Box<TableSpec>, Box<TableSpec>),
}

impl TableSpec {
    /// Conjunction; `other` is visited after `self`
    pub fn and(self, other: impl Into<TableSpec>) -> TableSpec {
        TableSpec::And(Box::new(self), Box::new(other.into()))
    }

    /// Walk the tree depth-first, left to right, stopping at the first error
    pub fn accept<V: TableSpecVisitor + ?Sized>(&self, visitor: &mut V) -> Result<()> {
        match self {
            TableSpec::Name(spec) => visitor.with_table_name(spec),
            TableSpec::Id(spec) => visitor.with_table_id(spec),
            TableSpec::Schema(spec) => visitor.with_table_schema(spec),
            TableSpec::Views(spec) => visitor.with_table_views(spec),
            TableSpec::Forms(spec) => visitor.with_table_forms(spec),
            TableSpec::Emoji(spec) => visitor.with_table_emoji(spec),
            TableSpec::NewField(spec) => visitor.with_new_field(spec),
            TableSpec::WithoutField(spec) => visitor.without_field(spec),
            TableSpec::UpdatedField(spec) => visitor.with_updated_field(spec),
            TableSpec::ViewFilter(spec) => visitor.with_view_filter(spec),
            TableSpec::And(left, right) => {
                left.accept(visitor)?;
                right.accept(visitor)
            }
        }
    }
}

macro_rules! leaf_spec {
    ($($leaf:ident => $variant:ident),* $(,)?) => {
        $(
            impl From<$leaf> for TableSpec {
                fn from(spec: $leaf) -> Self {
                    TableSpec::$variant(spec)
                }
            }

            impl $leaf {
                pub fn and(self, other: impl Into<TableSpec>) -> TableSpec {
                    TableSpec::from(self).and(other)
                }
            }
        )*
    };
}

leaf_spec! {
    WithTableName => Name,
    WithTableId => Id,
    WithTableSchema => Schema,
    WithTableViews => Views,
    WithTableForms => Forms,
    WithTableEmoji => Emoji,
    WithNewField => NewField,
    WithoutField => WithoutField,
    WithUpdatedField => UpdatedField,
    WithViewFilter => ViewFilter,
}

/// One callback per leaf specification; unhandled leaves are ignored
pub trait TableSpecVisitor {
    fn with_table_name(&mut self, _spec: &WithTableName) -> Result<()> {
        Ok(())
    }

    fn with_table_id(&mut self, _spec: &WithTableId) -> Result<()> {
        Ok(())
    }

    fn with_table_schema(&mut self, _spec: &WithTableSchema) -> Result<()> {
        Ok(())
    }

    fn with_table_views(&mut self, _spec: &WithTableViews) -> Result<()> {
        Ok(())
    }

    fn with_table_forms(&mut self, _spec: &WithTableForms) -> Result<()> {
        Ok(())
    }

    fn with_table_emoji(&mut self, _spec: &WithTableEmoji) -> Result<()> {
        Ok(())
    }

    fn with_new_field(&mut self, _spec: &WithNewField) -> Result<()> {
        Ok(())
    }

    fn without_field(&mut self, _spec: &WithoutField) -> Result<()> {
        Ok(())
    }

    fn with_updated_field(&mut self, _spec: &WithUpdatedField) -> Result<()> {
        Ok(())
    }

    fn with_view_filter(&mut self, _spec: &WithViewFilter) -> Result<()> {
        Ok(())
    }
}

impl Specification<Table> for TableSpec {
    fn is_satisfied_by(&self, table: &Table) -> bool {
        match self {
            TableSpec::Name(spec) => table.name() == spec.name(),
            TableSpec::Id(spec) => table.id() == spec.id(),
            TableSpec::Schema(spec) => table.schema() == spec.schema(),
            TableSpec::Views(spec) => table
                .views()
                .iter()
                .map(|v| v.id())
                .eq(spec.views().iter().map(|v| v.id())),
            TableSpec::Forms(spec) => table
                .forms()
                .iter()
                .map(|f| f.id())
                .eq(spec.forms().iter().map(|f| f.id())),
            TableSpec::Emoji(spec) => table.emoji() == spec.emoji(),
            TableSpec::NewField(spec) => table.schema().contains(spec.field().id()),
            TableSpec::WithoutField(spec) => !table.schema().contains(spec.field_id()),
            TableSpec::UpdatedField(spec) => {
                table.schema().get_by_id(spec.next().id()).is_some_and(|f| {
                    f.name() == spec.next().name()
                        && f.kind() == spec.next().kind()
                        && f.constraints() == spec.next().constraints()
                })
            }
            TableSpec::ViewFilter(spec) => table
                .views()
                .get_by_id(spec.view_id().as_str())
                .is_some_and(|v| v.filter() == spec.filter()),
            TableSpec::And(left, right) => {
                left.is_satisfied_by(table) && right.is_satisfied_by(table)
            }
        }
    }
}

/// Compose the creation specification of a table.
///
/// Attributes are validated in order (name, id, schema, views, forms,
/// emoji) and the first invalid one is returned as the error.
pub fn new_table_spec(input: &CreateTableInput) -> Result<TableSpec> {
    let name = WithTableName::from_string(&input.name)?;
    let id = WithTableId::from_string(input.id.as_deref())?;
    let schema = WithTableSchema::from(&input.schema)?;
    let views = WithTableViews::from(&input.views, schema.schema())?;
    let forms = WithTableForms::from(&input.forms, schema.schema())?;
    let emoji = WithTableEmoji::from_string(input.emoji.as_deref())?;

    Ok(name.and(id).and(schema).and(views).and(forms).and(emoji))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::ViewInput;

    fn input() -> CreateTableInput {
        CreateTableInput::new("Contacts")
            .with_id("tblcontacts")
            .with_field(CreateFieldInput::new("Name", "string").with_id("fldname"))
    }

    /// Records the order leaves are visited in
    #[derive(Default)]
    struct Trace(Vec<&'static str>);

    impl TableSpecVisitor for Trace {
        fn with_table_name(&mut self, _: &WithTableName) -> Result<()> {
            self.0.push("name");
            Ok(())
        }
        fn with_table_id(&mut self, _: &WithTableId) -> Result<()> {
            self.0.push("id");
            Ok(())
        }
        fn with_table_schema(&mut self, _: &WithTableSchema) -> Result<()> {
            self.0.push("schema");
            Ok(())
        }
        fn with_table_views(&mut self, _: &WithTableViews) -> Result<()> {
            self.0.push("views");
            Ok(())
        }
        fn with_table_forms(&mut self, _: &WithTableForms) -> Result<()> {
            self.0.push("forms");
            Err(TableError::validation("stop"))
        }
        fn with_table_emoji(&mut self, _: &WithTableEmoji) -> Result<()> {
            self.0.push("emoji");
            Ok(())
        }
    }

    #[test]
    fn test_new_table_spec_visits_in_order_and_stops_on_error() {
        let spec = new_table_spec(&input()).unwrap();
        let mut trace = Trace::default();

        let result = spec.accept(&mut trace);

        assert!(result.is_err());
        assert_eq!(trace.0, vec!["name", "id", "schema", "views", "forms"]);
    }

    #[test]
    fn test_new_table_spec_generates_id() {
        let mut input = input();
        input.id = None;

        let table = Table::from_spec(&new_table_spec(&input).unwrap()).unwrap();
        assert!(table.id().as_str().starts_with("tbl"));
    }

    #[test]
    fn test_new_table_spec_first_failure_wins() {
        let mut input = input();
        input.name = String::new();
        input.schema.clear();

        // name is checked before schema
        let err = new_table_spec(&input).unwrap_err();
        assert!(matches!(err, TableError::InvalidTableName(_)));
    }

    #[test]
    fn test_new_table_spec_rejects_bad_view() {
        let input = input().with_view(ViewInput::kanban("Board", Some("fldname")));
        let err = new_table_spec(&input).unwrap_err();
        assert!(matches!(err, TableError::InvalidView(_)));
    }

    #[test]
    fn test_new_table_spec_rejects_unsupported_type() {
        let input = input().with_field(CreateFieldInput::new("Score", "rating"));
        let err = new_table_spec(&input).unwrap_err();
        assert!(matches!(err, TableError::UnsupportedFieldType(_)));
    }

    #[test]
    fn test_table_satisfies_its_creation_spec() {
        let spec = new_table_spec(&input()).unwrap();
        let table = Table::from_spec(&spec).unwrap();

        assert!(spec.is_satisfied_by(&table));
        assert!(!WithTableName::from_string("Other").unwrap().and(spec).is_satisfied_by(&table));
    }

    #[test]
    fn test_updated_field_requires_same_id() {
        let a = Field::create(&CreateFieldInput::new("A", "string").with_id("flda")).unwrap();
        let b = Field::create(&CreateFieldInput::new("B", "string").with_id("fldb")).unwrap();

        assert!(WithUpdatedField::new(a, b).is_err());
    }
}
