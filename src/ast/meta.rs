//! Table and column metadata supplied by the entity-mapping layer.
//!
//! Metadata is computed once and shared by reference (`Arc`) between builders,
//! the renderer and the splitter. Nothing here discovers metadata; callers
//! describe their tables with [`TableMeta::builder`].

use std::fmt;
use std::sync::Arc;

use crate::ast::{SqlType, Value};
use crate::error::{BuildError, RenderError};

/// Per-column codec between host values and their SQL representation.
pub trait MappingType: fmt::Debug + Send + Sync {
    /// Normalized SQL type that literal and parameter rendering dispatches on.
    fn sql_type(&self) -> SqlType;

    /// Convert a host value before it is inlined or bound.
    fn before_bind(&self, value: Value) -> Result<Value, RenderError> {
        Ok(value)
    }

    /// Convert a value read back from the database.
    fn after_get(&self, value: Value) -> Result<Value, RenderError> {
        Ok(value)
    }
}

impl MappingType for SqlType {
    fn sql_type(&self) -> SqlType {
        *self
    }
}

/// One physical column.
#[derive(Debug, Clone)]
pub struct FieldMeta {
    /// Owning physical table.
    pub table: String,
    pub name: String,
    pub mapping: Arc<dyn MappingType>,
    /// Value assigned by the server on insert.
    pub generated: bool,
}

impl FieldMeta {
    pub fn new(table: impl Into<String>, name: impl Into<String>, mapping: Arc<dyn MappingType>) -> Self {
        Self {
            table: table.into(),
            name: name.into(),
            mapping,
            generated: false,
        }
    }

    pub fn sql_type(&self) -> SqlType {
        self.mapping.sql_type()
    }

    pub fn is(&self, other: &FieldMeta) -> bool {
        self.table == other.table && self.name == other.name
    }
}

/// Column on a parent table whose value names the child subtype of a row.
#[derive(Debug, Clone)]
pub struct Discriminator {
    pub column: String,
    /// Legal values; empty means unrestricted.
    pub values: Vec<Value>,
}

/// Link from a child table to the parent table it extends.
#[derive(Debug, Clone)]
pub struct ParentLink {
    pub table: Arc<TableMeta>,
    /// Discriminator value identifying rows of this child.
    pub discriminator: Value,
}

/// Physical table description.
#[derive(Debug, Clone)]
pub struct TableMeta {
    name: String,
    fields: Vec<Arc<FieldMeta>>,
    primary_key: usize,
    parent: Option<ParentLink>,
    discriminator: Option<Discriminator>,
    visible: Option<String>,
    version: Option<String>,
}

impl TableMeta {
    pub fn builder(name: impl Into<String>) -> TableMetaBuilder {
        TableMetaBuilder {
            name: name.into(),
            fields: Vec::new(),
            primary_key: None,
            parent: None,
            discriminator: None,
            visible: None,
            version: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Columns stored in this physical table, in declaration order.
    pub fn fields(&self) -> &[Arc<FieldMeta>] {
        &self.fields
    }

    /// Column stored in this physical table.
    pub fn field(&self, name: &str) -> Option<&Arc<FieldMeta>> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Column of the logical entity: own columns first, then inherited ones.
    pub fn resolve_field(&self, name: &str) -> Option<Arc<FieldMeta>> {
        if let Some(f) = self.field(name) {
            return Some(Arc::clone(f));
        }
        self.parent
            .as_ref()
            .and_then(|link| link.table.resolve_field(name))
    }

    /// All columns of the logical entity; the shared key appears once.
    pub fn entity_fields(&self) -> Vec<Arc<FieldMeta>> {
        let mut out: Vec<Arc<FieldMeta>> = self.fields.clone();
        if let Some(link) = &self.parent {
            for f in link.table.entity_fields() {
                if !out.iter().any(|own| own.name == f.name) {
                    out.push(f);
                }
            }
        }
        out
    }

    pub fn primary_key(&self) -> &Arc<FieldMeta> {
        &self.fields[self.primary_key]
    }

    pub fn parent(&self) -> Option<&ParentLink> {
        self.parent.as_ref()
    }

    pub fn discriminator(&self) -> Option<&Discriminator> {
        self.discriminator.as_ref()
    }

    pub fn visible_column(&self) -> Option<Arc<FieldMeta>> {
        self.visible.as_deref().and_then(|c| self.resolve_field(c))
    }

    pub fn version_column(&self) -> Option<Arc<FieldMeta>> {
        self.version.as_deref().and_then(|c| self.resolve_field(c))
    }

    pub fn is_inherited(&self) -> bool {
        self.parent.is_some()
    }

    /// The entity key is assigned by the server, here or on the parent.
    pub fn key_generated(&self) -> bool {
        self.primary_key().generated
            || self.parent.as_ref().is_some_and(|link| link.table.key_generated())
    }

    /// Columns an INSERT fills when no column list is given.
    ///
    /// The parent's discriminator is left out; it is written from the
    /// parent link.
    pub fn insert_fields(&self) -> Vec<Arc<FieldMeta>> {
        let key_generated = self.key_generated();
        let discriminator = self
            .parent
            .as_ref()
            .and_then(|link| link.table.discriminator())
            .map(|d| d.column.as_str());
        self.entity_fields()
            .into_iter()
            .filter(|f| !f.generated && !(key_generated && f.name == self.primary_key().name))
            .filter(|f| Some(f.name.as_str()) != discriminator)
            .collect()
    }

    /// Discriminator column of the parent and the value naming this child.
    pub fn discriminator_link(&self) -> Option<(Arc<FieldMeta>, &Value)> {
        let link = self.parent.as_ref()?;
        let disc = link.table.discriminator()?;
        let field = link.table.field(&disc.column)?;
        Some((Arc::clone(field), &link.discriminator))
    }
}

/// Builder for [`TableMeta`].
///
/// ```
/// use qail_criteria::ast::{SqlType, TableMeta};
///
/// let animal = TableMeta::builder("animal")
///     .generated_key("id", SqlType::BigInt)
///     .field("name", SqlType::Varchar(64))
///     .discriminator("kind", SqlType::Varchar(16), ["dog", "cat"])
///     .build()
///     .unwrap();
/// let dog = TableMeta::builder("dog")
///     .primary_key("id", SqlType::BigInt)
///     .field("breed", SqlType::Varchar(64))
///     .extends(&animal, "dog")
///     .build()
///     .unwrap();
/// assert_eq!(dog.resolve_field("name").unwrap().table, "animal");
/// ```
#[derive(Debug)]
pub struct TableMetaBuilder {
    name: String,
    fields: Vec<Arc<FieldMeta>>,
    primary_key: Option<usize>,
    parent: Option<ParentLink>,
    discriminator: Option<Discriminator>,
    visible: Option<String>,
    version: Option<String>,
}

impl TableMetaBuilder {
    fn push(mut self, name: &str, mapping: Arc<dyn MappingType>, generated: bool) -> Self {
        let mut field = FieldMeta::new(self.name.clone(), name, mapping);
        field.generated = generated;
        self.fields.push(Arc::new(field));
        self
    }

    pub fn field(self, name: &str, mapping: impl MappingType + 'static) -> Self {
        self.push(name, Arc::new(mapping), false)
    }

    /// Column with a shared codec instance.
    pub fn field_with(self, name: &str, mapping: Arc<dyn MappingType>) -> Self {
        self.push(name, mapping, false)
    }

    pub fn primary_key(self, name: &str, mapping: impl MappingType + 'static) -> Self {
        let idx = self.fields.len();
        let mut this = self.push(name, Arc::new(mapping), false);
        this.primary_key = Some(idx);
        this
    }

    /// Server-generated primary key.
    pub fn generated_key(self, name: &str, mapping: impl MappingType + 'static) -> Self {
        let idx = self.fields.len();
        let mut this = self.push(name, Arc::new(mapping), true);
        this.primary_key = Some(idx);
        this
    }

    pub fn discriminator<I, V>(self, column: &str, mapping: impl MappingType + 'static, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let mut this = self.push(column, Arc::new(mapping), false);
        this.discriminator = Some(Discriminator {
            column: column.to_string(),
            values: values.into_iter().map(Into::into).collect(),
        });
        this
    }

    pub fn extends(mut self, parent: &Arc<TableMeta>, discriminator: impl Into<Value>) -> Self {
        self.parent = Some(ParentLink {
            table: Arc::clone(parent),
            discriminator: discriminator.into(),
        });
        self
    }

    /// Boolean column filtering soft-deleted rows out of UPDATE/DELETE.
    pub fn visible(mut self, column: &str) -> Self {
        self.visible = Some(column.to_string());
        self
    }

    /// Optimistic-lock version column.
    pub fn version(mut self, column: &str) -> Self {
        self.version = Some(column.to_string());
        self
    }

    pub fn build(self) -> Result<Arc<TableMeta>, BuildError> {
        let invalid = |msg: String| BuildError::InvalidMeta(msg);
        if self.name.is_empty() {
            return Err(invalid("table name is empty".to_string()));
        }
        for (i, f) in self.fields.iter().enumerate() {
            if self.fields[..i].iter().any(|g| g.name == f.name) {
                return Err(invalid(format!("'{}' declares '{}' twice", self.name, f.name)));
            }
        }
        let primary_key = self
            .primary_key
            .ok_or_else(|| invalid(format!("'{}' has no primary key", self.name)))?;

        if let Some(link) = &self.parent {
            let parent = &link.table;
            if parent.parent.is_some() {
                return Err(invalid(format!(
                    "'{}' extends '{}', which is itself a child table",
                    self.name, parent.name
                )));
            }
            let disc = parent.discriminator.as_ref().ok_or_else(|| {
                invalid(format!("parent '{}' has no discriminator", parent.name))
            })?;
            if !disc.values.is_empty() && !disc.values.contains(&link.discriminator) {
                return Err(invalid(format!(
                    "{} is not a legal discriminator value of '{}'",
                    link.discriminator, parent.name
                )));
            }
            let key = &self.fields[primary_key];
            if key.name != parent.primary_key().name {
                return Err(invalid(format!(
                    "'{}' must share primary key '{}' with '{}'",
                    self.name,
                    parent.primary_key().name,
                    parent.name
                )));
            }
            if key.generated {
                return Err(invalid(format!(
                    "child key '{}.{}' cannot be server-generated",
                    self.name, key.name
                )));
            }
            for f in &self.fields {
                if f.name != key.name && parent.resolve_field(&f.name).is_some() {
                    return Err(invalid(format!(
                        "'{}.{}' shadows a column of '{}'",
                        self.name, f.name, parent.name
                    )));
                }
            }
        }

        let meta = TableMeta {
            name: self.name,
            fields: self.fields,
            primary_key,
            parent: self.parent,
            discriminator: self.discriminator,
            visible: self.visible,
            version: self.version,
        };
        for (kind, column) in [("visible", &meta.visible), ("version", &meta.version)] {
            if let Some(c) = column
                && meta.resolve_field(c).is_none()
            {
                return Err(invalid(format!("{} column '{}' is not declared", kind, c)));
            }
        }
        Ok(Arc::new(meta))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn animal() -> Arc<TableMeta> {
        TableMeta::builder("animal")
            .generated_key("id", SqlType::BigInt)
            .field("name", SqlType::Varchar(64))
            .discriminator("kind", SqlType::Varchar(16), ["dog"])
            .build()
            .unwrap()
    }

    #[test]
    fn test_missing_primary_key() {
        let err = TableMeta::builder("t")
            .field("a", SqlType::Integer)
            .build()
            .unwrap_err();
        assert!(matches!(err, BuildError::InvalidMeta(_)));
    }

    #[test]
    fn test_illegal_discriminator_value() {
        let err = TableMeta::builder("cat")
            .primary_key("id", SqlType::BigInt)
            .extends(&animal(), "cat")
            .build()
            .unwrap_err();
        assert!(matches!(err, BuildError::InvalidMeta(_)));
    }

    #[test]
    fn test_entity_fields_share_key_once() {
        let dog = TableMeta::builder("dog")
            .primary_key("id", SqlType::BigInt)
            .field("breed", SqlType::Text)
            .extends(&animal(), "dog")
            .build()
            .unwrap();
        let names: Vec<_> = dog.entity_fields().iter().map(|f| f.name.clone()).collect();
        assert_eq!(names, ["id", "breed", "name", "kind"]);
        assert_eq!(dog.primary_key().table, "dog");
        let insertable: Vec<_> = dog.insert_fields().iter().map(|f| f.name.clone()).collect();
        assert_eq!(insertable, ["breed", "name"]);
    }

    #[test]
    fn test_shadowed_parent_column() {
        let err = TableMeta::builder("dog")
            .primary_key("id", SqlType::BigInt)
            .field("name", SqlType::Text)
            .extends(&animal(), "dog")
            .build()
            .unwrap_err();
        assert!(matches!(err, BuildError::InvalidMeta(_)));
    }
}
