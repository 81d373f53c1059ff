//! The [`Model`] trait and the schema derived from it: declared names, OpenAPI properties,
//! primary key, index groups and uniqueness groups.

use crate::error::SchemaError;
use crate::naming::KindNames;
use crate::schema::field::{FieldDecl, FieldSchema, FieldType, SchemaBuilder};
use crate::schema::props::JsonSchemaProps;
use crate::schema::tag::{parse_tag, TagOption};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// A struct stored as one custom resource kind.
///
/// ```ignore
/// impl Model for Count {
///     const NAME: &'static str = "Count";
///     fn describe(schema: &mut SchemaBuilder) {
///         schema.field("name", FieldSchema::string()).tag("name,primaryKey");
///         schema.field("count_type", FieldSchema::integer()).tag("type,index");
///         schema.field("counter", FieldSchema::integer()).tag("count");
///     }
/// }
/// ```
pub trait Model: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Type name, e.g. "Count". Kind names are derived from it.
    const NAME: &'static str;

    /// Override for the kind name; defaults to [`Model::NAME`].
    fn kind_name() -> &'static str {
        Self::NAME
    }

    /// Declare the serialized fields, in serialization order.
    fn describe(schema: &mut SchemaBuilder);
}

/// Serialized key to declared document key, recursively for nested objects and array elements.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldMapping {
    pub rust_name: String,
    pub name: String,
    pub nested: Vec<FieldMapping>,
    /// Tagged `-`: never written to a document.
    pub hidden: bool,
}

impl FieldMapping {
    fn hidden(rust_name: &str) -> Self {
        FieldMapping { rust_name: rust_name.to_string(), name: rust_name.to_string(), nested: Vec::new(), hidden: true }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ModelSchema {
    /// Identity of the model type the schema was derived from.
    pub id: String,
    pub names: KindNames,
    /// Properties of the document's data section, keyed by declared name.
    pub spec: BTreeMap<String, JsonSchemaProps>,
    pub fields: Vec<FieldMapping>,
    /// Declared name of the primary key field.
    pub primary_key: Option<String>,
    pub indexes: Vec<Vec<String>>,
    pub uniques: Vec<Vec<String>>,
}

impl ModelSchema {
    pub fn empty(id: impl Into<String>) -> Self {
        ModelSchema { id: id.into(), ..Default::default() }
    }

    /// True when the schema cannot back a resource kind.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty() || self.spec.is_empty()
    }

    pub fn kind(&self) -> &str {
        &self.names.kind
    }

    pub fn plural(&self) -> &str {
        &self.names.plural
    }

    pub fn field(&self, name: &str) -> Option<&FieldMapping> {
        self.fields.iter().find(|f| !f.hidden && f.name == name)
    }

    /// Declared names that belong to any index group.
    pub fn indexed_fields(&self) -> BTreeSet<&str> {
        self.indexes.iter().flatten().map(String::as_str).collect()
    }

    pub fn is_indexed(&self, name: &str) -> bool {
        self.indexes.iter().flatten().any(|f| f == name)
    }
}

/// Derive the schema of `M`.
pub fn derive<M: Model>() -> Result<ModelSchema, SchemaError> {
    let mut builder = SchemaBuilder::default();
    M::describe(&mut builder);
    build_schema(std::any::type_name::<M>(), M::kind_name(), &builder)
}

struct Declared {
    name: String,
    options: Vec<TagOption>,
    props: JsonSchemaProps,
    mapping: FieldMapping,
}

fn declare(decl: &FieldDecl) -> Result<Option<Declared>, SchemaError> {
    let tag = decl
        .tag
        .as_deref()
        .map(|raw| parse_tag(&decl.rust_name, raw))
        .transpose()?
        .unwrap_or_default();
    if tag.is_hidden() {
        return Ok(None);
    }
    let name = tag.name.unwrap_or_else(|| decl.rust_name.to_lowercase());
    let (props, nested) = describe_field(&decl.schema)?;
    Ok(Some(Declared {
        mapping: FieldMapping { rust_name: decl.rust_name.clone(), name: name.clone(), nested, hidden: false },
        name,
        options: tag.options,
        props,
    }))
}

fn describe_field(schema: &FieldSchema) -> Result<(JsonSchemaProps, Vec<FieldMapping>), SchemaError> {
    let mut props = JsonSchemaProps::typed(schema.field_type.as_str());
    props.format = schema.format.clone();
    props.description = schema.description.clone();
    if schema.open {
        props.preserve_unknown_fields = Some(true);
    }

    let mut nested = Vec::new();
    for field in &schema.fields {
        let Some(inner) = declare(field)? else {
            nested.push(FieldMapping::hidden(&field.rust_name));
            continue;
        };
        if props.properties.contains_key(&inner.name) {
            return Err(SchemaError::DuplicateField(inner.name));
        }
        props.properties.insert(inner.name, inner.props);
        nested.push(inner.mapping);
    }
    if let Some(items) = &schema.items {
        let (item_props, item_nested) = describe_field(items)?;
        props.items = Some(Box::new(item_props));
        nested = item_nested;
    }
    Ok((props, nested))
}

/// Drop repeated members and repeated groups; two groups are the same when they hold the
/// same members in any order.
fn dedup_groups(groups: Vec<Vec<String>>) -> Vec<Vec<String>> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for group in groups {
        let mut members: Vec<String> = Vec::with_capacity(group.len());
        for member in group {
            if !members.contains(&member) {
                members.push(member);
            }
        }
        let mut key = members.clone();
        key.sort();
        if seen.insert(key) {
            out.push(members);
        }
    }
    out
}

pub fn build_schema(id: &str, kind_name: &str, builder: &SchemaBuilder) -> Result<ModelSchema, SchemaError> {
    if kind_name.trim().is_empty() {
        return Err(SchemaError::EmptyName { model: id.to_string() });
    }
    if builder.fields.is_empty() {
        return Err(SchemaError::NoFields { model: id.to_string() });
    }

    let mut schema = ModelSchema {
        id: id.to_string(),
        names: KindNames::from_name(kind_name),
        ..Default::default()
    };
    let mut indexes = Vec::new();
    let mut uniques = Vec::new();
    let mut index_groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut unique_groups: BTreeMap<String, Vec<String>> = BTreeMap::new();

    for decl in &builder.fields {
        let Some(declared) = declare(decl)? else {
            schema.fields.push(FieldMapping::hidden(&decl.rust_name));
            continue;
        };
        let name = declared.name;
        if schema.spec.contains_key(&name) {
            return Err(SchemaError::DuplicateField(name));
        }
        for option in declared.options {
            match option {
                TagOption::PrimaryKey => {
                    if let Some(first) = &schema.primary_key {
                        return Err(SchemaError::DuplicatePrimaryKey { first: first.clone(), second: name });
                    }
                    if decl.schema.field_type != FieldType::String {
                        return Err(SchemaError::PrimaryKeyNotString {
                            field: name,
                            found: decl.schema.field_type.as_str().to_string(),
                        });
                    }
                    schema.primary_key = Some(name.clone());
                    indexes.push(vec![name.clone()]);
                }
                TagOption::Index(None) => indexes.push(vec![name.clone()]),
                TagOption::Index(Some(group)) => index_groups.entry(group).or_default().push(name.clone()),
                TagOption::Unique(None) => {
                    uniques.push(vec![name.clone()]);
                    indexes.push(vec![name.clone()]);
                }
                TagOption::Unique(Some(group)) => unique_groups.entry(group).or_default().push(name.clone()),
            }
        }
        schema.spec.insert(name, declared.props);
        schema.fields.push(declared.mapping);
    }

    indexes.extend(index_groups.into_values());
    for group in unique_groups.into_values() {
        indexes.push(group.clone());
        uniques.push(group);
    }
    if schema.spec.is_empty() {
        return Err(SchemaError::NoFields { model: id.to_string() });
    }
    schema.indexes = dedup_groups(indexes);
    schema.uniques = dedup_groups(uniques);
    Ok(schema)
}
