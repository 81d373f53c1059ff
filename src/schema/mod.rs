//! Schema derivation: model field declarations to resource names, properties and indexes.

pub mod field;
pub mod model;
pub mod props;
pub mod registry;
pub mod tag;

pub use field::{FieldDecl, FieldSchema, FieldType, SchemaBuilder};
pub use model::{build_schema, derive, FieldMapping, Model, ModelSchema};
pub use props::JsonSchemaProps;
pub use registry::SchemaRegistry;
pub use tag::{parse_tag, FieldTag, TagOption};
