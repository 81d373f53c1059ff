//! Field declarations a model hands to [`SchemaBuilder`] in [`crate::Model::describe`].

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldType {
    String,
    Integer,
    Number,
    Boolean,
    Object,
    Array,
}

impl FieldType {
    pub fn as_str(self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Integer => "integer",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Object => "object",
            FieldType::Array => "array",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FieldSchema {
    pub field_type: FieldType,
    pub format: Option<String>,
    pub description: Option<String>,
    /// Declared sub-fields of an object.
    pub fields: Vec<FieldDecl>,
    pub items: Option<Box<FieldSchema>>,
    /// Objects without declared sub-fields keep whatever keys they carry.
    pub open: bool,
}

impl FieldSchema {
    fn of(field_type: FieldType) -> Self {
        FieldSchema { field_type, format: None, description: None, fields: Vec::new(), items: None, open: false }
    }

    pub fn string() -> Self {
        Self::of(FieldType::String)
    }

    pub fn integer() -> Self {
        Self::of(FieldType::Integer)
    }

    pub fn number() -> Self {
        Self::of(FieldType::Number)
    }

    pub fn boolean() -> Self {
        Self::of(FieldType::Boolean)
    }

    pub fn date_time() -> Self {
        Self::string().format("date-time")
    }

    /// A nested struct; `build` declares its fields.
    pub fn object(build: impl FnOnce(&mut SchemaBuilder)) -> Self {
        let mut builder = SchemaBuilder::default();
        build(&mut builder);
        FieldSchema { fields: builder.fields, ..Self::of(FieldType::Object) }
    }

    /// A free-form map.
    pub fn map() -> Self {
        FieldSchema { open: true, ..Self::of(FieldType::Object) }
    }

    pub fn array(items: FieldSchema) -> Self {
        FieldSchema { items: Some(Box::new(items)), ..Self::of(FieldType::Array) }
    }

    pub fn format(mut self, format: &str) -> Self {
        self.format = Some(format.to_string());
        self
    }

    pub fn description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FieldDecl {
    /// Key the field serializes under (the serde field name).
    pub rust_name: String,
    pub tag: Option<String>,
    pub schema: FieldSchema,
}

impl FieldDecl {
    /// Attach a `name,option,...` tag.
    pub fn tag(&mut self, tag: &str) -> &mut Self {
        self.tag = Some(tag.to_string());
        self
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SchemaBuilder {
    pub(crate) fields: Vec<FieldDecl>,
}

impl SchemaBuilder {
    pub fn field(&mut self, rust_name: &str, schema: FieldSchema) -> &mut FieldDecl {
        self.fields.push(FieldDecl { rust_name: rust_name.to_string(), tag: None, schema });
        let last = self.fields.len() - 1;
        &mut self.fields[last]
    }

    pub fn fields(&self) -> &[FieldDecl] {
        &self.fields
    }
}
