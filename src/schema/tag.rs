//! Field tag grammar: `name,option,option...`
//!
//! The first element is the declared name (empty keeps the default). Options are
//! `primaryKey`, `index`, `unique`, `index:<group>` and `unique:<group>`; fields sharing a
//! group name form one composite index or uniqueness group. A name of `-` hides the field.

use crate::error::SchemaError;

pub const OPTION_PRIMARY_KEY: &str = "primaryKey";
pub const OPTION_INDEX: &str = "index";
pub const OPTION_UNIQUE: &str = "unique";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TagOption {
    PrimaryKey,
    Index(Option<String>),
    Unique(Option<String>),
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FieldTag {
    pub name: Option<String>,
    pub options: Vec<TagOption>,
}

impl FieldTag {
    pub fn is_hidden(&self) -> bool {
        self.name.as_deref() == Some("-")
    }
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')
}

pub fn parse_tag(field: &str, raw: &str) -> Result<FieldTag, SchemaError> {
    let invalid = |reason: &str| SchemaError::InvalidTag {
        field: field.to_string(),
        tag: raw.to_string(),
        reason: reason.to_string(),
    };

    let mut parts = raw.split(',');
    let name = parts.next().unwrap_or_default().trim();
    if !name.chars().all(is_name_char) {
        return Err(invalid("name may only contain letters, digits, '_', '-' and '.'"));
    }

    let mut tag = FieldTag {
        name: (!name.is_empty()).then(|| name.to_string()),
        options: Vec::new(),
    };
    for part in parts {
        let option = part.trim();
        if option.is_empty() {
            return Err(invalid("empty option"));
        }
        let (key, group) = match option.split_once(':') {
            Some((key, group)) => {
                if group.is_empty() || !group.chars().all(is_name_char) {
                    return Err(invalid("bad group name"));
                }
                (key, Some(group.to_string()))
            }
            None => (option, None),
        };
        let parsed = match (key, group) {
            (OPTION_PRIMARY_KEY, None) => TagOption::PrimaryKey,
            (OPTION_INDEX, group) => TagOption::Index(group),
            (OPTION_UNIQUE, group) => TagOption::Unique(group),
            _ => {
                return Err(SchemaError::UnknownOption {
                    field: field.to_string(),
                    option: option.to_string(),
                })
            }
        };
        if !tag.options.contains(&parsed) {
            tag.options.push(parsed);
        }
    }
    Ok(tag)
}
