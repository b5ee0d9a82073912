//! API schema documents
//!
//! A snapshot is reduced to the two parts the diff engine looks at: the path
//! table (path → method → tags) and `components.schemas`. Schema nodes are
//! modelled as an explicit tagged union so every comparison is exhaustive.
//!
//! Upstream documents are not fully trusted. Nodes that cannot be classified
//! become [`Shape::Unknown`] instead of failing the whole parse.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde_json::{Map, Value};

use crate::error::{BaselineError, Result};

/// HTTP methods recognised on a path item
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HttpMethod {
    Delete,
    Get,
    Head,
    Options,
    Patch,
    Post,
    Put,
}

impl HttpMethod {
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "get" => Some(HttpMethod::Get),
            "post" => Some(HttpMethod::Post),
            "put" => Some(HttpMethod::Put),
            "delete" => Some(HttpMethod::Delete),
            "patch" => Some(HttpMethod::Patch),
            "head" => Some(HttpMethod::Head),
            "options" => Some(HttpMethod::Options),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One operation on a path
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Operation {
    pub tags: Vec<String>,
    pub summary: Option<String>,
}

/// All operations defined on one path
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PathItem {
    pub operations: BTreeMap<HttpMethod, Operation>,
}

impl PathItem {
    pub fn methods(&self) -> Vec<HttpMethod> {
        self.operations.keys().copied().collect()
    }

    /// Union of the tags of every operation, sorted and deduplicated
    pub fn tags(&self) -> Vec<String> {
        let tags: BTreeSet<&String> = self.operations.values().flat_map(|op| &op.tags).collect();
        tags.into_iter().cloned().collect()
    }
}

/// Composition keyword of a composed schema
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompositeKind {
    OneOf,
    AnyOf,
    AllOf,
}

impl CompositeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompositeKind::OneOf => "oneOf",
            CompositeKind::AnyOf => "anyOf",
            CompositeKind::AllOf => "allOf",
        }
    }
}

/// Structural shape of a schema node
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Object,
    Array {
        items: Option<Box<SchemaNode>>,
    },
    Primitive {
        kind: String,
    },
    Reference {
        name: String,
    },
    Composite {
        kind: CompositeKind,
        members: Vec<SchemaNode>,
    },
    Unknown,
}

/// A schema or property descriptor.
///
/// `properties` and `required` are read from every schema mapping whatever
/// its shape: composed, referencing and nullable objects carry fields too.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaNode {
    pub shape: Shape,
    pub properties: BTreeMap<String, SchemaNode>,
    pub required: BTreeSet<String>,
    pub description: Option<String>,
    pub deprecated: bool,
    pub enum_values: Vec<String>,
}

impl SchemaNode {
    pub fn new(shape: Shape) -> Self {
        Self {
            shape,
            properties: BTreeMap::new(),
            required: BTreeSet::new(),
            description: None,
            deprecated: false,
            enum_values: Vec::new(),
        }
    }

    /// Single-level token used for type equality: a primitive name,
    /// `ref:<Name>`, the composition keyword, or `unknown`
    pub fn type_token(&self) -> String {
        match &self.shape {
            Shape::Object => "object".to_string(),
            Shape::Array { .. } => "array".to_string(),
            Shape::Primitive { kind } => kind.clone(),
            Shape::Reference { name } => format!("ref:{name}"),
            Shape::Composite { kind, .. } => kind.as_str().to_string(),
            Shape::Unknown => "unknown".to_string(),
        }
    }

    pub fn properties(&self) -> &BTreeMap<String, SchemaNode> {
        &self.properties
    }

    pub fn is_required(&self, property: &str) -> bool {
        self.required.contains(property)
    }

    /// Build a node from an arbitrary JSON value
    pub fn from_value(value: &Value) -> Self {
        let Some(map) = value.as_object() else {
            return SchemaNode::new(Shape::Unknown);
        };

        SchemaNode {
            shape: classify_shape(map),
            properties: properties(map),
            required: required(map),
            description: map
                .get("description")
                .and_then(Value::as_str)
                .map(str::to_string),
            deprecated: map.get("deprecated").and_then(Value::as_bool).unwrap_or(false),
            enum_values: enum_values(map),
        }
    }
}

fn classify_shape(map: &Map<String, Value>) -> Shape {
    match map.get("type") {
        Some(Value::String(kind)) => match kind.as_str() {
            "object" => Shape::Object,
            "array" => Shape::Array {
                items: map
                    .get("items")
                    .map(|items| Box::new(SchemaNode::from_value(items))),
            },
            other => Shape::Primitive {
                kind: other.to_string(),
            },
        },
        // OpenAPI 3.1 style `type: [string, "null"]`
        Some(Value::Array(kinds)) => {
            let mut kinds: Vec<&str> = kinds.iter().filter_map(Value::as_str).collect();
            if kinds.is_empty() {
                return Shape::Unknown;
            }
            kinds.sort_unstable();
            Shape::Primitive {
                kind: kinds.join("|"),
            }
        }
        _ => untyped_shape(map),
    }
}

fn untyped_shape(map: &Map<String, Value>) -> Shape {
    if let Some(reference) = map.get("$ref").and_then(Value::as_str) {
        let name = reference.rsplit('/').next().unwrap_or(reference);
        return Shape::Reference {
            name: name.to_string(),
        };
    }

    for kind in [CompositeKind::OneOf, CompositeKind::AnyOf, CompositeKind::AllOf] {
        if let Some(members) = map.get(kind.as_str()) {
            let members = members
                .as_array()
                .map(|items| items.iter().map(SchemaNode::from_value).collect())
                .unwrap_or_default();
            return Shape::Composite { kind, members };
        }
    }

    // Inline objects frequently omit `type: object`
    if map.contains_key("properties") {
        return Shape::Object;
    }

    Shape::Unknown
}

fn properties(map: &Map<String, Value>) -> BTreeMap<String, SchemaNode> {
    map.get("properties")
        .and_then(Value::as_object)
        .map(|props| {
            props
                .iter()
                .map(|(name, prop)| (name.clone(), SchemaNode::from_value(prop)))
                .collect()
        })
        .unwrap_or_default()
}

/// `required` entries without a matching property are kept as-is
fn required(map: &Map<String, Value>) -> BTreeSet<String> {
    map.get("required")
        .and_then(Value::as_array)
        .map(|names| {
            names
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn enum_values(map: &Map<String, Value>) -> Vec<String> {
    map.get("enum")
        .and_then(Value::as_array)
        .map(|values| {
            values
                .iter()
                .map(|value| match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect()
        })
        .unwrap_or_default()
}

/// A parsed API schema snapshot
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaDocument {
    /// `info.version`, when present
    pub version: Option<String>,
    pub paths: BTreeMap<String, PathItem>,
    pub schemas: BTreeMap<String, SchemaNode>,
}

impl SchemaDocument {
    /// Parse raw snapshot bytes. JSON is detected by a leading `{`, anything
    /// else is read as YAML.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let first = bytes.iter().find(|b| !b.is_ascii_whitespace());
        let value = match first {
            Some(b'{') => serde_json::from_slice::<Value>(bytes)?,
            Some(_) => yaml_to_json(serde_yaml::from_slice::<serde_yaml::Value>(bytes)?),
            None => return Err(BaselineError::InvalidDocument("empty document".to_string())),
        };
        Self::from_value(&value)
    }

    pub fn from_value(value: &Value) -> Result<Self> {
        let root = value.as_object().ok_or_else(|| {
            BaselineError::InvalidDocument("document root is not a mapping".to_string())
        })?;

        let version = root
            .get("info")
            .and_then(|info| info.get("version"))
            .and_then(Value::as_str)
            .map(str::to_string);

        let paths = root
            .get("paths")
            .and_then(Value::as_object)
            .map(|paths| {
                paths
                    .iter()
                    .map(|(path, item)| (path.clone(), parse_path_item(item)))
                    .collect()
            })
            .unwrap_or_default();

        let schemas = root
            .get("components")
            .and_then(|components| components.get("schemas"))
            .and_then(Value::as_object)
            .map(|schemas| {
                schemas
                    .iter()
                    .map(|(name, schema)| (name.clone(), SchemaNode::from_value(schema)))
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            version,
            paths,
            schemas,
        })
    }

    pub fn path_count(&self) -> usize {
        self.paths.len()
    }

    pub fn schema_count(&self) -> usize {
        self.schemas.len()
    }
}

fn parse_path_item(item: &Value) -> PathItem {
    let operations = item
        .as_object()
        .map(|methods| {
            methods
                .iter()
                .filter_map(|(key, op)| {
                    let method = HttpMethod::from_key(key)?;
                    let tags = op
                        .get("tags")
                        .and_then(Value::as_array)
                        .map(|tags| {
                            tags.iter()
                                .filter_map(Value::as_str)
                                .map(str::to_string)
                                .collect()
                        })
                        .unwrap_or_default();
                    let summary = op.get("summary").and_then(Value::as_str).map(str::to_string);
                    Some((method, Operation { tags, summary }))
                })
                .collect()
        })
        .unwrap_or_default();

    PathItem { operations }
}

/// Convert YAML into JSON, stringifying non-string mapping keys
/// (response codes are often bare integers)
fn yaml_to_json(value: serde_yaml::Value) -> Value {
    use serde_yaml::Value as Yaml;

    match value {
        Yaml::Null => Value::Null,
        Yaml::Bool(b) => Value::Bool(b),
        Yaml::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::from(i)
            } else if let Some(u) = n.as_u64() {
                Value::from(u)
            } else {
                n.as_f64()
                    .and_then(serde_json::Number::from_f64)
                    .map(Value::Number)
                    .unwrap_or(Value::Null)
            }
        }
        Yaml::String(s) => Value::String(s),
        Yaml::Sequence(items) => Value::Array(items.into_iter().map(yaml_to_json).collect()),
        Yaml::Mapping(mapping) => {
            let mut object = Map::new();
            for (key, value) in mapping {
                let key = match key {
                    Yaml::String(s) => s,
                    Yaml::Number(n) => n.to_string(),
                    Yaml::Bool(b) => b.to_string(),
                    Yaml::Null => "null".to_string(),
                    _ => continue,
                };
                object.insert(key, yaml_to_json(value));
            }
            Value::Object(object)
        }
        Yaml::Tagged(tagged) => yaml_to_json(tagged.value),
    }
}
