use super::error::{ConversionError, MalformedFieldSnafu};

use serde_json::{Map, Value};
use snafu::OptionExt;

use std::fmt;

const API_VERSION_KEY: &str = "apiVersion";
const KIND_KEY: &str = "kind";

/// A dot-separated path to an attribute, e.g. `spec.hostPort`.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct FieldPath {
    segments: Vec<String>,
}

impl FieldPath {
    pub fn parse(path: &str) -> Self {
        FieldPath {
            segments: path.split('.').map(str::to_string).collect(),
        }
    }

    /// Splits the path into its parent segments and final key.
    fn split_last(&self) -> (&[String], &str) {
        match self.segments.split_last() {
            Some((last, parents)) => (parents, last.as_str()),
            None => (&[], ""),
        }
    }
}

impl From<&str> for FieldPath {
    fn from(path: &str) -> Self {
        FieldPath::parse(path)
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("."))
    }
}

/// A custom resource in its generic form: an `apiVersion`, a `kind`, and every other top-level
/// attribute as dynamically typed JSON.
///
/// The engine clones the caller's object before touching it, so whatever the caller holds is never
/// mutated by a conversion.
#[derive(Clone, Debug, PartialEq)]
pub struct ResourceObject {
    api_version: String,
    kind: String,
    attributes: Map<String, Value>,
}

impl ResourceObject {
    /// Reads a raw object as sent in a ConversionReview. The object must be a JSON map carrying
    /// string `apiVersion` and `kind` attributes.
    pub fn from_value(value: Value) -> Result<Self, ConversionError> {
        let mut attributes = match value {
            Value::Object(attributes) => attributes,
            other => {
                return MalformedFieldSnafu {
                    field: "object",
                    reason: format!("expected a map, found {}", type_name(&other)),
                }
                .fail()
            }
        };

        let api_version = take_required_string(&mut attributes, API_VERSION_KEY)?;
        let kind = take_required_string(&mut attributes, KIND_KEY)?;

        Ok(ResourceObject {
            api_version,
            kind,
            attributes,
        })
    }

    pub fn into_value(self) -> Value {
        let mut object = Map::with_capacity(self.attributes.len() + 2);
        object.insert(API_VERSION_KEY.to_string(), Value::String(self.api_version));
        object.insert(KIND_KEY.to_string(), Value::String(self.kind));
        object.extend(self.attributes);
        Value::Object(object)
    }

    pub fn api_version(&self) -> &str {
        &self.api_version
    }

    pub fn set_api_version(&mut self, api_version: &str) {
        self.api_version = api_version.to_string();
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn attributes(&self) -> &Map<String, Value> {
        &self.attributes
    }

    pub fn get(&self, path: &FieldPath) -> Option<&Value> {
        let (parents, key) = path.split_last();
        let mut current = &self.attributes;
        for segment in parents {
            current = current.get(segment)?.as_object()?;
        }
        current.get(key)
    }

    pub fn remove(&mut self, path: &FieldPath) -> Option<Value> {
        let (parents, key) = path.split_last();
        let mut current = &mut self.attributes;
        for segment in parents {
            current = current.get_mut(segment)?.as_object_mut()?;
        }
        current.remove(key)
    }

    /// Writes `value` at `path`, creating intermediate maps as needed. Fails if an intermediate
    /// attribute exists but is not a map.
    pub fn insert(&mut self, path: &FieldPath, value: Value) -> Result<(), ConversionError> {
        let (parents, key) = path.split_last();
        let mut current = &mut self.attributes;
        for segment in parents {
            current = current
                .entry(segment.clone())
                .or_insert_with(|| Value::Object(Map::new()))
                .as_object_mut()
                .context(MalformedFieldSnafu {
                    field: path.to_string(),
                    reason: format!("'{}' is not a map", segment),
                })?;
        }
        current.insert(key.to_string(), value);
        Ok(())
    }

    /// Returns the string at `path`, `None` if the attribute is absent, or an error if the
    /// attribute holds anything other than a string.
    pub fn string_at(&self, path: &FieldPath) -> Result<Option<&str>, ConversionError> {
        match self.get(path) {
            None => Ok(None),
            Some(Value::String(value)) => Ok(Some(value)),
            Some(other) => MalformedFieldSnafu {
                field: path.to_string(),
                reason: format!("expected a string, found {}", type_name(other)),
            }
            .fail(),
        }
    }

    /// Renders the scalar at `path` as text. Strings are used verbatim and numbers in their JSON
    /// form; any other type is an error.
    pub fn scalar_text_at(&self, path: &FieldPath) -> Result<Option<String>, ConversionError> {
        match self.get(path) {
            None => Ok(None),
            Some(Value::String(value)) => Ok(Some(value.clone())),
            Some(Value::Number(value)) => Ok(Some(value.to_string())),
            Some(other) => MalformedFieldSnafu {
                field: path.to_string(),
                reason: format!("expected a string or number, found {}", type_name(other)),
            }
            .fail(),
        }
    }

    /// A human readable identity for log and failure messages, e.g. `Endpoint default/web`.
    pub fn identity(&self) -> String {
        identity(&self.kind, &self.attributes)
    }
}

/// Describes a raw, possibly malformed object for failure messages.
pub fn describe_raw_object(value: &Value) -> String {
    match value.as_object() {
        Some(attributes) => {
            let kind = attributes
                .get(KIND_KEY)
                .and_then(Value::as_str)
                .unwrap_or("<unknown kind>");
            identity(kind, attributes)
        }
        None => format!("<{}>", type_name(value)),
    }
}

fn identity(kind: &str, attributes: &Map<String, Value>) -> String {
    let metadata = attributes.get("metadata").and_then(Value::as_object);
    let field = |key: &str| {
        metadata
            .and_then(|metadata| metadata.get(key))
            .and_then(Value::as_str)
    };

    match (field("namespace"), field("name")) {
        (Some(namespace), Some(name)) => format!("{} {}/{}", kind, namespace, name),
        (None, Some(name)) => format!("{} {}", kind, name),
        _ => kind.to_string(),
    }
}

fn take_required_string(
    attributes: &mut Map<String, Value>,
    key: &str,
) -> Result<String, ConversionError> {
    match attributes.remove(key) {
        Some(Value::String(value)) if !value.is_empty() => Ok(value),
        Some(other) => MalformedFieldSnafu {
            field: key,
            reason: format!("expected a non-empty string, found {}", type_name(&other)),
        }
        .fail(),
        None => MalformedFieldSnafu {
            field: key,
            reason: "attribute is missing",
        }
        .fail(),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a bool",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a sequence",
        Value::Object(_) => "a map",
    }
}
