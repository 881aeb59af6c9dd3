use super::error::{ConversionError, MalformedFieldSnafu};
use super::object::{FieldPath, ResourceObject};

use serde_json::Value;

/// A single attribute remapping step. Operations in a rule run in order, each on the output of the
/// previous one. An operation whose source attributes are absent does nothing.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum FieldOperation {
    /// Moves the value at `from` to `to`.
    Rename { from: FieldPath, to: FieldPath },

    /// Splits the string at `from` into exactly two parts on `delimiter`.
    Split {
        from: FieldPath,
        delimiter: String,
        into: (FieldPath, FieldPath),
    },

    /// Joins the values at `from` into one string at `into`. A missing side is treated as empty.
    Join {
        from: (FieldPath, FieldPath),
        delimiter: String,
        into: FieldPath,
    },
}

impl FieldOperation {
    pub fn rename(from: &str, to: &str) -> Self {
        FieldOperation::Rename {
            from: from.into(),
            to: to.into(),
        }
    }

    pub fn split(from: &str, delimiter: &str, left: &str, right: &str) -> Self {
        FieldOperation::Split {
            from: from.into(),
            delimiter: delimiter.to_string(),
            into: (left.into(), right.into()),
        }
    }

    pub fn join(left: &str, right: &str, delimiter: &str, into: &str) -> Self {
        FieldOperation::Join {
            from: (left.into(), right.into()),
            delimiter: delimiter.to_string(),
            into: into.into(),
        }
    }

    pub fn apply(&self, object: &mut ResourceObject) -> Result<(), ConversionError> {
        match self {
            FieldOperation::Rename { from, to } => {
                if let Some(value) = object.remove(from) {
                    object.insert(to, value)?;
                }
            }

            FieldOperation::Split {
                from,
                delimiter,
                into: (left, right),
            } => {
                let (left_value, right_value) = match object.string_at(from)? {
                    Some(value) => split_in_two(from, value, delimiter)?,
                    None => return Ok(()),
                };
                object.remove(from);
                object.insert(left, Value::String(left_value))?;
                object.insert(right, Value::String(right_value))?;
            }

            FieldOperation::Join {
                from: (left, right),
                delimiter,
                into,
            } => {
                let left_value = object.scalar_text_at(left)?;
                let right_value = object.scalar_text_at(right)?;
                if left_value.is_none() && right_value.is_none() {
                    return Ok(());
                }

                let joined = format!(
                    "{}{}{}",
                    left_value.unwrap_or_default(),
                    delimiter,
                    right_value.unwrap_or_default()
                );
                object.remove(left);
                object.remove(right);
                object.insert(into, Value::String(joined))?;
            }
        }
        Ok(())
    }
}

fn split_in_two(
    field: &FieldPath,
    value: &str,
    delimiter: &str,
) -> Result<(String, String), ConversionError> {
    let parts: Vec<&str> = value.split(delimiter).collect();
    match parts.as_slice() {
        [left, right] => Ok((left.to_string(), right.to_string())),
        _ => MalformedFieldSnafu {
            field: field.to_string(),
            reason: format!(
                "expected exactly 2 parts separated by '{}', found {} in '{}'",
                delimiter,
                parts.len(),
                value
            ),
        }
        .fail(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversion::ConversionErrorKind;
    use serde_json::json;

    fn object(attributes: Value) -> ResourceObject {
        let mut value = json!({"apiVersion": "stable.example.com/v1", "kind": "Endpoint"});
        value
            .as_object_mut()
            .unwrap()
            .extend(attributes.as_object().unwrap().clone());
        ResourceObject::from_value(value).unwrap()
    }

    fn attributes(object: ResourceObject) -> Value {
        let mut value = object.into_value();
        let map = value.as_object_mut().unwrap();
        map.remove("apiVersion");
        map.remove("kind");
        value
    }

    #[test]
    fn test_split() {
        let split = FieldOperation::split("hostPort", ":", "host", "port");
        let mut endpoint = object(json!({"hostPort": "10.0.0.1:443", "other": true}));
        split.apply(&mut endpoint).unwrap();
        assert_eq!(
            attributes(endpoint),
            json!({"host": "10.0.0.1", "port": "443", "other": true})
        );
    }

    #[test]
    fn test_split_requires_two_parts() {
        let split = FieldOperation::split("hostPort", ":", "host", "port");
        for host_port in [json!("10.0.0.1"), json!("a:b:c"), json!(443)] {
            let mut endpoint = object(json!({ "hostPort": host_port }));
            let err = split.apply(&mut endpoint).unwrap_err();
            assert_eq!(err.kind(), ConversionErrorKind::MalformedField);
        }
    }

    #[test]
    fn test_join() {
        let join = FieldOperation::join("host", "port", ":", "hostPort");
        let cases = [
            (json!({"host": "h", "port": "1"}), json!({"hostPort": "h:1"})),
            (json!({"host": "h"}), json!({"hostPort": "h:"})),
            (json!({"port": 443}), json!({"hostPort": ":443"})),
            (json!({"other": 1}), json!({"other": 1})),
        ];
        for (input, expected) in cases {
            let mut endpoint = object(input.clone());
            join.apply(&mut endpoint).unwrap();
            assert_eq!(attributes(endpoint), expected, "{}", input);
        }

        let mut endpoint = object(json!({"host": ["h"], "port": "1"}));
        let err = join.apply(&mut endpoint).unwrap_err();
        assert_eq!(err.kind(), ConversionErrorKind::MalformedField);
    }

    #[test]
    fn test_rename_nested() {
        let rename = FieldOperation::rename("spec.endpoint", "spec.network.endpoint");
        let mut endpoint = object(json!({"spec": {"endpoint": "h:1", "replicas": 2}}));
        rename.apply(&mut endpoint).unwrap();
        assert_eq!(
            attributes(endpoint),
            json!({"spec": {"network": {"endpoint": "h:1"}, "replicas": 2}})
        );

        let mut untouched = object(json!({"spec": {}}));
        rename.apply(&mut untouched).unwrap();
        assert_eq!(attributes(untouched), json!({"spec": {}}));
    }
}
