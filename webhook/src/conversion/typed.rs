use super::error::{JsonToSchemaSnafu, SchemaToJsonSnafu, TypedConversionError};

use serde::{de::DeserializeOwned, Serialize};
use snafu::ResultExt;

use std::any::type_name;
use std::marker::PhantomData;

/// A conversion routine that works on strongly typed schemas rather than on generic attribute maps.
pub trait TypedConversion: Send + Sync {
    fn convert(&self, object: serde_json::Value) -> Result<serde_json::Value, TypedConversionError>;
}

/// Converts between two schema types of the `models` crate by deserializing into `S`, applying the
/// schema library's `TryFrom` conversion into `T` and serializing the result.
///
/// Infallible `From` conversions are covered through the standard library's blanket `TryFrom`.
pub struct SchemaConversion<S, T> {
    schemas: PhantomData<fn(S) -> T>,
}

impl<S, T> SchemaConversion<S, T> {
    pub fn new() -> Self {
        SchemaConversion {
            schemas: PhantomData,
        }
    }
}

impl<S, T> Default for SchemaConversion<S, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S, T> TypedConversion for SchemaConversion<S, T>
where
    S: DeserializeOwned,
    T: TryFrom<S> + Serialize,
    T::Error: std::error::Error + Send + Sync + 'static,
{
    fn convert(&self, object: serde_json::Value) -> Result<serde_json::Value, TypedConversionError> {
        let source: S = serde_json::from_value(object).context(JsonToSchemaSnafu {
            schema: type_name::<S>(),
        })?;
        let target = T::try_from(source).map_err(|e| TypedConversionError::Transform {
            schema: type_name::<T>(),
            source: Box::new(e),
        })?;
        serde_json::to_value(target).context(SchemaToJsonSnafu {
            schema: type_name::<T>(),
        })
    }
}
