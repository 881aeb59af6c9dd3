//! The version conversion engine.
//!
//! Conversions are looked up in a rule table keyed by kind and version pair. A rule either remaps
//! attributes declaratively through an ordered list of [`FieldOperation`]s, or delegates to a
//! [`TypedConversion`] backed by the schema types in `models`.
mod declarative;
mod error;
mod object;
mod typed;

pub use self::declarative::FieldOperation;
pub use self::error::{ConversionError, ConversionErrorKind, RuleTableError, TypedConversionError};
pub use self::object::{describe_raw_object, FieldPath, ResourceObject};
pub use self::typed::{SchemaConversion, TypedConversion};

use self::error::{
    ConversionFailedSnafu, DuplicateRuleSnafu, SelfConversionRuleSnafu, SelfConversionSnafu,
    UnsupportedVersionPairSnafu,
};

use models::cluster::{v1alpha3, v1alpha4};
use models::constants::{CLUSTER_KIND, CLUSTER_V1ALPHA3, CLUSTER_V1ALPHA4, STABLE_V1, STABLE_V2};
use snafu::{ensure, OptionExt, ResultExt};
use tracing::{event, instrument, Level};

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Identifies a rule. A rule without a kind applies to every kind converted between the two
/// versions, unless a rule for that specific kind exists.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct RuleKey {
    pub kind: Option<String>,
    pub from: String,
    pub to: String,
}

impl RuleKey {
    fn new(kind: Option<&str>, from: &str, to: &str) -> Self {
        RuleKey {
            kind: kind.map(str::to_string),
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}

#[derive(Clone)]
pub enum ConversionRule {
    Declarative(Vec<FieldOperation>),
    Typed(Arc<dyn TypedConversion>),
}

impl fmt::Debug for ConversionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversionRule::Declarative(operations) => {
                f.debug_tuple("Declarative").field(operations).finish()
            }
            ConversionRule::Typed(_) => f.write_str("Typed"),
        }
    }
}

/// Converts resource objects between schema versions. The rule table is fixed once built, so a
/// single engine can be shared by every request.
#[derive(Debug)]
pub struct ConversionEngine {
    rules: HashMap<RuleKey, ConversionRule>,
}

impl ConversionEngine {
    pub fn builder() -> ConversionEngineBuilder {
        ConversionEngineBuilder::default()
    }

    /// The rules for the versions served by this webhook.
    pub fn default_rules() -> Result<Self, RuleTableError> {
        Self::builder()
            .declarative(
                None,
                STABLE_V1,
                STABLE_V2,
                vec![FieldOperation::split("hostPort", ":", "host", "port")],
            )
            .declarative(
                None,
                STABLE_V2,
                STABLE_V1,
                vec![FieldOperation::join("host", "port", ":", "hostPort")],
            )
            .typed(
                Some(CLUSTER_KIND),
                CLUSTER_V1ALPHA3,
                CLUSTER_V1ALPHA4,
                SchemaConversion::<v1alpha3::Cluster, v1alpha4::Cluster>::new(),
            )
            .typed(
                Some(CLUSTER_KIND),
                CLUSTER_V1ALPHA4,
                CLUSTER_V1ALPHA3,
                SchemaConversion::<v1alpha4::Cluster, v1alpha3::Cluster>::new(),
            )
            .build()
    }

    /// Converts `object` from its own `apiVersion` to `target`.
    pub fn convert(
        &self,
        object: &ResourceObject,
        target: &str,
    ) -> Result<ResourceObject, ConversionError> {
        self.convert_between(object, object.api_version(), target)
    }

    /// Converts `object` from `source` to `target`, returning a new object. `object` itself is
    /// left untouched whether or not the conversion succeeds.
    #[instrument(
        skip(self, object),
        fields(kind = object.kind()),
        err(level = Level::DEBUG)
    )]
    pub fn convert_between(
        &self,
        object: &ResourceObject,
        source: &str,
        target: &str,
    ) -> Result<ResourceObject, ConversionError> {
        ensure!(source != target, SelfConversionSnafu { version: source });

        let kind = object.kind();
        let rule = self.rule_for(kind, source, target).context(
            UnsupportedVersionPairSnafu {
                kind,
                from: source,
                to: target,
            },
        )?;

        let mut converted = match rule {
            ConversionRule::Declarative(operations) => {
                let mut converted = object.clone();
                for operation in operations {
                    operation.apply(&mut converted)?;
                }
                converted
            }
            ConversionRule::Typed(conversion) => {
                let mut source_object = object.clone();
                source_object.set_api_version(source);
                let value = conversion
                    .convert(source_object.into_value())
                    .context(ConversionFailedSnafu {
                        kind,
                        from: source,
                        to: target,
                    })?;
                ResourceObject::from_value(value)?
            }
        };

        converted.set_api_version(target);
        event!(
            Level::DEBUG,
            object = %converted.identity(),
            target_version = target,
            "Converted object."
        );
        Ok(converted)
    }

    fn rule_for(&self, kind: &str, source: &str, target: &str) -> Option<&ConversionRule> {
        self.rules
            .get(&RuleKey::new(Some(kind), source, target))
            .or_else(|| self.rules.get(&RuleKey::new(None, source, target)))
    }
}

/// Collects conversion rules. Problems are reported once, by [`ConversionEngineBuilder::build`],
/// so that rules can be chained.
#[derive(Debug, Default)]
pub struct ConversionEngineBuilder {
    rules: Vec<(RuleKey, ConversionRule)>,
}

impl ConversionEngineBuilder {
    pub fn declarative(
        mut self,
        kind: Option<&str>,
        from: &str,
        to: &str,
        operations: Vec<FieldOperation>,
    ) -> Self {
        self.rules.push((
            RuleKey::new(kind, from, to),
            ConversionRule::Declarative(operations),
        ));
        self
    }

    pub fn typed<C>(mut self, kind: Option<&str>, from: &str, to: &str, conversion: C) -> Self
    where
        C: TypedConversion + 'static,
    {
        self.rules.push((
            RuleKey::new(kind, from, to),
            ConversionRule::Typed(Arc::new(conversion)),
        ));
        self
    }

    pub fn build(self) -> Result<ConversionEngine, RuleTableError> {
        let mut rules = HashMap::with_capacity(self.rules.len());
        for (key, rule) in self.rules {
            ensure!(
                key.from != key.to,
                SelfConversionRuleSnafu {
                    version: key.from.clone()
                }
            );
            ensure!(
                !rules.contains_key(&key),
                DuplicateRuleSnafu {
                    kind: key.kind.clone().unwrap_or_else(|| "*".to_string()),
                    from: key.from.clone(),
                    to: key.to.clone(),
                }
            );
            rules.insert(key, rule);
        }
        Ok(ConversionEngine { rules })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn engine() -> ConversionEngine {
        ConversionEngine::default_rules().unwrap()
    }

    fn object(value: Value) -> ResourceObject {
        ResourceObject::from_value(value).unwrap()
    }

    fn endpoint_v1(host_port: Value) -> ResourceObject {
        object(json!({
            "apiVersion": STABLE_V1,
            "kind": "Endpoint",
            "metadata": {"name": "web", "namespace": "default"},
            "hostPort": host_port,
            "protocol": "https",
        }))
    }

    #[test]
    fn test_stable_v1_to_v2() {
        let converted = engine()
            .convert(&endpoint_v1(json!("10.0.0.1:443")), STABLE_V2)
            .unwrap();
        assert_eq!(
            converted.into_value(),
            json!({
                "apiVersion": STABLE_V2,
                "kind": "Endpoint",
                "metadata": {"name": "web", "namespace": "default"},
                "host": "10.0.0.1",
                "port": "443",
                "protocol": "https",
            })
        );
    }

    #[test]
    fn test_stable_round_trip() {
        let engine = engine();
        let original = endpoint_v1(json!("example.com:8080"));
        let upgraded = engine.convert(&original, STABLE_V2).unwrap();
        let downgraded = engine.convert(&upgraded, STABLE_V1).unwrap();
        assert_eq!(downgraded, original);
    }

    #[test]
    fn test_missing_host_port_passes_through() {
        let original = object(json!({
            "apiVersion": STABLE_V1,
            "kind": "Endpoint",
            "metadata": {"name": "web"},
        }));
        let converted = engine().convert(&original, STABLE_V2).unwrap();
        assert_eq!(converted.api_version(), STABLE_V2);
        assert!(!converted.attributes().contains_key("host"));
        assert!(!converted.attributes().contains_key("port"));
        assert_eq!(converted.attributes(), original.attributes());
    }

    #[test]
    fn test_self_conversion() {
        let engine = engine();
        for version in [STABLE_V1, STABLE_V2, CLUSTER_V1ALPHA3, "unknown.example.com/v9"] {
            let err = engine
                .convert_between(&endpoint_v1(json!("h:1")), version, version)
                .unwrap_err();
            assert_eq!(err.kind(), ConversionErrorKind::SelfConversion, "{}", version);
        }
    }

    #[test]
    fn test_unsupported_version_pair_leaves_input_unchanged() {
        let engine = engine();
        let original = endpoint_v1(json!("h:1"));
        let snapshot = original.clone();

        let err = engine
            .convert(&original, "stable.example.com/v3")
            .unwrap_err();
        assert_eq!(err.kind(), ConversionErrorKind::UnsupportedVersionPair);
        assert_eq!(original, snapshot);

        // Typed rules are kind-specific.
        let err = engine.convert(&original, CLUSTER_V1ALPHA4).unwrap_err();
        assert_eq!(err.kind(), ConversionErrorKind::UnsupportedVersionPair);
    }

    #[test]
    fn test_malformed_field() {
        let engine = engine();
        let original = endpoint_v1(json!("10.0.0.1"));
        let err = engine.convert(&original, STABLE_V2).unwrap_err();
        assert_eq!(err.kind(), ConversionErrorKind::MalformedField);
        assert!(err.to_string().contains("hostPort"), "{}", err);
        assert_eq!(original.attributes()["hostPort"], "10.0.0.1");
    }

    #[test]
    fn test_typed_cluster_round_trip() {
        let engine = engine();
        let original = object(json!({
            "apiVersion": CLUSTER_V1ALPHA3,
            "kind": "Cluster",
            "metadata": {"name": "workload", "namespace": "org-acme"},
            "spec": {
                "paused": true,
                "controlPlaneEndpoint": {"host": "api.workload.example.com", "port": 6443},
            },
            "status": {
                "phase": "Provisioned",
                "infrastructureReady": true,
                "controlPlaneInitialized": true,
                "controlPlaneReady": false,
            },
        }));

        let upgraded = engine.convert(&original, CLUSTER_V1ALPHA4).unwrap();
        assert_eq!(upgraded.api_version(), CLUSTER_V1ALPHA4);
        assert_eq!(
            upgraded.get(&"status.conditions".into()),
            Some(&json!([{"type": "ControlPlaneInitialized", "status": "True"}]))
        );

        let downgraded = engine.convert(&upgraded, CLUSTER_V1ALPHA3).unwrap();
        assert_eq!(downgraded, original);
    }

    #[test]
    fn test_typed_failure_wraps_cause() {
        let original = object(json!({
            "apiVersion": CLUSTER_V1ALPHA3,
            "kind": "Cluster",
            "metadata": {"name": "workload"},
            "spec": {"controlPlaneEndpoint": {"host": "api", "port": "not a port"}},
        }));
        let err = engine().convert(&original, CLUSTER_V1ALPHA4).unwrap_err();
        assert_eq!(err.kind(), ConversionErrorKind::ConversionFailed);
        assert!(matches!(
            err,
            ConversionError::ConversionFailed {
                source: TypedConversionError::JsonToSchema { .. },
                ..
            }
        ));
    }

    #[test]
    fn test_kind_specific_rule_wins() {
        let engine = ConversionEngine::builder()
            .declarative(None, "a/v1", "a/v2", vec![FieldOperation::rename("x", "y")])
            .declarative(
                Some("Special"),
                "a/v1",
                "a/v2",
                vec![FieldOperation::rename("x", "z")],
            )
            .build()
            .unwrap();

        let generic = object(json!({"apiVersion": "a/v1", "kind": "Plain", "x": 1}));
        let special = object(json!({"apiVersion": "a/v1", "kind": "Special", "x": 1}));
        assert_eq!(
            engine.convert(&generic, "a/v2").unwrap().attributes()["y"],
            1
        );
        assert_eq!(
            engine.convert(&special, "a/v2").unwrap().attributes()["z"],
            1
        );
    }

    #[test]
    fn test_invalid_rule_tables() {
        let duplicate = ConversionEngine::builder()
            .declarative(None, "a/v1", "a/v2", vec![])
            .declarative(None, "a/v1", "a/v2", vec![])
            .build()
            .unwrap_err();
        assert!(matches!(duplicate, RuleTableError::DuplicateRule { .. }));

        let self_rule = ConversionEngine::builder()
            .declarative(Some("Plain"), "a/v1", "a/v1", vec![])
            .build()
            .unwrap_err();
        assert!(matches!(self_rule, RuleTableError::SelfConversionRule { .. }));
    }
}
