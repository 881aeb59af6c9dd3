//! Types and helpers shared by the conversion webhook: the typed custom resource schemas whose
//! versions the webhook converts between, and the process-wide tracing and crypto setup.
pub mod cluster;
pub mod constants;
pub mod crypto;
pub mod telemetry;
