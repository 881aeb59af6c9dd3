//! Content negotiation for ConversionReview bodies.
//!
//! The codec table is fixed at startup and only ever read afterwards, so a single instance is
//! shared by every request without synchronization.
use mime::Mime;
use serde::{de::DeserializeOwned, Serialize};
use snafu::{OptionExt, ResultExt, Snafu};

use std::cmp::Ordering;
use std::fmt;

/// A `type/subtype` pair identifying a serialization format.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct MediaType {
    pub type_: &'static str,
    pub subtype: &'static str,
}

impl MediaType {
    pub const fn new(type_: &'static str, subtype: &'static str) -> Self {
        MediaType { type_, subtype }
    }

    fn matches_exactly(&self, mime: &Mime) -> bool {
        mime.type_().as_str().eq_ignore_ascii_case(self.type_)
            && mime.subtype().as_str().eq_ignore_ascii_case(self.subtype)
    }

    /// Whether an Accept media range selects this media type. Exact ranges, `type/*` and `*/*`
    /// are honored; `*/subtype` is not a valid range and never matches.
    fn matches_range(&self, range: &Mime) -> bool {
        let type_ = range.type_().as_str();
        let subtype = range.subtype().as_str();
        let star = mime::STAR.as_str();
        (type_.eq_ignore_ascii_case(self.type_)
            && (subtype.eq_ignore_ascii_case(self.subtype) || subtype == star))
            || (type_ == star && subtype == star)
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.type_, self.subtype)
    }
}

pub const APPLICATION_JSON: MediaType = MediaType::new("application", "json");
pub const APPLICATION_YAML: MediaType = MediaType::new("application", "yaml");

/// A serialization format able to read a request envelope and write a response envelope.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Codec {
    Json,
    Yaml,
}

impl Codec {
    /// The media type written to the `Content-Type` header of responses encoded by this codec.
    pub fn media_type(&self) -> MediaType {
        match self {
            Codec::Json => APPLICATION_JSON,
            Codec::Yaml => APPLICATION_YAML,
        }
    }

    pub fn decode<T: DeserializeOwned>(&self, body: &[u8]) -> Result<T, CodecError> {
        match self {
            Codec::Json => serde_json::from_slice(body).context(JsonSnafu),
            Codec::Yaml => serde_yaml::from_slice(body).context(YamlSnafu),
        }
    }

    pub fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, CodecError> {
        match self {
            Codec::Json => serde_json::to_vec(value).context(JsonSnafu),
            Codec::Yaml => serde_yaml::to_string(value)
                .map(String::into_bytes)
                .context(YamlSnafu),
        }
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum CodecError {
    #[snafu(display("Invalid JSON: {}", source))]
    Json { source: serde_json::Error },

    #[snafu(display("Invalid YAML: {}", source))]
    Yaml { source: serde_yaml::Error },
}

#[derive(Debug, Snafu, PartialEq)]
#[snafu(visibility(pub))]
pub enum NegotiationError {
    #[snafu(display("Unsupported Content-Type '{}'", content_type))]
    UnsupportedMediaType { content_type: String },

    #[snafu(display("No supported media type satisfies Accept '{}'", accept))]
    NotAcceptable { accept: String },
}

/// The media types the webhook can read and write, in descending priority. The first entry is the
/// default used when a caller expresses no preference.
#[derive(Debug, Clone)]
pub struct CodecTable {
    entries: Vec<(MediaType, Codec)>,
}

impl Default for CodecTable {
    fn default() -> Self {
        CodecTable {
            entries: vec![
                (APPLICATION_JSON, Codec::Json),
                (APPLICATION_YAML, Codec::Yaml),
            ],
        }
    }
}

impl CodecTable {
    /// The codec used when the caller sends no Accept header.
    pub fn default_codec(&self) -> Codec {
        self.entries
            .first()
            .map(|(_, codec)| *codec)
            .unwrap_or(Codec::Json)
    }

    /// Picks the codec for a request body from its Content-Type header. Parameters such as
    /// `charset` are ignored, but the `type/subtype` essence must match a table entry exactly.
    pub fn select_decoder(&self, content_type: &str) -> Result<Codec, NegotiationError> {
        let unsupported = || NegotiationError::UnsupportedMediaType {
            content_type: content_type.to_string(),
        };

        let mime: Mime = content_type.trim().parse().map_err(|_| unsupported())?;
        self.entries
            .iter()
            .find(|(media_type, _)| media_type.matches_exactly(&mime))
            .map(|(_, codec)| *codec)
            .ok_or_else(unsupported)
    }

    /// Picks the codec for a response body from the Accept header using quality-value
    /// negotiation. A missing or blank header selects the default codec.
    pub fn select_encoder(&self, accept: Option<&str>) -> Result<Codec, NegotiationError> {
        let accept = match accept.map(str::trim) {
            None | Some("") => return Ok(self.default_codec()),
            Some(accept) => accept,
        };

        parse_accept(accept)
            .iter()
            .find_map(|range| {
                self.entries
                    .iter()
                    .find(|(media_type, _)| media_type.matches_range(range))
                    .map(|(_, codec)| *codec)
            })
            .context(NotAcceptableSnafu { accept })
    }
}

/// Parses an Accept header into media ranges ordered by descending quality. Ranges with equal
/// quality keep their header order. Ranges that fail to parse, carry an invalid weight, or are
/// weighted `q=0` are dropped.
fn parse_accept(accept: &str) -> Vec<Mime> {
    let mut ranges: Vec<(Mime, f32)> = accept
        .split(',')
        .filter_map(|clause| {
            let range: Mime = clause.trim().parse().ok()?;
            let quality = match range.get_param("q") {
                Some(q) => q.as_str().parse::<f32>().ok()?,
                None => 1.0,
            };
            (quality > 0.0 && quality <= 1.0).then_some((range, quality))
        })
        .collect();

    // `sort_by` is stable, which preserves header order between equally weighted ranges.
    ranges.sort_by(|(_, a), (_, b)| b.partial_cmp(a).unwrap_or(Ordering::Equal));
    ranges.into_iter().map(|(range, _)| range).collect()
}
