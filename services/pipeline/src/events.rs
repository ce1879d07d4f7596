//! Event envelopes flowing through the photoflow pipeline.
//!
//! All events carry the image's file name as their correlation id. Shapes
//! follow the wire format produced by the upload front-end: camelCase
//! field names, metadata type carried as a message attribute rather than
//! in the body.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Name of the envelope attribute carrying the metadata attribute kind.
pub const METADATA_TYPE_ATTRIBUTE: &str = "metadata_type";

/// Emitted once per object landing in the upload bucket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadNotification {
    /// Base file name of the uploaded object (may still be URL-encoded)
    pub file_name: String,
    /// Full object key as recorded by the object store
    pub object_key: String,
}

/// A single-attribute metadata update for an existing record.
///
/// The attribute being set travels in the `metadata_type` envelope
/// attribute, mirroring the upstream producer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataUpdate {
    /// File name of the record to update
    pub id: String,
    /// New attribute value
    pub value: String,
}

/// Moderation outcome for one image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewOutcome {
    pub status: ReviewStatus,
    pub reason: String,
}

/// A moderation decision arriving from the review front-end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewUpdate {
    /// File name of the record to update
    pub id: String,
    /// Review date, stored verbatim on the record
    pub date: String,
    pub update: ReviewOutcome,
}

/// Republished after a moderation decision has been applied; drives the
/// confirmation mail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewCompleted {
    pub id: String,
    pub date: String,
    pub update: ReviewOutcome,
}

/// Moderation verdict. Any other value on the wire is a validation error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReviewStatus {
    Pass,
    Reject,
}

impl ReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewStatus::Pass => "Pass",
            ReviewStatus::Reject => "Reject",
        }
    }
}

impl std::fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whitelisted record attributes a metadata update may set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetadataKind {
    Caption,
    Date,
    #[serde(rename = "name")]
    Name,
}

impl MetadataKind {
    /// Parse the `metadata_type` attribute value. The names are
    /// case-sensitive; anything outside the whitelist is rejected.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Caption" => Some(MetadataKind::Caption),
            "Date" => Some(MetadataKind::Date),
            "name" => Some(MetadataKind::Name),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MetadataKind::Caption => "Caption",
            MetadataKind::Date => "Date",
            MetadataKind::Name => "name",
        }
    }
}

impl std::fmt::Display for MetadataKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decode an object key per the storage provider's convention: `+` means
/// space, everything else reserved is percent-encoded.
pub fn decode_object_key(key: &str) -> String {
    let plussed = key.replace('+', " ");
    // Invalid UTF-8 sequences are kept lossily; the key is only used for
    // record lookup and object deletion.
    percent_encoding::percent_decode_str(&plussed)
        .decode_utf8_lossy()
        .into_owned()
}

/// Strip any path prefix from an object key.
pub fn base_file_name(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

/// Lowercased extension of a file name, without the dot.
pub fn file_extension(file_name: &str) -> Option<String> {
    Path::new(file_name)
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
}
