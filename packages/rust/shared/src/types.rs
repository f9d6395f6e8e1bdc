//! Core domain types for xnatkit.
//!
//! The listing records mirror the rows XNAT returns under
//! `ResultSet.Result` when a collection is queried with `format=json`.
//! XNAT serializes every column as a string.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::{Result, XnatKitError};

/// Format of the `insert_date` column in XNAT listings.
const INSERT_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

// ---------------------------------------------------------------------------
// EntityType
// ---------------------------------------------------------------------------

/// Top-level XNAT collections a resource can be attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Projects,
    Subjects,
    Experiments,
}

impl EntityType {
    /// Path segment used in REST URLs (`/data/{segment}/{id}`).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Projects => "projects",
            Self::Subjects => "subjects",
            Self::Experiments => "experiments",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = XnatKitError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "projects" => Ok(Self::Projects),
            "subjects" => Ok(Self::Subjects),
            "experiments" => Ok(Self::Experiments),
            other => Err(XnatKitError::validation(format!(
                "unknown entity type '{other}' (expected projects, subjects or experiments)"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// ScanRole
// ---------------------------------------------------------------------------

/// Role of a file inside a NIfTI session directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ScanRole {
    T1,
    Dti,
    Bvec,
    Bval,
}

impl ScanRole {
    /// Upper-case role name as it appears in file names and scan types.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::T1 => "T1",
            Self::Dti => "DTI",
            Self::Bvec => "BVEC",
            Self::Bval => "BVAL",
        }
    }

    /// Whether files of this role are images (as opposed to diffusion side files).
    pub fn is_image(self) -> bool {
        matches!(self, Self::T1 | Self::Dti)
    }
}

impl fmt::Display for ScanRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Listing records
// ---------------------------------------------------------------------------

/// A row of `/data/projects`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectRecord {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// A row of `/data/projects/{p}/subjects`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectRecord {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub insert_date: Option<String>,
}

/// A row of `/data/projects/{p}/subjects/{s}/experiments` (imaging sessions).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub insert_date: Option<String>,
    #[serde(default, rename = "xsiType")]
    pub xsi_type: Option<String>,
}

/// A row of `/data/experiments/{e}/reconstructions`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconstructionRecord {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

/// A row of `/data/experiments/{e}/scans`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanRecord {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(default, rename = "type")]
    pub kind: String,
}

/// A row of `/data/{entity}/{id}/resources`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRecord {
    pub xnat_abstractresource_id: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

/// A row of `/data/projects/{p}/pipelines`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineRecord {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(default, rename = "Path")]
    pub path: Option<String>,
}

/// A row of `/data/projects/{p}/experiments?xsiType=xnat:mrSessionData`.
///
/// Depending on the server version the ID column is either `ID` or
/// the fully-qualified `xnat:mrsessiondata/id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ExperimentRow")]
pub struct ExperimentRecord {
    #[serde(rename = "ID")]
    pub id: String,
    pub label: String,
    pub subject_label: String,
}

/// Raw experiment row; servers may send either ID column, or both.
#[derive(Deserialize)]
struct ExperimentRow {
    #[serde(rename = "xnat:mrsessiondata/id")]
    qualified_id: Option<String>,
    #[serde(rename = "ID")]
    id: Option<String>,
    #[serde(default)]
    label: String,
    #[serde(default)]
    subject_label: String,
}

impl TryFrom<ExperimentRow> for ExperimentRecord {
    type Error = String;

    fn try_from(row: ExperimentRow) -> std::result::Result<Self, Self::Error> {
        let id = row
            .qualified_id
            .or(row.id)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| format!("experiment row '{}' has no ID column", row.label))?;
        Ok(Self {
            id,
            label: row.label,
            subject_label: row.subject_label,
        })
    }
}

/// Parse an XNAT `insert_date` value (`2014-03-05 10:11:12.345`).
pub fn parse_insert_date(value: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value.trim(), INSERT_DATE_FORMAT)
        .map_err(|e| XnatKitError::parse(format!("invalid insert_date '{value}': {e}")))
}
