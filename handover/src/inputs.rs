use std::fs::File;
use std::io::Read;
use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

use crate::migration::{ConfigurationError, MigrationPair};

const MEMBER_SEPARATOR: char = ';';

/// One row of the filter export: a saved filter and its current owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterOwnerRecord {
    /// Filter id
    pub filter_id: String,
    /// Username of the owner
    pub owner: String,
}

/// One row of the role export: a project role and its user members.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleMembershipRecord {
    /// Project key
    pub project_key: String,
    /// Role display name
    pub role_name: String,
    /// REST URL of the role, used to add members
    pub role_url: String,
    /// Usernames of the role's members
    pub members: Vec<String>,
}

impl RoleMembershipRecord {
    /// `project/role`, used to identify the role in reports.
    #[must_use]
    pub fn object_id(&self) -> String {
        format!("{}/{}", self.project_key, self.role_name)
    }
}

#[derive(Deserialize)]
struct RoleRow {
    project_key: String,
    role_name: String,
    role_url: String,
    #[serde(default)]
    usernames: String,
}

fn open(path: &Path) -> Result<File, ConfigurationError> {
    File::open(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ConfigurationError::MissingInput {
                path: path.display().to_string(),
            }
        } else {
            ConfigurationError::Generic {
                message: format!("failed to open {}: {e}", path.display()),
            }
        }
    })
}

fn invalid_file(path: &Path) -> String {
    format!("invalid input file {}", path.display())
}

/// Reads a pairs CSV: `source,target` per row, an optional header row starting with
/// `source`, further columns ignored.
///
/// Rows with a missing column are kept with an empty identity so that the batch reports
/// them as malformed.
///
/// # Errors
/// - `ConfigurationError::MissingInput` if the file does not exist
/// - `ConfigurationError::Generic` if it cannot be read or parsed
pub fn read_pairs(path: &Path) -> Result<Vec<MigrationPair>, ConfigurationError> {
    let file = open(path)?;
    ConfigurationError::from_anyhow_result_with_prefix(parse_pairs(file), &invalid_file(path))
}

/// Parses pairs from any reader; see [`read_pairs`].
///
/// # Errors
/// Returns an error when a row cannot be decoded.
pub fn parse_pairs<R: Read>(reader: R) -> anyhow::Result<Vec<MigrationPair>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut pairs = Vec::new();
    for (row, record) in csv_reader.records().enumerate() {
        let record = record.with_context(|| format!("row {}", row + 1))?;
        let source = record.get(0).unwrap_or_default();
        let target = record.get(1).unwrap_or_default();

        if row == 0 && source.to_lowercase().starts_with("source") {
            continue;
        }
        if source.is_empty() && target.is_empty() {
            continue;
        }
        pairs.push(MigrationPair::new(source, target));
    }
    Ok(pairs)
}

/// Reads the filter export: `filter_id,owner` per row, no header, further columns ignored.
///
/// # Errors
/// - `ConfigurationError::MissingInput` if the file does not exist
/// - `ConfigurationError::Generic` if it cannot be read or parsed
pub fn read_filter_export(path: &Path) -> Result<Vec<FilterOwnerRecord>, ConfigurationError> {
    let file = open(path)?;
    ConfigurationError::from_anyhow_result_with_prefix(
        parse_filter_export(file),
        &invalid_file(path),
    )
}

/// Parses a filter export from any reader; see [`read_filter_export`].
///
/// # Errors
/// Returns an error when a row cannot be decoded.
pub fn parse_filter_export<R: Read>(reader: R) -> anyhow::Result<Vec<FilterOwnerRecord>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut records = Vec::new();
    for (row, record) in csv_reader.records().enumerate() {
        let record = record.with_context(|| format!("row {}", row + 1))?;
        match (record.get(0), record.get(1)) {
            (Some(filter_id), Some(owner)) if !filter_id.is_empty() && !owner.is_empty() => {
                records.push(FilterOwnerRecord {
                    filter_id: filter_id.to_string(),
                    owner: owner.to_string(),
                });
            }
            _ => crate::warn!("inputs.filter_row_ignored row={}", row + 1),
        }
    }
    Ok(records)
}

/// Reads the role export: header `project_key,role_name,role_url,usernames`, with
/// `;`-separated usernames.
///
/// # Errors
/// - `ConfigurationError::MissingInput` if the file does not exist
/// - `ConfigurationError::Generic` if it cannot be read, lacks a column or is malformed
pub fn read_role_export(path: &Path) -> Result<Vec<RoleMembershipRecord>, ConfigurationError> {
    let file = open(path)?;
    ConfigurationError::from_anyhow_result_with_prefix(parse_role_export(file), &invalid_file(path))
}

/// Parses a role export from any reader; see [`read_role_export`].
///
/// # Errors
/// Returns an error when the header lacks a column or a row cannot be decoded.
pub fn parse_role_export<R: Read>(reader: R) -> anyhow::Result<Vec<RoleMembershipRecord>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut records = Vec::new();
    for (row, record) in csv_reader.deserialize::<RoleRow>().enumerate() {
        // Header is line 1
        let record = record.with_context(|| format!("row {}", row + 2))?;
        records.push(RoleMembershipRecord {
            project_key: record.project_key,
            role_name: record.role_name,
            role_url: record.role_url,
            members: record
                .usernames
                .split(MEMBER_SEPARATOR)
                .map(str::trim)
                .filter(|member| !member.is_empty())
                .map(str::to_string)
                .collect(),
        });
    }
    Ok(records)
}

/// Reads a pairs CSV from disk.
///
/// # Errors
/// - `ConfigurationError::MissingInput` if the file does not exist
/// - `ConfigurationError::Generic` if it cannot be read or parsed
#[allow(clippy::needless_pass_by_value)]
#[uniffi::export]
pub fn load_pairs_csv(path: String) -> Result<Vec<MigrationPair>, ConfigurationError> {
    let _handover_logger_ctx = crate::primitives::logger::LogContext::new("Inputs");
    let pairs = read_pairs(Path::new(&path))?;
    crate::info!("inputs.pairs_loaded count={}", pairs.len());
    Ok(pairs)
}
