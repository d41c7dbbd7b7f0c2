use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Error body returned by most REST endpoints.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ErrorPayload {
    /// General error messages
    pub error_messages: Vec<String>,
    /// Field-level errors
    pub errors: BTreeMap<String, String>,
    /// Single message used by some older endpoints
    pub message: Option<String>,
}

/// One entry of a user's group listing.
#[derive(Debug, Clone, Deserialize)]
pub struct GroupEntry {
    /// Group name
    pub name: String,
}

/// An issue as returned by search, restricted to the requested fields.
#[derive(Debug, Clone, Deserialize)]
pub struct IssueRecord {
    /// Issue key, e.g. `OPS-42`
    pub key: String,
    /// Requested fields; absent fields are missing from the map
    #[serde(default)]
    pub fields: Map<String, Value>,
}

impl IssueRecord {
    /// Username held by a single-user field, if set.
    #[must_use]
    pub fn user_field(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(user_name)
    }

    /// Usernames held by a multi-user field, in stored order. An unset field is empty.
    #[must_use]
    pub fn multi_user_field(&self, field: &str) -> Vec<String> {
        match self.fields.get(field) {
            Some(Value::Array(users)) => users
                .iter()
                .filter_map(user_name)
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// Reads the `name` of a user object.
#[must_use]
pub fn user_name(value: &Value) -> Option<&str> {
    value.get("name").and_then(Value::as_str)
}

/// A user reference as accepted by field updates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    /// Username
    pub name: String,
}

impl UserRef {
    /// Reference to `name`.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

/// Body of an issue search. The paginator rewrites `startAt` and `maxResults` per page.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    /// Query
    pub jql: String,
    /// Offset of the first issue
    pub start_at: u32,
    /// Page size
    pub max_results: u32,
    /// Fields to return for each issue
    pub fields: Vec<String>,
}

/// Body of an issue edit.
#[derive(Debug, Clone, Serialize)]
pub struct IssueUpdate {
    /// New field values
    pub fields: Map<String, Value>,
}

/// Body of a project-role addition.
#[derive(Debug, Clone, Serialize)]
pub struct RoleActorsRequest {
    /// Usernames to add
    pub user: Vec<String>,
}

/// A field definition from the field catalog.
#[derive(Debug, Clone, Deserialize)]
pub struct FieldDefinition {
    /// Field id, e.g. `customfield_10010`
    pub id: String,
    /// Display name
    #[serde(default)]
    pub name: String,
    /// Whether this is a custom field
    #[serde(default)]
    pub custom: bool,
    /// Type information; missing for some system fields
    #[serde(default)]
    pub schema: Option<FieldSchema>,
}

impl FieldDefinition {
    /// The custom field type key, e.g.
    /// `com.atlassian.jira.plugin.system.customfieldtypes:userpicker`.
    #[must_use]
    pub fn custom_type(&self) -> Option<&str> {
        self.schema.as_ref().and_then(|schema| schema.custom.as_deref())
    }
}

/// Type information of a field.
#[derive(Debug, Clone, Deserialize)]
pub struct FieldSchema {
    /// Custom field type key
    #[serde(default)]
    pub custom: Option<String>,
}
