use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Timestamp layout used for every stored date. Fixed width, so text
/// comparison in SQL orders the same way as the timestamps themselves.
pub const DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

pub fn now_timestamp() -> String {
    Utc::now().naive_utc().format(DATE_FORMAT).to_string()
}

pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format(DATE_FORMAT).to_string()
}

/// Turn a human-readable name into a URL-safe identifier:
/// `"Under Review"` becomes `"under-review"`.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;
    for c in name.chars() {
        if c.is_alphanumeric() || c == '_' {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.extend(c.to_lowercase());
        } else if c.is_whitespace() || c == '-' {
            pending_dash = true;
        }
    }
    slug
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Project {
    pub id: i64,
    pub linkname: String,
    pub name: String,
    pub listid: String,
    pub listemail: String,
    pub web_url: String,
    pub scm_url: String,
    pub webscm_url: String,
}

#[derive(Debug, Clone, Default)]
pub struct NewProject {
    pub linkname: String,
    pub name: String,
    pub listid: String,
    pub listemail: String,
    pub web_url: String,
    pub scm_url: String,
    pub webscm_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct State {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub ordering: i32,
    pub action_required: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Person {
    pub id: i64,
    pub name: Option<String>,
    pub email: String,
    pub user_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub is_superuser: bool,
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.username)
    }
}

#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub is_superuser: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Series {
    pub id: i64,
    pub project_id: i64,
    pub name: Option<String>,
    pub date: String,
    pub version: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Patch {
    pub id: i64,
    pub project_id: i64,
    pub msgid: String,
    pub name: String,
    pub date: String,
    pub submitter_id: i64,
    pub delegate_id: Option<i64>,
    pub state_id: i64,
    pub archived: bool,
    pub hash: Option<String>,
    pub commit_ref: Option<String>,
    pub pull_url: Option<String>,
    pub series_id: Option<i64>,
    pub content: String,
    pub diff: Option<String>,
    pub headers: String,
}

/// A patch together with every row it references, as needed to render it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchDetail {
    pub patch: Patch,
    pub project: Project,
    pub submitter: Person,
    pub state: State,
    pub delegate: Option<User>,
    pub series: Option<Series>,
}

/// Input for the ingestion entry point. `series_id` stays `None` for
/// patches that predate series tracking.
#[derive(Debug, Clone, Default)]
pub struct NewPatch {
    pub project_id: i64,
    pub msgid: String,
    pub name: String,
    pub date: Option<String>,
    pub submitter_id: i64,
    pub state_id: i64,
    pub delegate_id: Option<i64>,
    pub series_id: Option<i64>,
    pub content: String,
    pub diff: Option<String>,
    pub headers: String,
}

/// Reference to a row either by numeric id or by a natural key
/// (linkname, email, username depending on the table).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LookupKey {
    Id(i64),
    Name(String),
}

impl LookupKey {
    /// Numeric strings are ids, anything else is a natural key.
    pub fn parse(value: &str) -> Self {
        let value = value.trim();
        match value.parse::<i64>() {
            Ok(id) => Self::Id(id),
            Err(_) => Self::Name(value.to_string()),
        }
    }

    /// Normalize `Name("42")` to `Id(42)`.
    pub fn normalized(&self) -> Self {
        match self {
            Self::Id(id) => Self::Id(*id),
            Self::Name(name) => Self::parse(name),
        }
    }
}

impl fmt::Display for LookupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{}", id),
            Self::Name(name) => f.write_str(name),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderField {
    #[default]
    Id,
    Name,
    Date,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PatchOrder {
    pub field: OrderField,
    pub descending: bool,
}

impl FromStr for PatchOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (descending, field) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let field = match field {
            "id" => OrderField::Id,
            "name" => OrderField::Name,
            "date" => OrderField::Date,
            _ => {
                return Err(format!(
                    "Invalid ordering '{}'. Valid values: id, name, date (optionally prefixed with '-')",
                    s
                ));
            }
        };
        Ok(Self { field, descending })
    }
}

/// Store-level filter for patch listings. All set clauses are AND-ed;
/// `states` is OR-ed within itself.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PatchFilter {
    pub states: Vec<String>,
    pub project: Option<LookupKey>,
    pub submitter: Option<LookupKey>,
    pub delegate: Option<LookupKey>,
    pub archived: Option<bool>,
    pub q: Option<String>,
    pub since: Option<NaiveDateTime>,
    pub before: Option<NaiveDateTime>,
    pub order: PatchOrder,
}

/// Partial update of a patch. The outer `Option` says whether the field
/// was supplied at all; the inner one distinguishes an explicit `null`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PatchUpdate {
    #[serde(default, deserialize_with = "present")]
    pub state: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub delegate: Option<Option<LookupKey>>,
    #[serde(default, deserialize_with = "present")]
    pub archived: Option<Option<bool>>,
    #[serde(default, deserialize_with = "present")]
    pub commit_ref: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub pull_url: Option<Option<String>>,
}

impl PatchUpdate {
    pub fn is_empty(&self) -> bool {
        self.state.is_none()
            && self.delegate.is_none()
            && self.archived.is_none()
            && self.commit_ref.is_none()
            && self.pull_url.is_none()
    }

    /// Names of the supplied fields, for logging.
    pub fn changed_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.state.is_some() {
            fields.push("state");
        }
        if self.delegate.is_some() {
            fields.push("delegate");
        }
        if self.archived.is_some() {
            fields.push("archived");
        }
        if self.commit_ref.is_some() {
            fields.push("commit_ref");
        }
        if self.pull_url.is_some() {
            fields.push("pull_url");
        }
        fields
    }
}

fn present<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
