//! Client for the remote tabular data source.
//!
//! One `TableClient` serves every table: cursor-based pagination via the
//! opaque `offset` token, bearer-token auth, optional server-side named view.
//! Network and auth failures propagate as errors; nothing is retried.

use std::time::Duration;

use anyhow::{bail, Context};
use serde::Deserialize;
use serde_json::Value;
use url::Url;

use crate::config::AirtableConfig;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Column names as they appear in the remote base.
pub mod fields {
    pub const NAME: &str = "Name";
    pub const BUILDING: &str = "What will you build";
    pub const PAST_WORK: &str = "Past work";
    pub const LINKEDIN: &str = "What's the link to your LinkedIn?";
    pub const EXPERTISE: &str = "What are your areas of expertise you have (select max 4 please)";
    pub const PROFILE_PICTURE: &str = "Profile picture";

    pub const FULL_NAME: &str = "Full name";
    pub const PROJECT: &str = "Project";
    pub const PROJECT_ALT: &str = "😊 Build project name";
    pub const UPDATE_DATE: &str = "Build update date";
    pub const BUILD_GOAL: &str = "🏗 Build goal for week";
    pub const BUILD_URL: &str = "🚢 Build URL";
    pub const ASKS: &str =
        "Would you like to submit a help request or have any asks from community?";
    pub const CUSTOMERS: &str = "How many customers did you test with this week?";
    pub const MILESTONES: &str = "Did you reach a key milestone you want to share?";
}

/// One record as returned by the list endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Record {
    pub id: String,

    #[serde(default, rename = "createdTime")]
    pub created_time: String,

    #[serde(default)]
    pub fields: serde_json::Map<String, Value>,
}

impl Record {
    /// Text value of a field; numbers are rendered as text, other types are None.
    pub fn text(&self, field: &str) -> Option<String> {
        match self.fields.get(field) {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn text_or_empty(&self, field: &str) -> String {
        self.text(field).unwrap_or_default()
    }

    /// Multi-select fields come back as an array of strings; a plain string is
    /// tolerated and wrapped.
    pub fn string_list(&self, field: &str) -> Vec<String> {
        match self.fields.get(field) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str())
                .map(str::to_owned)
                .collect(),
            Some(Value::String(s)) if !s.trim().is_empty() => vec![s.clone()],
            _ => vec![],
        }
    }

    /// URL of the first attachment in an attachment field.
    pub fn attachment_url(&self, field: &str) -> Option<String> {
        self.fields
            .get(field)?
            .as_array()?
            .first()?
            .get("url")?
            .as_str()
            .map(str::to_owned)
    }
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    records: Vec<Record>,
    offset: Option<String>,
}

pub struct TableClient {
    client: reqwest::blocking::Client,
    api_url: String,
    base_id: String,
    api_key: String,
}

impl TableClient {
    pub fn new(config: &AirtableConfig, api_key: String) -> anyhow::Result<Self> {
        if api_key.is_empty() {
            bail!("airtable api key is missing (set airtable.api_key or AIRTABLE_API_KEY)");
        }
        if config.base_id.is_empty() {
            bail!("airtable.base_id is not configured");
        }

        let client = reqwest::blocking::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .context("cannot build http client")?;

        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            base_id: config.base_id.clone(),
            api_key,
        })
    }

    fn table_url(&self, table: &str) -> anyhow::Result<Url> {
        let mut url = Url::parse(&self.api_url)
            .with_context(|| format!("invalid airtable api url: {}", self.api_url))?;
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("airtable api url cannot be a base"))?
            .push(&self.base_id)
            .push(table);
        Ok(url)
    }

    /// Page through the list endpoint until no continuation offset is
    /// returned, accumulating every record in fetch order.
    pub fn list_all(&self, table: &str, view: Option<&str>) -> anyhow::Result<Vec<Record>> {
        let url = self.table_url(table)?;
        let mut records = vec![];
        let mut offset: Option<String> = None;

        loop {
            let mut params: Vec<(&str, &str)> = vec![];
            if let Some(view) = view {
                params.push(("view", view));
            }
            if let Some(ref offset) = offset {
                params.push(("offset", offset));
            }

            let resp = self
                .client
                .get(url.clone())
                .bearer_auth(&self.api_key)
                .query(&params)
                .send()
                .with_context(|| format!("request to table {table:?} failed"))?;

            let status = resp.status();
            if !status.is_success() {
                let body = resp.text().unwrap_or_default();
                bail!("airtable returned {status} for table {table:?}: {body}");
            }

            let page: ListResponse = resp
                .json()
                .with_context(|| format!("malformed response from table {table:?}"))?;

            records.extend(page.records);

            match page.offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }

        log::info!("fetched {} records from table {table:?}", records.len());
        Ok(records)
    }
}
