//! Property discovery through the GA4 Admin API.
//!
//! Used to find the numeric property ids that go into a batch config.

use std::rc::Rc;
use std::time::Duration;

use reqwest::blocking::Client;
use serde::Deserialize;
use tracing::info;

use crate::auth::TokenSource;
use crate::config;
use crate::error::{ExtractError, Result};
use crate::executor::api_error_message;
use crate::models::QueryResult;

const PAGE_SIZE: u32 = 200;

pub const PROPERTIES_PREFIX: &str = "ga4_properties";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertySummary {
    pub account_name: String,
    pub property_id: String,
    pub property_name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountSummariesPage {
    #[serde(default)]
    account_summaries: Vec<AccountSummary>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountSummary {
    #[serde(default)]
    display_name: String,
    #[serde(default)]
    property_summaries: Vec<PropertyEntry>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PropertyEntry {
    property: String,
    #[serde(default)]
    display_name: String,
}

/// Flatten one `accountSummaries` page.
///
/// Returns the properties on the page and the token of the next page, if any.
pub fn parse_account_summaries(
    payload: &serde_json::Value,
) -> Result<(Vec<PropertySummary>, Option<String>)> {
    let page: AccountSummariesPage = serde_json::from_value(payload.clone())
        .map_err(|e| ExtractError::query("*", format!("unexpected accountSummaries response: {}", e)))?;
    let mut out = Vec::new();
    for account in page.account_summaries {
        for prop in account.property_summaries {
            let property_id = prop
                .property
                .rsplit('/')
                .next()
                .unwrap_or_default()
                .to_string();
            out.push(PropertySummary {
                account_name: account.display_name.clone(),
                property_id,
                property_name: prop.display_name,
            });
        }
    }
    let next = page.next_page_token.filter(|t| !t.is_empty());
    Ok((out, next))
}

/// Tabular form for export: `account_name,property_id,property_name`.
pub fn to_table(properties: &[PropertySummary]) -> QueryResult {
    QueryResult::new(
        vec![
            "account_name".to_string(),
            "property_id".to_string(),
            "property_name".to_string(),
        ],
        properties
            .iter()
            .map(|p| {
                vec![
                    p.account_name.clone(),
                    p.property_id.clone(),
                    p.property_name.clone(),
                ]
            })
            .collect(),
    )
}

/// Minimal Admin API client.
pub struct AdminClient {
    client: Client,
    base_url: String,
    tokens: Rc<TokenSource>,
}

impl AdminClient {
    pub fn new(tokens: Rc<TokenSource>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: config::ADMIN_API_BASE.to_string(),
            tokens,
        })
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// List every property visible to the credential, across all accounts.
    pub fn list_properties(&self) -> Result<Vec<PropertySummary>> {
        let url = format!("{}/accountSummaries", self.base_url);
        let mut all = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut req = self
                .client
                .get(&url)
                .bearer_auth(self.tokens.access_token()?)
                .query(&[("pageSize", PAGE_SIZE.to_string())]);
            if let Some(token) = &page_token {
                req = req.query(&[("pageToken", token.as_str())]);
            }

            let resp = req.send()?;
            let status = resp.status();
            let payload: serde_json::Value = resp.json().unwrap_or(serde_json::Value::Null);
            if !status.is_success() {
                return Err(ExtractError::query(
                    "*",
                    api_error_message(&payload).unwrap_or_else(|| format!("HTTP {}", status)),
                ));
            }

            let (props, next) = parse_account_summaries(&payload)?;
            for p in &props {
                info!(account = %p.account_name, property_id = %p.property_id, name = %p.property_name, "property");
            }
            all.extend(props);

            match next {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        info!(total = all.len(), "listed properties");
        Ok(all)
    }
}
