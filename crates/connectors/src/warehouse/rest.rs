//! REST warehouse client.
//!
//! Speaks the synchronous-query REST surface of the analytics warehouse:
//! `POST /projects/{project}/queries` submits the bound query and returns the
//! first result page together with execution metadata; further pages are
//! fetched lazily via `GET /projects/{project}/queries/{jobId}?pageToken=...`
//! as the row stream is polled. Cell values arrive as strings and are decoded
//! by schema field type.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;

use quarry_common::models::{ParamMap, ResponseDetails, Row};
use quarry_error::{ErrorCode, ErrorContext, QuarryError, Result};

use crate::credentials::CredentialsProvider;

use super::{QueryStream, StreamingQuery, Warehouse};

/// Response headers worth relaying to the caller.
const RELAYED_HEADERS: [&str; 2] = ["cache-control", "retry-after"];

pub struct RestWarehouse {
    api_url: String,
    client: reqwest::Client,
    credentials: Arc<dyn CredentialsProvider>,
}

impl RestWarehouse {
    pub fn new(api_url: impl Into<String>, credentials: Arc<dyn CredentialsProvider>) -> Self {
        Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
            credentials,
        }
    }
}

#[async_trait]
impl Warehouse for RestWarehouse {
    async fn run_streaming_query(&self, query: StreamingQuery) -> Result<QueryStream> {
        let token = self.credentials.access_token().await?;

        let url = format!("{}/projects/{}/queries", self.api_url, query.project);
        let body = json!({
            "query": query.sql,
            "useLegacySql": false,
            "defaultDataset": { "datasetId": query.dataset },
            "maxResults": query.max_results,
            "parameterMode": "NAMED",
            "queryParameters": wire_parameters(&query.params),
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(token.expose_secret())
            .json(&body)
            .send()
            .await?;

        let relayed = relayed_headers(response.headers());

        if !response.status().is_success() {
            return Err(execution_error(response).await);
        }

        let page: ResultPage = response.json().await?;

        if page.job_complete == Some(false) {
            return Err(QuarryError::new(
                ErrorCode::ExecutionFailed,
                "Warehouse did not complete the query synchronously",
            )
            .with_context(ErrorContext::Warehouse {
                status: None,
                job_id: page.job_reference.and_then(|j| j.job_id),
            }));
        }

        let job_id = page.job_reference.as_ref().and_then(|j| j.job_id.clone());
        let details = ResponseDetails {
            job_id: job_id.clone(),
            total_bytes_processed: page.total_bytes_processed.as_ref().and_then(Lenient::as_u64),
            cache_hit: page.cache_hit,
            total_rows: page.total_rows.as_ref().and_then(Lenient::as_u64),
        };

        let schema = page.schema.clone().ok_or_else(|| {
            QuarryError::new(ErrorCode::ResponseDecode, "Warehouse response missing schema")
        })?;

        let mut buffered = VecDeque::with_capacity(page.rows.len());
        for raw in page.rows {
            buffered.push_back(decode_row(&schema, raw)?);
        }

        let cursor = PageCursor {
            client: self.client.clone(),
            api_url: self.api_url.clone(),
            project: query.project.clone(),
            token,
            job_id,
            schema,
            max_results: query.max_results,
            buffered,
            next_page: page.page_token,
        };

        let rows = futures::stream::try_unfold(cursor, |mut cursor| async move {
            loop {
                if let Some(row) = cursor.buffered.pop_front() {
                    return Ok(Some((row, cursor)));
                }
                let Some(token) = cursor.next_page.take() else {
                    return Ok(None);
                };
                cursor.fetch_page(&token).await?;
            }
        })
        .boxed();

        Ok(QueryStream {
            rows,
            details,
            headers: relayed,
        })
    }
}

struct PageCursor {
    client: reqwest::Client,
    api_url: String,
    project: String,
    token: SecretString,
    job_id: Option<String>,
    schema: Schema,
    max_results: u64,
    buffered: VecDeque<Row>,
    next_page: Option<String>,
}

impl PageCursor {
    async fn fetch_page(&mut self, page_token: &str) -> Result<()> {
        let job_id = self.job_id.clone().ok_or_else(|| {
            QuarryError::new(
                ErrorCode::ResponseDecode,
                "Warehouse returned a page token without a job reference",
            )
        })?;

        let url = format!("{}/projects/{}/queries/{}", self.api_url, self.project, job_id);
        let response = self
            .client
            .get(&url)
            .bearer_auth(self.token.expose_secret())
            .query(&[
                ("pageToken", page_token.to_string()),
                ("maxResults", self.max_results.to_string()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(execution_error(response).await);
        }

        let page: ResultPage = response.json().await?;
        self.next_page = page.page_token;
        for raw in page.rows {
            self.buffered.push_back(decode_row(&self.schema, raw)?);
        }
        Ok(())
    }
}

/// Builds an `ExecutionFailed` error carrying the upstream status. The bearer
/// token never reaches the message.
async fn execution_error(response: reqwest::Response) -> QuarryError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let detail = body.chars().take(512).collect::<String>();
    QuarryError::new(
        ErrorCode::ExecutionFailed,
        format!("Warehouse query failed with status {}: {}", status, detail),
    )
    .with_context(ErrorContext::Warehouse {
        status: Some(status.as_u16()),
        job_id: None,
    })
}

fn wire_parameters(params: &ParamMap) -> Vec<serde_json::Value> {
    params
        .iter()
        .map(|(name, value)| {
            json!({
                "name": name,
                "parameterType": { "type": value.type_name() },
                "parameterValue": { "value": value.render() },
            })
        })
        .collect()
}

fn relayed_headers(headers: &reqwest::header::HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter(|(name, _)| {
            let name = name.as_str();
            name.starts_with("x-ratelimit-") || RELAYED_HEADERS.contains(&name)
        })
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResultPage {
    job_reference: Option<JobReference>,
    job_complete: Option<bool>,
    schema: Option<Schema>,
    #[serde(default)]
    rows: Vec<RawRow>,
    total_rows: Option<Lenient>,
    total_bytes_processed: Option<Lenient>,
    cache_hit: Option<bool>,
    page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    job_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct Schema {
    fields: Vec<SchemaField>,
}

#[derive(Debug, Clone, Deserialize)]
struct SchemaField {
    name: String,
    #[serde(rename = "type")]
    field_type: String,
    #[serde(default)]
    mode: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawRow {
    f: Vec<RawCell>,
}

#[derive(Debug, Deserialize)]
struct RawCell {
    v: serde_json::Value,
}

/// Counters the warehouse serializes either as JSON numbers or strings.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Lenient {
    Num(u64),
    Str(String),
}

impl Lenient {
    fn as_u64(&self) -> Option<u64> {
        match self {
            Lenient::Num(n) => Some(*n),
            Lenient::Str(s) => s.parse().ok(),
        }
    }
}

fn decode_row(schema: &Schema, raw: RawRow) -> Result<Row> {
    if raw.f.len() != schema.fields.len() {
        return Err(QuarryError::new(
            ErrorCode::ResponseDecode,
            format!(
                "Row arity {} does not match schema arity {}",
                raw.f.len(),
                schema.fields.len()
            ),
        ));
    }

    let mut row = Row::new();
    for (field, cell) in schema.fields.iter().zip(raw.f) {
        row.insert(field.name.clone(), decode_cell(field, cell.v));
    }
    Ok(row)
}

fn decode_cell(field: &SchemaField, value: serde_json::Value) -> serde_json::Value {
    if field.mode.as_deref() == Some("REPEATED") {
        if let serde_json::Value::Array(items) = value {
            let decoded = items
                .into_iter()
                .map(|item| {
                    // Repeated cells nest as {"v": scalar}
                    let inner = match item {
                        serde_json::Value::Object(mut obj) => {
                            obj.remove("v").unwrap_or(serde_json::Value::Null)
                        }
                        other => other,
                    };
                    decode_scalar(&field.field_type, inner)
                })
                .collect();
            return serde_json::Value::Array(decoded);
        }
        return serde_json::Value::Array(vec![]);
    }
    decode_scalar(&field.field_type, value)
}

fn decode_scalar(field_type: &str, value: serde_json::Value) -> serde_json::Value {
    let serde_json::Value::String(text) = value else {
        return value;
    };

    match field_type {
        "INTEGER" | "INT64" => text
            .parse::<i64>()
            .map(serde_json::Value::from)
            .unwrap_or(serde_json::Value::String(text)),
        "FLOAT" | "FLOAT64" | "NUMERIC" => text
            .parse::<f64>()
            .map(serde_json::Value::from)
            .unwrap_or(serde_json::Value::String(text)),
        "BOOLEAN" | "BOOL" => match text.as_str() {
            "true" => serde_json::Value::Bool(true),
            "false" => serde_json::Value::Bool(false),
            _ => serde_json::Value::String(text),
        },
        _ => serde_json::Value::String(text),
    }
}
