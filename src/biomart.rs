use std::thread;
use std::time::Duration;

use regex::Regex;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::Serialize;
use tracing::debug;

use crate::error::KiraError;

/// A dataset that exists on a BioMart server, ready to be queried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatasetHandle {
    pub server_url: String,
    pub mart: String,
    pub virtual_schema: String,
    pub dataset_id: String,
    pub display_name: Option<String>,
}

pub trait BiomartClient: Send + Sync {
    fn resolve_dataset(
        &self,
        server_url: &str,
        dataset_id: &str,
    ) -> Result<DatasetHandle, KiraError>;
    fn query(&self, dataset: &DatasetHandle, attributes: &[&str]) -> Result<String, KiraError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MartLocation {
    pub name: String,
    pub virtual_schema: String,
}

#[derive(Clone)]
pub struct BiomartHttpClient {
    client: Client,
}

impl BiomartHttpClient {
    pub fn new(timeout: Duration) -> Result<Self, KiraError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("kira-ga/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| KiraError::BiomartHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|err| KiraError::BiomartHttp(err.to_string()))?;
        Ok(Self { client })
    }

    fn service_url(server_url: &str) -> String {
        format!("{}/martservice", server_url.trim_end_matches('/'))
    }

    fn handle_status(
        response: reqwest::blocking::Response,
    ) -> Result<reqwest::blocking::Response, KiraError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response
            .text()
            .unwrap_or_else(|_| "BioMart request failed".to_string());
        Err(KiraError::BiomartStatus { status, message })
    }

    fn get_text(&self, url: &str, query: &[(&str, &str)]) -> Result<String, KiraError> {
        debug!(url, ?query, "biomart GET");
        let response = self.send_with_retries(|| self.client.get(url).query(query))?;
        let response = Self::handle_status(response)?;
        response
            .text()
            .map_err(|err| KiraError::BiomartHttp(err.to_string()))
    }

    fn send_with_retries<F>(
        &self,
        mut make_req: F,
    ) -> Result<reqwest::blocking::Response, KiraError>
    where
        F: FnMut() -> reqwest::blocking::RequestBuilder,
    {
        const MAX_RETRIES: usize = 3;
        const BASE_DELAY_MS: u64 = 200;
        let mut attempt = 0usize;
        loop {
            let response = make_req().send();
            match response {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < MAX_RETRIES && is_retryable_status(status) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        debug!(status, delay_ms = delay, "retryable status from BioMart");
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < MAX_RETRIES && is_retryable_error(&err) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        debug!(error = %err, delay_ms = delay, "retryable transport error");
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Err(KiraError::BiomartHttp(err.to_string()));
                }
            }
        }
    }
}

impl BiomartClient for BiomartHttpClient {
    fn resolve_dataset(
        &self,
        server_url: &str,
        dataset_id: &str,
    ) -> Result<DatasetHandle, KiraError> {
        let url = Self::service_url(server_url);
        let registry = self.get_text(&url, &[("type", "registry")])?;
        let marts = parse_registry(&registry)?;
        if marts.is_empty() {
            return Err(KiraError::BiomartQuery(format!(
                "registry at {url} lists no marts"
            )));
        }

        for mart in marts {
            let listing = self.get_text(&url, &[("type", "datasets"), ("mart", &mart.name)])?;
            if let Some(display_name) = find_dataset(&listing, dataset_id) {
                return Ok(DatasetHandle {
                    server_url: server_url.to_string(),
                    mart: mart.name,
                    virtual_schema: mart.virtual_schema,
                    dataset_id: dataset_id.to_string(),
                    display_name,
                });
            }
        }

        Err(KiraError::DatasetNotFound {
            dataset: dataset_id.to_string(),
            server: server_url.to_string(),
        })
    }

    fn query(&self, dataset: &DatasetHandle, attributes: &[&str]) -> Result<String, KiraError> {
        let url = Self::service_url(&dataset.server_url);
        let xml = build_query_xml(dataset, attributes);
        debug!(url, dataset = %dataset.dataset_id, attributes = attributes.len(), "biomart query");
        let response = self.send_with_retries(|| self.client.post(&url).form(&[("query", &xml)]))?;
        let response = Self::handle_status(response)?;
        let body = response
            .text()
            .map_err(|err| KiraError::BiomartHttp(err.to_string()))?;
        check_query_body(body)
    }
}

/// Visible marts listed by a `type=registry` response.
pub fn parse_registry(xml: &str) -> Result<Vec<MartLocation>, KiraError> {
    let location_re = Regex::new(r"<MartURLLocation\b([^>]*)>")
        .map_err(|err| KiraError::BiomartQuery(err.to_string()))?;
    let attr_re = Regex::new(r#"(\w+)\s*=\s*"([^"]*)""#)
        .map_err(|err| KiraError::BiomartQuery(err.to_string()))?;

    let mut marts = Vec::new();
    for location in location_re.captures_iter(xml) {
        let mut name = None;
        let mut virtual_schema = "default".to_string();
        let mut visible = true;
        for attr in attr_re.captures_iter(&location[1]) {
            match &attr[1] {
                "name" => name = Some(attr[2].to_string()),
                "serverVirtualSchema" if !attr[2].is_empty() => {
                    virtual_schema = attr[2].to_string()
                }
                "visible" => visible = &attr[2] != "0",
                _ => {}
            }
        }
        if let Some(name) = name.filter(|_| visible) {
            marts.push(MartLocation {
                name,
                virtual_schema,
            });
        }
    }
    Ok(marts)
}

/// Looks up `dataset_id` in a `type=datasets` listing. Returns the display
/// name (if any) when the dataset is present.
pub fn find_dataset(listing: &str, dataset_id: &str) -> Option<Option<String>> {
    listing.lines().find_map(|line| {
        let mut columns = line.split('\t');
        let _kind = columns.next()?;
        let name = columns.next()?;
        if name.trim() != dataset_id {
            return None;
        }
        let display = columns
            .next()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());
        Some(display)
    })
}

pub fn build_query_xml(dataset: &DatasetHandle, attributes: &[&str]) -> String {
    let mut xml = String::from(r#"<?xml version="1.0" encoding="UTF-8"?><!DOCTYPE Query>"#);
    xml.push_str(&format!(
        r#"<Query virtualSchemaName="{}" formatter="TSV" header="0" uniqueRows="1" count="" datasetConfigVersion="0.6">"#,
        escape_attr(&dataset.virtual_schema)
    ));
    xml.push_str(&format!(
        r#"<Dataset name="{}" interface="default">"#,
        escape_attr(&dataset.dataset_id)
    ));
    for attribute in attributes {
        xml.push_str(&format!(r#"<Attribute name="{}"/>"#, escape_attr(attribute)));
    }
    xml.push_str("</Dataset></Query>");
    xml
}

/// BioMart reports query problems in-band with a 200 status.
fn check_query_body(body: String) -> Result<String, KiraError> {
    let head = body.trim_start();
    if head.starts_with("Query ERROR") || head.starts_with("ERROR") {
        let message = head.lines().next().unwrap_or(head).trim().to_string();
        return Err(KiraError::BiomartQuery(message));
    }
    Ok(body)
}

fn escape_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 408 | 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}
