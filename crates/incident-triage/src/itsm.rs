//! ServiceNow Table API client.
//!
//! Every lookup is a single authenticated GET against
//! `{base_url}/api/now/table/{table}` with the filter as query parameters.
//! Non-2xx is a hard failure; nothing is retried or paginated.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use crate::config::ItsmConfig;
use crate::errors::{TriageError, TriageResult};
use crate::models::{lenient, Incident, Row};

const INCIDENT_TABLE: &str = "incident";
const CMDB_CI_TABLE: &str = "cmdb_ci";

/// Incident and configuration-item lookups used by the assistant.
///
/// Implemented by [`ServiceNowClient`]; tests substitute in-memory trackers.
#[async_trait]
pub trait IncidentTracker: Send + Sync {
    /// Fetch one incident by `sys_id`. Zero rows is `NotFound`.
    async fn get_incident(&self, incident_id: &str) -> TriageResult<Incident>;

    /// Configuration item referenced by an incident.
    async fn get_configuration_item(&self, incident_id: &str) -> TriageResult<Option<String>> {
        Ok(self.get_incident(incident_id).await?.configuration_item)
    }

    /// Application recorded on a `cmdb_ci` row, `None` if the CI does not exist.
    async fn get_application(&self, configuration_item: &str) -> TriageResult<Option<String>>;

    /// All incidents raised against a configuration item. Empty on no matches.
    async fn find_history_incidents(&self, configuration_item: &str)
        -> TriageResult<Vec<Incident>>;
}

/// HTTP client for one ServiceNow instance.
///
/// Holds a single reqwest session (connection pool, TLS setting, timeout)
/// reused across calls.
pub struct ServiceNowClient {
    base_url: String,
    username: String,
    password: String,
    http: Client,
}

impl ServiceNowClient {
    pub fn new(config: &ItsmConfig) -> TriageResult<Self> {
        let http = Client::builder()
            .danger_accept_invalid_certs(!config.verify_tls)
            .timeout(config.timeout())
            .build()
            .map_err(|e| {
                TriageError::Configuration(format!("failed to build ticketing HTTP client: {e}"))
            })?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: config.password.clone(),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/api/now/table/{table}", self.base_url)
    }

    /// GET `table` filtered by `params`, returning the `result` rows.
    ///
    /// # Errors
    ///
    /// - `Transport` on connection failure, timeout, or any non-2xx status
    ///   (the body is not read in that case).
    /// - `MalformedResponse` if a 2xx body is not a table response.
    pub async fn get_rows(&self, table: &str, params: &[(&str, &str)]) -> TriageResult<Vec<Row>> {
        let url = self.table_url(table);

        let response = self
            .http
            .get(&url)
            .basic_auth(&self.username, Some(&self.password))
            .header(reqwest::header::ACCEPT, "application/json")
            .query(params)
            .send()
            .await
            .map_err(|e| TriageError::transport(&url, None, e.to_string()))?;

        let status = response.status();
        debug!(table, status = status.as_u16(), "ticketing response");
        if !status.is_success() {
            return Err(TriageError::transport(
                &url,
                Some(status.as_u16()),
                status
                    .canonical_reason()
                    .unwrap_or("unexpected status")
                    .to_string(),
            ));
        }

        let body: Value = response.json().await.map_err(|e| {
            TriageError::MalformedResponse(format!("{table}: body is not JSON: {e}"))
        })?;
        rows_from_body(table, body)
    }
}

/// Extract the `result` array from a Table API body.
///
/// An absent or `null` `result` yields no rows.
pub fn rows_from_body(table: &str, body: Value) -> TriageResult<Vec<Row>> {
    let Value::Object(mut envelope) = body else {
        return Err(TriageError::MalformedResponse(format!(
            "{table}: expected a JSON object"
        )));
    };

    match envelope.remove("result") {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .into_iter()
            .map(|item| match item {
                Value::Object(row) => Ok(row),
                other => Err(TriageError::MalformedResponse(format!(
                    "{table}: result row is not an object: {other}"
                ))),
            })
            .collect(),
        // Single-record endpoints return an object rather than an array.
        Some(Value::Object(row)) => Ok(vec![row]),
        Some(other) => Err(TriageError::MalformedResponse(format!(
            "{table}: `result` is not an array: {other}"
        ))),
    }
}

#[async_trait]
impl IncidentTracker for ServiceNowClient {
    async fn get_incident(&self, incident_id: &str) -> TriageResult<Incident> {
        let rows = self
            .get_rows(INCIDENT_TABLE, &[("sys_id", incident_id)])
            .await?;
        let first = rows.first().ok_or_else(|| TriageError::NotFound {
            table: INCIDENT_TABLE.to_string(),
            sys_id: incident_id.to_string(),
        })?;
        Incident::from_row(first)
    }

    async fn get_application(&self, configuration_item: &str) -> TriageResult<Option<String>> {
        let rows = self
            .get_rows(CMDB_CI_TABLE, &[("sys_id", configuration_item)])
            .await?;
        Ok(rows
            .into_iter()
            .next()
            .and_then(|mut row| row.remove("application"))
            .and_then(lenient::reference_value))
    }

    async fn find_history_incidents(
        &self,
        configuration_item: &str,
    ) -> TriageResult<Vec<Incident>> {
        let rows = self
            .get_rows(INCIDENT_TABLE, &[("configuration_item", configuration_item)])
            .await?;
        rows.iter().map(Incident::from_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn absent_result_is_empty() {
        assert!(rows_from_body("incident", json!({})).unwrap().is_empty());
        assert!(rows_from_body("incident", json!({ "result": null }))
            .unwrap()
            .is_empty());
        assert!(rows_from_body("incident", json!({ "result": [] }))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn result_rows_are_returned_in_order() {
        let rows = rows_from_body(
            "incident",
            json!({ "result": [{ "sys_id": "a" }, { "sys_id": "b" }] }),
        )
        .unwrap();
        let ids: Vec<_> = rows
            .iter()
            .map(|r| r["sys_id"].as_str().unwrap())
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn non_object_row_is_malformed() {
        let err = rows_from_body("incident", json!({ "result": ["oops"] })).unwrap_err();
        assert!(matches!(err, TriageError::MalformedResponse(_)));
    }

    #[test]
    fn non_object_body_is_malformed() {
        let err = rows_from_body("cmdb_ci", json!([1, 2])).unwrap_err();
        assert!(matches!(err, TriageError::MalformedResponse(_)));
    }

    #[test]
    fn trailing_slash_trimmed_from_base_url() {
        let config = ItsmConfig {
            base_url: "https://acme.service-now.com/".into(),
            username: "u".into(),
            password: "p".into(),
            verify_tls: true,
            timeout_secs: 5,
        };
        let client = ServiceNowClient::new(&config).unwrap();
        assert_eq!(client.base_url(), "https://acme.service-now.com");
        assert_eq!(
            client.table_url("incident"),
            "https://acme.service-now.com/api/now/table/incident"
        );
    }
}
