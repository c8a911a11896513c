//! Google Sheets `values:append` client.

use chrono::{Local, NaiveDate};
use jobflow_core::JobRecord;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::{SinkError, SinkResult};
use crate::sink::{AccessToken, BoxFuture, JobSink};

use super::config::SheetsConfig;

/// Body of a `values:append` call.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppendRequest {
    pub range: String,
    pub major_dimension: &'static str,
    pub values: Vec<Vec<String>>,
}

impl AppendRequest {
    /// A single-row append for `record`.
    pub fn for_record(range: &str, record: &JobRecord, today: NaiveDate) -> Self {
        Self {
            range: range.to_string(),
            major_dimension: "ROWS",
            values: vec![record.to_row(today).to_vec()],
        }
    }
}

/// What the API reports about an append.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppendResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spreadsheet_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_range: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updates: Option<UpdatedRange>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatedRange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_range: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_rows: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_columns: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_cells: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Maps an HTTP status and body to the append outcome.
///
/// 401 becomes `AuthExpired`; any other non-2xx becomes an `Api` error
/// carrying the API's message (or the raw body); a 2xx that is not the
/// expected JSON is an `InvalidResponse`.
pub fn classify_response(status: u16, body: &str) -> SinkResult<AppendResponse> {
    if status == 401 {
        return Err(SinkError::auth_expired(format!(
            "Sheets API rejected the access token: {}",
            error_message(body)
        )));
    }

    if !(200..300).contains(&status) {
        return Err(SinkError::api(format!(
            "Sheets API error ({status}): {}",
            error_message(body)
        ))
        .with_status(status));
    }

    serde_json::from_str(body).map_err(|e| {
        SinkError::invalid_response(format!("unexpected Sheets API response: {e}"))
            .with_status(status)
            .with_source(e)
    })
}

fn error_message(body: &str) -> String {
    match serde_json::from_str::<ApiErrorBody>(body) {
        Ok(parsed) => parsed.error.message,
        Err(_) => body.trim().to_string(),
    }
}

/// Appends job rows to a spreadsheet.
#[derive(Debug)]
pub struct SheetsClient {
    config: SheetsConfig,
    http_client: reqwest::Client,
}

impl SheetsClient {
    pub fn new(config: SheetsConfig) -> SinkResult<Self> {
        config.validate()?;

        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| {
                SinkError::internal(format!("failed to create HTTP client: {e}")).with_source(e)
            })?;

        Ok(Self {
            config,
            http_client,
        })
    }

    pub fn config(&self) -> &SheetsConfig {
        &self.config
    }

    #[instrument(skip_all, fields(url = %record.url))]
    async fn append_row(
        &self,
        record: &JobRecord,
        token: &AccessToken,
    ) -> SinkResult<AppendResponse> {
        let today = Local::now().date_naive();
        let request = AppendRequest::for_record(&self.config.range, record, today);
        let body = serde_json::to_string(&request).map_err(|e| {
            SinkError::internal(format!("failed to serialize append request: {e}"))
                .with_source(e)
        })?;

        let response = self
            .http_client
            .post(self.config.append_url())
            .bearer_auth(token.secret())
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| {
                SinkError::network(format!("append request failed: {e}")).with_source(e)
            })?;

        let status = response.status().as_u16();
        let text = response.text().await.map_err(|e| {
            SinkError::network(format!("failed to read append response: {e}")).with_source(e)
        })?;

        let result = classify_response(status, &text)?;
        debug!(
            status,
            range = result
                .updates
                .as_ref()
                .and_then(|u| u.updated_range.as_deref())
                .unwrap_or(""),
            "Appended row"
        );
        Ok(result)
    }
}

impl JobSink for SheetsClient {
    fn name(&self) -> &str {
        "google-sheets"
    }

    fn append<'a>(
        &'a self,
        record: &'a JobRecord,
        token: &'a AccessToken,
    ) -> BoxFuture<'a, SinkResult<AppendResponse>> {
        Box::pin(self.append_row(record, token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SinkErrorCode;
    use crate::test_http::{FakeResponse, closed_port_url, spawn_fake_server};
    use jobflow_core::SourcePlatform;

    fn record() -> JobRecord {
        JobRecord::new("https://www.linkedin.com/jobs/view/123")
            .with_title("Rust Engineer")
            .with_company("Acme")
            .with_location("Remote")
            .with_platform(SourcePlatform::LinkedIn)
    }

    fn client(base: &str) -> SheetsClient {
        SheetsClient::new(
            SheetsConfig::new("sheet-123").with_api_base(format!("{base}/v4/spreadsheets")),
        )
        .unwrap()
    }

    #[test]
    fn request_body() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        let request = AppendRequest::for_record("Sheet1!A1", &record(), today);

        insta::assert_json_snapshot!(request, @r#"
        {
          "range": "Sheet1!A1",
          "majorDimension": "ROWS",
          "values": [
            [
              "Rust Engineer",
              "Acme",
              "Remote",
              "",
              "https://www.linkedin.com/jobs/view/123",
              "2024-03-15",
              "Saved",
              ""
            ]
          ]
        }
        "#);
    }

    #[test]
    fn classify_success() {
        let body = r#"{
            "spreadsheetId": "sheet-123",
            "tableRange": "Sheet1!A1:H4",
            "updates": {"updatedRange": "Sheet1!A5:H5", "updatedRows": 1, "updatedCells": 8}
        }"#;
        let response = classify_response(200, body).unwrap();
        assert_eq!(response.spreadsheet_id.as_deref(), Some("sheet-123"));
        let updates = response.updates.unwrap();
        assert_eq!(updates.updated_rows, Some(1));
        assert_eq!(updates.updated_range.as_deref(), Some("Sheet1!A5:H5"));
    }

    #[test]
    fn classify_unauthorized() {
        let err = classify_response(
            401,
            r#"{"error":{"code":401,"message":"Request had invalid authentication credentials."}}"#,
        )
        .unwrap_err();
        assert!(err.is_auth_expired());
        assert!(err.message().contains("invalid authentication credentials"));
    }

    #[test]
    fn classify_api_error_uses_message() {
        let err = classify_response(
            403,
            r#"{"error":{"code":403,"message":"The caller does not have permission"}}"#,
        )
        .unwrap_err();
        assert_eq!(err.code(), SinkErrorCode::Api);
        assert_eq!(err.status(), Some(403));
        assert_eq!(
            err.message(),
            "Sheets API error (403): The caller does not have permission"
        );

        let err = classify_response(502, "  Bad Gateway\n").unwrap_err();
        assert_eq!(err.message(), "Sheets API error (502): Bad Gateway");
    }

    #[test]
    fn classify_garbage_success() {
        let err = classify_response(200, "<html>").unwrap_err();
        assert_eq!(err.code(), SinkErrorCode::InvalidResponse);
    }

    #[tokio::test]
    async fn append_posts_row() {
        let (base, request) = spawn_fake_server(FakeResponse::json(
            200,
            r#"{"spreadsheetId":"sheet-123","updates":{"updatedRows":1}}"#,
        ))
        .await;

        let response = client(&base)
            .append(&record(), &AccessToken::new("ya29.token"))
            .await
            .unwrap();
        assert_eq!(response.spreadsheet_id.as_deref(), Some("sheet-123"));

        let request = request.await.unwrap();
        assert_eq!(request.method, "POST");
        assert_eq!(
            request.target,
            "/v4/spreadsheets/sheet-123/values/Sheet1%21A1:append?valueInputOption=USER_ENTERED"
        );
        assert_eq!(request.header("authorization"), Some("Bearer ya29.token"));
        assert_eq!(request.header("content-type"), Some("application/json"));
        assert!(request.body.contains(r#""majorDimension":"ROWS""#));
        assert!(request.body.contains("Rust Engineer"));
    }

    #[tokio::test]
    async fn append_reports_expired_token() {
        let (base, _request) = spawn_fake_server(FakeResponse::json(
            401,
            r#"{"error":{"code":401,"message":"expired"}}"#,
        ))
        .await;

        let err = client(&base)
            .append(&record(), &AccessToken::new("stale"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), SinkErrorCode::AuthExpired);
    }

    #[tokio::test]
    async fn append_reports_server_error() {
        let (base, _request) = spawn_fake_server(FakeResponse::json(
            500,
            r#"{"error":{"code":500,"message":"Internal error encountered."}}"#,
        ))
        .await;

        let err = client(&base)
            .append(&record(), &AccessToken::new("token"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), SinkErrorCode::Api);
        assert_eq!(err.status(), Some(500));
    }

    #[tokio::test]
    async fn append_without_server_is_network_error() {
        let base = closed_port_url().await;
        let err = client(&base)
            .append(&record(), &AccessToken::new("token"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), SinkErrorCode::Network);
    }

    #[test]
    fn rejects_invalid_config() {
        let err = SheetsClient::new(SheetsConfig::new("")).unwrap_err();
        assert_eq!(err.code(), SinkErrorCode::Configuration);
    }
}
