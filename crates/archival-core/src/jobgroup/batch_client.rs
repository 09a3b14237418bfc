//! Client for the external batch-processing endpoint (§4.8): upload an
//! input file, create a batch job against it, poll its status, and fetch
//! the output file once the remote side marks it complete. The surface
//! mirrors the teacher's payment gateway clients (`payment/gateways/*`) —
//! a thin `reqwest`-backed struct per external collaborator, errors
//! mapped into `Error::ExternalApi`/`Error::Network` rather than leaking
//! `reqwest::Error`.

use crate::{Error, Result};
use reqwest::multipart;
use serde::Deserialize;
use serde_json::{json, Value as Json};

#[derive(Debug, Clone)]
pub struct BatchApiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchStatus {
    pub id: String,
    pub status: String,
    pub output_file_id: Option<String>,
}

impl BatchApiClient {
    pub fn new(base_url: String, api_key: Option<String>) -> Self {
        Self { http: reqwest::Client::new(), base_url, api_key }
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    /// Upload a line-delimited JSON file with `purpose=batch`, returning the
    /// remote file id.
    pub async fn upload_file(&self, filename: &str, data: Vec<u8>) -> Result<String> {
        let part = multipart::Part::bytes(data).file_name(filename.to_string());
        let form = multipart::Form::new().text("purpose", "batch").part("file", part);

        let request = self.authed(self.http.post(format!("{}/files", self.base_url))).multipart(form);
        let response = request.send().await.map_err(|e| Error::external_api(e.to_string()))?;
        ensure_success(&response)?;

        let body: Json = response.json().await.map_err(|e| Error::external_api(e.to_string()))?;
        body.get("id")
            .and_then(Json::as_str)
            .map(|s| s.to_string())
            .ok_or_else(|| Error::external_api("file upload response missing id"))
    }

    /// Create a batch against a previously uploaded input file.
    pub async fn create_batch(&self, input_file_id: &str, metadata: Json) -> Result<BatchStatus> {
        let body = json!({
            "input_file_id": input_file_id,
            "endpoint": "/v1/chat/completions",
            "completion_window": "24h",
            "metadata": metadata,
        });

        let request = self.authed(self.http.post(format!("{}/batches", self.base_url))).json(&body);
        let response = request.send().await.map_err(|e| Error::external_api(e.to_string()))?;
        ensure_success(&response)?;

        response.json::<BatchStatus>().await.map_err(|e| Error::external_api(e.to_string()))
    }

    pub async fn get_batch(&self, external_id: &str) -> Result<BatchStatus> {
        let request = self.authed(self.http.get(format!("{}/batches/{}", self.base_url, external_id)));
        let response = request.send().await.map_err(|e| Error::external_api(e.to_string()))?;
        ensure_success(&response)?;

        response.json::<BatchStatus>().await.map_err(|e| Error::external_api(e.to_string()))
    }

    pub async fn get_file_content(&self, file_id: &str) -> Result<Vec<u8>> {
        let request = self.authed(self.http.get(format!("{}/files/{}/content", self.base_url, file_id)));
        let response = request.send().await.map_err(|e| Error::external_api(e.to_string()))?;
        ensure_success(&response)?;

        let bytes = response.bytes().await.map_err(|e| Error::external_api(e.to_string()))?;
        Ok(bytes.to_vec())
    }

    pub async fn cancel_batch(&self, external_id: &str) -> Result<()> {
        let request = self.authed(self.http.post(format!("{}/batches/{}/cancel", self.base_url, external_id)));
        let response = request.send().await.map_err(|e| Error::external_api(e.to_string()))?;
        ensure_success(&response)?;
        Ok(())
    }
}

fn ensure_success(response: &reqwest::Response) -> Result<()> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    if status.as_u16() == 429 || status.is_server_error() {
        Err(Error::external_api(format!("batch api returned {}", status)))
    } else {
        Err(Error::Other(format!("batch api rejected request: {}", status)))
    }
}
