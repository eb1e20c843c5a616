// Request-review API over the authenticated client

use bytes::Bytes;
use reqwest::header::ACCEPT;
use serde_json::{json, Value};
use std::sync::Arc;

use super::decode::{decode_list, decode_record, ActionReply};
use super::types::{DocumentKind, Permohonan, PermohonanPage, StatusCounts};
use crate::error::{ClientError, Result};
use crate::http_client::AuthenticatedHttpClient;
use crate::transport::ApiRequest;

/// Default page size used by the console
pub const DEFAULT_PER_PAGE: u32 = 20;

const XLSX_MIME: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// Public disk prefix for stored upload paths
const STORAGE_PREFIX: &str = "/storage/";

/// Staff operations on legalization requests
pub struct PermohonanApi {
    client: Arc<AuthenticatedHttpClient>,
}

impl PermohonanApi {
    pub fn new(client: Arc<AuthenticatedHttpClient>) -> Self {
        Self { client }
    }

    /// List requests
    pub async fn list(&self, per_page: u32) -> Result<PermohonanPage> {
        let request = ApiRequest::get("/api/permohonan/show").query("per_page", per_page);
        let body: Value = self.client.execute_json(request).await?;
        let page = decode_list(&body)?;
        tracing::debug!(count = page.items.len(), "Loaded requests");
        Ok(page)
    }

    pub async fn get(&self, id: u64) -> Result<Permohonan> {
        let body: Value = self
            .client
            .get_json(&format!("/api/permohonan/{}", id))
            .await?;
        decode_record(&body)
    }

    /// Submit a new request
    pub async fn create(&self, fields: &Value) -> Result<Permohonan> {
        let request = ApiRequest::post("/api/permohonan").json(fields)?;
        let body: Value = self.client.execute_json(request).await?;
        let item: Permohonan = decode_record(&body)?;
        tracing::info!("Created request #{}", item.id);
        Ok(item)
    }

    /// Mark a request as verified. Only waiting requests qualify.
    pub async fn verify(&self, id: u64) -> Result<String> {
        let item = self.get(id).await?;
        if !item.can_review() {
            return Err(not_reviewable("diverifikasi"));
        }

        tracing::info!("Verifying request #{}", id);
        let request = ApiRequest::post(format!("/api/permohonan/{}/verifikasi", id));
        self.action(request)
            .await
            .map(|msg| msg.unwrap_or_else(|| format!("Permohonan #{} berhasil diverifikasi", id)))
    }

    /// Reject a request. The reason is mandatory.
    pub async fn reject(&self, id: u64, reason: &str) -> Result<String> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(ClientError::Config(
                "Harap masukkan alasan penolakan".to_string(),
            ));
        }

        let item = self.get(id).await?;
        if !item.can_review() {
            return Err(not_reviewable("ditolak"));
        }

        tracing::info!("Rejecting request #{}", id);
        let request = ApiRequest::post(format!("/api/permohonan/{}/tolak", id))
            .json(&json!({ "alasan": reason, "catatan": reason }))?;
        self.action(request)
            .await
            .map(|msg| msg.unwrap_or_else(|| format!("Permohonan #{} telah ditolak", id)))
    }

    /// Update fields of a request
    pub async fn update(&self, id: u64, fields: &Value) -> Result<Permohonan> {
        let request = ApiRequest::put(format!("/api/permohonan/{}", id)).json(fields)?;
        let body: Value = self.client.execute_json(request).await?;
        decode_record(&body)
    }

    pub async fn delete(&self, id: u64) -> Result<()> {
        self.client
            .execute(ApiRequest::delete(format!("/api/permohonan/{}", id)))
            .await?;
        Ok(())
    }

    /// Spreadsheet export of all requests (xlsx bytes)
    pub async fn export(&self) -> Result<Bytes> {
        let request = ApiRequest::post("/api/permohonan/export")
            .json(&json!({}))?
            .header(ACCEPT, &format!("{}, application/json", XLSX_MIME))?;
        let response = self.client.execute(request).await?;
        tracing::info!(bytes = response.body.len(), "Export downloaded");
        Ok(response.body)
    }

    /// Fetch one of the request's stored documents
    pub async fn download_document(&self, item: &Permohonan, kind: DocumentKind) -> Result<Bytes> {
        let location = item.document(kind).ok_or_else(|| {
            ClientError::Config("File tidak tersedia untuk didownload".to_string())
        })?;

        let response = self
            .client
            .execute(ApiRequest::get(document_path(location)))
            .await?;
        tracing::info!(
            bytes = response.body.len(),
            "Downloaded {:?} document of request #{}",
            kind,
            item.id
        );
        Ok(response.body)
    }

    /// Per-status counts over the current list
    pub async fn stats(&self, per_page: u32) -> Result<StatusCounts> {
        let page = self.list(per_page).await?;
        Ok(StatusCounts::tally(&page.items))
    }

    /// POST an action; a 2xx with `success: false` is still a failure
    async fn action(&self, request: ApiRequest) -> Result<Option<String>> {
        let response = self.client.execute(request).await?;
        let reply: ActionReply = if response.body.is_empty() {
            ActionReply {
                success: None,
                message: None,
            }
        } else {
            response.json()?
        };

        if reply.success == Some(false) {
            return Err(ClientError::Api {
                status: response.status.as_u16(),
                message: reply
                    .message
                    .unwrap_or_else(|| "Request was not processed".to_string()),
                response: Box::new(response),
            });
        }
        Ok(reply.message)
    }
}

fn not_reviewable(action: &str) -> ClientError {
    ClientError::Config(format!(
        "Hanya permohonan dengan status \"Menunggu\" yang dapat {}",
        action
    ))
}

/// Request path for a stored document. Absolute URLs pass through; bare
/// upload paths live under the public storage disk.
fn document_path(location: &str) -> String {
    let location = location.trim();
    if location.starts_with("http://") || location.starts_with("https://") || location.starts_with('/') {
        location.to_string()
    } else {
        format!("{}{}", STORAGE_PREFIX, location)
    }
}
