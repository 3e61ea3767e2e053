use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use std::time::Duration;

use super::QuotaDirectory;
use crate::error::DirectoryError;
use crate::models::ClientQuota;

// Looks clients up over HTTP: GET {base}/clients/{id}
#[derive(Debug, Clone)]
pub struct HttpQuotaDirectory {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpQuotaDirectory {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, DirectoryError> {
        let base_url = Url::parse(base_url).map_err(|e| DirectoryError::Url(e.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(DirectoryError::Url(format!("{base_url} cannot be a base url")));
        }

        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self { client, base_url })
    }

    // Client id goes in as a single escaped path segment
    pub fn client_url(&self, client_id: &str) -> Result<Url, DirectoryError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| DirectoryError::Url(self.base_url.to_string()))?
            .pop_if_empty()
            .push("clients")
            .push(client_id);
        Ok(url)
    }
}

#[async_trait]
impl QuotaDirectory for HttpQuotaDirectory {
    async fn find_by_client_id(
        &self,
        client_id: &str,
    ) -> Result<Option<ClientQuota>, DirectoryError> {
        let url = self.client_url(client_id)?;
        let res = self.client.get(url).send().await?;

        let status = res.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(DirectoryError::Status(status.as_u16()));
        }

        let quota: ClientQuota = res.json().await?;
        if !quota.is_valid() || quota.client_id != client_id {
            tracing::warn!(client_id, "Directory returned an unusable quota record");
            return Ok(None);
        }
        Ok(Some(quota))
    }
}
