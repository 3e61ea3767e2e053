mod http;
mod memory;

pub use http::HttpQuotaDirectory;
pub use memory::InMemoryQuotaDirectory;

use async_trait::async_trait;

use crate::error::DirectoryError;
use crate::models::ClientQuota;

#[async_trait]
pub trait QuotaDirectory: Send + Sync {
    // Ok(None) means the client is not registered
    async fn find_by_client_id(&self, client_id: &str)
    -> Result<Option<ClientQuota>, DirectoryError>;
}
