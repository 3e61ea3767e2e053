use async_trait::async_trait;
use dashmap::DashMap;
use std::path::Path;

use super::QuotaDirectory;
use crate::error::DirectoryError;
use crate::models::ClientQuota;

// Directory held in process, optionally seeded from a JSON file
#[derive(Debug, Default)]
pub struct InMemoryQuotaDirectory {
    clients: DashMap<String, ClientQuota>,
}

impl InMemoryQuotaDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    // JSON array of quota records, invalid ones are skipped
    pub fn from_file(path: &Path) -> Result<Self, DirectoryError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| DirectoryError::Load(format!("{}: {}", path.display(), e)))?;
        let records: Vec<ClientQuota> = serde_json::from_str(&raw)
            .map_err(|e| DirectoryError::Load(format!("{}: {}", path.display(), e)))?;

        let directory = Self::new();
        for record in records {
            let client_id = record.client_id.clone();
            if !directory.insert(record) {
                tracing::warn!(client_id = %client_id, "Skipping client record with invalid limits");
            }
        }

        tracing::info!(clients = directory.len(), path = %path.display(), "Loaded client records");
        Ok(directory)
    }

    // Insert or replace a record, false if it was rejected as invalid
    pub fn insert(&self, quota: ClientQuota) -> bool {
        if !quota.is_valid() {
            return false;
        }
        self.clients.insert(quota.client_id.clone(), quota);
        true
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[async_trait]
impl QuotaDirectory for InMemoryQuotaDirectory {
    async fn find_by_client_id(
        &self,
        client_id: &str,
    ) -> Result<Option<ClientQuota>, DirectoryError> {
        Ok(self.clients.get(client_id).map(|entry| entry.value().clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn finds_inserted_clients() {
        let directory = InMemoryQuotaDirectory::new();
        assert!(directory.insert(ClientQuota::new("acme", 5, 100)));

        let found = directory.find_by_client_id("acme").await.unwrap();
        assert_eq!(found, Some(ClientQuota::new("acme", 5, 100)));
        assert_eq!(directory.find_by_client_id("other").await.unwrap(), None);
    }

    #[tokio::test]
    async fn rejects_invalid_records() {
        let directory = InMemoryQuotaDirectory::new();
        assert!(!directory.insert(ClientQuota::new("acme", 0, 100)));
        assert!(directory.is_empty());
    }

    #[test]
    fn loads_records_from_file() {
        let path = std::env::temp_dir().join(format!(
            "quota-gateway-clients-{}.json",
            std::process::id()
        ));
        std::fs::write(
            &path,
            r#"[
                {"clientId":"acme","limitPerSecond":5,"limitPerMonth":1000},
                {"clientId":"broken","limitPerSecond":0,"limitPerMonth":1000}
            ]"#,
        )
        .unwrap();

        let directory = InMemoryQuotaDirectory::from_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(directory.len(), 1);
    }

    #[test]
    fn missing_file_is_a_load_error() {
        let result = InMemoryQuotaDirectory::from_file(Path::new("/nonexistent/clients.json"));
        assert!(matches!(result, Err(DirectoryError::Load(_))));
    }
}
