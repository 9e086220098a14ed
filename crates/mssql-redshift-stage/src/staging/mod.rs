//! S3 staging for extracted table files.
//!
//! Extracted files are uploaded under
//! `<namespace>/<environment>/<target-table-with-dots-as-dashes>/output.<ext>`
//! and referenced by the warehouse COPY statement via their `s3://` URL.
//! Multi-part loads are described by a JSON manifest document.

use chrono::Utc;
use object_store::aws::AmazonS3Builder;
use object_store::path::Path as StorePath;
use object_store::{ObjectStore, PutPayload};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::config::StagingConfig;
use crate::error::Result;

/// One staged file part referenced by a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub url: String,
    pub mandatory: bool,
}

/// A COPY manifest document: an ordered list of staged file parts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub entries: Vec<ManifestEntry>,
}

impl Manifest {
    /// Build a manifest from staged URLs; every part is mandatory.
    pub fn new(urls: impl IntoIterator<Item = String>) -> Self {
        Self {
            entries: urls
                .into_iter()
                .map(|url| ManifestEntry {
                    url,
                    mandatory: true,
                })
                .collect(),
        }
    }
}

/// Staging object-store wrapper.
pub struct StagingStore {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    namespace: String,
    environment: String,
}

impl StagingStore {
    /// Build an S3 store from configuration.
    pub fn from_config(config: &StagingConfig) -> Result<Self> {
        let mut builder = AmazonS3Builder::new()
            .with_region(&config.region)
            .with_bucket_name(&config.bucket)
            .with_access_key_id(&config.access_key_id)
            .with_secret_access_key(&config.secret_access_key);

        if let Some(endpoint) = &config.endpoint {
            builder = builder.with_endpoint(endpoint).with_allow_http(true);
        }

        let store = builder.build()?;

        Ok(Self {
            store: Arc::new(store),
            bucket: config.bucket.clone(),
            namespace: config.namespace.clone(),
            environment: config.environment.clone(),
        })
    }

    /// Construct a store over an arbitrary backend (in-memory for tests).
    pub fn with_store(
        store: Arc<dyn ObjectStore>,
        bucket: impl Into<String>,
        namespace: impl Into<String>,
        environment: impl Into<String>,
    ) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            namespace: namespace.into(),
            environment: environment.into(),
        }
    }

    /// Key for a table's staged file. Dots in the target table name become
    /// dashes so schema-qualified names stay a single path segment.
    pub fn staged_key(&self, target_table: &str, compressed: bool) -> String {
        let ext = if compressed { "tsv.gz" } else { "tsv" };
        format!(
            "{}/{}/{}/output.{}",
            self.namespace,
            self.environment,
            target_table.replace('.', "-"),
            ext
        )
    }

    /// Full `s3://` URL for a key.
    pub fn url(&self, key: &str) -> String {
        format!("s3://{}/{}", self.bucket, key)
    }

    /// Upload a byte payload to a key.
    pub async fn put(&self, key: &str, payload: Vec<u8>) -> Result<()> {
        self.store
            .put(&StorePath::from(key), PutPayload::from(payload))
            .await?;
        Ok(())
    }

    /// Upload a local file to a key.
    pub async fn put_file(&self, key: &str, local_path: &std::path::Path) -> Result<()> {
        let payload = tokio::fs::read(local_path).await?;
        info!(
            "Uploading {} ({} bytes) to s3://{}/{}",
            local_path.display(),
            payload.len(),
            self.bucket,
            key
        );
        self.put(key, payload).await
    }

    /// Serialize and upload a manifest, returning its URL.
    ///
    /// When no key is given the manifest lands under the namespace with a
    /// timestamped name.
    pub async fn put_manifest(&self, manifest: &Manifest, key: Option<String>) -> Result<String> {
        let key = key.unwrap_or_else(|| {
            format!(
                "{}/manifests/{}.json",
                self.namespace,
                Utc::now().format("%Y%m%d-%H%M%S%f")
            )
        });

        let body = serde_json::to_vec(manifest)?;
        self.put(&key, body).await?;
        Ok(self.url(&key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use object_store::memory::InMemory;

    fn memory_store() -> StagingStore {
        StagingStore::with_store(Arc::new(InMemory::new()), "stage-bucket", "stage", "dev")
    }

    #[test]
    fn test_staged_key_naming() {
        let store = memory_store();
        assert_eq!(
            store.staged_key("public.accounts", false),
            "stage/dev/public-accounts/output.tsv"
        );
        assert_eq!(
            store.staged_key("public.accounts", true),
            "stage/dev/public-accounts/output.tsv.gz"
        );
    }

    #[test]
    fn test_url() {
        let store = memory_store();
        assert_eq!(
            store.url("stage/dev/t/output.tsv"),
            "s3://stage-bucket/stage/dev/t/output.tsv"
        );
    }

    #[test]
    fn test_manifest_shape() {
        let manifest = Manifest::new(vec![
            "s3://b/part-0".to_string(),
            "s3://b/part-1".to_string(),
        ]);
        let json = serde_json::to_string(&manifest).unwrap();
        assert_eq!(
            json,
            r#"{"entries":[{"url":"s3://b/part-0","mandatory":true},{"url":"s3://b/part-1","mandatory":true}]}"#
        );
    }

    #[tokio::test]
    async fn test_put_and_manifest_roundtrip() {
        let store = memory_store();
        store.put("stage/dev/t/output.tsv", b"a\tb\n".to_vec()).await.unwrap();

        let manifest = Manifest::new(vec![store.url("stage/dev/t/output.tsv")]);
        let url = store
            .put_manifest(&manifest, Some("stage/manifests/m.json".to_string()))
            .await
            .unwrap();
        assert_eq!(url, "s3://stage-bucket/stage/manifests/m.json");
    }
}
