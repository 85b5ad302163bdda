//! Blob store capability and provider binding. All backends sit behind the
//! `object_store` crate; errors are split into transient (retryable) and
//! permanent so the commit path can decide whether to back off or halt.

use std::sync::Arc;

use bytes::Bytes;
use object_store::aws::AmazonS3Builder;
use object_store::gcp::GoogleCloudStorageBuilder;
use object_store::memory::InMemory;
use object_store::path::Path;
use object_store::{ObjectStore, PutMode, PutOptions, PutPayload};

use crate::config::{PROVIDER_AWS_S3, PROVIDER_GCS, PROVIDER_MEMORY, SinkConfig};
use crate::error::{Error, Result};

#[cfg(test)]
pub(crate) mod test_utils;

/// Outcome of a create-only write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    Created,
    /// Another writer got there first; the object is durable either way.
    AlreadyExists,
}

/// Uniform capability over blob-store backends.
#[trait_variant::make(BlobStore: Send)]
pub trait LocalBlobStore {
    async fn exists(&self, path: &str) -> Result<bool>;

    /// Create-only write: never overwrites an existing object.
    async fn put_if_absent(&self, path: &str, bytes: Bytes) -> Result<PutOutcome>;

    async fn put(&self, path: &str, bytes: Bytes) -> Result<()>;

    async fn get(&self, path: &str) -> Result<Bytes>;

    /// Whether `put_if_absent` is natively atomic on this backend. When
    /// false, callers fall back to write-then-verify.
    fn supports_create(&self) -> bool;
}

/// Blob store backed by an `object_store` implementation.
#[derive(Clone)]
pub struct ObjectStoreBlob {
    store: Arc<dyn ObjectStore>,
    create_only: bool,
}

impl ObjectStoreBlob {
    /// Binds the backend named by `provider`. Credentials come from the
    /// environment, the way the respective SDKs expect them.
    pub fn from_config(config: &SinkConfig) -> Result<Self> {
        let store: Arc<dyn ObjectStore> = match config.provider.to_lowercase().as_str() {
            PROVIDER_AWS_S3 => {
                let mut builder = AmazonS3Builder::from_env().with_bucket_name(&config.bucket);
                if let Some(region) = &config.region {
                    builder = builder.with_region(region);
                }
                if let Some(endpoint) = &config.endpoint {
                    builder = builder
                        .with_endpoint(endpoint)
                        .with_virtual_hosted_style_request(false)
                        .with_allow_http(true);
                }
                Arc::new(builder.build().map_err(map_store_err)?)
            }
            PROVIDER_GCS => {
                let builder =
                    GoogleCloudStorageBuilder::from_env().with_bucket_name(&config.bucket);
                Arc::new(builder.build().map_err(map_store_err)?)
            }
            PROVIDER_MEMORY => Arc::new(InMemory::new()),
            other => {
                return Err(Error::Config(format!(
                    "unknown provider {other:?}, available options: {PROVIDER_AWS_S3} / {PROVIDER_GCS} / {PROVIDER_MEMORY}"
                )));
            }
        };
        Ok(Self {
            store,
            create_only: true,
        })
    }

    pub fn in_memory() -> Self {
        Self {
            store: Arc::new(InMemory::new()),
            create_only: true,
        }
    }

    /// Marks the backend's conditional put as unsupported, switching callers
    /// to the write-then-verify fallback.
    pub fn with_create_support(mut self, supported: bool) -> Self {
        self.create_only = supported;
        self
    }
}

impl BlobStore for ObjectStoreBlob {
    async fn exists(&self, path: &str) -> Result<bool> {
        match self.store.head(&Path::from(path)).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(map_store_err(e)),
        }
    }

    async fn put_if_absent(&self, path: &str, bytes: Bytes) -> Result<PutOutcome> {
        let options = PutOptions::from(PutMode::Create);
        match self
            .store
            .put_opts(&Path::from(path), PutPayload::from(bytes), options)
            .await
        {
            Ok(_) => Ok(PutOutcome::Created),
            Err(object_store::Error::AlreadyExists { .. }) => Ok(PutOutcome::AlreadyExists),
            Err(e) => Err(map_store_err(e)),
        }
    }

    async fn put(&self, path: &str, bytes: Bytes) -> Result<()> {
        self.store
            .put(&Path::from(path), PutPayload::from(bytes))
            .await
            .map(|_| ())
            .map_err(map_store_err)
    }

    async fn get(&self, path: &str) -> Result<Bytes> {
        let result = self
            .store
            .get(&Path::from(path))
            .await
            .map_err(map_store_err)?;
        result.bytes().await.map_err(map_store_err)
    }

    fn supports_create(&self) -> bool {
        self.create_only
    }
}

fn map_store_err(e: object_store::Error) -> Error {
    match e {
        object_store::Error::PermissionDenied { .. }
        | object_store::Error::Unauthenticated { .. }
        | object_store::Error::InvalidPath { .. }
        | object_store::Error::NotSupported { .. }
        | object_store::Error::NotImplemented { .. }
        | object_store::Error::UnknownConfigurationKey { .. }
        | object_store::Error::NotFound { .. } => Error::PermanentStorage(e.to_string()),
        other => Error::TransientStorage(other.to_string()),
    }
}
