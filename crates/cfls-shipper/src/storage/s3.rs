use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_sdk_s3::{
    error::{DisplayErrorContext, SdkError},
    operation::get_object::GetObjectError,
    Client,
};
use tracing::{debug, info, instrument};

use super::{config::StorageConfig, ObjectStore, StorageError};

/// S3 (or S3-compatible) source bucket
#[derive(Clone)]
pub struct S3Store {
    client: Client,
    bucket: String,
}

impl S3Store {
    pub async fn new(config: StorageConfig) -> Self {
        debug!(?config, "initializing S3 client");

        let mut loader =
            aws_config::defaults(BehaviorVersion::latest()).region(Region::new(config.region.clone()));

        if let Some((access_key, secret_key)) = config.static_credentials() {
            loader = loader.credentials_provider(Credentials::new(
                access_key,
                secret_key,
                None,
                None,
                "cfls-static",
            ));
        }

        let sdk_config = loader.load().await;
        let mut builder =
            aws_sdk_s3::config::Builder::from(&sdk_config).force_path_style(config.path_style);

        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        info!(bucket = %config.bucket, "S3 client initialized");

        Self {
            client: Client::from_conf(builder.build()),
            bucket: config.bucket,
        }
    }
}

fn is_missing_object<R>(err: &SdkError<GetObjectError, R>) -> bool
where
    R: std::fmt::Debug,
{
    match err {
        SdkError::ServiceError(service) => service.err().is_no_such_key(),
        _ => false,
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn list(&self, max_keys: i32) -> Result<Vec<String>, StorageError> {
        let output = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .max_keys(max_keys)
            .send()
            .await
            .map_err(|e| StorageError::Service(DisplayErrorContext(&e).to_string()))?;

        Ok(output
            .contents()
            .iter()
            .filter_map(|object| object.key())
            .filter(|key| !key.is_empty())
            .map(str::to_string)
            .collect())
    }

    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let response = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) if is_missing_object(&e) => return Err(StorageError::NotFound(key.to_string())),
            Err(e) => return Err(StorageError::Service(DisplayErrorContext(&e).to_string())),
        };

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| StorageError::Body(e.to_string()))?
            .into_bytes()
            .to_vec();

        debug!(key, bytes = data.len(), "downloaded object");
        Ok(data)
    }

    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StorageError::Service(DisplayErrorContext(&e).to_string()))?;

        debug!(key, "deleted object");
        Ok(())
    }
}
