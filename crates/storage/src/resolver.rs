//! Bucket naming for single-bucket and partitioned deployments.

use tracing::warn;

use crate::traits::BucketResolver;
use crate::types::{PartitionSettings, StorageLocation};

/// Split a resolved bucket name into the physical bucket and an optional
/// key prefix (`"bucket/data"` -> `("bucket", Some("data"))`).
pub fn split_bucket_name(name: &str) -> (&str, Option<&str>) {
    match name.split_once('/') {
        Some((bucket, prefix)) if !prefix.is_empty() => (bucket, Some(prefix)),
        Some((bucket, _)) => (bucket, None),
        None => (name, None),
    }
}

/// One bucket for everything. The data directory is folded into the name.
#[derive(Debug, Clone)]
pub struct SingleBucketResolver {
    name: String,
}

impl SingleBucketResolver {
    pub fn new(location: &StorageLocation) -> Self {
        let name: String = if location.data_dir.is_empty() {
            location.bucket.clone()
        } else {
            format!("{}/{}", location.bucket, location.data_dir)
        };
        Self { name }
    }
}

impl BucketResolver for SingleBucketResolver {
    fn object_bucket_name(&self, _object_id: &str) -> String {
        self.name.clone()
    }

    fn is_partitioned(&self) -> bool {
        false
    }

    fn listing_buckets(&self) -> Vec<String> {
        vec![self.name.clone()]
    }
}

/// Objects sharded over `"{base}.{index}"` buckets by object id prefix.
///
/// Without partition settings every id resolves to the base bucket.
#[derive(Debug, Clone)]
pub struct PartitionedBucketResolver {
    object_bucket: String,
    partition: Option<PartitionSettings>,
}

impl PartitionedBucketResolver {
    pub fn new(location: &StorageLocation) -> Self {
        Self {
            object_bucket: location.bucket.clone(),
            partition: location.partition.filter(|p| p.pool_size > 0),
        }
    }

    /// Bucket index of an object id.
    ///
    /// Ids whose prefix is not hexadecimal land in bucket 0.
    pub fn bucket_index(&self, object_id: &str) -> Option<u32> {
        let partition: PartitionSettings = self.partition?;
        let prefix: &str = object_id.get(..partition.key_size).unwrap_or(object_id);

        match u64::from_str_radix(prefix, 16) {
            Ok(value) => Some((value % partition.pool_size as u64) as u32),
            Err(_) => {
                warn!("Object id {} has no hex prefix, using bucket 0", object_id);
                Some(0)
            }
        }
    }

    fn suffixed(&self, base: &str, object_id: &str) -> String {
        match self.bucket_index(object_id) {
            Some(index) => format!("{}.{}", base, index),
            None => base.to_string(),
        }
    }
}

impl BucketResolver for PartitionedBucketResolver {
    fn object_bucket_name(&self, object_id: &str) -> String {
        self.suffixed(&self.object_bucket, object_id)
    }

    fn is_partitioned(&self) -> bool {
        self.partition.is_some()
    }

    fn listing_buckets(&self) -> Vec<String> {
        match self.partition {
            Some(partition) => (0..partition.pool_size)
                .map(|i| format!("{}.{}", self.object_bucket, i))
                .collect(),
            None => vec![self.object_bucket.clone()],
        }
    }
}
