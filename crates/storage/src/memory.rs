//! In-memory storage backend.
//!
//! Implements every provider-side trait against process memory so the index,
//! the upload orchestrator and the filesystem can be exercised without a
//! network. Failure injection switches simulate outages and tampered URLs.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use score_common::hash_bytes;

use crate::error::StorageError;
use crate::parts::Part;
use crate::traits::{EntitySource, PartTransport, RangeFetcher, StorageBackend};
use crate::types::{ByteRange, Entity, ObjectInfo, PresignRequest, PresignedUrl, TransferOperation};

const HOST_SUFFIX: &str = "memory.local";

#[derive(Debug, Clone)]
struct StoredObject {
    data: Vec<u8>,
    last_modified: i64,
}

#[derive(Debug, Default)]
struct PendingUpload {
    object_id: String,
    parts: BTreeMap<u32, (String, Vec<u8>)>,
}

/// Failure counters: each positive value fails that many upcoming calls.
#[derive(Debug, Default)]
struct Faults {
    fail_list: AtomicBool,
    deny_presign: AtomicBool,
    untrusted_urls: AtomicU32,
    failed_fetches: AtomicU32,
    failed_puts: AtomicU32,
}

/// Provider fake holding objects, entities and multipart uploads in memory.
#[derive(Debug)]
pub struct MemoryBackend {
    bucket: String,
    url_ttl: Duration,
    objects: Mutex<BTreeMap<String, StoredObject>>,
    entities: Mutex<Vec<Entity>>,
    uploads: Mutex<HashMap<String, PendingUpload>>,
    next_id: AtomicU64,
    list_calls: AtomicU64,
    entity_calls: AtomicU64,
    presign_calls: AtomicU64,
    fetch_calls: AtomicU64,
    put_calls: AtomicU64,
    faults: Faults,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Decrement a failure counter, returning true if this call should fail.
fn take_fault(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

impl MemoryBackend {
    /// Create an empty backend serving URLs under `bucket`.
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            url_ttl: Duration::from_secs(3600),
            objects: Mutex::new(BTreeMap::new()),
            entities: Mutex::new(Vec::new()),
            uploads: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            list_calls: AtomicU64::new(0),
            entity_calls: AtomicU64::new(0),
            presign_calls: AtomicU64::new(0),
            fetch_calls: AtomicU64::new(0),
            put_calls: AtomicU64::new(0),
            faults: Faults::default(),
        }
    }

    /// Set the lifetime of issued URLs.
    pub fn with_url_ttl(mut self, ttl: Duration) -> Self {
        self.url_ttl = ttl;
        self
    }

    /// Store an object.
    pub fn insert_object(&self, object_id: impl Into<String>, data: Vec<u8>) {
        let stored: StoredObject = StoredObject {
            data,
            last_modified: 1_700_000_000_000,
        };
        lock(&self.objects).insert(object_id.into(), stored);
    }

    /// Register an entity with the metadata listing.
    pub fn insert_entity(&self, entity: Entity) {
        lock(&self.entities).push(entity);
    }

    /// Contents of a stored object.
    pub fn object_data(&self, object_id: &str) -> Option<Vec<u8>> {
        lock(&self.objects).get(object_id).map(|o| o.data.clone())
    }

    /// Number of multipart uploads neither completed nor aborted.
    pub fn pending_uploads(&self) -> usize {
        lock(&self.uploads).len()
    }

    /// Make `list_objects` fail until reset.
    pub fn set_fail_list(&self, fail: bool) {
        self.faults.fail_list.store(fail, Ordering::SeqCst);
    }

    /// Make `presigned_url` fail with access denied until reset.
    pub fn set_deny_presign(&self, deny: bool) {
        self.faults.deny_presign.store(deny, Ordering::SeqCst);
    }

    /// Issue `count` URLs that carry no signature.
    pub fn issue_untrusted_urls(&self, count: u32) {
        self.faults.untrusted_urls.store(count, Ordering::SeqCst);
    }

    /// Fail the next `count` ranged fetches.
    pub fn fail_next_fetches(&self, count: u32) {
        self.faults.failed_fetches.store(count, Ordering::SeqCst);
    }

    /// Fail the next `count` part uploads.
    pub fn fail_next_puts(&self, count: u32) {
        self.faults.failed_puts.store(count, Ordering::SeqCst);
    }

    pub fn list_calls(&self) -> u64 {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn entity_calls(&self) -> u64 {
        self.entity_calls.load(Ordering::SeqCst)
    }

    pub fn presign_calls(&self) -> u64 {
        self.presign_calls.load(Ordering::SeqCst)
    }

    pub fn fetch_calls(&self) -> u64 {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn put_calls(&self) -> u64 {
        self.put_calls.load(Ordering::SeqCst)
    }

    fn build_url(&self, request: &PresignRequest, sequence: u64) -> String {
        let mut url: String = format!(
            "https://{}.{}/data/{}?X-Amz-Expires={}&X-Amz-Signature=sig{}",
            self.bucket,
            HOST_SUFFIX,
            request.object_id,
            self.url_ttl.as_secs(),
            sequence
        );
        if let (Some(upload_id), Some(part_number)) = (&request.upload_id, request.part_number) {
            url.push_str(&format!("&uploadId={}&partNumber={}", upload_id, part_number));
        }
        url
    }

    fn network_error(message: &str) -> StorageError {
        StorageError::NetworkError {
            message: message.to_string(),
            retryable: true,
        }
    }
}

/// Object id, upload id and part number encoded in a URL issued by this backend.
fn parse_url(raw: &str) -> Result<(String, Option<String>, Option<u32>), StorageError> {
    let url: Url = Url::parse(raw).map_err(|e| StorageError::Other {
        message: format!("Malformed URL: {}", e),
    })?;

    let object_id: String = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or_default()
        .to_string();

    let mut upload_id: Option<String> = None;
    let mut part_number: Option<u32> = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "uploadId" => upload_id = Some(value.into_owned()),
            "partNumber" => part_number = value.parse().ok(),
            _ => {}
        }
    }

    Ok((object_id, upload_id, part_number))
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn list_objects(&self) -> Result<Vec<ObjectInfo>, StorageError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.faults.fail_list.load(Ordering::SeqCst) {
            return Err(StorageError::BackendUnavailable {
                message: "listing failed".to_string(),
            });
        }

        Ok(lock(&self.objects)
            .iter()
            .map(|(id, o)| ObjectInfo::new(id.clone(), o.data.len() as u64, o.last_modified))
            .collect())
    }

    async fn presigned_url(&self, request: &PresignRequest) -> Result<PresignedUrl, StorageError> {
        let sequence: u64 = self.presign_calls.fetch_add(1, Ordering::SeqCst);

        if self.faults.deny_presign.load(Ordering::SeqCst) {
            return Err(StorageError::AccessDenied {
                bucket: self.bucket.clone(),
                key: request.object_id.clone(),
                message: "token not authorized".to_string(),
            });
        }

        if request.operation == TransferOperation::Read
            && !lock(&self.objects).contains_key(&request.object_id)
        {
            return Err(StorageError::NotFound {
                bucket: self.bucket.clone(),
                key: request.object_id.clone(),
            });
        }

        if take_fault(&self.faults.untrusted_urls) {
            let url: String = format!("ftp://{}/{}", HOST_SUFFIX, request.object_id);
            return Ok(PresignedUrl::expiring_in(url, self.url_ttl));
        }

        Ok(PresignedUrl::expiring_in(
            self.build_url(request, sequence),
            self.url_ttl,
        ))
    }

    async fn initiate_multipart(&self, object_id: &str) -> Result<String, StorageError> {
        let upload_id: String = format!("upload-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        let pending: PendingUpload = PendingUpload {
            object_id: object_id.to_string(),
            parts: BTreeMap::new(),
        };
        lock(&self.uploads).insert(upload_id.clone(), pending);
        Ok(upload_id)
    }

    async fn complete_multipart(
        &self,
        object_id: &str,
        upload_id: &str,
        parts: &[Part],
    ) -> Result<(), StorageError> {
        let pending: PendingUpload = lock(&self.uploads).remove(upload_id).ok_or_else(|| {
            StorageError::Other {
                message: format!("Unknown upload {}", upload_id),
            }
        })?;
        if pending.object_id != object_id {
            return Err(StorageError::Other {
                message: format!("Upload {} belongs to {}", upload_id, pending.object_id),
            });
        }

        let mut data: Vec<u8> = Vec::new();
        for part in parts {
            let (etag, bytes) = pending.parts.get(&part.part_number()).ok_or_else(|| {
                StorageError::Other {
                    message: format!("Part {} was never uploaded", part.part_number()),
                }
            })?;
            if part.etag() != Some(etag.as_str()) {
                return Err(StorageError::Other {
                    message: format!("ETag mismatch for part {}", part.part_number()),
                });
            }
            data.extend_from_slice(bytes);
        }

        self.insert_object(pending.object_id, data);
        Ok(())
    }

    async fn abort_multipart(&self, _object_id: &str, upload_id: &str) -> Result<(), StorageError> {
        lock(&self.uploads).remove(upload_id);
        Ok(())
    }
}

#[async_trait]
impl RangeFetcher for MemoryBackend {
    async fn fetch(&self, url: &PresignedUrl, range: ByteRange) -> Result<Vec<u8>, StorageError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if take_fault(&self.faults.failed_fetches) {
            return Err(Self::network_error("connection reset"));
        }

        let (object_id, _, _) = parse_url(&url.url)?;
        let objects = lock(&self.objects);
        let object: &StoredObject = objects.get(&object_id).ok_or_else(|| StorageError::NotFound {
            bucket: self.bucket.clone(),
            key: object_id.clone(),
        })?;

        let clipped: ByteRange = range.clip(object.data.len() as u64);
        Ok(object.data[clipped.start as usize..clipped.end as usize].to_vec())
    }
}

#[async_trait]
impl PartTransport for MemoryBackend {
    async fn put_part(&self, url: &PresignedUrl, data: &[u8]) -> Result<String, StorageError> {
        self.put_calls.fetch_add(1, Ordering::SeqCst);
        if take_fault(&self.faults.failed_puts) {
            return Err(Self::network_error("broken pipe"));
        }

        let (object_id, upload_id, part_number) = parse_url(&url.url)?;
        let etag: String = format!("\"{}\"", hash_bytes(data));
        let (upload_id, part_number) = match (upload_id, part_number) {
            (Some(upload_id), Some(part_number)) => (upload_id, part_number),
            (None, None) => {
                self.insert_object(object_id, data.to_vec());
                return Ok(etag);
            }
            _ => {
                return Err(StorageError::Other {
                    message: "URL is not a part upload URL".to_string(),
                });
            }
        };


        let mut uploads = lock(&self.uploads);
        let pending: &mut PendingUpload =
            uploads.get_mut(&upload_id).ok_or_else(|| StorageError::Other {
                message: format!("Unknown upload {}", upload_id),
            })?;
        pending.parts.insert(part_number, (etag.clone(), data.to_vec()));
        Ok(etag)
    }
}

#[async_trait]
impl EntitySource for MemoryBackend {
    async fn entities(&self) -> Result<Vec<Entity>, StorageError> {
        self.entity_calls.fetch_add(1, Ordering::SeqCst);
        Ok(lock(&self.entities).clone())
    }
}
