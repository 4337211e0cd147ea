//! In-memory [`ObjectStore`] for tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;

use super::object_store::{CompletedPart, ObjectStore};

struct PendingUpload {
    key: String,
    parts: Vec<(i32, Bytes)>,
}

/// Object store that keeps objects in a map and records every call.
#[derive(Default)]
pub struct MemoryObjectStore {
    retain_bodies: bool,
    failing_keys: HashSet<String>,
    next_id: AtomicU64,
    objects: Mutex<HashMap<String, Vec<u8>>>,
    pending: Mutex<HashMap<String, PendingUpload>>,
    part_sizes: Mutex<HashMap<String, Vec<usize>>>,
    aborted: Mutex<Vec<String>>,
    calls: Mutex<Vec<String>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self {
            retain_bodies: true,
            ..Default::default()
        }
    }

    /// Records part sizes but drops the bytes.
    pub fn discarding_bodies() -> Self {
        Self::default()
    }

    /// Every write for `key` fails.
    pub fn failing_parts_for(mut self, key: &str) -> Self {
        self.failing_keys.insert(key.to_string());
        self
    }

    pub fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.lock().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Sizes of the parts uploaded for `key`, in order.
    pub fn part_sizes(&self, key: &str) -> Vec<usize> {
        self.part_sizes
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .unwrap_or_default()
    }

    pub fn aborted(&self) -> Vec<String> {
        self.aborted.lock().unwrap().clone()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record_call(&self, operation: &str, key: &str) -> anyhow::Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("{} {}", operation, key));
        if self.failing_keys.contains(key) {
            anyhow::bail!("simulated {} failure", operation);
        }
        Ok(())
    }

    fn body(&self, body: &Bytes) -> Vec<u8> {
        if self.retain_bodies {
            body.to_vec()
        } else {
            Vec::new()
        }
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    fn location(&self) -> String {
        "memory://test".to_string()
    }

    async fn put_object(&self, key: &str, body: Bytes) -> anyhow::Result<()> {
        self.record_call("PutObject", key)?;
        let stored = self.body(&body);
        self.objects.lock().unwrap().insert(key.to_string(), stored);
        Ok(())
    }

    async fn create_multipart_upload(&self, key: &str) -> anyhow::Result<String> {
        // Succeeds for failing keys so part failures can be exercised.
        self.calls
            .lock()
            .unwrap()
            .push(format!("CreateMultipartUpload {}", key));
        let id = format!("upload-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.pending.lock().unwrap().insert(
            id.clone(),
            PendingUpload {
                key: key.to_string(),
                parts: Vec::new(),
            },
        );
        Ok(id)
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: Bytes,
    ) -> anyhow::Result<CompletedPart> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("UploadPart {} #{}", key, part_number));
        if self.failing_keys.contains(key) {
            anyhow::bail!("simulated UploadPart failure");
        }
        self.part_sizes
            .lock()
            .unwrap()
            .entry(key.to_string())
            .or_default()
            .push(body.len());
        let stored = Bytes::from(self.body(&body));
        let mut pending = self.pending.lock().unwrap();
        let upload = pending
            .get_mut(upload_id)
            .ok_or_else(|| anyhow::anyhow!("no such upload {}", upload_id))?;
        upload.parts.push((part_number, stored));
        Ok(CompletedPart {
            part_number,
            e_tag: Some(format!("etag-{}", part_number)),
        })
    }

    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: Vec<CompletedPart>,
    ) -> anyhow::Result<()> {
        self.record_call("CompleteMultipartUpload", key)?;
        let upload = self
            .pending
            .lock()
            .unwrap()
            .remove(upload_id)
            .ok_or_else(|| anyhow::anyhow!("no such upload {}", upload_id))?;
        anyhow::ensure!(upload.key == key, "upload {} belongs to {}", upload_id, upload.key);
        anyhow::ensure!(parts.len() == upload.parts.len(), "part list mismatch");
        let mut content = Vec::new();
        for (_, bytes) in &upload.parts {
            content.extend_from_slice(bytes);
        }
        self.objects.lock().unwrap().insert(key.to_string(), content);
        Ok(())
    }

    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> anyhow::Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("AbortMultipartUpload {}", key));
        self.pending.lock().unwrap().remove(upload_id);
        self.aborted.lock().unwrap().push(key.to_string());
        Ok(())
    }
}
