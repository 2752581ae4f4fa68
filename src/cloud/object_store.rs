//! The object-store collaborator boundary: uniform
//! get/put/exists/copy/dbid-lookup against `(bucket, path)`, synchronous
//! from the core's point of view.

use crate::error::{Result, StorageError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Uniform object-store surface. All operations are blocking from the
/// caller's perspective: a backend that is itself async
/// (like [`S3ObjectStore`]) bridges internally via a dedicated runtime.
pub trait ObjectStore: Send + Sync {
    /// `true`/`false`, never an error for "absent" — absence is a valid
    /// outcome at this layer.
    fn exists(&self, bucket: &str, path: &str) -> Result<bool>;

    /// Downloads `bucket/path` to `local_dst`. Returns
    /// `Err(StorageError::NotFound)` when the object is absent.
    fn get(&self, bucket: &str, path: &str, local_dst: &Path) -> Result<()>;

    fn put(&self, local_src: &Path, bucket: &str, path: &str) -> Result<()>;

    fn copy(&self, src_bucket: &str, src_path: &str, dst_bucket: &str, dst_path: &str) -> Result<()>;

    /// Looks up the object path registered for `dbid` under `bucket`.
    /// `Ok(None)` means "no registration" (a valid outcome, not an error).
    fn get_path_for_dbid(&self, bucket: &str, dbid: &str) -> Result<Option<String>>;

    /// Registers `object_path` as the location for `dbid` under `bucket`.
    /// Used by `SanitizeDirectory` when minting a clone.
    fn register_dbid(&self, bucket: &str, dbid: &str, object_path: &str) -> Result<()>;
}

/// In-memory object store: a stand-in for S3 used by tests and by
/// embedders who want to run entirely local. Content lives in a
/// `bucket -> (path -> bytes)` map; dbid registrations live alongside it.
#[derive(Default, Clone)]
pub struct MemoryObjectStore {
    inner: Arc<Mutex<MemoryState>>,
}

#[derive(Default)]
struct MemoryState {
    objects: HashMap<String, HashMap<String, Vec<u8>>>,
    dbid_registry: HashMap<String, HashMap<String, String>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test/bootstrap helper: seed an object directly without going
    /// through a local file.
    pub fn seed(&self, bucket: &str, path: &str, data: Vec<u8>) {
        let mut state = self.inner.lock();
        state.objects.entry(bucket.to_string()).or_default().insert(path.to_string(), data);
    }

    pub fn get_bytes(&self, bucket: &str, path: &str) -> Option<Vec<u8>> {
        let state = self.inner.lock();
        state.objects.get(bucket).and_then(|b| b.get(path)).cloned()
    }
}

impl ObjectStore for MemoryObjectStore {
    fn exists(&self, bucket: &str, path: &str) -> Result<bool> {
        let state = self.inner.lock();
        Ok(state.objects.get(bucket).map(|b| b.contains_key(path)).unwrap_or(false))
    }

    fn get(&self, bucket: &str, path: &str, local_dst: &Path) -> Result<()> {
        let data = {
            let state = self.inner.lock();
            state
                .objects
                .get(bucket)
                .and_then(|b| b.get(path))
                .cloned()
                .ok_or_else(|| StorageError::NotFound(format!("{bucket}/{path}")))?
        };
        std::fs::write(local_dst, data)?;
        Ok(())
    }

    fn put(&self, local_src: &Path, bucket: &str, path: &str) -> Result<()> {
        let data = std::fs::read(local_src)?;
        let mut state = self.inner.lock();
        state.objects.entry(bucket.to_string()).or_default().insert(path.to_string(), data);
        Ok(())
    }

    fn copy(&self, src_bucket: &str, src_path: &str, dst_bucket: &str, dst_path: &str) -> Result<()> {
        let data = {
            let state = self.inner.lock();
            state
                .objects
                .get(src_bucket)
                .and_then(|b| b.get(src_path))
                .cloned()
                .ok_or_else(|| StorageError::NotFound(format!("{src_bucket}/{src_path}")))?
        };
        let mut state = self.inner.lock();
        state.objects.entry(dst_bucket.to_string()).or_default().insert(dst_path.to_string(), data);
        Ok(())
    }

    fn get_path_for_dbid(&self, bucket: &str, dbid: &str) -> Result<Option<String>> {
        let state = self.inner.lock();
        Ok(state.dbid_registry.get(bucket).and_then(|m| m.get(dbid)).cloned())
    }

    fn register_dbid(&self, bucket: &str, dbid: &str, object_path: &str) -> Result<()> {
        let mut state = self.inner.lock();
        state
            .dbid_registry
            .entry(bucket.to_string())
            .or_default()
            .insert(dbid.to_string(), object_path.to_string());
        Ok(())
    }
}

/// AWS S3 backend, built on the `object_store` crate's async `AmazonS3`
/// client. The core's call contract is synchronous, so every
/// call is bridged through a small dedicated Tokio runtime rather than
/// forcing the whole crate onto an async executor.
pub struct S3ObjectStore {
    runtime: tokio::runtime::Runtime,
    clients: Mutex<HashMap<String, Arc<object_store::aws::AmazonS3>>>,
    /// dbid registrations are not an S3-native concept; RocksDB-cloud
    /// keeps them in a side table (DynamoDB in the original). We keep the
    /// same shape here: a small JSON side object per bucket, lazily
    /// fetched/written through the same client.
    registry_cache: Mutex<HashMap<String, HashMap<String, String>>>,
}

const DBID_REGISTRY_OBJECT: &str = ".dbid_registry.json";

impl S3ObjectStore {
    pub fn new() -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .map_err(|e| StorageError::ObjectStore(e.to_string()))?;
        Ok(Self {
            runtime,
            clients: Mutex::new(HashMap::new()),
            registry_cache: Mutex::new(HashMap::new()),
        })
    }

    fn client_for(&self, bucket: &str) -> Result<Arc<object_store::aws::AmazonS3>> {
        if let Some(existing) = self.clients.lock().get(bucket) {
            return Ok(existing.clone());
        }
        let client = object_store::aws::AmazonS3Builder::from_env()
            .with_bucket_name(bucket)
            .build()
            .map_err(|e| StorageError::ObjectStore(e.to_string()))?;
        let client = Arc::new(client);
        self.clients.lock().insert(bucket.to_string(), client.clone());
        Ok(client)
    }

    fn block_on<F: std::future::Future>(&self, fut: F) -> F::Output {
        self.runtime.block_on(fut)
    }
}

impl ObjectStore for S3ObjectStore {
    fn exists(&self, bucket: &str, path: &str) -> Result<bool> {
        use object_store::path::Path as ObjPath;
        let client = self.client_for(bucket)?;
        let obj_path = ObjPath::from(path);
        match self.block_on(client.head(&obj_path)) {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(StorageError::ObjectStore(e.to_string())),
        }
    }

    fn get(&self, bucket: &str, path: &str, local_dst: &Path) -> Result<()> {
        use object_store::path::Path as ObjPath;
        let client = self.client_for(bucket)?;
        let obj_path = ObjPath::from(path);
        let bytes = self.block_on(async {
            let result = client.get(&obj_path).await?;
            result.bytes().await
        });
        match bytes {
            Ok(data) => {
                std::fs::write(local_dst, data)?;
                Ok(())
            }
            Err(object_store::Error::NotFound { .. }) => {
                Err(StorageError::NotFound(format!("{bucket}/{path}")))
            }
            Err(e) => Err(StorageError::ObjectStore(e.to_string())),
        }
    }

    fn put(&self, local_src: &Path, bucket: &str, path: &str) -> Result<()> {
        use object_store::path::Path as ObjPath;
        use object_store::PutPayload;
        let client = self.client_for(bucket)?;
        let obj_path = ObjPath::from(path);
        let data = std::fs::read(local_src)?;
        self.block_on(client.put(&obj_path, PutPayload::from(data)))
            .map_err(|e| StorageError::ObjectStore(e.to_string()))?;
        Ok(())
    }

    fn copy(&self, src_bucket: &str, src_path: &str, dst_bucket: &str, dst_path: &str) -> Result<()> {
        use object_store::path::Path as ObjPath;
        if src_bucket == dst_bucket {
            let client = self.client_for(src_bucket)?;
            self.block_on(client.copy(&ObjPath::from(src_path), &ObjPath::from(dst_path)))
                .map_err(|e| StorageError::ObjectStore(e.to_string()))?;
            return Ok(());
        }
        // Cross-bucket copy: S3 server-side copy needs one client scoped
        // to the destination bucket; we stream the bytes through instead
        // of shelling out to a second client per (src, dst) pair.
        let src_client = self.client_for(src_bucket)?;
        let dst_client = self.client_for(dst_bucket)?;
        let src_obj = ObjPath::from(src_path);
        let dst_obj = ObjPath::from(dst_path);
        self.block_on(async {
            let data = src_client.get(&src_obj).await?.bytes().await?;
            dst_client.put(&dst_obj, object_store::PutPayload::from(data)).await
        })
        .map_err(|e| StorageError::ObjectStore(e.to_string()))?;
        Ok(())
    }

    fn get_path_for_dbid(&self, bucket: &str, dbid: &str) -> Result<Option<String>> {
        self.load_registry(bucket)?;
        let cache = self.registry_cache.lock();
        Ok(cache.get(bucket).and_then(|m| m.get(dbid)).cloned())
    }

    fn register_dbid(&self, bucket: &str, dbid: &str, object_path: &str) -> Result<()> {
        self.load_registry(bucket)?;
        {
            let mut cache = self.registry_cache.lock();
            cache.entry(bucket.to_string()).or_default().insert(dbid.to_string(), object_path.to_string());
        }
        self.persist_registry(bucket)
    }
}

impl S3ObjectStore {
    fn load_registry(&self, bucket: &str) -> Result<()> {
        if self.registry_cache.lock().contains_key(bucket) {
            return Ok(());
        }
        use object_store::path::Path as ObjPath;
        let client = self.client_for(bucket)?;
        let obj_path = ObjPath::from(DBID_REGISTRY_OBJECT);
        let bytes = self.block_on(async {
            let result = client.get(&obj_path).await?;
            result.bytes().await
        });
        let map = match bytes {
            Ok(data) => serde_json::from_slice(&data).unwrap_or_default(),
            Err(object_store::Error::NotFound { .. }) => HashMap::new(),
            Err(e) => return Err(StorageError::ObjectStore(e.to_string())),
        };
        self.registry_cache.lock().insert(bucket.to_string(), map);
        Ok(())
    }

    fn persist_registry(&self, bucket: &str) -> Result<()> {
        use object_store::path::Path as ObjPath;
        let client = self.client_for(bucket)?;
        let map = self.registry_cache.lock().get(bucket).cloned().unwrap_or_default();
        let json = serde_json::to_vec(&map)?;
        self.block_on(client.put(&ObjPath::from(DBID_REGISTRY_OBJECT), object_store::PutPayload::from(json)))
            .map_err(|e| StorageError::ObjectStore(e.to_string()))?;
        Ok(())
    }
}
