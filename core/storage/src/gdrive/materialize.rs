//! Idempotent find-or-create of the section/standard folder path.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::Mutex;
use tracing::{debug, info};

use accredify_common::{AuthorizationToken, FolderPath, Result};

use super::client::DriveClient;

/// Key for per-segment serialization: parent folder id plus segment name.
type SegmentKey = (String, String);

type LockTable = StdMutex<HashMap<SegmentKey, Arc<Mutex<()>>>>;

/// Materializes folder paths under a project root.
///
/// Each find-or-create step is serialized per `(parent, name)` inside the
/// process, so concurrent uploads that share a folder (two standards under
/// one section, or the same standard twice) see each other's created
/// folders instead of racing to create duplicates. Separate processes can
/// still race; the first matching folder wins on later lookups.
pub struct PathMaterializer {
    client: DriveClient,
    locks: LockTable,
}

/// Registration in the lock table for one segment.
///
/// Dropping it, whether the step finished or the caller was cancelled,
/// removes the table entry once nobody else holds or waits on it.
struct SegmentLock<'a> {
    table: &'a LockTable,
    key: SegmentKey,
    lock: Option<Arc<Mutex<()>>>,
}

impl<'a> SegmentLock<'a> {
    fn register(table: &'a LockTable, parent: &str, name: &str) -> Self {
        let key = (parent.to_string(), name.to_string());
        let lock = table
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(key.clone())
            .or_default()
            .clone();
        Self {
            table,
            key,
            lock: Some(lock),
        }
    }

    async fn acquire(&self) -> Option<tokio::sync::MutexGuard<'_, ()>> {
        match &self.lock {
            Some(lock) => Some(lock.lock().await),
            None => None,
        }
    }
}

impl Drop for SegmentLock<'_> {
    fn drop(&mut self) {
        let mut locks = self.table.lock().unwrap_or_else(|e| e.into_inner());
        // Give up our reference under the table lock so concurrent drops
        // agree on who is last.
        self.lock = None;
        if let Some(lock) = locks.get(&self.key) {
            if Arc::strong_count(lock) == 1 {
                locks.remove(&self.key);
            }
        }
    }
}

impl PathMaterializer {
    pub fn new(client: DriveClient) -> Self {
        Self {
            client,
            locks: StdMutex::new(HashMap::new()),
        }
    }

    pub fn client(&self) -> &DriveClient {
        &self.client
    }

    /// Ensure `path` exists under `root_folder_id` and return the leaf folder id.
    ///
    /// For each segment, an existing non-trashed folder with exactly that
    /// name is reused; otherwise one is created.
    ///
    /// # Errors
    /// - `FolderLookupFailed` if a lookup fails
    /// - `FolderCreateFailed` if a create fails
    pub async fn ensure_path(
        &self,
        token: &AuthorizationToken,
        root_folder_id: &str,
        path: &FolderPath,
    ) -> Result<String> {
        let mut parent = root_folder_id.to_string();

        for segment in path.segments() {
            parent = self.ensure_child(token, &parent, segment).await?;
        }

        Ok(parent)
    }

    /// Find or create one folder named `name` directly under `parent`.
    async fn ensure_child(
        &self,
        token: &AuthorizationToken,
        parent: &str,
        name: &str,
    ) -> Result<String> {
        let registration = SegmentLock::register(&self.locks, parent, name);
        let _guard = registration.acquire().await;

        match self.client.find_folder(token, parent, name).await? {
            Some(existing) => {
                debug!(name = %name, id = %existing.id, "Reusing existing folder");
                Ok(existing.id)
            }
            None => {
                let created = self.client.create_folder(token, parent, name).await?;
                info!(name = %name, id = %created.id, parent = %parent, "Created folder");
                Ok(created.id)
            }
        }
    }

    #[cfg(test)]
    fn tracked_segments(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gdrive::client::DriveConfig;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn materializer_at(base: &str) -> PathMaterializer {
        let client = DriveClient::new(DriveConfig::with_base_url(base)).unwrap();
        PathMaterializer::new(client)
    }

    fn materializer() -> PathMaterializer {
        materializer_at("http://127.0.0.1:9")
    }

    #[test]
    fn test_lock_shared_per_segment() {
        let m = materializer();

        let a = SegmentLock::register(&m.locks, "root", "Section A");
        let b = SegmentLock::register(&m.locks, "root", "Section A");
        let c = SegmentLock::register(&m.locks, "root", "Section B");

        assert!(Arc::ptr_eq(
            a.lock.as_ref().unwrap(),
            b.lock.as_ref().unwrap()
        ));
        assert!(!Arc::ptr_eq(
            a.lock.as_ref().unwrap(),
            c.lock.as_ref().unwrap()
        ));
        assert_eq!(m.tracked_segments(), 2);
    }

    #[test]
    fn test_drop_prunes_unused_locks() {
        let m = materializer();

        let first = SegmentLock::register(&m.locks, "root", "Section A");
        let second = SegmentLock::register(&m.locks, "root", "Section A");
        drop(first);
        assert_eq!(m.tracked_segments(), 1);

        drop(second);
        assert_eq!(m.tracked_segments(), 0);
    }

    #[tokio::test]
    async fn test_failed_lookup_releases_lock() {
        let m = materializer();
        let token = AuthorizationToken::new("t");
        let path = FolderPath::new("Section A", "Standard 1").unwrap();

        let result = m.ensure_path(&token, "root", &path).await;
        assert!(matches!(
            result,
            Err(accredify_common::Error::FolderLookupFailed(_))
        ));
        assert_eq!(m.tracked_segments(), 0);
    }

    #[tokio::test]
    async fn test_aborted_call_releases_lock() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/drive/v3/files"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "files": [] }))
                    .set_delay(Duration::from_secs(10)),
            )
            .mount(&server)
            .await;

        let m = Arc::new(materializer_at(&server.uri()));
        let task = {
            let m = m.clone();
            tokio::spawn(async move {
                let token = AuthorizationToken::new("t");
                let path = FolderPath::new("Section A", "Standard 1").unwrap();
                m.ensure_path(&token, "root", &path).await
            })
        };

        // Wait until the lookup is in flight.
        for _ in 0..100 {
            if !server.received_requests().await.unwrap_or_default().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(m.tracked_segments(), 1);

        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());
        assert_eq!(m.tracked_segments(), 0);
    }
}
