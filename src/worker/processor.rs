//! The per-task workflow.
//!
//! One task runs start to finish as a straight-line sequence:
//!
//! 1. Lock the record.
//! 2. Read it and extract the refresh credential.
//! 3. Refresh the token pair.
//! 4. Write the refreshed credentials back.
//! 5. Fetch and persist every page of data.
//! 6. Record the artifact list and success status.
//! 7. Release the record.
//! 8. Remove it.
//!
//! A failure at any of steps 2–6 aborts the rest of the sequence and leaves
//! the record **locked**: a locked record with no further activity is the
//! durable, inspectable marker of a stuck task, left for an operator or an
//! external reaper. Nothing here retries a failed task - a retry would risk
//! duplicate side effects against the external API.
//!
//! Step 3 runs unconditionally. Refreshing in place (rather than
//! re-queuing the task for a fresh pickup) means pagination progress is
//! never reset by credential expiry mid-run.

use std::sync::Arc;

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::config::FetchPolicy;
use crate::provider::{FetchError, PagedFetcher, ProviderError, SeriesApi};
use crate::queue::{QueueError, QueueStore, TaskRef};
use crate::session::SessionStore;

/// Errors that fail a single task.
#[derive(Debug, Error)]
pub enum TaskError {
    /// A queue store operation failed.
    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    /// The token exchange was rejected or unreachable.
    #[error("token refresh failed: {0}")]
    Refresh(#[source] ProviderError),

    /// The paging run failed.
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    /// The record lacks a credential the workflow needs.
    #[error("record is missing the {0} credential")]
    MissingCredential(&'static str),
}

/// Result type for task processing.
pub type Result<T> = std::result::Result<T, TaskError>;

/// Executes the full workflow for one task at a time.
pub struct TaskProcessor<A> {
    store: QueueStore,
    api: Arc<A>,
    fetcher: PagedFetcher<A>,
}

impl<A: SeriesApi> TaskProcessor<A> {
    pub fn new(
        store: QueueStore,
        api: Arc<A>,
        artifacts: SessionStore,
        policy: FetchPolicy,
    ) -> Self {
        let fetcher = PagedFetcher::new(api.clone(), artifacts, policy);
        TaskProcessor {
            store,
            api,
            fetcher,
        }
    }

    /// Runs one task through the workflow.
    ///
    /// On success the record has been released and removed. On error the
    /// record remains locked; the caller logs the failure and moves on.
    #[instrument(skip(self), fields(task = %task, session = %task.session()))]
    pub async fn process(&self, task: &TaskRef) -> Result<()> {
        let locked = self.store.lock(task)?;
        let record = self.store.read(&locked)?;

        let refresh_token = record
            .refresh_token()
            .ok_or(TaskError::MissingCredential("refresh_token"))?;
        let refreshed = self
            .api
            .refresh_token(refresh_token)
            .await
            .map_err(TaskError::Refresh)?;
        debug!("token pair refreshed");

        let record = self.store.update(&locked, &refreshed.as_patch())?;
        let access_token = record
            .access_token()
            .ok_or(TaskError::MissingCredential("access_token"))?;

        let artifacts = self
            .fetcher
            .fetch_all(&record.session_id, access_token, None)
            .await?;

        let mut patch = Map::new();
        patch.insert(
            "files_created".to_string(),
            Value::Array(
                artifacts
                    .iter()
                    .map(|p| Value::String(p.display().to_string()))
                    .collect(),
            ),
        );
        patch.insert("status".to_string(), Value::String("success".to_string()));
        self.store.update(&locked, &patch)?;

        let released = self.store.release(&locked)?;
        self.store.remove(&released)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::api::{PageFetch, PageRequest};
    use crate::provider::error::{ProviderError, Result as ApiResult};
    use crate::provider::token::TokenResponse;
    use crate::queue::TaskState;
    use crate::types::{Namespace, SessionId};
    use serde_json::json;
    use tempfile::tempdir;

    /// Provider stub: refresh always succeeds with fixed tokens, paging
    /// serves a fixed number of pages. `fail_refresh` turns the token
    /// endpoint into a hard 401.
    struct StubApi {
        fail_refresh: bool,
        pages: usize,
    }

    impl SeriesApi for StubApi {
        async fn refresh_token(&self, _refresh_token: &str) -> ApiResult<TokenResponse> {
            if self.fail_refresh {
                return Err(ProviderError::TokenRejected {
                    status: 401,
                    detail: "expired_token".into(),
                });
            }
            Ok(TokenResponse {
                access_token: "fresh-at".into(),
                refresh_token: "fresh-rt".into(),
                expires_in: Some(28_800),
                extra: Map::new(),
            })
        }

        async fn fetch_page(
            &self,
            access_token: &str,
            request: &PageRequest,
        ) -> ApiResult<PageFetch> {
            // The worker must use the *refreshed* access token
            assert_eq!(access_token, "fresh-at");
            let page_no = match request {
                PageRequest::Initial { .. } => 0,
                PageRequest::Cursor(c) => c.as_str().parse::<usize>().unwrap(),
            };
            let body = if page_no + 1 < self.pages {
                format!(
                    r#"{{"sleep":[{page_no}],"pagination":{{"next":"{}"}}}}"#,
                    page_no + 1
                )
            } else {
                format!(r#"{{"sleep":[{page_no}],"pagination":{{}}}}"#)
            };
            Ok(PageFetch::Page {
                body: body.into_bytes(),
            })
        }
    }

    struct Fixture {
        _queue_dir: tempfile::TempDir,
        _session_dir: tempfile::TempDir,
        store: QueueStore,
        sessions: SessionStore,
        namespace: Namespace,
    }

    fn fixture() -> Fixture {
        let queue_dir = tempdir().unwrap();
        let session_dir = tempdir().unwrap();
        let store = QueueStore::new(queue_dir.path());
        let namespace = Namespace::new("fitbit");
        store.init(&namespace).unwrap();
        Fixture {
            store: store.clone(),
            sessions: SessionStore::new(session_dir.path()),
            namespace,
            _queue_dir: queue_dir,
            _session_dir: session_dir,
        }
    }

    fn processor(fx: &Fixture, api: StubApi) -> TaskProcessor<StubApi> {
        TaskProcessor::new(
            fx.store.clone(),
            Arc::new(api),
            fx.sessions.clone(),
            FetchPolicy::default(),
        )
    }

    fn enqueue(fx: &Fixture, session: &str) -> TaskRef {
        let payload = [
            ("access_token".to_string(), json!("stale-at")),
            ("refresh_token".to_string(), json!("stale-rt")),
        ]
        .into_iter()
        .collect();
        fx.store
            .create(&fx.namespace, &SessionId::new(session), payload)
            .unwrap()
    }

    fn partition_count(fx: &Fixture, state: TaskState) -> usize {
        std::fs::read_dir(fx.store.partition_dir(&fx.namespace, state))
            .unwrap()
            .count()
    }

    #[tokio::test]
    async fn successful_run_removes_record_and_keeps_artifacts() {
        let fx = fixture();
        let task = enqueue(&fx, "sess-ok");
        let processor = processor(
            &fx,
            StubApi {
                fail_refresh: false,
                pages: 2,
            },
        );

        processor.process(&task).await.unwrap();

        // Record is gone from every partition
        for state in TaskState::all() {
            assert_eq!(partition_count(&fx, state), 0, "{state} not empty");
        }

        // Both pages are durable in the session working area
        let session_dir = fx.sessions.session_dir(&SessionId::new("sess-ok"));
        assert!(session_dir.join("page.0.json").exists());
        assert!(session_dir.join("page.1.json").exists());
    }

    #[tokio::test]
    async fn refresh_failure_leaves_record_locked_with_original_payload() {
        let fx = fixture();
        let task = enqueue(&fx, "sess-bad");
        let processor = processor(
            &fx,
            StubApi {
                fail_refresh: true,
                pages: 2,
            },
        );

        let result = processor.process(&task).await;
        assert!(matches!(result, Err(TaskError::Refresh(_))));

        // Locked, untouched, and inspectable
        assert_eq!(partition_count(&fx, TaskState::Locked), 1);
        let locked = task.with_state(TaskState::Locked);
        let record = fx.store.read(&locked).unwrap();
        assert_eq!(record.access_token(), Some("stale-at"));
        assert!(record.str_field("status").is_none());

        // No pages were fetched
        let session_dir = fx.sessions.session_dir(&SessionId::new("sess-bad"));
        assert!(!session_dir.exists());
    }

    #[tokio::test]
    async fn missing_refresh_token_leaves_record_locked() {
        let fx = fixture();
        let task = fx
            .store
            .create(&fx.namespace, &SessionId::new("sess-nocred"), Map::new())
            .unwrap();
        let processor = processor(
            &fx,
            StubApi {
                fail_refresh: false,
                pages: 1,
            },
        );

        let result = processor.process(&task).await;
        assert!(matches!(
            result,
            Err(TaskError::MissingCredential("refresh_token"))
        ));
        assert_eq!(partition_count(&fx, TaskState::Locked), 1);
    }

    #[tokio::test]
    async fn success_status_and_artifact_list_are_written_before_release() {
        let fx = fixture();
        let task = enqueue(&fx, "sess-fields");
        let processor = processor(
            &fx,
            StubApi {
                fail_refresh: false,
                pages: 3,
            },
        );

        processor.process(&task).await.unwrap();

        // The record is removed, but the artifacts it listed are real
        let session_dir = fx.sessions.session_dir(&SessionId::new("sess-fields"));
        let mut names: Vec<_> = std::fs::read_dir(&session_dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        names.sort();
        assert_eq!(names, vec!["page.0.json", "page.1.json", "page.2.json"]);
    }
}
