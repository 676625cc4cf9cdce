use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use rand::Rng;
use rearch::CapsuleHandle;
use thiserror::Error;
use tracing::{error, instrument, warn};

use crate::{
    api::MAX_EPOCH_MILLIS,
    paste_repo::{
        BurnOutcome, NewPaste, PasteRepository, SavePasteError, ViewedPaste,
        paste_repository_capsule,
    },
    validation::CreatePasteRequest,
};

pub const PASTE_ID_LEN: usize = 10;

const PASTE_ID_ALPHABET: &[u8; 64] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789_-";

pub fn paste_rest_service_capsule(
    CapsuleHandle { mut get, .. }: CapsuleHandle,
) -> Arc<dyn PasteRestService> {
    let paste_repo = Arc::clone(get.as_ref(paste_repository_capsule));
    Arc::new(PasteRestServiceImpl { paste_repo })
}

#[async_trait]
pub trait PasteRestService: Send + Sync {
    /// Stores the paste under a fresh random ID and returns that ID.
    async fn create_paste(
        &self,
        request: CreatePasteRequest,
        now_ms: i64,
    ) -> Result<String, CreatePasteError>;
    async fn get_paste(&self, id: &str, now_ms: i64) -> Result<ViewedPaste, GetPasteError>;
    async fn check_health(&self) -> anyhow::Result<()>;
}

#[derive(Debug, Error)]
pub enum CreatePasteError {
    #[error("internal/database error: {0}")]
    Internal(anyhow::Error), // NOTE: no #[from] so we have to be explicit
}

#[derive(Debug, Error)]
pub enum GetPasteError {
    #[error("paste not found")]
    NotFound,
    #[error("internal/database error: {0}")]
    Internal(anyhow::Error),
}

struct PasteRestServiceImpl {
    paste_repo: Arc<dyn PasteRepository>,
}

#[async_trait]
impl PasteRestService for PasteRestServiceImpl {
    #[instrument(skip(self, request))]
    async fn create_paste(
        &self,
        request: CreatePasteRequest,
        now_ms: i64,
    ) -> Result<String, CreatePasteError> {
        const SAVE_ATTEMPTS: usize = 3;

        // NOTE: capped so every stored expiry can still be rendered when the paste is read
        let expires_at = request.ttl_seconds.map(|ttl_seconds| {
            now_ms
                .saturating_add(ttl_seconds.saturating_mul(1000))
                .min(MAX_EPOCH_MILLIS)
        });

        for _ in 0..SAVE_ATTEMPTS {
            let attempt_id = generate_paste_id();
            let to_save = NewPaste {
                id: attempt_id.clone(),
                content: request.content.clone(),
                expires_at,
                max_views: request.max_views,
            };

            match self.paste_repo.create_paste(to_save).await {
                Ok(()) => return Ok(attempt_id),
                Err(SavePasteError::IdTaken) => {
                    warn!(?attempt_id, "Generated paste ID that was already taken");
                }
                Err(SavePasteError::Internal(err)) => {
                    error!(?err, "Encountered internal error while saving paste");
                    return Err(CreatePasteError::Internal(err));
                }
            }
        }

        Err(CreatePasteError::Internal(anyhow!(
            "Exhausted paste ID generation attempts"
        )))
    }

    #[instrument(skip(self))]
    async fn get_paste(&self, id: &str, now_ms: i64) -> Result<ViewedPaste, GetPasteError> {
        match self.paste_repo.get_and_burn_view(id, now_ms).await {
            Ok(BurnOutcome::Success(paste)) => Ok(paste),
            Ok(BurnOutcome::NotFound) => Err(GetPasteError::NotFound),
            Err(err) => Err(GetPasteError::Internal(err)),
        }
    }

    #[instrument(skip(self))]
    async fn check_health(&self) -> anyhow::Result<()> {
        self.paste_repo.ping().await
    }
}

/// A URL-safe ID of [`PASTE_ID_LEN`] characters.
fn generate_paste_id() -> String {
    let mut bytes = [0; PASTE_ID_LEN];
    rand::rng().fill_bytes(&mut bytes);
    // NOTE: 256 is a multiple of the alphabet size, so masking keeps the draw uniform
    bytes
        .iter()
        .map(|byte| char::from(PASTE_ID_ALPHABET[usize::from(byte & 63)]))
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    };

    use mockall::{mock, predicate::*};
    use serde_json::json;

    use super::*;
    use crate::{api::PasteView, validation::validate_create_paste};

    mock! {
        PasteRepository {}

        #[async_trait]
        impl PasteRepository for PasteRepository {
            async fn create_paste(&self, paste: NewPaste) -> Result<(), SavePasteError>;
            async fn get_and_burn_view(&self, id: &str, now_ms: i64) -> anyhow::Result<BurnOutcome>;
            async fn delete_dead_pastes(&self, now_ms: i64) -> anyhow::Result<u64>;
            async fn ping(&self) -> anyhow::Result<()>;
        }
    }

    fn service_with(mock_repo: MockPasteRepository) -> PasteRestServiceImpl {
        PasteRestServiceImpl {
            paste_repo: Arc::new(mock_repo),
        }
    }

    fn request(ttl_seconds: Option<i64>, max_views: Option<i64>) -> CreatePasteRequest {
        CreatePasteRequest {
            content: "hello".to_owned(),
            ttl_seconds,
            max_views,
        }
    }

    fn is_paste_id(id: &str) -> bool {
        id.len() == PASTE_ID_LEN && id.bytes().all(|byte| PASTE_ID_ALPHABET.contains(&byte))
    }

    #[test]
    fn test_generate_paste_id() {
        let first = generate_paste_id();
        let second = generate_paste_id();
        assert!(is_paste_id(&first));
        assert!(is_paste_id(&second));
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn test_create_paste_without_limits() {
        let mut mock_repo = MockPasteRepository::new();
        mock_repo
            .expect_create_paste()
            .withf(|paste| {
                is_paste_id(&paste.id)
                    && paste.content == "hello"
                    && paste.expires_at.is_none()
                    && paste.max_views.is_none()
            })
            .once()
            .return_once(|_| Ok(()));

        let id = service_with(mock_repo)
            .create_paste(request(None, None), 1_000)
            .await
            .unwrap();
        assert!(is_paste_id(&id));
    }

    #[tokio::test]
    async fn test_create_paste_computes_expiry() {
        let mut mock_repo = MockPasteRepository::new();
        mock_repo
            .expect_create_paste()
            .withf(|paste| paste.expires_at == Some(61_000) && paste.max_views == Some(2))
            .once()
            .return_once(|_| Ok(()));

        service_with(mock_repo)
            .create_paste(request(Some(60), Some(2)), 1_000)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_create_paste_expiry_is_capped() {
        let mut mock_repo = MockPasteRepository::new();
        mock_repo
            .expect_create_paste()
            .withf(|paste| paste.expires_at == Some(MAX_EPOCH_MILLIS))
            .once()
            .return_once(|_| Ok(()));

        service_with(mock_repo)
            .create_paste(request(Some(i64::MAX), None), 1_000)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_huge_ttl_paste_can_be_read_back() {
        let request = validate_create_paste(&json!({
            "content": "x",
            "ttl_seconds": 300_000_000_000_i64,
            "max_views": 5,
        }))
        .unwrap();

        let saved = Arc::new(Mutex::new(None));
        let mut mock_repo = MockPasteRepository::new();
        mock_repo.expect_create_paste().once().return_once({
            let saved = Arc::clone(&saved);
            move |paste| {
                *saved.lock().unwrap() = Some(paste);
                Ok(())
            }
        });
        service_with(mock_repo)
            .create_paste(request, 1_700_000_000_000)
            .await
            .unwrap();

        let saved = saved.lock().unwrap().take().unwrap();
        assert_eq!(saved.expires_at, Some(MAX_EPOCH_MILLIS));

        let view = PasteView::try_from(ViewedPaste {
            content: saved.content,
            remaining_views: saved.max_views.map(|views| views - 1),
            expires_at: saved.expires_at,
        })
        .unwrap();
        assert_eq!(view.content, "x");
        assert_eq!(view.remaining_views, Some(4));
        assert_eq!(
            view.expires_at.as_deref(),
            Some("9999-12-31T23:59:59.999Z")
        );
    }

    #[tokio::test]
    async fn test_create_paste_retries_taken_id() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let mut mock_repo = MockPasteRepository::new();
        mock_repo.expect_create_paste().times(2).returning({
            let attempts = Arc::clone(&attempts);
            move |_| {
                if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(SavePasteError::IdTaken)
                } else {
                    Ok(())
                }
            }
        });

        let id = service_with(mock_repo)
            .create_paste(request(None, None), 1_000)
            .await
            .unwrap();
        assert!(is_paste_id(&id));
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_create_paste_exhausts_attempts() {
        let mut mock_repo = MockPasteRepository::new();
        mock_repo
            .expect_create_paste()
            .times(3)
            .returning(|_| Err(SavePasteError::IdTaken));

        let err = service_with(mock_repo)
            .create_paste(request(None, None), 1_000)
            .await
            .unwrap_err();
        assert!(matches!(err, CreatePasteError::Internal(_)));
    }

    #[tokio::test]
    async fn test_create_paste_db_error_is_not_retried() {
        let mut mock_repo = MockPasteRepository::new();
        mock_repo
            .expect_create_paste()
            .once()
            .return_once(|_| Err(SavePasteError::Internal(anyhow!("test failure"))));

        let err = service_with(mock_repo)
            .create_paste(request(None, None), 1_000)
            .await
            .unwrap_err();
        assert!(matches!(err, CreatePasteError::Internal(err) if err.to_string() == "test failure"));
    }

    #[tokio::test]
    async fn test_get_paste_success() {
        let viewed = ViewedPaste {
            content: "hello".to_owned(),
            remaining_views: Some(0),
            expires_at: None,
        };
        let mut mock_repo = MockPasteRepository::new();
        mock_repo
            .expect_get_and_burn_view()
            .with(eq("abc123xyz0"), eq(5_000))
            .once()
            .return_once({
                let viewed = viewed.clone();
                move |_, _| Ok(BurnOutcome::Success(viewed))
            });

        let result = service_with(mock_repo)
            .get_paste("abc123xyz0", 5_000)
            .await
            .unwrap();
        assert_eq!(result, viewed);
    }

    #[tokio::test]
    async fn test_get_paste_not_found() {
        let mut mock_repo = MockPasteRepository::new();
        mock_repo
            .expect_get_and_burn_view()
            .once()
            .return_once(|_, _| Ok(BurnOutcome::NotFound));

        let err = service_with(mock_repo)
            .get_paste("abc123xyz0", 5_000)
            .await
            .unwrap_err();
        assert!(matches!(err, GetPasteError::NotFound));
    }

    #[tokio::test]
    async fn test_get_paste_db_error() {
        let mut mock_repo = MockPasteRepository::new();
        mock_repo
            .expect_get_and_burn_view()
            .once()
            .return_once(|_, _| Err(anyhow!("test error")));

        let err = service_with(mock_repo)
            .get_paste("abc123xyz0", 5_000)
            .await
            .unwrap_err();
        assert!(matches!(err, GetPasteError::Internal(err) if err.to_string() == "test error"));
    }

    #[tokio::test]
    async fn test_check_health() {
        let mut mock_repo = MockPasteRepository::new();
        mock_repo.expect_ping().once().return_once(|| Ok(()));
        service_with(mock_repo).check_health().await.unwrap();

        let mut mock_repo = MockPasteRepository::new();
        mock_repo
            .expect_ping()
            .once()
            .return_once(|| Err(anyhow!("connection refused")));
        assert!(service_with(mock_repo).check_health().await.is_err());
    }
}
