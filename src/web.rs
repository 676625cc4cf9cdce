use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing,
};
use rearch::CapsuleHandle;
use serde_json::Value;
use tracing::{error, info, instrument};
use url::Url;
use uuid::Uuid;

use crate::{
    api::{self, CreatedPaste, Health, InternalError, PasteView, paste_url},
    clock::{Clock, TEST_NOW_HEADER, clock_capsule},
    config::public_url_capsule,
    pages,
    paste_service::{
        CreatePasteError, GetPasteError, PasteRestService, paste_rest_service_capsule,
    },
    validation::validate_create_paste,
};

/// Everything the HTTP handlers need, pulled out of the container once.
#[derive(Clone)]
pub struct WebState {
    pub paste_service: Arc<dyn PasteRestService>,
    pub clock: Arc<dyn Clock>,
    pub public_url: Option<Url>,
}

pub fn web_state_capsule(CapsuleHandle { mut get, .. }: CapsuleHandle) -> WebState {
    WebState {
        paste_service: Arc::clone(get.as_ref(paste_rest_service_capsule)),
        clock: Arc::clone(get.as_ref(clock_capsule)),
        public_url: get.as_ref(public_url_capsule).clone(),
    }
}

pub fn router(state: WebState) -> Router {
    Router::new()
        .route("/", routing::get(index))
        .route("/pastes", routing::post(create_paste))
        .route("/pastes/{id}", routing::get(get_paste))
        .route("/p/{id}", routing::get(view_paste))
        .route("/healthz", routing::get(healthz))
        .fallback(fallback)
        .with_state(state)
}

async fn index() -> Html<String> {
    Html(pages::index_page())
}

async fn fallback() -> Response {
    not_found_json()
}

#[instrument(skip(state, headers, body))]
async fn create_paste(State(state): State<WebState>, headers: HeaderMap, body: Bytes) -> Response {
    let Ok(body) = serde_json::from_slice::<Value>(&body) else {
        info!("User submitted malformed JSON");
        return (
            StatusCode::BAD_REQUEST,
            Json(api::Error {
                error: "Invalid JSON".to_owned(),
            }),
        )
            .into_response();
    };

    let request = match validate_create_paste(&body) {
        Ok(request) => request,
        Err(validation_errors) => {
            info!(?validation_errors, "User submitted a bad request");
            return (StatusCode::BAD_REQUEST, Json(validation_errors)).into_response();
        }
    };

    let id = match state
        .paste_service
        .create_paste(request, now_ms(&state, &headers))
        .await
    {
        Ok(id) => id,
        Err(CreatePasteError::Internal(err)) => return internal_server_error(&err),
    };

    let base_url = state
        .public_url
        .clone()
        .map_or_else(|| base_url_from_host(&headers), Ok);
    match base_url.and_then(|base_url| paste_url(&base_url, &id)) {
        Ok(url) => Json(CreatedPaste {
            id,
            url: url.into(),
        })
        .into_response(),
        Err(parse_error) => internal_server_error(&anyhow::Error::new(parse_error)),
    }
}

#[instrument(skip(state, headers))]
async fn get_paste(
    State(state): State<WebState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    match state
        .paste_service
        .get_paste(&id, now_ms(&state, &headers))
        .await
    {
        Ok(paste) => match PasteView::try_from(paste) {
            Ok(view) => Json(view).into_response(),
            Err(format_error) => internal_server_error(&format_error),
        },
        Err(GetPasteError::NotFound) => not_found_json(),
        Err(GetPasteError::Internal(err)) => internal_server_error(&err),
    }
}

#[instrument(skip(state, headers))]
async fn view_paste(
    State(state): State<WebState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    match state
        .paste_service
        .get_paste(&id, now_ms(&state, &headers))
        .await
    {
        Ok(paste) => Html(pages::paste_page(&paste)).into_response(),
        Err(GetPasteError::NotFound) => {
            (StatusCode::NOT_FOUND, Html(pages::not_found_page())).into_response()
        }
        Err(GetPasteError::Internal(err)) => {
            let err_uuid = Uuid::new_v4();
            error!(?err_uuid, ?err, "Encountered an error during a request");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Html(pages::error_page(&err_uuid.to_string())),
            )
                .into_response()
        }
    }
}

#[instrument(skip(state))]
async fn healthz(State(state): State<WebState>) -> Response {
    match state.paste_service.check_health().await {
        Ok(()) => Json(Health {
            ok: true,
            error: None,
        })
        .into_response(),
        Err(err) => {
            error!(?err, "Health check failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(Health {
                    ok: false,
                    error: Some("Database health check failed".to_owned()),
                }),
            )
                .into_response()
        }
    }
}

fn now_ms(state: &WebState, headers: &HeaderMap) -> i64 {
    let test_now_ms = headers
        .get(TEST_NOW_HEADER)
        .and_then(|value| value.to_str().ok());
    state.clock.now_ms(test_now_ms)
}

fn base_url_from_host(headers: &HeaderMap) -> Result<Url, url::ParseError> {
    let host = headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("localhost");
    Url::parse(&format!("http://{host}"))
}

fn not_found_json() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(api::Error {
            error: "Not found".to_owned(),
        }),
    )
        .into_response()
}

fn internal_server_error(err: &anyhow::Error) -> Response {
    let err_uuid = Uuid::new_v4();
    error!(?err_uuid, ?err, "Encountered an error during a request");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(InternalError {
            error: "Internal server error".to_owned(),
            error_id: err_uuid.to_string(),
        }),
    )
        .into_response()
}
