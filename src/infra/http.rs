//! JSON endpoints and attachment serving.
//!
//! Endpoint handlers always answer 200 with a JSON envelope; request-level
//! failures travel in the envelope's `err` field. The file route is the one
//! exception and speaks plain HTTP statuses.

use std::io::ErrorKind;
use std::sync::Arc;

use axum::{
    Json, Router,
    body::Body,
    extract::{Path, State},
    http::{
        StatusCode,
        header::{CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE, HeaderValue},
    },
    response::{IntoResponse, Response},
    routing::{get, post},
};
use tracing::error;

use crate::application::api::{
    CreateRequest, DeleteRequest, FacetsRequest, FacetsResponse, ItemResponse, ListRequest,
    ListResponse, ReadRequest, SchemaRequest, SchemaResponse, SearchRequest, SearchResponse,
    UpdateRequest,
};
use crate::application::content::ContentService;
use crate::infra::attachments::{AttachmentStore, MaterializeError};

#[derive(Clone)]
pub struct HttpState {
    pub service: Arc<ContentService>,
    pub attachments: Arc<AttachmentStore>,
}

pub fn build_router(state: HttpState) -> Router {
    Router::new()
        .route("/create", post(create))
        .route("/read", post(read))
        .route("/update", post(update))
        .route("/delete", post(delete))
        .route("/search", post(search))
        .route("/facets", post(facets))
        .route("/list", post(list))
        .route("/schema", post(schema))
        .route("/files/{content_type}/{language}/{id}/{name}", get(serve_file))
        .with_state(state)
}

/// Run a synchronous store/index operation on the blocking pool so redb and
/// tantivy work never stalls the async workers. `fallback` builds the
/// envelope for the rare case the blocking task itself dies.
async fn offload<T, F>(fallback: impl FnOnce(String) -> T, task: F) -> Json<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(task).await {
        Ok(response) => Json(response),
        Err(err) => {
            error!(target: "scrigno::http", error = %err, "blocking service task failed");
            Json(fallback("internal failure".to_string()))
        }
    }
}

async fn create(
    State(state): State<HttpState>,
    Json(request): Json<CreateRequest>,
) -> Json<ItemResponse> {
    let content_type = request.content_type.clone();
    let language = request.language.clone();
    offload(
        move |err| ItemResponse::failure(&content_type, &language, err),
        move || {
            let result = state
                .service
                .create(
                    &request.content_type,
                    &request.language,
                    &request.slug,
                    &request.slug_text,
                    request.content,
                )
                .map(serde_json::Value::Object);
            ItemResponse::from_result(&request.content_type, &request.language, result)
        },
    )
    .await
}

async fn read(
    State(state): State<HttpState>,
    Json(request): Json<ReadRequest>,
) -> Json<ItemResponse> {
    let content_type = request.content_type.clone();
    let language = request.language.clone();
    offload(
        move |err| ItemResponse::failure(&content_type, &language, err),
        move || {
            let result = state
                .service
                .read(&request.content_type, &request.language, &request.slug)
                .map(serde_json::Value::Object);
            ItemResponse::from_result(&request.content_type, &request.language, result)
        },
    )
    .await
}

async fn update(
    State(state): State<HttpState>,
    Json(request): Json<UpdateRequest>,
) -> Json<ItemResponse> {
    let content_type = request.content_type.clone();
    let language = request.language.clone();
    offload(
        move |err| ItemResponse::failure(&content_type, &language, err),
        move || {
            let result = state
                .service
                .update(
                    &request.content_type,
                    &request.language,
                    &request.slug,
                    request.content,
                )
                .map(serde_json::Value::Object);
            ItemResponse::from_result(&request.content_type, &request.language, result)
        },
    )
    .await
}

async fn delete(
    State(state): State<HttpState>,
    Json(request): Json<DeleteRequest>,
) -> Json<ItemResponse> {
    let content_type = request.content_type.clone();
    let language = request.language.clone();
    offload(
        move |err| ItemResponse::failure(&content_type, &language, err),
        move || {
            let result = state
                .service
                .delete(&request.content_type, &request.language, &request.slug)
                .map(serde_json::Value::Object);
            ItemResponse::from_result(&request.content_type, &request.language, result)
        },
    )
    .await
}

async fn search(
    State(state): State<HttpState>,
    Json(request): Json<SearchRequest>,
) -> Json<SearchResponse> {
    offload(SearchResponse::failure, move || {
        SearchResponse::from_result(state.service.search(
            &request.content_type,
            &request.language,
            &request.query,
            request.limit,
            request.skip,
        ))
    })
    .await
}

async fn facets(
    State(state): State<HttpState>,
    Json(request): Json<FacetsRequest>,
) -> Json<FacetsResponse> {
    offload(FacetsResponse::failure, move || {
        FacetsResponse::from_result(state.service.facets(
            &request.content_type,
            &request.language,
            &request.query,
            &request.fields,
        ))
    })
    .await
}

async fn list(
    State(state): State<HttpState>,
    Json(request): Json<ListRequest>,
) -> Json<ListResponse> {
    offload(ListResponse::failure, move || {
        ListResponse::from_result(state.service.list(
            &request.content_type,
            &request.language,
            request.limit,
            request.skip,
        ))
    })
    .await
}

async fn schema(
    State(state): State<HttpState>,
    Json(_request): Json<SchemaRequest>,
) -> Json<SchemaResponse> {
    Json(SchemaResponse::from_outcome(state.service.schema()))
}

async fn serve_file(
    State(state): State<HttpState>,
    Path((content_type, language, id, name)): Path<(String, String, u64, String)>,
) -> Response {
    match state.attachments.read(&content_type, &language, id, &name).await {
        Ok(bytes) => build_file_response(&name, bytes),
        Err(MaterializeError::InvalidPath) => StatusCode::NOT_FOUND.into_response(),
        Err(MaterializeError::Io(err)) if err.kind() == ErrorKind::NotFound => {
            StatusCode::NOT_FOUND.into_response()
        }
        Err(err) => {
            error!(
                target: "scrigno::http",
                content_type,
                language,
                id,
                name,
                error = %err,
                "failed to read stored attachment"
            );
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn build_file_response(name: &str, bytes: Vec<u8>) -> Response {
    let length = bytes.len();
    let mut response = Response::new(Body::from(bytes));
    *response.status_mut() = StatusCode::OK;

    let headers = response.headers_mut();
    let mime = mime_guess::from_path(name).first_or_octet_stream();
    if let Ok(value) = HeaderValue::from_str(mime.as_ref()) {
        headers.insert(CONTENT_TYPE, value);
    }
    if let Ok(value) = HeaderValue::from_str(&length.to_string()) {
        headers.insert(CONTENT_LENGTH, value);
    }
    headers.insert(
        CACHE_CONTROL,
        HeaderValue::from_static("public, max-age=31536000, immutable"),
    );

    response
}
