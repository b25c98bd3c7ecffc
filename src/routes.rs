use std::sync::Arc;

use axum::{
    body::Body,
    extract::{DefaultBodyLimit, MatchedPath, Multipart, Path, Request, State},
    http::{header, Method},
    response::Response,
    routing::{get, post},
    Json,
    Router,
};
use blob_gateway::{BlobGateway, BlobMetadata, PutResult};
use futures::{StreamExt, TryStreamExt};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info};
use utoipa::OpenApi;

use crate::{
    http_objects::{
        Blob,
        BlobGateAPIError,
        BlobList,
        BlobLocator,
        BlobNameList,
        DeleteResult,
        SalesReceipt,
        SalesRequestBody,
        UploadBlob,
        UploadResult,
    },
    metrics::{api_io_stats, Increment},
    relay::{SalesRequest, SubmissionRelay},
};

#[derive(OpenApi)]
#[openapi(
        paths(
            list_blobs,
            list_blob_names,
            upload_blob,
            download_blob,
            get_blob_locator,
            describe_blob,
            delete_blob,
            submit_sales_request,
        ),
        components(
            schemas(
                BlobGateAPIError,
                Blob,
                BlobList,
                BlobNameList,
                BlobLocator,
                UploadBlob,
                UploadResult,
                DeleteResult,
                SalesRequestBody,
                SalesReceipt,
            )
        ),
        tags(
            (name = "blobgate", description = "Blob gateway API")
        )
    )]
struct ApiDoc;

#[derive(Clone)]
pub struct RouteState {
    pub gateway: Arc<BlobGateway>,
    pub relay: Arc<SubmissionRelay>,
    pub metrics: Arc<api_io_stats::Metrics>,
}

pub fn create_routes(route_state: RouteState, max_upload_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_origin(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(index))
        .route("/docs/openapi.json", get(openapi))
        .route(
            "/containers/{container}/blobs",
            get(list_blobs).with_state(route_state.clone()),
        )
        .route(
            "/containers/{container}/blob_names",
            get(list_blob_names).with_state(route_state.clone()),
        )
        .route(
            "/containers/{container}/blobs/{name}",
            post(upload_blob)
                .get(download_blob)
                .delete(delete_blob)
                .with_state(route_state.clone()),
        )
        .route(
            "/containers/{container}/blobs/{name}/locator",
            get(get_blob_locator).with_state(route_state.clone()),
        )
        .route(
            "/containers/{container}/blobs/{name}/descriptor",
            get(describe_blob).with_state(route_state.clone()),
        )
        .route(
            "/sales_requests",
            post(submit_sales_request).with_state(route_state.clone()),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &Request| {
                    let method = req.method();
                    let uri = req.uri();

                    let matched_path = req
                        .extensions()
                        .get::<MatchedPath>()
                        .map(|matched_path| matched_path.as_str());

                    tracing::debug_span!("request", %method, %uri, matched_path)
                })
                .on_failure(()),
        )
        .layer(cors)
        .layer(DefaultBodyLimit::max(max_upload_bytes))
}

async fn index() -> &'static str {
    "Blobgate Server"
}

async fn openapi() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// List blobs in a container with access locators and metadata
#[utoipa::path(
    get,
    path = "/containers/{container}/blobs",
    tag = "blobs",
    responses(
        (status = 200, description = "Blobs in listing order", body = BlobList),
        (status = 400, description = "Invalid container name"),
        (status = INTERNAL_SERVER_ERROR, description = "Internal Server Error")
    ),
)]
pub async fn list_blobs(
    Path(container): Path<String>,
    State(state): State<RouteState>,
) -> Result<Json<BlobList>, BlobGateAPIError> {
    let blobs = state.gateway.list_enriched(&container).await?;
    Ok(Json(BlobList {
        blobs: blobs.into_iter().map(Blob::from).collect(),
    }))
}

/// List blob names in a container
#[utoipa::path(
    get,
    path = "/containers/{container}/blob_names",
    tag = "blobs",
    responses(
        (status = 200, description = "Blob names in store order", body = BlobNameList),
        (status = 400, description = "Invalid container name"),
        (status = INTERNAL_SERVER_ERROR, description = "Internal Server Error")
    ),
)]
pub async fn list_blob_names(
    Path(container): Path<String>,
    State(state): State<RouteState>,
) -> Result<Json<BlobNameList>, BlobGateAPIError> {
    let names: Vec<String> = state.gateway.list_names(&container)?.try_collect().await?;
    Ok(Json(BlobNameList { names }))
}

/// Upload a blob. `title` and `comment` must precede `file`; empty values
/// are treated as absent.
#[utoipa::path(
    post,
    path = "/containers/{container}/blobs/{name}",
    request_body(content_type = "multipart/form-data", content = inline(UploadBlob)),
    tag = "blobs",
    responses(
        (status = 200, description = "upload successful", body = UploadResult),
        (status = 400, description = "bad request"),
        (status = INTERNAL_SERVER_ERROR, description = "Internal Server Error")
    ),
)]
pub async fn upload_blob(
    Path((container, name)): Path<(String, String)>,
    State(state): State<RouteState>,
    mut form: Multipart,
) -> Result<Json<UploadResult>, BlobGateAPIError> {
    let mut committed = false;
    let read = read_upload_form(&state, &container, &name, &mut form, &mut committed).await;
    let put = match read {
        Ok(put) => put,
        Err(err) => {
            // a rejected form must not leave its file behind
            if committed {
                if let Err(delete_err) = state.gateway.delete(&name, &container).await {
                    error!(
                        container = %container,
                        name = %name,
                        error = %delete_err,
                        "failed to discard rejected upload"
                    );
                }
            }
            return Err(err);
        }
    };

    Increment::inc(&state.metrics.uploads, &[]);
    state.metrics.upload_bytes.add(put.size_bytes, &[]);
    Ok(Json(put.into()))
}

/// Streams the `file` field into the gateway. `committed` is set once the
/// store has accepted the content.
async fn read_upload_form(
    state: &RouteState,
    container: &str,
    name: &str,
    form: &mut Multipart,
    committed: &mut bool,
) -> Result<PutResult, BlobGateAPIError> {
    let mut metadata = BlobMetadata::default();
    let mut uploaded = None;

    while let Some(field) = form
        .next_field()
        .await
        .map_err(|e| BlobGateAPIError::bad_request(&e.to_string()))?
    {
        let field_name = field.name().unwrap_or_default().to_string();
        match field_name.as_str() {
            "title" | "comment" => {
                if uploaded.is_some() {
                    return Err(BlobGateAPIError::bad_request(
                        "title and comment must precede file",
                    ));
                }
                let text = field
                    .text()
                    .await
                    .map_err(|e| BlobGateAPIError::bad_request(&e.to_string()))?;
                let value = Some(text).filter(|t| !t.is_empty());
                if field_name == "title" {
                    metadata.title = value;
                } else {
                    metadata.comment = value;
                }
            }
            "file" => {
                if uploaded.is_some() {
                    return Err(BlobGateAPIError::bad_request("only one file is accepted"));
                }
                let content_type = field.content_type().map(str::to_string);
                let stream = field
                    .map(|res| res.map_err(|err| anyhow::anyhow!(err)))
                    .boxed();
                let put = state
                    .gateway
                    .upload(name, container, stream, content_type.as_deref(), &metadata)
                    .await?;
                *committed = true;
                uploaded = Some(put);
            }
            other => {
                info!("ignoring unknown upload field {}", other);
            }
        }
    }

    uploaded.ok_or_else(|| BlobGateAPIError::bad_request("file is required"))
}

/// Download a blob's content
#[utoipa::path(
    get,
    path = "/containers/{container}/blobs/{name}",
    tag = "blobs",
    responses(
        (status = 200, description = "Blob content"),
        (status = 404, description = "Blob not found"),
        (status = INTERNAL_SERVER_ERROR, description = "Internal Server Error")
    ),
)]
pub async fn download_blob(
    Path((container, name)): Path<(String, String)>,
    State(state): State<RouteState>,
) -> Result<Response<Body>, BlobGateAPIError> {
    let (properties, content) = state.gateway.download(&name, &container).await?;
    let content_type = properties
        .content_type
        .unwrap_or_else(|| "application/octet-stream".to_string());

    Response::builder()
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_LENGTH, properties.size_bytes.to_string())
        .body(Body::from_stream(content))
        .map_err(|e| BlobGateAPIError::internal_error_str(&e.to_string()))
}

/// Canonical, unsigned locator of a blob
#[utoipa::path(
    get,
    path = "/containers/{container}/blobs/{name}/locator",
    tag = "blobs",
    responses(
        (status = 200, description = "Locator", body = BlobLocator),
        (status = 400, description = "Invalid container or blob name")
    ),
)]
pub async fn get_blob_locator(
    Path((container, name)): Path<(String, String)>,
    State(state): State<RouteState>,
) -> Result<Json<BlobLocator>, BlobGateAPIError> {
    let locator = state.gateway.get_locator(&name, &container)?;
    Ok(Json(BlobLocator { locator }))
}

/// A single blob with access locator and metadata
#[utoipa::path(
    get,
    path = "/containers/{container}/blobs/{name}/descriptor",
    tag = "blobs",
    responses(
        (status = 200, description = "Blob", body = Blob),
        (status = 404, description = "Blob not found"),
        (status = INTERNAL_SERVER_ERROR, description = "Internal Server Error")
    ),
)]
pub async fn describe_blob(
    Path((container, name)): Path<(String, String)>,
    State(state): State<RouteState>,
) -> Result<Json<Blob>, BlobGateAPIError> {
    let descriptor = state.gateway.describe(&name, &container).await?;
    Ok(Json(descriptor.into()))
}

/// Delete a blob
#[utoipa::path(
    delete,
    path = "/containers/{container}/blobs/{name}",
    tag = "blobs",
    responses(
        (status = 200, description = "Whether the blob existed", body = DeleteResult),
        (status = 400, description = "Invalid container or blob name"),
        (status = INTERNAL_SERVER_ERROR, description = "Internal Server Error")
    ),
)]
pub async fn delete_blob(
    Path((container, name)): Path<(String, String)>,
    State(state): State<RouteState>,
) -> Result<Json<DeleteResult>, BlobGateAPIError> {
    let existed = state.gateway.delete(&name, &container).await?;
    Ok(Json(DeleteResult { existed }))
}

/// Submit a sales request to the processing queue
#[utoipa::path(
    post,
    path = "/sales_requests",
    request_body = SalesRequestBody,
    tag = "sales",
    responses(
        (status = 200, description = "Request accepted", body = SalesReceipt),
        (status = 400, description = "bad request"),
        (status = INTERNAL_SERVER_ERROR, description = "Internal Server Error")
    ),
)]
pub async fn submit_sales_request(
    State(state): State<RouteState>,
    Json(request): Json<SalesRequest>,
) -> Result<Json<SalesReceipt>, BlobGateAPIError> {
    let receipt = state.relay.submit(request).await?;
    Ok(Json(receipt.into()))
}
