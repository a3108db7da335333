use std::path::Path;

use actix_cors::Cors;
use actix_files::Files;
use actix_web::{
    get, http::header, http::StatusCode, middleware, post, web, App, HttpResponse, HttpServer,
    Responder,
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio_util::io::ReaderStream;
use tracing::{info, warn};

use crate::config::Config;
use crate::models::{validate_source_ref, CreateJobRequest, State};
use crate::registry::JobRegistry;
use crate::selector::available_qualities;
use crate::status::{status_stream, POLL_INTERVAL};

struct AppState {
    registry: JobRegistry,
}

#[derive(Serialize)]
struct CreateJobResponse {
    job_id: String,
    status: State,
    stream_url: String,
    download_url: String,
}

#[derive(Deserialize)]
struct InfoParams {
    video_id: Option<String>,
}

#[derive(Serialize)]
struct InfoResponse {
    title: String,
    qualities: Vec<String>,
}

#[derive(Serialize)]
enum ErrorType {
    InvalidVideoId,
    JobNotFound,
    NotReady,
    UpstreamUnavailable,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorType,
    description: String,
}

fn build_error_response(
    status: StatusCode,
    error_type: ErrorType,
    description: &str,
) -> HttpResponse {
    HttpResponse::build(status).json(ErrorResponse {
        error: error_type,
        description: description.to_owned(),
    })
}

fn not_found() -> HttpResponse {
    build_error_response(StatusCode::NOT_FOUND, ErrorType::JobNotFound, "Job not found")
}

#[post("/api/job")]
async fn create_job(
    data: web::Data<AppState>,
    params: web::Json<CreateJobRequest>,
) -> impl Responder {
    match data.registry.create(&params.video_id, params.quality.as_deref()) {
        Ok(job) => HttpResponse::Accepted().json(CreateJobResponse {
            job_id: job.id.to_string(),
            status: job.state,
            stream_url: format!("/api/events/{}", job.id),
            download_url: format!("/api/download/{}", job.id),
        }),
        Err(err) => build_error_response(
            StatusCode::BAD_REQUEST,
            ErrorType::InvalidVideoId,
            &err.user_message(),
        ),
    }
}

#[get("/api/job/{id}")]
async fn get_job(data: web::Data<AppState>, id: web::Path<String>) -> impl Responder {
    match data.registry.get(&id) {
        Ok(job) => HttpResponse::Ok().json(job),
        Err(_) => not_found(),
    }
}

#[get("/api/events/{id}")]
async fn events(data: web::Data<AppState>, id: web::Path<String>) -> impl Responder {
    let stream = status_stream(data.registry.store().clone(), &id, POLL_INTERVAL)
        .map(|event| Ok::<_, std::io::Error>(web::Bytes::from(event.to_sse())));

    HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header((header::CACHE_CONTROL, "no-cache"))
        .streaming(stream)
}

#[get("/api/download/{id}")]
async fn download(data: web::Data<AppState>, id: web::Path<String>) -> impl Responder {
    let job = match data.registry.get(&id) {
        Ok(job) => job,
        Err(_) => return not_found(),
    };

    if job.state != State::Ready {
        return build_error_response(StatusCode::BAD_REQUEST, ErrorType::NotReady, "Not ready");
    }

    let (Some(path), Some(filename)) = (job.output_path, job.filename) else {
        return not_found();
    };

    let file = match tokio::fs::File::open(&path).await {
        Ok(file) => file,
        Err(err) => {
            warn!(id = %job.id, "ready output could not be opened: {err}");
            return not_found();
        }
    };

    HttpResponse::Ok()
        .content_type("video/mp4")
        .insert_header((
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{filename}\""),
        ))
        .streaming(ReaderStream::new(file))
}

#[get("/api/info")]
async fn video_info(
    data: web::Data<AppState>,
    params: web::Query<InfoParams>,
) -> impl Responder {
    let Some(video_id) = params.video_id.as_deref() else {
        return build_error_response(
            StatusCode::BAD_REQUEST,
            ErrorType::InvalidVideoId,
            "video_id required",
        );
    };

    if let Err(err) = validate_source_ref(video_id) {
        return build_error_response(
            StatusCode::BAD_REQUEST,
            ErrorType::InvalidVideoId,
            &err.user_message(),
        );
    }

    match data.registry.source().fetch_metadata(video_id).await {
        Ok(info) => HttpResponse::Ok().json(InfoResponse {
            qualities: available_qualities(&info.formats),
            title: info.title,
        }),
        Err(err) => {
            warn!(video_id, "info lookup failed: {err}");
            build_error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorType::UpstreamUnavailable,
                &err.user_message(),
            )
        }
    }
}

fn configure(registry: JobRegistry) -> impl FnOnce(&mut web::ServiceConfig) {
    move |cfg| {
        cfg.app_data(web::Data::new(AppState { registry }))
            .service(create_job)
            .service(get_job)
            .service(events)
            .service(download)
            .service(video_info);
    }
}

/// CORS policy for browser clients on other origins. `*` allows any origin without credentials.
fn cors(allowed_origins: &[String]) -> Cors {
    let cors = Cors::default()
        .allowed_methods(vec!["GET", "POST", "OPTIONS"])
        .allowed_headers(vec![header::CONTENT_TYPE, header::AUTHORIZATION]);

    if allowed_origins.iter().any(|origin| origin.as_str() == "*") {
        return cors.allow_any_origin().send_wildcard();
    }

    allowed_origins
        .iter()
        .fold(cors.supports_credentials(), |cors, origin| cors.allowed_origin(origin))
}

fn frontend(web_dir: &Path) -> Files {
    Files::new("/", web_dir).index_file("index.html")
}

pub async fn start_web_server(registry: JobRegistry, config: &Config) -> std::io::Result<()> {
    let port = config.port;
    let allowed_origins = config.allowed_origins.clone();
    let web_dir = config.web_dir.clone();

    info!("Starting web server at 0.0.0.0:{port}...");

    HttpServer::new(move || {
        App::new()
            .wrap(middleware::Condition::new(
                !allowed_origins.is_empty(),
                cors(&allowed_origins),
            ))
            .wrap(middleware::Logger::default())
            .configure(configure(registry.clone()))
            .service(frontend(&web_dir))
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}
