//! Five routes bridging client requests to the coordinator and the job-dispatch
//! stand-in. Input-validation failures translate to `400` with a small JSON error
//! envelope.

use std::sync::Arc;

use actix_multipart::Multipart;
use actix_web::{web, HttpResponse, Responder};
use futures_util::TryStreamExt;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::coordinator::JobCoordinator;
use crate::dispatch::{JobRegistry, JobState};
use crate::download::{build_zip, plan_download, DownloadPlan};
use crate::model::{CreateTaskRequest, FileTaskRequest};
use crate::rewriter;

pub struct AppState {
    pub config: Arc<AppConfig>,
    pub coordinator: Arc<JobCoordinator>,
    pub registry: Arc<JobRegistry>,
}

fn bad_request(message: impl std::fmt::Display) -> HttpResponse {
    HttpResponse::BadRequest().json(serde_json::json!({ "error": message.to_string() }))
}

pub async fn ping() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({ "status": "ok", "service": "isobox" }))
}

pub async fn create_task(
    state: web::Data<AppState>,
    body: web::Json<CreateTaskRequest>,
) -> impl Responder {
    let request = body.into_inner();
    if let Err(e) = request.validate() {
        return bad_request(e);
    }

    let job_id = state
        .registry
        .submit_code(
            state.coordinator.clone(),
            request.programming_language,
            request.source_code,
        )
        .await;

    log::info!("task {job_id} accepted");
    HttpResponse::Accepted().json(serde_json::json!({ "task_id": job_id, "status": "accepted" }))
}

pub async fn task_result(state: web::Data<AppState>, task_id: web::Path<String>) -> impl Responder {
    let job_id = match Uuid::parse_str(&task_id) {
        Ok(id) => id,
        Err(_) => return bad_request("task_id is not a valid identifier"),
    };

    match state.registry.fetch(job_id).await {
        None => HttpResponse::NotFound().json(serde_json::json!({ "error": "unknown task_id" })),
        Some(JobState::Pending) => {
            HttpResponse::Accepted().json(serde_json::json!({ "state": "pending" }))
        }
        Some(JobState::Done(result)) => HttpResponse::Ok().json(result),
    }
}

async fn read_field_bytes(field: &mut actix_multipart::Field) -> Vec<u8> {
    let mut bytes = Vec::new();
    while let Ok(Some(chunk)) = field.try_next().await {
        bytes.extend_from_slice(&chunk);
    }
    bytes
}

async fn read_field_text(field: &mut actix_multipart::Field) -> String {
    String::from_utf8_lossy(&read_field_bytes(field).await).into_owned()
}

pub async fn create_file_task(
    state: web::Data<AppState>,
    mut payload: Multipart,
) -> impl Responder {
    let mut programming_language: Option<String> = None;
    let mut source_code: Option<String> = None;
    let mut declared_inputs = Vec::new();
    let mut declared_outputs = Vec::new();
    let mut uploaded: Vec<(String, Vec<u8>)> = Vec::new();

    loop {
        let mut field = match payload.try_next().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return bad_request(e),
        };

        let field_name = field
            .content_disposition()
            .and_then(|cd| cd.get_name())
            .unwrap_or("")
            .to_string();

        match field_name.as_str() {
            "programming_language" => {
                programming_language = Some(read_field_text(&mut field).await)
            }
            "source_code" => source_code = Some(read_field_text(&mut field).await),
            "input_files" => declared_inputs.push(read_field_text(&mut field).await),
            "output_files" => declared_outputs.push(read_field_text(&mut field).await),
            "files" => {
                let filename = field
                    .content_disposition()
                    .and_then(|cd| cd.get_filename())
                    .unwrap_or("")
                    .to_string();
                let bytes = read_field_bytes(&mut field).await;
                uploaded.push((filename, bytes));
            }
            _ => {}
        }
    }

    let (programming_language, source_code) = match (programming_language, source_code) {
        (Some(l), Some(s)) => (l, s),
        _ => return bad_request("programming_language and source_code are required"),
    };

    let uploaded_names: Vec<String> = uploaded.iter().map(|(name, _)| name.clone()).collect();
    let request = FileTaskRequest {
        programming_language: programming_language.clone(),
        source_code: source_code.clone(),
        declared_inputs: declared_inputs.clone(),
        declared_outputs: declared_outputs.clone(),
        uploaded_names,
    };
    if let Err(e) = request.validate() {
        return bad_request(e);
    }

    let job_id = Uuid::new_v4();
    let input_dir = state.config.storage_in.join(job_id.to_string());
    if let Err(e) = std::fs::create_dir_all(&input_dir) {
        log::error!("failed to create input directory for job {job_id}: {e}");
        return HttpResponse::InternalServerError()
            .json(serde_json::json!({ "error": "internal error" }));
    }
    for (name, bytes) in &uploaded {
        let Some(basename) = std::path::Path::new(name).file_name() else {
            return bad_request("uploaded file has no basename");
        };
        if let Err(e) = std::fs::write(input_dir.join(basename), bytes) {
            log::error!("failed to persist uploaded file for job {job_id}: {e}");
            return HttpResponse::InternalServerError()
                .json(serde_json::json!({ "error": "internal error" }));
        }
    }

    let rewritten = match rewriter::rewrite(
        &source_code,
        job_id,
        &declared_inputs,
        &state.config.storage_in,
        &state.config.storage_out,
    ) {
        Ok(rewritten) => rewritten,
        Err(e) => return bad_request(e),
    };

    state
        .registry
        .submit_code_with_files(
            state.coordinator.clone(),
            job_id,
            programming_language,
            rewritten,
            declared_outputs,
        )
        .await;

    log::info!("file task {job_id} accepted");
    HttpResponse::Accepted().json(serde_json::json!({ "task_id": job_id, "status": "accepted" }))
}

pub async fn download_file_task(
    state: web::Data<AppState>,
    task_id: web::Path<String>,
) -> impl Responder {
    let job_id = match Uuid::parse_str(&task_id) {
        Ok(id) => id,
        Err(_) => return bad_request("task_id is not a valid identifier"),
    };

    match state.registry.fetch(job_id).await {
        None => HttpResponse::NotFound().json(serde_json::json!({ "error": "unknown task_id" })),
        Some(JobState::Pending) => {
            HttpResponse::Accepted().json(serde_json::json!({ "state": "pending" }))
        }
        Some(JobState::Done(result)) => match plan_download(&result.output_files) {
            DownloadPlan::NoOutputs => {
                HttpResponse::NotFound().json(serde_json::json!({ "error": "no output files" }))
            }
            DownloadPlan::SingleFile(entry) => match std::fs::read(&entry.storage_path) {
                Ok(bytes) => HttpResponse::Ok()
                    .insert_header((
                        "Content-Disposition",
                        format!("attachment; filename=\"{}\"", entry.archive_name),
                    ))
                    .body(bytes),
                Err(_) => HttpResponse::NotFound()
                    .json(serde_json::json!({ "error": "output file missing" })),
            },
            DownloadPlan::Zip(entries) => {
                let built = tokio::task::spawn_blocking(move || build_zip(&entries)).await;
                match built {
                    Ok(Ok(mut stream)) => {
                        let mut bytes = Vec::new();
                        if std::io::Read::read_to_end(&mut stream, &mut bytes).is_err() {
                            return HttpResponse::InternalServerError()
                                .json(serde_json::json!({ "error": "failed to build archive" }));
                        }
                        HttpResponse::Ok()
                            .insert_header((
                                "Content-Disposition",
                                "attachment; filename=\"output.zip\"",
                            ))
                            .content_type("application/zip")
                            .body(bytes)
                    }
                    _ => HttpResponse::InternalServerError()
                        .json(serde_json::json!({ "error": "failed to build archive" })),
                }
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{test, App};

    fn test_state() -> web::Data<AppState> {
        let tmp = tempfile::tempdir().unwrap();
        let config = Arc::new(AppConfig {
            storage_in: tmp.path().join("in"),
            storage_out: tmp.path().join("out"),
            base_dir: tmp.path().to_path_buf(),
            queue_url: None,
            result_store_url: None,
            saving_mode: crate::config::SavingMode::Local,
            job_timeout_secs: 5,
            truncation_cap: 64_000,
            sandbox_image: crate::language::SANDBOX_IMAGE.to_string(),
        });
        std::mem::forget(tmp);
        web::Data::new(AppState {
            coordinator: Arc::new(JobCoordinator::new(config.clone())),
            registry: Arc::new(JobRegistry::new()),
            config,
        })
    }

    #[actix_web::test]
    async fn ping_returns_ok() {
        let app = test::init_service(App::new().route("/core/ping", web::get().to(ping))).await;
        let req = test::TestRequest::get().uri("/core/ping").to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());
    }

    #[actix_web::test]
    async fn create_task_rejects_oversized_source() {
        let state = test_state();
        let app = test::init_service(
            App::new()
                .app_data(state)
                .route("/task/create", web::post().to(create_task)),
        )
        .await;

        let oversized = "x".repeat(crate::model::MAX_SOURCE_BYTES + 1);
        let req = test::TestRequest::post()
            .uri("/task/create")
            .set_json(
                serde_json::json!({ "programming_language": "python", "source_code": oversized }),
            )
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400);
    }

    #[actix_web::test]
    async fn create_task_then_poll_reaches_a_terminal_state() {
        let state = test_state();
        let app = test::init_service(
            App::new()
                .app_data(state)
                .route("/task/create", web::post().to(create_task))
                .route("/task/{task_id}/task_result", web::get().to(task_result)),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/task/create")
            .set_json(serde_json::json!({ "programming_language": "haskell", "source_code": "main = pure ()" }))
            .to_request();
        let resp: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        let task_id = resp["task_id"].as_str().unwrap().to_string();

        let mut body = serde_json::json!({});
        for _ in 0..50 {
            let req = test::TestRequest::get()
                .uri(&format!("/task/{task_id}/task_result"))
                .to_request();
            body = test::call_and_read_body_json(&app, req).await;
            if body.get("returncode").is_some() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(body["returncode"], 2);
    }

    #[actix_web::test]
    async fn task_result_for_unknown_id_is_not_found() {
        let state = test_state();
        let app = test::init_service(
            App::new()
                .app_data(state)
                .route("/task/{task_id}/task_result", web::get().to(task_result)),
        )
        .await;

        let req = test::TestRequest::get()
            .uri(&format!("/task/{}/task_result", Uuid::new_v4()))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 404);
    }

    #[actix_web::test]
    async fn task_result_for_malformed_id_is_bad_request() {
        let state = test_state();
        let app = test::init_service(
            App::new()
                .app_data(state)
                .route("/task/{task_id}/task_result", web::get().to(task_result)),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/task/not-a-uuid/task_result")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400);
    }
}
