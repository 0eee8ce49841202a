//! OpenAPI documentation and schema generation
//!
//! The specification is generated at compile time with utoipa and served at
//! `/openapi.json` (and through Swagger UI at `/swagger-ui` when enabled).

use utoipa::OpenApi;

/// OpenAPI documentation for the logpulse REST API
#[derive(OpenApi)]
#[openapi(
    info(
        title = "logpulse REST API",
        version = "0.1.0",
        description = "Upload logs for streaming analysis and follow the resulting jobs",
        license(
            name = "MIT OR Apache-2.0"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development server")
    ),
    paths(
        // Uploads
        crate::api::routes::upload_log,

        // Jobs
        crate::api::routes::list_jobs,
        crate::api::routes::get_job,

        // System
        crate::api::routes::health_check,
        crate::api::routes::openapi_spec,
        crate::api::routes::event_stream,
    ),
    components(schemas(
        // Core types from types.rs
        crate::types::JobId,
        crate::types::Status,
        crate::types::JobInfo,
        crate::types::JobAccepted,
        crate::types::ResultRecord,
        crate::types::Event,

        // Delivery payload sent by the webhook notifier
        crate::notifier::Delivery,

        // Config types from config.rs
        crate::config::Config,
        crate::config::IngestConfig,
        crate::config::AnalyzerConfig,
        crate::config::NotificationConfig,
        crate::config::WebhookConfig,
        crate::config::RetryConfig,
        crate::config::PersistenceConfig,
        crate::config::ServerIntegrationConfig,
        crate::config::ApiConfig,

        // API request types from routes
        crate::api::routes::JobsQuery,
        crate::api::routes::LogUploadForm,

        // Error types from error.rs
        crate::error::ApiError,
        crate::error::ErrorDetail,
    )),
    tags(
        (name = "uploads", description = "Log uploads - Submit a log file and recipient for analysis"),
        (name = "jobs", description = "Jobs - Status of accepted uploads"),
        (name = "system", description = "System endpoints - Health checks, OpenAPI spec, events"),
    )
)]
pub struct ApiDoc;
