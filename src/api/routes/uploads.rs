//! Log upload handler.
//!
//! The file field is never held in memory. When the `email` field comes first
//! the target is reserved and the file is written chunk by chunk into the job
//! directory. A file that arrives before its recipient is written to a staging
//! file in the temp directory and moved into the job directory once the
//! request is complete.

use crate::LogPulse;
use crate::api::AppState;
use crate::error::{ApiError, Error, PipelineError, Result};
use crate::pipeline::{JobSource, Reservation};
use crate::types::JobAccepted;
use axum::{
    Json,
    extract::{
        Multipart, State,
        multipart::{Field, MultipartError},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::path::PathBuf;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Where the `file` field was written
enum Upload {
    /// Written before the recipient was known; not yet tied to a job
    Staged { filename: String, path: PathBuf },
    /// Written to its job directory under a reservation
    Spooled(Reservation),
}

/// POST /log/file - Upload a log for analysis
#[utoipa::path(
    post,
    path = "/log/file",
    tag = "uploads",
    request_body(content = LogUploadForm, description = "Log file and recipient (multipart/form-data)", content_type = "multipart/form-data"),
    responses(
        (status = 202, description = "Job accepted", body = crate::types::JobAccepted),
        (status = 400, description = "Missing or repeated field, or invalid recipient"),
        (status = 409, description = "A job for the same file and recipient is in progress"),
        (status = 413, description = "Upload exceeds the configured size limit"),
        (status = 503, description = "Shutting down")
    )
)]
pub async fn upload_log(State(state): State<AppState>, mut multipart: Multipart) -> Response {
    let pulse = &state.pulse;
    let mut recipient: Option<String> = None;
    let mut upload: Option<Upload> = None;

    let read = read_fields(pulse, &mut multipart, &mut recipient, &mut upload).await;
    if let Err(e) = read {
        discard(pulse, upload, &e.error).await;
        return e.into_response();
    }

    match finish_upload(pulse, recipient, upload).await {
        Ok(ack) => (StatusCode::ACCEPTED, Json(ack)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Error from reading the multipart body, with the status to answer
struct UploadError {
    status: Option<StatusCode>,
    error: Error,
}

impl From<Error> for UploadError {
    fn from(error: Error) -> Self {
        Self {
            status: None,
            error,
        }
    }
}

impl From<MultipartError> for UploadError {
    fn from(e: MultipartError) -> Self {
        let status = e.status();
        Self {
            status: (status == StatusCode::PAYLOAD_TOO_LARGE).then_some(status),
            error: Error::Pipeline(PipelineError::validation(format!(
                "malformed upload: {}",
                e.body_text()
            ))),
        }
    }
}

impl IntoResponse for UploadError {
    fn into_response(self) -> Response {
        match self.status {
            Some(status) => {
                let mut api_error: ApiError = self.error.into();
                api_error.error.code = "payload_too_large".to_string();
                (status, Json(api_error)).into_response()
            }
            None => self.error.into_response(),
        }
    }
}

async fn read_fields(
    pulse: &LogPulse,
    multipart: &mut Multipart,
    recipient: &mut Option<String>,
    upload: &mut Option<Upload>,
) -> std::result::Result<(), UploadError> {
    while let Some(mut field) = multipart.next_field().await? {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "email" => {
                if recipient.is_some() {
                    return Err(validation("only one email per upload").into());
                }
                *recipient = Some(field.text().await?.trim().to_string());
            }
            "file" => {
                if upload.is_some() {
                    return Err(validation("only one file per upload").into());
                }
                let filename = field
                    .file_name()
                    .map(str::to_string)
                    .ok_or_else(|| validation("file field has no filename"))?;

                match recipient.as_deref() {
                    Some(to) => {
                        let reservation = pulse.reserve(&filename, to).await?;
                        // Stored before writing so a failure below is abandoned by the caller
                        *upload = Some(Upload::Spooled(reservation.clone()));
                        let mut spool = pulse.create_spool(&reservation).await?;
                        let written = write_field(&mut field, &mut spool).await?;
                        tracing::debug!(
                            job_id = reservation.id.0,
                            bytes = written,
                            compressed = reservation.compressed,
                            "Spooled upload"
                        );
                    }
                    None => {
                        let (path, mut staging) = pulse.create_staging().await?;
                        *upload = Some(Upload::Staged { filename, path });
                        let written = write_field(&mut field, &mut staging).await?;
                        tracing::debug!(bytes = written, "Staged upload ahead of its recipient");
                    }
                }
            }
            other => {
                tracing::debug!(field = other, "Ignoring unknown upload field");
            }
        }
    }
    Ok(())
}

/// Copy a multipart field to `out` chunk by chunk
async fn write_field<W>(field: &mut Field<'_>, out: &mut W) -> std::result::Result<u64, UploadError>
where
    W: AsyncWrite + Unpin,
{
    let mut written: u64 = 0;
    while let Some(chunk) = field.chunk().await? {
        out.write_all(&chunk).await.map_err(Error::Io)?;
        written += chunk.len() as u64;
    }
    out.flush().await.map_err(Error::Io)?;
    Ok(written)
}

async fn finish_upload(
    pulse: &LogPulse,
    recipient: Option<String>,
    upload: Option<Upload>,
) -> Result<JobAccepted> {
    let Some(recipient) = recipient else {
        let e = validation("missing email field");
        discard(pulse, upload, &e).await;
        return Err(e);
    };

    let reservation = match upload {
        None => return Err(validation("missing file field")),
        Some(Upload::Spooled(reservation)) => reservation,
        Some(Upload::Staged { filename, path }) => {
            let reservation = match pulse.reserve(&filename, &recipient).await {
                Ok(reservation) => reservation,
                Err(e) => {
                    discard(pulse, Some(Upload::Staged { filename, path }), &e).await;
                    return Err(e);
                }
            };
            if let Err(e) = pulse.adopt_staged(&reservation, &path).await {
                discard(pulse, Some(Upload::Staged { filename, path }), &e).await;
                pulse.abandon(reservation, &e).await;
                return Err(e);
            }
            reservation
        }
    };

    let source = JobSource::File {
        path: reservation.spool_path(),
        compressed: reservation.compressed,
    };
    Ok(pulse.submit(reservation.into_job(source)))
}

/// Drop whatever a failed request left on disk
async fn discard(pulse: &LogPulse, upload: Option<Upload>, error: &Error) {
    match upload {
        None => {}
        Some(Upload::Spooled(reservation)) => pulse.abandon(reservation, error).await,
        Some(Upload::Staged { path, .. }) => match tokio::fs::remove_file(&path).await {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to remove staged upload");
            }
            _ => {}
        },
    }
}

fn validation(reason: &str) -> Error {
    Error::Pipeline(PipelineError::validation(reason))
}
