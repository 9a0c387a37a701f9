//! Upload validation: MIME allow-list, per-file size ceiling, and
//! traversal-free filenames. Any violation rejects the whole request
//! with a code naming the failed check.

use axum::http::StatusCode;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;

use crate::config::UploadConfig;
use crate::pipeline::{ErrorCode, FileUpload, Rejection, RequestContext, Stage, StageOutcome};

/// Validator applied to every file descriptor on the request.
pub struct UploadValidator {
    allowed_types: Vec<String>,
    max_file_bytes: u64,
}

impl UploadValidator {
    pub fn from_config(config: &UploadConfig) -> Self {
        Self {
            allowed_types: config.allowed_types.clone(),
            max_file_bytes: config.max_file_bytes,
        }
    }

    pub fn validate(&self, file: &FileUpload) -> Result<(), Rejection> {
        if !self
            .allowed_types
            .iter()
            .any(|t| file.content_type.eq_ignore_ascii_case(t))
        {
            return Err(Rejection::new(
                StatusCode::BAD_REQUEST,
                ErrorCode::InvalidFileType,
                format!("File type {} is not allowed", file.content_type),
            ));
        }
        if file.size > self.max_file_bytes {
            return Err(Rejection::new(
                StatusCode::BAD_REQUEST,
                ErrorCode::FileTooLarge,
                format!("File exceeds {} bytes", self.max_file_bytes),
            ));
        }
        if file.filename.contains("..") || file.filename.contains('/') {
            return Err(Rejection::new(
                StatusCode::BAD_REQUEST,
                ErrorCode::InvalidFileName,
                "File name contains path traversal characters",
            ));
        }
        Ok(())
    }
}

pub struct UploadStage {
    validator: UploadValidator,
}

impl UploadStage {
    pub fn new(validator: UploadValidator) -> Self {
        Self { validator }
    }
}

impl Stage for UploadStage {
    fn name(&self) -> &'static str {
        "upload"
    }

    fn apply<'a>(&'a self, ctx: RequestContext) -> BoxFuture<'a, StageOutcome> {
        async move {
            for file in &ctx.files {
                if let Err(rejection) = self.validator.validate(file) {
                    tracing::warn!(
                        client = %ctx.client_ip,
                        filename = %file.filename,
                        content_type = %file.content_type,
                        size = file.size,
                        code = rejection.code.as_str(),
                        "Upload rejected"
                    );
                    return StageOutcome::Reject(rejection);
                }
            }
            StageOutcome::Continue(ctx)
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> UploadValidator {
        UploadValidator {
            allowed_types: vec![
                "image/jpeg".to_string(),
                "image/png".to_string(),
                "image/gif".to_string(),
                "image/webp".to_string(),
            ],
            max_file_bytes: 5 * 1024 * 1024,
        }
    }

    fn file(name: &str, mime: &str, size: u64) -> FileUpload {
        FileUpload {
            filename: name.to_string(),
            content_type: mime.to_string(),
            size,
        }
    }

    #[test]
    fn shell_script_mime_is_rejected() {
        let err = validator()
            .validate(&file("run.sh", "application/x-sh", 100))
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidFileType);
    }

    #[test]
    fn oversized_image_is_rejected() {
        let err = validator()
            .validate(&file("big.png", "image/png", 6 * 1024 * 1024))
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::FileTooLarge);
    }

    #[test]
    fn traversal_filename_is_rejected() {
        let err = validator()
            .validate(&file("../../etc/passwd", "image/png", 100))
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidFileName);
    }

    #[test]
    fn valid_image_is_accepted() {
        assert!(validator()
            .validate(&file("photo.png", "image/png", 2 * 1024 * 1024))
            .is_ok());
    }

    #[tokio::test]
    async fn first_bad_file_rejects_the_request() {
        use crate::pipeline::context::test_context;

        let mut ctx = test_context();
        ctx.files = vec![
            file("ok.png", "image/png", 10),
            file("bad.sh", "application/x-sh", 10),
        ];
        let stage = UploadStage::new(validator());
        match stage.apply(ctx).await {
            StageOutcome::Reject(r) => assert_eq!(r.code, ErrorCode::InvalidFileType),
            StageOutcome::Continue(_) => panic!("request with bad file must be rejected"),
        }
    }
}
