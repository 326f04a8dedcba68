//! Archive of original upload files, kept alongside the parsed resume.

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use tracing::info;
use uuid::Uuid;

use super::{CollaboratorError, UploadedFile};

#[async_trait]
pub trait FileArchive: Send + Sync {
    /// Stores the file and returns its object key.
    async fn store(&self, user_id: &str, file: &UploadedFile) -> Result<String, CollaboratorError>;
}

pub struct S3Archive {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3Archive {
    pub fn new(client: aws_sdk_s3::Client, bucket: String) -> Self {
        Self { client, bucket }
    }
}

#[async_trait]
impl FileArchive for S3Archive {
    async fn store(&self, user_id: &str, file: &UploadedFile) -> Result<String, CollaboratorError> {
        let key = archive_key(user_id, Uuid::new_v4(), &file.filename);
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(file.bytes.to_vec()))
            .content_type(
                file.content_type
                    .as_deref()
                    .unwrap_or("application/octet-stream"),
            )
            .send()
            .await
            .map_err(|e| CollaboratorError::Unavailable(format!("S3 upload failed: {e}")))?;

        info!("Archived upload to s3://{}/{}", self.bucket, key);
        Ok(key)
    }
}

/// `uploads/{user}/{uuid}-{filename}` with path separators and control
/// characters in either segment replaced.
pub fn archive_key(user_id: &str, id: Uuid, filename: &str) -> String {
    fn clean(segment: &str) -> String {
        segment
            .trim()
            .chars()
            .map(|c| if c == '/' || c == '\\' || c.is_control() { '_' } else { c })
            .collect()
    }
    format!("uploads/{}/{}-{}", clean(user_id), id, clean(filename))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_archive_key_layout() {
        let id = Uuid::nil();
        assert_eq!(
            archive_key("demo-user-123", id, "cv.pdf"),
            format!("uploads/demo-user-123/{id}-cv.pdf")
        );
    }

    #[test]
    fn test_archive_key_neutralizes_separators() {
        let key = archive_key("../u1", Uuid::nil(), "a/b\\c.pdf");
        assert_eq!(key.matches('/').count(), 2);
        assert!(key.ends_with("-a_b_c.pdf"));
    }
}
