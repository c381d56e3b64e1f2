// Module: Camera
// The capture seam: produce a JPEG at the requested path, or fail.

use async_trait::async_trait;
use std::path::Path;
use tokio::process::Command;
use tracing::{debug, error};

use crate::errors::ControlError;

#[async_trait]
pub trait Camera: Send + Sync {
    async fn capture(&self, path: &Path) -> Result<(), ControlError>;
}

/// Real camera: shells out to `raspistill`.
///
/// -n no preview, -t 200 settle delay, 640x480 at quality 75 keeps the
/// upload small without hurting recognition.
pub struct RaspistillCamera;

#[async_trait]
impl Camera for RaspistillCamera {
    async fn capture(&self, path: &Path) -> Result<(), ControlError> {
        debug!(path = %path.display(), "Capturing image");
        let status = Command::new("raspistill")
            .args(["-n", "-t", "200", "-w", "640", "-h", "480", "-q", "75", "-o"])
            .arg(path)
            .status()
            .await?;
        if status.success() {
            Ok(())
        } else {
            error!(%status, "raspistill failed");
            Err(ControlError::Transport(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("raspistill exited with {status}"),
            )))
        }
    }
}

/// Loopback camera: writes a minimal JPEG so the rest of the pipeline can
/// be exercised on a machine without camera hardware.
pub struct FakeCamera;

const FAKE_JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xD9];

#[async_trait]
impl Camera for FakeCamera {
    async fn capture(&self, path: &Path) -> Result<(), ControlError> {
        debug!(path = %path.display(), "Faking image capture");
        tokio::fs::write(path, FAKE_JPEG).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fake_camera_writes_a_file() {
        let dir = std::env::temp_dir().join(format!("rcc-cam-{}", uuid::Uuid::new_v4()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let path = dir.join("capture_1.jpg");

        FakeCamera.capture(&path).await.unwrap();

        let bytes = tokio::fs::read(&path).await.unwrap();
        assert_eq!(bytes, FAKE_JPEG);
    }

    #[tokio::test]
    async fn test_fake_camera_fails_on_missing_dir() {
        let path = std::env::temp_dir()
            .join(format!("rcc-cam-missing-{}", uuid::Uuid::new_v4()))
            .join("capture_1.jpg");
        let err = FakeCamera.capture(&path).await.unwrap_err();
        assert_eq!(err.category(), "transport");
    }
}
