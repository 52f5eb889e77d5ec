use async_trait::async_trait;
use log::{debug, error};
use std::path::Path;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

use crate::utils::error::GpsError;

#[async_trait]
pub trait DataSender: Send + Sync {
    async fn send(&self, data: &str) -> Result<(), GpsError>;
    fn sender_type(&self) -> &str;
    fn destination(&self) -> &str;
}

pub struct ConsoleSender;

#[async_trait]
impl DataSender for ConsoleSender {
    async fn send(&self, data: &str) -> Result<(), GpsError> {
        println!("{}", data);
        Ok(())
    }

    fn sender_type(&self) -> &str {
        "console"
    }

    fn destination(&self) -> &str {
        "stdout"
    }
}

/// Writes rendered views to a file, either replacing it on every render or
/// appending.
pub struct FileSender {
    file_path: String,
    append: bool,
}

impl FileSender {
    pub fn new<P: AsRef<Path>>(file_path: P, append: bool) -> Self {
        Self {
            file_path: file_path.as_ref().to_string_lossy().to_string(),
            append,
        }
    }
}

#[async_trait]
impl DataSender for FileSender {
    async fn send(&self, data: &str) -> Result<(), GpsError> {
        debug!("📝 Writing {} bytes to {}", data.len(), self.file_path);

        if let Some(parent) = Path::new(&self.file_path).parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        if self.append {
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.file_path)
                .await
                .map_err(|e| {
                    error!("❌ Failed to open file {}: {}", self.file_path, e);
                    GpsError::CommunicationError(format!("File open error: {}", e))
                })?;

            file.write_all(format!("{}\n", data).as_bytes()).await.map_err(|e| {
                error!("❌ Failed to write to file {}: {}", self.file_path, e);
                GpsError::CommunicationError(format!("File write error: {}", e))
            })?;

            // A tokio File finishes writes in the background unless flushed.
            file.flush().await.map_err(|e| {
                error!("❌ Failed to flush file {}: {}", self.file_path, e);
                GpsError::CommunicationError(format!("File flush error: {}", e))
            })?;
        } else {
            fs::write(&self.file_path, format!("{}\n", data)).await.map_err(|e| {
                error!("❌ Failed to write to file {}: {}", self.file_path, e);
                GpsError::CommunicationError(format!("File write error: {}", e))
            })?;
        }

        Ok(())
    }

    fn sender_type(&self) -> &str {
        "file"
    }

    fn destination(&self) -> &str {
        &self.file_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("gps_tracker_{}_{}", std::process::id(), name))
    }

    #[tokio::test]
    async fn test_file_sender_overwrites() {
        let path = scratch_path("overwrite.txt");
        let sender = FileSender::new(&path, false);
        sender.send("first").await.unwrap();
        sender.send("second").await.unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "second\n");
        std::fs::remove_file(&path).ok();
    }

    #[tokio::test]
    async fn test_file_sender_appends() {
        let path = scratch_path("append.txt");
        std::fs::remove_file(&path).ok();
        let sender = FileSender::new(&path, true);
        sender.send("first").await.unwrap();
        sender.send("second").await.unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "first\nsecond\n");
        assert_eq!(sender.sender_type(), "file");

        // Each send is on disk as soon as it returns.
        for i in 0..20 {
            sender.send(&format!("line {}", i)).await.unwrap();
            let written = std::fs::read_to_string(&path).unwrap();
            assert!(written.ends_with(&format!("line {}\n", i)));
        }
        std::fs::remove_file(&path).ok();
    }
}
