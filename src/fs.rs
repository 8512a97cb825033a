use std::{
    io,
    path::{Path, PathBuf},
};

use aws_sdk_s3::primitives::ByteStream;
use rand::Rng;
use tokio::{
    fs::{File, OpenOptions},
    io::AsyncWriteExt,
};

/// Read buffer used when streaming a local file to the remote service.
pub const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;

const PARTIAL_SUFFIX: &str = "part";

/// An opened upload source. The handle is closed when this value, or the
/// stream built from it, is dropped.
pub struct SourceFile {
    file: File,
    len: u64,
}

impl SourceFile {
    pub async fn open(path: &Path) -> io::Result<Self> {
        let file = File::open(path).await?;
        let metadata = file.metadata().await?;

        if !metadata.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "not a regular file",
            ));
        }

        Ok(Self {
            file,
            len: metadata.len(),
        })
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub async fn into_byte_stream(self) -> io::Result<ByteStream> {
        ByteStream::read_from()
            .file(self.file)
            .buffer_size(UPLOAD_CHUNK_SIZE)
            .build()
            .await
            .map_err(io::Error::other)
    }
}

/// A download destination staged in a hidden sibling file.
///
/// Bytes only reach `dest` through [`PartialFile::commit`], which renames the
/// staged file into place. If it is discarded or dropped first, the staged
/// file is removed and `dest` is left as it was.
pub struct PartialFile {
    dest: PathBuf,
    staged: PathBuf,
    file: Option<File>,
    written: u64,
    finished: bool,
}

impl PartialFile {
    pub async fn create(dest: &Path) -> io::Result<Self> {
        let name = dest.file_name().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "destination has no file name")
        })?;

        if let Ok(metadata) = tokio::fs::metadata(dest).await {
            if metadata.is_dir() {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "destination is a directory",
                ));
            }
        }

        let suffix: u32 = rand::thread_rng().gen();
        let staged = dest.with_file_name(format!(
            ".{}.{:08x}.{}",
            name.to_string_lossy(),
            suffix,
            PARTIAL_SUFFIX
        ));

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&staged)
            .await?;

        Ok(Self {
            dest: dest.to_path_buf(),
            staged,
            file: Some(file),
            written: 0,
            finished: false,
        })
    }

    pub fn staged_path(&self) -> &Path {
        &self.staged
    }

    pub async fn write_chunk(&mut self, chunk: &[u8]) -> io::Result<()> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| io::Error::other("staged file already closed"))?;

        file.write_all(chunk).await?;
        self.written += chunk.len() as u64;

        Ok(())
    }

    /// Flushes, syncs and moves the staged bytes onto the destination.
    pub async fn commit(mut self) -> io::Result<u64> {
        if let Some(mut file) = self.file.take() {
            file.flush().await?;
            file.sync_all().await?;
        }

        tokio::fs::rename(&self.staged, &self.dest).await?;
        self.finished = true;

        Ok(self.written)
    }

    /// Closes and removes the staged file, waiting for pending writes first.
    pub async fn discard(mut self) {
        if let Some(mut file) = self.file.take() {
            let _ = file.flush().await;
        }

        if let Err(err) = tokio::fs::remove_file(&self.staged).await {
            if err.kind() != io::ErrorKind::NotFound {
                tracing::warn!(error_message=%err, path=%self.staged.display(), "failed to remove staged file");
            }
        }
        self.finished = true;
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if self.finished {
            return;
        }

        drop(self.file.take());
        if let Err(err) = std::fs::remove_file(&self.staged) {
            if err.kind() != io::ErrorKind::NotFound {
                tracing::warn!(error_message=%err, path=%self.staged.display(), "failed to remove staged file");
            }
        }
    }
}
