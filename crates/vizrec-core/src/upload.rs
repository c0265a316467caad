//! Request-scoped spooling of uploaded files
//!
//! Uploads are copied chunk by chunk into an anonymous temporary file, then
//! rewound before being handed to the adapter. The file is unlinked at
//! creation, so dropping the upload releases the storage.

use std::io::SeekFrom;

use reqwest::multipart::Part;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio_util::io::ReaderStream;

use crate::error::Result;

/// An upload being written to temporary storage
#[derive(Debug)]
pub struct UploadSpool {
    file: File,
    len: u64,
}

impl UploadSpool {
    /// Open a fresh anonymous temporary file
    pub fn new() -> Result<Self> {
        let file = tempfile::tempfile()?;
        Ok(Self {
            file: File::from_std(file),
            len: 0,
        })
    }

    /// Append a chunk of the upload
    pub async fn write_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        self.file.write_all(chunk).await?;
        self.len += chunk.len() as u64;
        Ok(())
    }

    /// Bytes written so far
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Check if nothing has been written
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Flush and rewind, producing an upload ready to be read from the start
    pub async fn finish(
        mut self,
        file_name: Option<String>,
        content_type: Option<String>,
    ) -> Result<SpooledUpload> {
        self.file.flush().await?;
        self.file.seek(SeekFrom::Start(0)).await?;

        Ok(SpooledUpload {
            file_name,
            content_type,
            len: self.len,
            file: self.file,
        })
    }
}

/// A rewound upload backed by a temporary file
#[derive(Debug)]
pub struct SpooledUpload {
    file_name: Option<String>,
    content_type: Option<String>,
    len: u64,
    file: File,
}

impl SpooledUpload {
    /// Spool an in-memory payload
    pub async fn from_bytes(
        file_name: Option<String>,
        content_type: Option<String>,
        data: &[u8],
    ) -> Result<Self> {
        let mut spool = UploadSpool::new()?;
        spool.write_chunk(data).await?;
        spool.finish(file_name, content_type).await
    }

    /// File name supplied by the client
    pub fn file_name(&self) -> Option<&str> {
        self.file_name.as_deref()
    }

    /// Content type supplied by the client
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// Size in bytes
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Check if the upload has no content
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Read the whole upload back into memory
    pub async fn into_bytes(mut self) -> Result<Vec<u8>> {
        let mut data = Vec::with_capacity(self.len as usize);
        self.file.read_to_end(&mut data).await?;
        Ok(data)
    }

    /// Turn the upload into a streamed multipart part.
    ///
    /// `default_name` is used when the client did not supply a file name.
    pub fn into_part(self, default_name: &str) -> Result<Part> {
        let file_name = self
            .file_name
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| default_name.to_string());

        let body = reqwest::Body::wrap_stream(ReaderStream::new(self.file));
        let part = Part::stream_with_length(body, self.len).file_name(file_name);

        match self.content_type {
            Some(content_type) => Ok(part.mime_str(&content_type)?),
            None => Ok(part),
        }
    }
}
