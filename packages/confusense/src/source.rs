use std::collections::VecDeque;
use std::path::Path;

use async_trait::async_trait;
use confusion_core::Landmarks;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};

#[derive(Debug, Error)]
pub enum SourceError {
    /// No more frames will arrive; ends the capture session cleanly.
    #[error("landmark source exhausted")]
    Exhausted,
    #[error("landmark source I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid frame on line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// Produces one landmark frame per call, `None` when no face is visible.
#[async_trait]
pub trait LandmarkSource: Send {
    async fn detect(&mut self) -> Result<Option<Landmarks>, SourceError>;
}

/// Frames read from JSON lines: an array of `{x, y, z?}` points, or `null`.
pub struct JsonlSource<R> {
    lines: Lines<R>,
    line: usize,
}

impl JsonlSource<BufReader<tokio::fs::File>> {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let file = tokio::fs::File::open(path).await?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: AsyncBufRead + Unpin> JsonlSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line: 0,
        }
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> LandmarkSource for JsonlSource<R> {
    async fn detect(&mut self) -> Result<Option<Landmarks>, SourceError> {
        loop {
            let Some(raw) = self.lines.next_line().await? else {
                return Err(SourceError::Exhausted);
            };
            self.line += 1;
            let raw = raw.trim();
            if raw.is_empty() {
                continue;
            }
            return serde_json::from_str(raw).map_err(|source| SourceError::Parse {
                line: self.line,
                source,
            });
        }
    }
}

/// In-memory frame queue.
#[derive(Debug, Clone, Default)]
pub struct FrameQueue {
    frames: VecDeque<Option<Landmarks>>,
}

impl FrameQueue {
    pub fn new(frames: impl IntoIterator<Item = Option<Landmarks>>) -> Self {
        Self {
            frames: frames.into_iter().collect(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

#[async_trait]
impl LandmarkSource for FrameQueue {
    async fn detect(&mut self) -> Result<Option<Landmarks>, SourceError> {
        self.frames.pop_front().ok_or(SourceError::Exhausted)
    }
}

/// Reads every frame from a JSON-lines file.
pub async fn read_frames(path: impl AsRef<Path>) -> Result<Vec<Option<Landmarks>>, SourceError> {
    let mut source = JsonlSource::open(path).await?;
    let mut frames = Vec::new();
    loop {
        match source.detect().await {
            Ok(frame) => frames.push(frame),
            Err(SourceError::Exhausted) => return Ok(frames),
            Err(err) => return Err(err),
        }
    }
}
