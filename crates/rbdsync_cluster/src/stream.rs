//! Snapshot diff streams.

use crate::error::{ClusterError, ClusterResult};
use std::fmt;
use std::io::{self, Read};
use std::process::{Child, ChildStdout};

/// A snapshot diff travelling from an export to an import.
///
/// A stream produced by [`super::RbdCli`] wraps the stdout pipe of a running
/// `rbd export-diff`. Handing it to [`super::RbdCli::import_diff`] connects
/// that pipe directly to the stdin of `rbd import-diff`, so the diff is never
/// held in memory and the importer throttles the exporter.
///
/// Streams from other sources wrap any [`Read`] implementation.
///
/// Every stream must end in [`DiffStream::finish`] (importers call it), which
/// reaps the producing process and reports its exit status.
pub struct DiffStream {
    source: Source,
    producer: Option<Producer>,
}

pub(crate) enum Source {
    Pipe(ChildStdout),
    Reader(Box<dyn Read + Send>),
}

/// The process writing into a piped stream.
pub(crate) struct Producer {
    child: Child,
    command: String,
}

impl Producer {
    /// Waits for the producer and checks its exit status.
    pub(crate) fn finish(mut self) -> ClusterResult<()> {
        let status = self.child.wait()?;
        if status.success() {
            Ok(())
        } else {
            Err(ClusterError::command_failed(
                self.command,
                status.to_string(),
                "export side of the diff stream failed",
            ))
        }
    }
}

impl DiffStream {
    /// Creates a stream over an arbitrary reader.
    pub fn from_reader<R: Read + Send + 'static>(reader: R) -> Self {
        Self {
            source: Source::Reader(Box::new(reader)),
            producer: None,
        }
    }

    /// Creates a stream with no content.
    pub fn empty() -> Self {
        Self::from_reader(io::empty())
    }

    /// Wraps the stdout pipe of a spawned export process.
    pub(crate) fn from_child(mut child: Child, command: String) -> ClusterResult<Self> {
        let stdout = child.stdout.take().ok_or_else(|| {
            ClusterError::Stream(format!("`{}` was spawned without a stdout pipe", command))
        })?;
        Ok(Self {
            source: Source::Pipe(stdout),
            producer: Some(Producer { child, command }),
        })
    }

    /// Returns true if the stream is an OS pipe from a running process.
    #[must_use]
    pub fn is_pipe(&self) -> bool {
        matches!(self.source, Source::Pipe(_))
    }

    pub(crate) fn into_parts(self) -> (Source, Option<Producer>) {
        (self.source, self.producer)
    }

    /// Closes the stream and reaps its producer, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the producing process failed.
    pub fn finish(self) -> ClusterResult<()> {
        let (source, producer) = self.into_parts();
        drop(source);
        match producer {
            Some(producer) => producer.finish(),
            None => Ok(()),
        }
    }
}

impl Read for DiffStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.source {
            Source::Pipe(stdout) => stdout.read(buf),
            Source::Reader(reader) => reader.read(buf),
        }
    }
}

impl fmt::Debug for DiffStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiffStream")
            .field("pipe", &self.is_pipe())
            .field(
                "producer",
                &self.producer.as_ref().map(|p| p.command.as_str()),
            )
            .finish()
    }
}
