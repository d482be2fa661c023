//! Format identification.
//!
//! Runs the container adapters as a priority cascade: managed assembly by
//! path convention, ELF, PE, and finally the raw view. Each stage may fail;
//! failures are logged and the next stage is tried, so identification of a
//! loaded buffer always produces a [`BinaryFile`].

use std::path::Path;

use bytes::Bytes;
use tracing::{debug, info, warn};

use super::{cil, elf, pe, raw, BinaryFile, FormatError};
use crate::config::{SnifferConfig, ViewerConfig};
use crate::error::Result;
use crate::io;
use crate::span_trace;

/// Picks the container adapter for a buffer.
#[derive(Debug, Clone, Default)]
pub struct FormatSniffer {
    config: SnifferConfig,
}

impl FormatSniffer {
    pub fn new(config: SnifferConfig) -> Self {
        Self { config }
    }

    /// Content-based type hint from `infer`, for diagnostics only.
    pub fn content_hint(data: &[u8]) -> Option<&'static str> {
        infer::get(data).map(|kind| kind.mime_type())
    }

    /// Identify `contents` and parse it with the first adapter that accepts it.
    pub fn identify(&self, path: &str, contents: Bytes) -> BinaryFile {
        let span = span_trace!("identify", path = %path, size = contents.len());
        let _guard = span.enter();

        if let Some(mime) = Self::content_hint(&contents) {
            debug!(mime, "Content hint");
        }

        if self.config.is_managed_assembly_path(path) {
            debug!("Path matches a managed assembly convention");
            match cil::parse(path, contents.clone()) {
                Ok(file) => return Self::accepted(file),
                Err(e) => Self::rejected("CIL", &e),
            }
        }

        match elf::parse(path, contents.clone()) {
            Ok(file) => return Self::accepted(file),
            Err(e) => Self::rejected("ELF", &e),
        }

        match pe::parse(path, contents.clone(), self.config.probe_cli_header) {
            Ok(file) => return Self::accepted(file),
            Err(e) => Self::rejected("PE", &e),
        }

        info!("No container format recognized, using raw view");
        raw::parse(path, contents)
    }

    /// Load a file from disk and identify it. Only I/O errors are returned.
    pub fn open<P: AsRef<Path>>(path: P, config: &ViewerConfig) -> Result<BinaryFile> {
        let path = path.as_ref();
        let contents = io::load_file(path, &config.io)?;
        let sniffer = Self::new(config.sniffer.clone());
        Ok(sniffer.identify(&path.to_string_lossy(), contents))
    }

    fn accepted(file: BinaryFile) -> BinaryFile {
        info!(
            container = file.container().name(),
            machine = %file.machine_type(),
            "Identified file"
        );
        file
    }

    fn rejected(adapter: &'static str, err: &FormatError) {
        match err {
            FormatError::NotThisFormat(_) => debug!(adapter, "Not this format"),
            _ => warn!(adapter, error = %err, "Adapter failed, falling through"),
        }
    }
}

/// Identify with the default sniffer configuration.
pub fn identify(path: &str, contents: Bytes) -> BinaryFile {
    FormatSniffer::default().identify(path, contents)
}
