//! PE adapter.
//!
//! Native PE images become [`Container::Pe`]; images that carry a CLI header
//! are handed to the CIL adapter when header probing is enabled.

use bytes::Bytes;
use object::{FileKind, Object};
use tracing::debug;

use super::{
    cil, collect_symbols, find_code_window, BinaryFile, Container, FormatError, PeDetails, Result,
};
use crate::core::machine::MachineType;

/// Parsed PE object plus what the adapters derive from it.
pub(crate) struct PeImage<'data> {
    pub obj: object::File<'data>,
    pub details: PeDetails,
}

impl<'data> PeImage<'data> {
    pub(crate) fn parse(data: &'data [u8]) -> Result<Self> {
        let is_64 = match FileKind::parse(data) {
            Ok(FileKind::Pe32) => false,
            Ok(FileKind::Pe64) => true,
            _ => return Err(FormatError::NotThisFormat("PE")),
        };
        let obj = object::File::parse(data)?;
        let details = PeDetails {
            is_64,
            image_base: obj.relative_address_base(),
        };
        Ok(Self { obj, details })
    }

    /// Build the common view with the given container tag and machine.
    pub(crate) fn into_binary(
        self,
        path: impl Into<String>,
        contents: Bytes,
        container: Container,
        machine: MachineType,
    ) -> Result<BinaryFile> {
        let file_size = contents.len() as u64;
        let window =
            find_code_window(&self.obj, file_size).ok_or_else(|| FormatError::Malformed {
                format: "PE",
                message: "no code section".to_string(),
            })?;
        let layout = window.layout(self.obj.entry(), file_size);
        let (exports, imports) = collect_symbols(&self.obj);

        debug!(
            container = container.name(),
            machine = %machine,
            image_base = %format_args!("{:#x}", self.details.image_base),
            code_base = %format_args!("{:#x}", layout.base),
            code_addr = %format_args!("{:#x}", layout.virt_addr),
            exports = exports.len(),
            imports = imports.len(),
            "Parsed PE"
        );

        Ok(BinaryFile::new(
            path,
            contents,
            container,
            layout,
            machine,
            machine.default_endianness(),
        )
        .with_symbols(exports, imports))
    }
}

/// Parse a PE image. When `probe_cli_header` is set and the image carries a
/// CLI header, the result is a CIL file instead.
pub fn parse(path: impl Into<String>, contents: Bytes, probe_cli_header: bool) -> Result<BinaryFile> {
    let data = contents.clone();
    let image = PeImage::parse(&data)?;

    if probe_cli_header {
        if let Some(details) = cil::read_cli_details(&data, &image) {
            debug!("PE image carries a CLI header");
            return image.into_binary(path, contents, Container::Cil(details), MachineType::Cil);
        }
    }

    let machine = MachineType::from(image.obj.architecture());
    let details = image.details;
    image.into_binary(path, contents, Container::Pe(details), machine)
}
