//! Bounded file loading.
//!
//! Files are memory-mapped (or read, when mapping is disabled) after a size
//! check and handed out as a `Bytes` buffer: immutable, reference counted and
//! safe to share with every fetch the index runs.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use bytes::Bytes;
use memmap2::Mmap;
use tracing::{debug, warn};

use crate::config::IoConfig;
use crate::error::{LazydisError, Result};

/// Load a whole file into an immutable shared buffer.
///
/// Fails with [`LazydisError::FileTooLarge`] when the file exceeds
/// `config.max_file_size`.
pub fn load_file<P: AsRef<Path>>(path: P, config: &IoConfig) -> Result<Bytes> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let file_size = file.metadata()?.len();

    debug!(
        path = %path.display(),
        size = file_size,
        max_file_size = config.max_file_size,
        mmap = config.use_mmap,
        "Loading file"
    );

    if file_size > config.max_file_size {
        warn!(
            path = %path.display(),
            size = file_size,
            limit = config.max_file_size,
            "File is too large"
        );
        return Err(LazydisError::FileTooLarge {
            limit: config.max_file_size,
            found: file_size,
        });
    }

    // memmap cannot map empty files
    if file_size == 0 {
        return Ok(Bytes::new());
    }

    if config.use_mmap {
        // Safety: read-only map of a regular file; the buffer is never written through.
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(Bytes::from_owner(mmap))
    } else {
        let mut data = Vec::with_capacity(file_size as usize);
        file.take(config.max_file_size).read_to_end(&mut data)?;
        Ok(Bytes::from(data))
    }
}
