//! Gzip decompression of uploaded logs
//!
//! Inflates `<name>.gz` into a sibling `<name>` file. The output is written to a
//! `.partial` file first and renamed into place only after the whole stream
//! decoded, so a failed run never leaves a truncated file that later stages
//! would read as valid.

use crate::error::{Error, PipelineError, Result};
use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const GZ_SUFFIX: &str = ".gz";
const PARTIAL_SUFFIX: &str = ".partial";

/// Whether a filename denotes a gzip upload (`.gz` suffix, case-insensitive)
pub fn is_gzip_name(name: &str) -> bool {
    name.to_ascii_lowercase().ends_with(GZ_SUFFIX)
}

/// Sibling path the decompressed content is written to
///
/// `big.log.gz` becomes `big.log`; a path without the suffix gets `.out` appended.
pub fn decompressed_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let stem = if is_gzip_name(&name) && name.len() > GZ_SUFFIX.len() {
        name[..name.len() - GZ_SUFFIX.len()].to_string()
    } else {
        format!("{}.out", name)
    };

    path.with_file_name(stem)
}

/// Decompress `path` into its sibling file without blocking the runtime
pub async fn decompress(path: &Path) -> Result<PathBuf> {
    let owned = path.to_path_buf();
    tokio::task::spawn_blocking(move || decompress_blocking(&owned))
        .await
        .map_err(|e| {
            Error::Pipeline(PipelineError::DecompressionFailed {
                path: path.to_path_buf(),
                reason: format!("decompression task failed: {}", e),
            })
        })?
}

/// Synchronous decompression, all-or-nothing on the output file
pub fn decompress_blocking(path: &Path) -> Result<PathBuf> {
    let output = decompressed_path(path);
    let partial = partial_path(&output);

    debug!(?path, ?output, "decompressing gzip upload");

    match inflate(path, &partial) {
        Ok(bytes) => {
            std::fs::rename(&partial, &output).map_err(|e| {
                let _ = std::fs::remove_file(&partial);
                failed(path, format!("failed to move output into place: {}", e))
            })?;
            info!(?path, ?output, bytes, "decompressed gzip upload");
            Ok(output)
        }
        Err(e) => {
            let _ = std::fs::remove_file(&partial);
            Err(e)
        }
    }
}

fn inflate(input: &Path, partial: &Path) -> Result<u64> {
    let file = File::open(input).map_err(|e| failed(input, format!("cannot open input: {}", e)))?;

    let len = file
        .metadata()
        .map_err(|e| failed(input, format!("cannot stat input: {}", e)))?
        .len();
    if len == 0 {
        return Err(failed(input, "input is empty".to_string()));
    }

    let mut decoder = MultiGzDecoder::new(BufReader::new(file));
    let out = File::create(partial)
        .map_err(|e| failed(input, format!("cannot create output: {}", e)))?;
    let mut writer = BufWriter::new(out);

    let bytes = std::io::copy(&mut decoder, &mut writer)
        .map_err(|e| failed(input, format!("invalid gzip data: {}", e)))?;
    writer
        .flush()
        .map_err(|e| failed(input, format!("cannot flush output: {}", e)))?;
    writer
        .get_ref()
        .sync_all()
        .map_err(|e| failed(input, format!("cannot sync output: {}", e)))?;

    Ok(bytes)
}

fn partial_path(output: &Path) -> PathBuf {
    let mut name = output
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(PARTIAL_SUFFIX);
    output.with_file_name(name)
}

fn failed(path: &Path, reason: String) -> Error {
    Error::Pipeline(PipelineError::DecompressionFailed {
        path: path.to_path_buf(),
        reason,
    })
}
