//! File writers for the record streams, one task per output file.
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{LoaderError, Result};

/// Creates the output file, together with its parent directories.
pub fn create_output_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| LoaderError::io(parent, e))?;
        }
    }
    File::create(path).map_err(|e| LoaderError::io(path, e))
}

/// Writes every received record as a CSV row until the channel is closed.
/// Resolves to the number of rows written.
pub fn spawn_csv_writer<T>(path: PathBuf, file: File, mut rx: mpsc::Receiver<T>) -> JoinHandle<Result<u64>>
where
    T: Serialize + Send + 'static,
{
    tokio::spawn(async move {
        let mut writer = csv::Writer::from_writer(BufWriter::new(file));
        let mut written = 0;
        while let Some(record) = rx.recv().await {
            writer.serialize(&record)?;
            written += 1;
        }
        writer.flush().map_err(|e| LoaderError::io(&path, e))?;
        Ok(written)
    })
}

/// Writes every received record as one JSON line until the channel is closed.
/// Resolves to the number of lines written.
pub fn spawn_json_lines_writer<T>(path: PathBuf, file: File, mut rx: mpsc::Receiver<T>) -> JoinHandle<Result<u64>>
where
    T: Serialize + Send + 'static,
{
    tokio::spawn(async move {
        let mut writer = BufWriter::new(file);
        let mut written = 0;
        while let Some(record) = rx.recv().await {
            serde_json::to_writer(&mut writer, &record)?;
            writer.write_all(b"\n").map_err(|e| LoaderError::io(&path, e))?;
            written += 1;
        }
        writer.flush().map_err(|e| LoaderError::io(&path, e))?;
        Ok(written)
    })
}
