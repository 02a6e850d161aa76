//! Output files.
//!
//! Every file is written to a hidden sibling first and renamed into place,
//! so readers never see a half-written chart and a failed run leaves the
//! previous output intact.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::ChartResult;
use crate::models::{cell_text, Table};

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    path.with_file_name(format!(".{}.tmp", name))
}

/// Write `bytes` to `path` via a temporary file and rename.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let tmp = temp_path(path);
    let result = fs::File::create(&tmp)
        .and_then(|mut file| {
            file.write_all(bytes)?;
            file.sync_all()
        })
        .and_then(|_| fs::rename(&tmp, path));
    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

/// Render a table as UTF-8 CSV with a header row, columns in table order.
pub fn table_to_csv(table: &Table) -> ChartResult<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(table.columns())?;
    for row in table.rows() {
        writer.write_record(row.iter().map(cell_text))?;
    }
    writer.into_inner().map_err(|e| std::io::Error::other(e.to_string()).into())
}
