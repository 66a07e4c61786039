//! Session metadata (`info.csv`) and other key/value files
//!
//! Files are two-column CSV with a `key,value` header. The start block is
//! written when recording begins; stop fields are appended to the same file.

use std::fs::{File, OpenOptions};
use std::path::Path;

use crate::error::{RecorderError, RecorderResult};

/// Ordered key/value pairs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataRecord {
    fields: Vec<(String, String)>,
}

impl MetadataRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl ToString) {
        self.fields.push((key.into(), value.to_string()));
    }

    pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.push(key, value);
        self
    }

    /// First value stored under `key`
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K: Into<String>, V: ToString> FromIterator<(K, V)> for MetadataRecord {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Self::new();
        for (k, v) in iter {
            record.push(k, v);
        }
        record
    }
}

/// Create (or truncate) a key/value file and write the header plus `record`
pub fn write_start(path: &Path, record: &MetadataRecord) -> RecorderResult<()> {
    let file = File::create(path)?;
    write_rows(path, file, record, true)
}

/// Append `record` to an existing key/value file without touching prior rows
pub fn append_stop(path: &Path, record: &MetadataRecord) -> RecorderResult<()> {
    let file = OpenOptions::new().append(true).open(path)?;
    write_rows(path, file, record, false)
}

/// Read a key/value file back, skipping the header
pub fn read(path: &Path) -> RecorderResult<MetadataRecord> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .map_err(|source| metadata_error(path, source))?;

    let mut record = MetadataRecord::new();
    for row in reader.records() {
        let row = row.map_err(|source| metadata_error(path, source))?;
        let key = row.get(0).unwrap_or_default();
        let value = row.get(1).unwrap_or_default();
        record.push(key, value);
    }
    Ok(record)
}

fn write_rows(path: &Path, file: File, record: &MetadataRecord, header: bool) -> RecorderResult<()> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(file);

    if header {
        writer
            .write_record(["key", "value"])
            .map_err(|source| metadata_error(path, source))?;
    }
    for (key, value) in &record.fields {
        writer
            .write_record([key.as_str(), value.as_str()])
            .map_err(|source| metadata_error(path, source))?;
    }
    writer.flush()?;
    Ok(())
}

fn metadata_error(path: &Path, source: csv::Error) -> RecorderError {
    RecorderError::Metadata {
        path: path.to_path_buf(),
        source,
    }
}

/// One-line description of the machine the recording was made on
pub fn system_info() -> String {
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string());

    format!(
        "User: {}, Platform: {}, Machine: {}, Arch: {}",
        user,
        std::env::consts::OS,
        host_name(),
        std::env::consts::ARCH
    )
}

#[cfg(unix)]
fn host_name() -> String {
    let mut buf = [0u8; 256];
    // SAFETY: buf is valid for buf.len() bytes; gethostname NUL-terminates on success
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr() as *mut libc::c_char, buf.len()) };
    if rc != 0 {
        return "unknown".to_string();
    }
    let len = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..len]).into_owned()
}

#[cfg(not(unix))]
fn host_name() -> String {
    std::env::var("COMPUTERNAME").unwrap_or_else(|_| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_block_is_appended_after_start_block() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("info.csv");

        let start: MetadataRecord = [("Recording Name", "pilot"), ("Start Time", "10:00:00")]
            .into_iter()
            .collect();
        write_start(&path, &start).unwrap();

        let stop = MetadataRecord::new().with("World Camera Frames", 3);
        append_stop(&path, &stop).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            text,
            "key,value\nRecording Name,pilot\nStart Time,10:00:00\nWorld Camera Frames,3\n"
        );

        let back = read(&path).unwrap();
        assert_eq!(back.len(), 3);
        assert_eq!(back.get("World Camera Frames"), Some("3"));
    }

    #[test]
    fn test_values_with_commas_survive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("user_info.csv");
        let record = MetadataRecord::new().with("System Info", "User: a, Platform: linux");
        write_start(&path, &record).unwrap();

        assert_eq!(
            read(&path).unwrap().get("System Info"),
            Some("User: a, Platform: linux")
        );
    }

    #[test]
    fn test_append_requires_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = append_stop(&dir.path().join("missing.csv"), &MetadataRecord::new());
        assert!(matches!(result, Err(RecorderError::Io(_))));
    }

    #[test]
    fn test_system_info_mentions_platform() {
        let info = system_info();
        assert!(info.contains(std::env::consts::OS));
        assert!(info.starts_with("User: "));
    }
}
