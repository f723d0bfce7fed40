use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::extract::{Field, Record};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Truncate and start with a header row.
    Overwrite,
    /// Append; the header is only written for a run starting at line 0
    /// into a new or empty file.
    Append { start_line: usize },
}

/// CSV output with a fixed column set, one flushed row per record.
pub struct CsvSink {
    writer: csv::Writer<File>,
    columns: Vec<Field>,
    path: PathBuf,
}

impl CsvSink {
    pub fn open(path: &Path, columns: Vec<Field>, mode: WriteMode) -> Result<Self> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }

        let (file, write_header) = match mode {
            WriteMode::Overwrite => (File::create(path), true),
            WriteMode::Append { start_line } => {
                let existing = fs::metadata(path).map(|m| m.len()).unwrap_or(0);
                let file = OpenOptions::new().create(true).append(true).open(path);
                (file, start_line == 0 && existing == 0)
            }
        };
        let file = file.with_context(|| format!("Failed to open {}", path.display()))?;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        if write_header {
            writer.write_record(columns.iter().map(|f| f.header()))?;
            writer.flush()?;
        }

        Ok(Self {
            writer,
            columns,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write one row in column order and flush it to disk.
    pub fn append_record(&mut self, record: &Record) -> Result<()> {
        self.writer.write_record(record.cells(&self.columns))?;
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{FieldValue, Profile};

    fn record(name: &str) -> Record {
        let mut r = Record::default();
        r.set(Field::PerfumeName, FieldValue::Text(name.to_string()));
        r.set(Field::FragranceNotes, FieldValue::Text("Rose, Oud".into()));
        r.set(Field::Rating, FieldValue::Number(8.25));
        r
    }

    fn read_back(path: &Path) -> (Vec<String>, Vec<Vec<String>>) {
        let mut rdr = csv::Reader::from_path(path).unwrap();
        let headers = rdr.headers().unwrap().iter().map(str::to_string).collect();
        let rows = rdr
            .records()
            .map(|r| r.unwrap().iter().map(str::to_string).collect())
            .collect();
        (headers, rows)
    }

    #[test]
    fn rows_match_header_width() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/perfumes.csv");
        let cols = Profile::Detailed.fields().to_vec();
        let mut sink = CsvSink::open(&path, cols.clone(), WriteMode::Overwrite).unwrap();
        sink.append_record(&record("Oud Wood")).unwrap();
        sink.append_record(&Record::default()).unwrap();

        let (headers, rows) = read_back(&path);
        assert_eq!(headers, cols.iter().map(|f| f.header()).collect::<Vec<_>>());
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.len() == headers.len()));
        assert_eq!(rows[0][0], "Oud Wood");
        assert_eq!(rows[0][3], "Rose, Oud");
        assert_eq!(rows[0][5], "8.25");
        assert!(rows[1].iter().all(String::is_empty));
    }

    #[test]
    fn overwrite_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("single.csv");
        let cols = vec![Field::PerfumeName];
        for name in ["First", "Second"] {
            let mut sink = CsvSink::open(&path, cols.clone(), WriteMode::Overwrite).unwrap();
            sink.append_record(&record(name)).unwrap();
        }
        let (_, rows) = read_back(&path);
        assert_eq!(rows, vec![vec!["Second".to_string()]]);
    }

    #[test]
    fn resumed_append_writes_header_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("popular.csv");
        let cols = Profile::Popular.fields().to_vec();

        let mut sink = CsvSink::open(&path, cols.clone(), WriteMode::Append { start_line: 0 }).unwrap();
        sink.append_record(&record("A")).unwrap();
        drop(sink);

        let mut sink = CsvSink::open(&path, cols.clone(), WriteMode::Append { start_line: 1 }).unwrap();
        sink.append_record(&record("B")).unwrap();
        drop(sink);

        // A restart from zero onto a non-empty file must not repeat the header.
        let mut sink = CsvSink::open(&path, cols, WriteMode::Append { start_line: 0 }).unwrap();
        sink.append_record(&record("C")).unwrap();

        let (headers, rows) = read_back(&path);
        assert_eq!(headers[0], "Perfume Name");
        let names: Vec<&str> = rows.iter().map(|r| r[0].as_str()).collect();
        assert_eq!(names, vec!["A", "B", "C"]);
    }

    #[test]
    fn resumed_append_into_missing_file_has_no_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resume.csv");
        let mut sink =
            CsvSink::open(&path, vec![Field::PerfumeName], WriteMode::Append { start_line: 40 }).unwrap();
        sink.append_record(&record("Late")).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "Late\n");
    }
}
