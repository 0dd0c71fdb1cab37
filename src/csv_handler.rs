// src/csv_handler.rs
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use csv::{ReaderBuilder, WriterBuilder};
use log::{debug, warn};
use tokio::task;

use crate::data_types::TableData;
use crate::error::StoreError;
use crate::store::TabularStore;

/// Local fallback store: one `<sheet>.csv` file per sheet inside a directory.
pub struct CSVHandler {
    dir: PathBuf,
}

impl CSVHandler {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        CSVHandler { dir: dir.into() }
    }

    fn sheet_path(&self, sheet_name: &str) -> PathBuf {
        self.dir.join(format!("{sheet_name}.csv"))
    }

    fn existing_path(&self, sheet_name: &str) -> Result<PathBuf, StoreError> {
        let path = self.sheet_path(sheet_name);
        if path.is_file() {
            Ok(path)
        } else {
            Err(StoreError::NotFound(sheet_name.to_string()))
        }
    }

    fn read_table(path: &Path) -> Result<TableData, StoreError> {
        let delimiter = Self::detect_delimiter(path);

        let file = File::open(path)?;
        let mut reader = ReaderBuilder::new()
            .delimiter(delimiter as u8)
            .has_headers(false)
            .flexible(true)
            .from_reader(file);

        let mut data = TableData::empty();
        let mut records = reader.byte_records();

        if let Some(headers) = records.next() {
            let headers = headers?;
            for cell in headers.iter() {
                let header = std::str::from_utf8(cell).map_err(|_| {
                    StoreError::SchemaMismatch(format!(
                        "{}: header row is not valid UTF-8",
                        path.display()
                    ))
                })?;
                data.headers.push(header.trim().to_string());
            }
        }
        // Undecodable bytes in a data row become U+FFFD, which the row mapper
        // rejects, so only that row is dropped.
        for (i, record) in records.enumerate() {
            let record = record?;
            if std::str::from_utf8(record.as_slice()).is_err() {
                warn!("{} row {i} is not valid UTF-8", path.display());
            }
            data.rows.push(
                record
                    .iter()
                    .map(|cell| String::from_utf8_lossy(cell).into_owned())
                    .collect(),
            );
        }

        Ok(data)
    }

    fn write_table(path: &Path, data: &TableData) -> Result<(), StoreError> {
        let delimiter = Self::detect_delimiter(path);

        let mut writer = WriterBuilder::new()
            .delimiter(delimiter as u8)
            .flexible(true)
            .from_path(path)?;
        writer.write_record(&data.headers)?;
        for row in &data.rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
        Ok(())
    }

    fn detect_delimiter<P: AsRef<Path>>(path: P) -> char {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(_) => return ',', // Default to comma if file can't be opened
        };

        let mut reader = BufReader::new(file);
        let mut first_line = String::new();

        if reader.read_line(&mut first_line).is_ok() && first_line.contains(';') {
            return ';';
        }

        ','
    }

    async fn blocking<T, F>(f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, StoreError> + Send + 'static,
    {
        task::spawn_blocking(f)
            .await
            .map_err(|err| StoreError::Io(std::io::Error::other(err)))?
    }
}

#[async_trait]
impl TabularStore for CSVHandler {
    async fn fetch(&self, sheet_name: &str) -> Result<TableData, StoreError> {
        let path = self.existing_path(sheet_name)?;
        debug!("reading {}", path.display());
        Self::blocking(move || Self::read_table(&path)).await
    }

    async fn append(&self, sheet_name: &str, row: Vec<String>) -> Result<(), StoreError> {
        let path = self.existing_path(sheet_name)?;
        debug!("appending to {}", path.display());
        Self::blocking(move || {
            let mut data = Self::read_table(&path)?;
            data.rows.push(row);
            Self::write_table(&path, &data)
        })
        .await
    }

    async fn update(
        &self,
        sheet_name: &str,
        row_index: usize,
        row: Vec<String>,
    ) -> Result<(), StoreError> {
        let path = self.existing_path(sheet_name)?;
        let sheet = sheet_name.to_string();
        debug!("updating row {row_index} of {}", path.display());
        Self::blocking(move || {
            let mut data = Self::read_table(&path)?;
            let len = data.rows.len();
            let slot = data
                .rows
                .get_mut(row_index)
                .ok_or(StoreError::RowOutOfBounds {
                    sheet,
                    index: row_index,
                    len,
                })?;
            *slot = row;
            Self::write_table(&path, &data)
        })
        .await
    }

    async fn list_sheets(&self) -> Result<Vec<String>, StoreError> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some("csv") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    async fn create_sheet(&self, sheet_name: &str, header: Vec<String>) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.sheet_path(sheet_name);
        if path.exists() {
            return Ok(());
        }
        Self::blocking(move || Self::write_table(&path, &TableData::with_headers(&header))).await
    }

    async fn replace(&self, sheet_name: &str, data: TableData) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.sheet_path(sheet_name);
        debug!("rewriting {}", path.display());
        Self::blocking(move || Self::write_table(&path, &data)).await
    }

    fn describe(&self) -> String {
        format!("local CSV directory {}", self.dir.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let handler = CSVHandler::new(dir.path());
        let err = handler.fetch("Tasks").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(name) if name == "Tasks"));
    }

    #[tokio::test]
    async fn semicolon_files_keep_their_delimiter() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Requests.csv");
        fs::write(&path, "id;situation\n1;Pendente\n").unwrap();

        let handler = CSVHandler::new(dir.path());
        handler.append("Requests", row(&["2", "Concluído"])).await.unwrap();

        let written = fs::read_to_string(&path).unwrap();
        assert_eq!(written, "id;situation\n1;Pendente\n2;Concluído\n");
    }

    #[tokio::test]
    async fn created_sheet_round_trips_writes() {
        let dir = tempfile::tempdir().unwrap();
        let handler = CSVHandler::new(dir.path().join("data"));

        handler
            .create_sheet("Tasks", row(&["id", "status", "dueDate"]))
            .await
            .unwrap();
        handler.append("Tasks", row(&["1", "Pendente", ""])).await.unwrap();
        handler.append("Tasks", row(&["2", "Pendente", "2026-01-10"])).await.unwrap();
        handler
            .update("Tasks", 1, row(&["2", "Concluído", "2026-01-10"]))
            .await
            .unwrap();

        let table = handler.fetch("Tasks").await.unwrap();
        assert_eq!(table.headers, row(&["id", "status", "dueDate"]));
        assert_eq!(
            table.rows,
            vec![row(&["1", "Pendente", ""]), row(&["2", "Concluído", "2026-01-10"])]
        );
        assert_eq!(handler.list_sheets().await.unwrap(), vec!["Tasks".to_string()]);
    }

    #[tokio::test]
    async fn undecodable_rows_are_read_lossily() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Tasks.csv");
        fs::write(&path, b"id,title\n1,ok\n2,bad\xff\xfe\n3,fine\n").unwrap();

        let table = CSVHandler::new(dir.path()).fetch("Tasks").await.unwrap();
        assert_eq!(table.rows.len(), 3);
        assert_eq!(table.rows[0], row(&["1", "ok"]));
        assert!(table.rows[1][1].contains('\u{FFFD}'));
        assert_eq!(table.rows[2], row(&["3", "fine"]));
    }

    #[tokio::test]
    async fn undecodable_header_is_a_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("Tasks.csv"), b"id,t\xffitle\n1,ok\n").unwrap();

        let err = CSVHandler::new(dir.path()).fetch("Tasks").await.unwrap_err();
        assert!(matches!(err, StoreError::SchemaMismatch(_)));
    }

    #[tokio::test]
    async fn replace_rewrites_the_whole_sheet() {
        let dir = tempfile::tempdir().unwrap();
        let handler = CSVHandler::new(dir.path().join("data"));
        handler.create_sheet("Updates", row(&["id"])).await.unwrap();
        handler.append("Updates", row(&["1"])).await.unwrap();

        let data = TableData {
            headers: row(&["id", "content"]),
            rows: vec![row(&["2", "novo"])],
        };
        handler.replace("Updates", data.clone()).await.unwrap();
        handler.replace("Categories", TableData::with_headers(&["key"])).await.unwrap();

        assert_eq!(handler.fetch("Updates").await.unwrap(), data);
        assert!(handler.fetch("Categories").await.unwrap().rows.is_empty());
    }

    #[tokio::test]
    async fn update_out_of_bounds_leaves_file_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let handler = CSVHandler::new(dir.path());
        handler.create_sheet("Tasks", row(&["id"])).await.unwrap();

        let err = handler.update("Tasks", 3, row(&["9"])).await.unwrap_err();
        assert!(matches!(err, StoreError::RowOutOfBounds { index: 3, len: 0, .. }));
        assert!(handler.fetch("Tasks").await.unwrap().rows.is_empty());
    }
}
