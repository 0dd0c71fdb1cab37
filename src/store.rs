// src/store.rs
use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::data_types::TableData;
use crate::error::StoreError;

/// A named collection of tables, each a header row plus data rows.
///
/// Writes are visible to the next `fetch` on the same handle. Row indexes
/// address data rows only; the header row is never addressable.
#[async_trait]
pub trait TabularStore: Send + Sync {
    async fn fetch(&self, sheet_name: &str) -> Result<TableData, StoreError>;

    async fn append(&self, sheet_name: &str, row: Vec<String>) -> Result<(), StoreError>;

    async fn update(
        &self,
        sheet_name: &str,
        row_index: usize,
        row: Vec<String>,
    ) -> Result<(), StoreError>;

    async fn list_sheets(&self) -> Result<Vec<String>, StoreError>;

    /// Creates an empty sheet holding only `header`.
    async fn create_sheet(&self, sheet_name: &str, header: Vec<String>) -> Result<(), StoreError>;

    /// Overwrites a sheet with `data`, creating the sheet when missing.
    async fn replace(&self, sheet_name: &str, data: TableData) -> Result<(), StoreError>;

    fn describe(&self) -> String;
}

/// Store kept entirely in process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    sheets: std::sync::Mutex<BTreeMap<String, TableData>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    pub fn with_sheet(self, sheet_name: &str, data: TableData) -> Self {
        self.lock().insert(sheet_name.to_string(), data);
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, TableData>> {
        // A poisoned map is still consistent: every mutation is a single insert or push.
        self.sheets
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl TabularStore for MemoryStore {
    async fn fetch(&self, sheet_name: &str) -> Result<TableData, StoreError> {
        self.lock()
            .get(sheet_name)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(sheet_name.to_string()))
    }

    async fn append(&self, sheet_name: &str, row: Vec<String>) -> Result<(), StoreError> {
        let mut sheets = self.lock();
        let table = sheets
            .get_mut(sheet_name)
            .ok_or_else(|| StoreError::NotFound(sheet_name.to_string()))?;
        table.rows.push(row);
        Ok(())
    }

    async fn update(
        &self,
        sheet_name: &str,
        row_index: usize,
        row: Vec<String>,
    ) -> Result<(), StoreError> {
        let mut sheets = self.lock();
        let table = sheets
            .get_mut(sheet_name)
            .ok_or_else(|| StoreError::NotFound(sheet_name.to_string()))?;
        let len = table.rows.len();
        let slot = table
            .rows
            .get_mut(row_index)
            .ok_or_else(|| StoreError::RowOutOfBounds {
                sheet: sheet_name.to_string(),
                index: row_index,
                len,
            })?;
        *slot = row;
        Ok(())
    }

    async fn list_sheets(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.lock().keys().cloned().collect())
    }

    async fn create_sheet(&self, sheet_name: &str, header: Vec<String>) -> Result<(), StoreError> {
        self.lock()
            .entry(sheet_name.to_string())
            .or_insert_with(|| TableData::with_headers(&header));
        Ok(())
    }

    async fn replace(&self, sheet_name: &str, data: TableData) -> Result<(), StoreError> {
        self.lock().insert(sheet_name.to_string(), data);
        Ok(())
    }

    fn describe(&self) -> String {
        "in-memory store".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    #[tokio::test]
    async fn fetch_missing_sheet_is_not_found() {
        let store = MemoryStore::new();
        let err = store.fetch("Tasks").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(name) if name == "Tasks"));
    }

    #[tokio::test]
    async fn writes_are_visible_to_next_fetch() {
        let store = MemoryStore::new().with_sheet("Tasks", TableData::with_headers(&["id", "status"]));
        store.append("Tasks", row(&["1", "Pendente"])).await.unwrap();
        store.update("Tasks", 0, row(&["1", "Concluído"])).await.unwrap();

        let table = store.fetch("Tasks").await.unwrap();
        assert_eq!(table.rows, vec![row(&["1", "Concluído"])]);
    }

    #[tokio::test]
    async fn update_past_the_end_is_rejected() {
        let store = MemoryStore::new().with_sheet("Tasks", TableData::with_headers(&["id"]));
        let err = store.update("Tasks", 0, row(&["1"])).await.unwrap_err();
        assert!(matches!(err, StoreError::RowOutOfBounds { index: 0, len: 0, .. }));
    }

    #[tokio::test]
    async fn replace_creates_or_overwrites() {
        let store = MemoryStore::new();
        store
            .replace("Updates", TableData { headers: row(&["id"]), rows: vec![row(&["1"]), row(&["2"])] })
            .await
            .unwrap();
        store.replace("Updates", TableData::with_headers(&["id"])).await.unwrap();

        let table = store.fetch("Updates").await.unwrap();
        assert_eq!(table.headers, row(&["id"]));
        assert!(table.rows.is_empty());
    }
}
