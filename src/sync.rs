// src/sync.rs
//! The refresh cycle: fetch every sheet, parse, aggregate, then swap in the
//! new snapshot. A failing cycle leaves the previous snapshot untouched.

use std::collections::{BTreeMap, HashSet};

use chrono::{Local, NaiveDateTime, Utc};
use log::{debug, info, warn};

use crate::aggregate::{aggregate, ViewModel};
use crate::data_types::{
    CategoryInfo, Record, TableData, TaskUpdate, Vocabulary, CATEGORIES_SHEET, TASKS_SHEET,
    UPDATES_SHEET,
};
use crate::error::StoreError;
use crate::mapper::{self, ColumnRole, Schema, UpdateLayout, CATEGORIES_HEADER, UPDATES_HEADER};
use crate::store::TabularStore;

/// A data row that was left out of a refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRow {
    pub sheet: String,
    /// 0-based data row index.
    pub row_index: usize,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SheetView {
    pub schema: Schema,
    pub records: Vec<Record>,
    pub view: ViewModel,
}

/// Everything one refresh produced.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub sheets: BTreeMap<String, SheetView>,
    pub skipped: Vec<SkippedRow>,
    pub refreshed_at: NaiveDateTime,
}

impl Snapshot {
    pub fn sheet(&self, name: &str) -> Option<&SheetView> {
        self.sheets.get(name)
    }
}

/// Colors handed out to new categories.
const CATEGORY_COLORS: [&str; 9] = [
    "#ef4444", "#f97316", "#f59e0b", "#10b981", "#06b6d4", "#3b82f6", "#8b5cf6", "#d946ef",
    "#ec4899",
];

pub struct Dashboard {
    store: Box<dyn TabularStore>,
    /// Schemas as configured. Never modified.
    configured: Vec<Schema>,
    /// Schemas in effect for the last committed refresh.
    schemas: Vec<Schema>,
    user: String,
    /// Load the task categories from the Categories sheet when it exists.
    categories_from_sheet: bool,
    snapshot: Option<Snapshot>,
}

impl Dashboard {
    pub fn new(store: Box<dyn TabularStore>, schemas: Vec<Schema>, user: &str) -> Self {
        Dashboard {
            store,
            configured: schemas.clone(),
            schemas,
            user: user.to_string(),
            categories_from_sheet: false,
            snapshot: None,
        }
    }

    /// The standard Tasks and Requests sheets, with task categories read
    /// from the Categories sheet.
    pub fn standard(
        store: Box<dyn TabularStore>,
        tasks: Vocabulary,
        requests: Vocabulary,
        user: &str,
    ) -> Self {
        let mut dashboard = Dashboard::new(
            store,
            vec![Schema::tasks(tasks), Schema::requests(requests)],
            user,
        );
        dashboard.categories_from_sheet = true;
        dashboard
    }

    pub fn store(&self) -> &dyn TabularStore {
        self.store.as_ref()
    }

    pub fn snapshot(&self) -> Option<&Snapshot> {
        self.snapshot.as_ref()
    }

    pub fn schema(&self, sheet: &str) -> Result<&Schema, StoreError> {
        self.schemas
            .iter()
            .find(|s| s.sheet == sheet)
            .ok_or_else(|| StoreError::NotFound(sheet.to_string()))
    }

    pub async fn refresh(&mut self) -> Result<&Snapshot, StoreError> {
        self.refresh_at(Local::now().naive_local()).await
    }

    /// Runs one full cycle as of `now`. The held snapshot and the
    /// vocabularies in effect are replaced together, and only when every
    /// sheet was fetched.
    pub async fn refresh_at(&mut self, now: NaiveDateTime) -> Result<&Snapshot, StoreError> {
        let today = now.date();
        info!("refreshing from {}", self.store.describe());

        let mut schemas = self.configured.clone();
        if self.categories_from_sheet {
            if let Some(categories) = self.load_categories().await? {
                if let Some(tasks) = schemas.iter_mut().find(|s| s.sheet == TASKS_SHEET) {
                    tasks.vocabulary.categories = categories;
                }
            }
        }

        let mut sheets = BTreeMap::new();
        let mut skipped = Vec::new();
        for schema in &schemas {
            let table = self.store.fetch(&schema.sheet).await?;
            let records = if table.is_empty() {
                Vec::new()
            } else {
                mapper::check_headers(&table.headers, schema)?;
                parse_rows(&table.rows, schema, &mut skipped)
            };
            let view = aggregate(&records, &schema.vocabulary, today);
            debug!("{}: {} records", schema.sheet, records.len());
            sheets.insert(
                schema.sheet.clone(),
                SheetView {
                    schema: schema.clone(),
                    records,
                    view,
                },
            );
        }

        if !skipped.is_empty() {
            warn!("{} rows skipped during refresh", skipped.len());
        }
        self.schemas = schemas;
        Ok(&*self.snapshot.insert(Snapshot {
            sheets,
            skipped,
            refreshed_at: now,
        }))
    }

    /// Reads the Categories sheet. `None` means the sheet is missing or
    /// empty and the configured categories apply.
    async fn load_categories(&self) -> Result<Option<Vec<CategoryInfo>>, StoreError> {
        let table = match self.store.fetch(CATEGORIES_SHEET).await {
            Ok(table) => table,
            Err(StoreError::NotFound(_)) => {
                debug!("no {CATEGORIES_SHEET} sheet, using configured categories");
                return Ok(None);
            }
            Err(err) => return Err(err),
        };

        let categories: Vec<_> = table
            .rows
            .iter()
            .filter_map(|row| mapper::parse_category(&table.headers, row))
            .collect();
        Ok((!categories.is_empty()).then_some(categories))
    }

    /// Current valid records of a sheet paired with their data row index.
    async fn fetch_records(&self, schema: &Schema) -> Result<Vec<(usize, Record)>, StoreError> {
        let table = self.store.fetch(&schema.sheet).await?;
        if !table.headers.is_empty() {
            mapper::check_headers(&table.headers, schema)?;
        }
        Ok(table
            .rows
            .iter()
            .enumerate()
            .filter(|(_, row)| !is_blank(row))
            .filter_map(|(i, row)| mapper::parse(row, schema).ok().map(|r| (i, r)))
            .collect())
    }

    /// Appends a record after checking its id is not already taken, by a
    /// valid row or by one a refresh would skip.
    pub async fn add_record(&self, sheet: &str, record: &Record) -> Result<(), StoreError> {
        let schema = self.schema(sheet)?;
        let raw = validated_row(record, schema)?;

        let table = self.store.fetch(sheet).await?;
        if !table.headers.is_empty() {
            mapper::check_headers(&table.headers, schema)?;
        }
        if holds_id(&table, schema, &record.id) {
            return Err(StoreError::DuplicateId {
                sheet: sheet.to_string(),
                id: record.id.clone(),
            });
        }

        self.store.append(sheet, raw).await?;
        info!("added {} to {sheet}", record.id);
        Ok(())
    }

    /// Rewrites the row holding `record.id`.
    pub async fn update_record(&self, sheet: &str, record: &Record) -> Result<(), StoreError> {
        let schema = self.schema(sheet)?;
        let raw = validated_row(record, schema)?;

        let row_index = self
            .fetch_records(schema)
            .await?
            .into_iter()
            .find(|(_, r)| r.id == record.id)
            .map(|(i, _)| i)
            .ok_or_else(|| StoreError::UnknownRecord {
                sheet: sheet.to_string(),
                id: record.id.clone(),
            })?;

        self.store.update(sheet, row_index, raw).await?;
        info!("updated {} in {sheet}", record.id);
        Ok(())
    }

    /// Moves a record to another kanban column.
    pub async fn set_status(&self, sheet: &str, id: &str, status: &str) -> Result<Record, StoreError> {
        let schema = self.schema(sheet)?;
        let mut record = self
            .fetch_records(schema)
            .await?
            .into_iter()
            .map(|(_, r)| r)
            .find(|r| r.id == id)
            .ok_or_else(|| StoreError::UnknownRecord {
                sheet: sheet.to_string(),
                id: id.to_string(),
            })?;

        record.status = schema
            .vocabulary
            .status(status)
            .ok_or_else(|| StoreError::SchemaMismatch(format!("{sheet}: unknown status {status:?}")))?
            .to_string();
        self.update_record(sheet, &record).await?;
        Ok(record)
    }

    async fn fetch_updates(&self) -> Result<(UpdateLayout, TableData), StoreError> {
        let table = self.store.fetch(UPDATES_SHEET).await?;
        let layout = if table.headers.is_empty() {
            UpdateLayout::default()
        } else {
            UpdateLayout::from_headers(&table.headers)?
        };
        Ok((layout, table))
    }

    /// Appends an entry to a task's follow-up history, signed by the
    /// configured user.
    pub async fn add_update(&self, task_id: &str, content: &str, now: NaiveDateTime) -> Result<TaskUpdate, StoreError> {
        let (layout, mut table) = self.fetch_updates().await?;
        let update = TaskUpdate {
            id: next_update_id(&layout, &table, Utc::now().timestamp_millis()),
            task_id: task_id.to_string(),
            content: content.to_string(),
            timestamp: now.format("%Y-%m-%d %H:%M:%S").to_string(),
            user: self.user.clone(),
        };

        let row = layout.serialize(&update);
        if table.headers.is_empty() {
            table.headers = to_strings(&UPDATES_HEADER);
            table.rows.push(row);
            self.store.replace(UPDATES_SHEET, table).await?;
        } else {
            self.store.append(UPDATES_SHEET, row).await?;
        }
        info!("added update {} to task {task_id}", update.id);
        Ok(update)
    }

    /// Follow-up history of one task, oldest first.
    pub async fn updates_for(&self, task_id: &str) -> Result<Vec<TaskUpdate>, StoreError> {
        let (layout, table) = self.fetch_updates().await?;
        let mut updates: Vec<TaskUpdate> = parse_updates(&layout, &table)
            .into_iter()
            .map(|(_, u)| u)
            .filter(|u| u.task_id == task_id)
            .collect();
        updates.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        Ok(updates)
    }

    /// Replaces the text of an update and marks it as edited.
    pub async fn edit_update(&self, update_id: &str, content: &str, now: NaiveDateTime) -> Result<TaskUpdate, StoreError> {
        let (layout, table) = self.fetch_updates().await?;
        let (row_index, mut update) = parse_updates(&layout, &table)
            .into_iter()
            .find(|(_, u)| u.id == update_id)
            .ok_or_else(|| unknown_update(update_id))?;

        update.content = content.to_string();
        update.timestamp = format!("{} (editado)", now.format("%Y-%m-%d %H:%M:%S"));
        self.store
            .update(UPDATES_SHEET, row_index, layout.serialize(&update))
            .await?;
        info!("edited update {update_id}");
        Ok(update)
    }

    /// Removes an update. Other rows, malformed ones included, are kept as
    /// they are.
    pub async fn delete_update(&self, update_id: &str) -> Result<TaskUpdate, StoreError> {
        let (layout, mut table) = self.fetch_updates().await?;
        let (row_index, update) = parse_updates(&layout, &table)
            .into_iter()
            .find(|(_, u)| u.id == update_id)
            .ok_or_else(|| unknown_update(update_id))?;

        table.rows.remove(row_index);
        self.store.replace(UPDATES_SHEET, table).await?;
        info!("deleted update {update_id}");
        Ok(update)
    }

    /// Task categories in effect, as of the last refresh.
    pub fn categories(&self) -> Result<&[CategoryInfo], StoreError> {
        Ok(&self.schema(TASKS_SHEET)?.vocabulary.categories)
    }

    /// Task categories as stored now: the Categories sheet when it has
    /// entries, the configured list otherwise.
    pub async fn category_list(&self) -> Result<Vec<CategoryInfo>, StoreError> {
        if let Some(categories) = self.load_categories().await? {
            return Ok(categories);
        }
        self.configured
            .iter()
            .find(|s| s.sheet == TASKS_SHEET)
            .map(|s| s.vocabulary.categories.clone())
            .ok_or_else(|| StoreError::NotFound(TASKS_SHEET.to_string()))
    }

    async fn save_categories(&mut self, categories: Vec<CategoryInfo>) -> Result<(), StoreError> {
        let data = TableData {
            headers: to_strings(&CATEGORIES_HEADER),
            rows: categories.iter().map(mapper::serialize_category).collect(),
        };
        self.store.replace(CATEGORIES_SHEET, data).await?;

        // An emptied sheet falls back to the configured list on refresh.
        let effective = if categories.is_empty() {
            self.category_list().await?
        } else {
            categories
        };
        if let Some(tasks) = self.schemas.iter_mut().find(|s| s.sheet == TASKS_SHEET) {
            tasks.vocabulary.categories = effective;
        }
        Ok(())
    }

    /// Adds a task category keyed `"<icon> <name>"`. Takes effect for
    /// writes immediately.
    pub async fn add_category(&mut self, icon: &str, name: &str) -> Result<CategoryInfo, StoreError> {
        let (icon, name) = (icon.trim(), name.trim());
        if name.is_empty() {
            return Err(StoreError::SchemaMismatch(format!(
                "{CATEGORIES_SHEET}: empty category name"
            )));
        }
        let key = if icon.is_empty() {
            name.to_string()
        } else {
            format!("{icon} {name}")
        };

        let mut categories = self.category_list().await?;
        if categories.iter().any(|c| c.key == key || c.name == name) {
            return Err(StoreError::DuplicateId {
                sheet: CATEGORIES_SHEET.to_string(),
                id: key,
            });
        }

        let color = category_color(&key);
        let info = CategoryInfo {
            key,
            name: name.to_string(),
            icon: icon.to_string(),
            color: color.to_string(),
            bg: format!("{color}22"),
        };
        categories.push(info.clone());
        self.save_categories(categories).await?;
        info!("added category {}", info.key);
        Ok(info)
    }

    /// Removes a task category by key or name. Records already filed under
    /// it are skipped by later refreshes until recategorized.
    pub async fn remove_category(&mut self, category: &str) -> Result<CategoryInfo, StoreError> {
        let category = category.trim();
        let mut categories = self.category_list().await?;
        let position = categories
            .iter()
            .position(|c| c.key == category || c.name == category)
            .ok_or_else(|| StoreError::UnknownRecord {
                sheet: CATEGORIES_SHEET.to_string(),
                id: category.to_string(),
            })?;

        let removed = categories.remove(position);
        self.save_categories(categories).await?;
        info!("removed category {}", removed.key);
        Ok(removed)
    }

    /// Creates every sheet the dashboard reads that does not exist yet.
    /// Returns the names of the sheets created.
    pub async fn init_sheets(&self) -> Result<Vec<String>, StoreError> {
        let existing = self.store.list_sheets().await?;
        let mut wanted: Vec<(String, Vec<String>)> = self
            .schemas
            .iter()
            .map(|s| (s.sheet.clone(), s.header()))
            .collect();
        if self.categories_from_sheet {
            wanted.push((UPDATES_SHEET.to_string(), to_strings(&UPDATES_HEADER)));
            wanted.push((CATEGORIES_SHEET.to_string(), to_strings(&CATEGORIES_HEADER)));
        }

        let mut created = Vec::new();
        for (name, header) in wanted {
            if existing.contains(&name) {
                continue;
            }
            self.store.create_sheet(&name, header).await?;
            created.push(name);
        }
        Ok(created)
    }

}

fn to_strings(cells: &[&str]) -> Vec<String> {
    cells.iter().map(|c| c.to_string()).collect()
}

fn is_blank(row: &[String]) -> bool {
    row.iter().all(|cell| cell.trim().is_empty())
}

fn validated_row(record: &Record, schema: &Schema) -> Result<Vec<String>, StoreError> {
    let raw = mapper::serialize(record, schema);
    // Parsing the serialized row applies the same checks as a refresh would.
    mapper::parse(&raw, schema)?;
    Ok(raw)
}

/// Parses data rows, skipping blank rows silently and malformed rows or
/// repeated ids with a warning.
fn parse_rows(rows: &[Vec<String>], schema: &Schema, skipped: &mut Vec<SkippedRow>) -> Vec<Record> {
    let mut seen = HashSet::new();
    let mut records = Vec::with_capacity(rows.len());

    for (row_index, row) in rows.iter().enumerate() {
        if is_blank(row) {
            continue;
        }
        let reason = match mapper::parse(row, schema) {
            Ok(record) if seen.insert(record.id.clone()) => {
                records.push(record);
                continue;
            }
            Ok(record) => format!("duplicate id {}", record.id),
            Err(err) => err.to_string(),
        };
        warn!("{} row {row_index} skipped: {reason}", schema.sheet);
        skipped.push(SkippedRow {
            sheet: schema.sheet.clone(),
            row_index,
            reason,
        });
    }

    records
}

/// Whether any non-blank row carries `id` in the id column, parseable or not.
fn holds_id(table: &TableData, schema: &Schema, id: &str) -> bool {
    let Some(column) = schema.columns.iter().position(|c| c.role == ColumnRole::Id) else {
        return false;
    };
    table
        .rows
        .iter()
        .filter(|row| !is_blank(row))
        .any(|row| row.get(column).map(|cell| cell.trim()) == Some(id))
}

/// Parses the Updates rows, logging and leaving out the malformed ones.
fn parse_updates(layout: &UpdateLayout, table: &TableData) -> Vec<(usize, TaskUpdate)> {
    let mut updates = Vec::with_capacity(table.rows.len());
    for (i, row) in table.rows.iter().enumerate() {
        if is_blank(row) {
            continue;
        }
        match layout.parse(row) {
            Ok(update) => updates.push((i, update)),
            Err(err) => warn!("{UPDATES_SHEET} row {i} skipped: {err}"),
        }
    }
    updates
}

/// Millisecond timestamp ids, bumped past the largest id in use so that
/// updates added within the same millisecond stay distinct.
fn next_update_id(layout: &UpdateLayout, table: &TableData, now_millis: i64) -> String {
    let largest = parse_updates(layout, table)
        .iter()
        .filter_map(|(_, u)| u.id.parse::<i64>().ok())
        .max();
    match largest {
        Some(largest) if largest >= now_millis => (largest + 1).to_string(),
        _ => now_millis.to_string(),
    }
}

fn unknown_update(update_id: &str) -> StoreError {
    StoreError::UnknownRecord {
        sheet: UPDATES_SHEET.to_string(),
        id: update_id.to_string(),
    }
}

fn category_color(key: &str) -> &'static str {
    let hash = key.chars().map(|c| c as usize).sum::<usize>();
    CATEGORY_COLORS[hash % CATEGORY_COLORS.len()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapper::Column;
    use crate::store::MemoryStore;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 15)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap()
    }

    fn demand_columns() -> Vec<Column> {
        vec![
            Column::new("id", ColumnRole::Id),
            Column::new("category", ColumnRole::Category),
            Column::new("status", ColumnRole::Status),
            Column::new("due", ColumnRole::DueDate),
        ]
    }

    fn demand_vocabulary() -> Vocabulary {
        Vocabulary::new(
            &["Bolsas", "Educação", "Estágio"],
            &["Aberto", "Concluído"],
            "Concluído",
            "Aberto",
        )
    }

    fn demand_schema() -> Schema {
        Schema::new("Demands", demand_columns(), demand_vocabulary())
    }

    fn demands(rows: Vec<Vec<String>>) -> TableData {
        TableData {
            headers: row(&["id", "category", "status", "due"]),
            rows,
        }
    }

    /// A Tasks sheet with the demand layout whose categories may come from
    /// the Categories sheet.
    fn task_board(store: MemoryStore) -> Dashboard {
        let schema = Schema::new(TASKS_SHEET, demand_columns(), demand_vocabulary());
        let mut dashboard = Dashboard::new(Box::new(store), vec![schema], "me");
        dashboard.categories_from_sheet = true;
        dashboard
    }

    fn lab_category() -> TableData {
        TableData {
            headers: to_strings(&CATEGORIES_HEADER),
            rows: vec![row(&["#00d9ff", "🧪", "Lab", "#1f3d4a", "🧪 Lab"])],
        }
    }

    fn category_names(dashboard: &Dashboard) -> Vec<String> {
        dashboard
            .categories()
            .unwrap()
            .iter()
            .map(|c| c.name.clone())
            .collect()
    }

    fn record_ids(snapshot: &Snapshot, sheet: &str) -> Vec<String> {
        snapshot.sheet(sheet).unwrap().records.iter().map(|r| r.id.clone()).collect()
    }

    #[test]
    fn duplicate_and_malformed_rows_are_skipped() {
        let mut skipped = Vec::new();
        let rows = vec![
            row(&["1", "Bolsas", "Aberto", "2024-01-01"]),
            row(&["", "", "", ""]),
            row(&["1", "Estágio", "Aberto", ""]),
            row(&["2", "Financeiro", "Aberto", ""]),
            row(&["3", "Estágio", "Concluído"]),
        ];

        let records = parse_rows(&rows, &demand_schema(), &mut skipped);
        assert_eq!(records.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(), vec!["1", "3"]);
        assert_eq!(skipped.iter().map(|s| s.row_index).collect::<Vec<_>>(), vec![2, 3]);
        assert_eq!(skipped[0].reason, "duplicate id 1");
    }

    #[tokio::test]
    async fn failed_refresh_keeps_previous_snapshot() {
        let store = MemoryStore::new().with_sheet(
            "Demands",
            demands(vec![row(&["1", "Bolsas", "Aberto", "2024-01-01"])]),
        );
        let mut dashboard = Dashboard::new(Box::new(store), vec![demand_schema()], "maicon@example.com");
        dashboard.refresh_at(now()).await.unwrap();

        dashboard.configured.push(Schema::new("Missing", Vec::new(), Vocabulary::requests()));
        let err = dashboard.refresh_at(now()).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(ref name) if name == "Missing"));

        let snapshot = dashboard.snapshot().unwrap();
        assert_eq!(snapshot.sheets.len(), 1);
        assert_eq!(snapshot.sheet("Demands").unwrap().view.total(), 1);
        assert!(dashboard.schema("Missing").is_err());
    }

    #[tokio::test]
    async fn bad_header_fails_the_cycle() {
        let store = MemoryStore::new().with_sheet(
            "Demands",
            TableData {
                headers: row(&["id", "status", "category", "due"]),
                rows: vec![],
            },
        );
        let mut dashboard = Dashboard::new(Box::new(store), vec![demand_schema()], "me");
        let err = dashboard.refresh_at(now()).await.unwrap_err();
        assert!(matches!(err, StoreError::SchemaMismatch(_)));
        assert!(dashboard.snapshot().is_none());
    }

    #[tokio::test]
    async fn category_sheet_applies_per_cycle() {
        let store = MemoryStore::new()
            .with_sheet(
                TASKS_SHEET,
                demands(vec![row(&["1", "Bolsas", "Aberto", ""]), row(&["2", "Lab", "Aberto", ""])]),
            )
            .with_sheet(CATEGORIES_SHEET, lab_category());
        let mut dashboard = task_board(store);

        let snapshot = dashboard.refresh_at(now()).await.unwrap();
        assert_eq!(record_ids(snapshot, TASKS_SHEET), vec!["2"]);
        assert_eq!(snapshot.skipped.len(), 1);
        assert_eq!(category_names(&dashboard), vec!["Lab"]);

        // Emptying the sheet brings the configured categories back.
        dashboard
            .store()
            .replace(CATEGORIES_SHEET, TableData::with_headers(&CATEGORIES_HEADER))
            .await
            .unwrap();
        let snapshot = dashboard.refresh_at(now()).await.unwrap();
        assert_eq!(record_ids(snapshot, TASKS_SHEET), vec!["1"]);
        assert_eq!(snapshot.skipped[0].row_index, 1);
        assert_eq!(category_names(&dashboard), vec!["Bolsas", "Educação", "Estágio"]);
    }

    #[tokio::test]
    async fn failed_refresh_keeps_the_vocabulary() {
        // Categories can be read but the Tasks sheet is missing.
        let store = MemoryStore::new().with_sheet(CATEGORIES_SHEET, lab_category());
        let mut dashboard = task_board(store);

        assert!(dashboard.refresh_at(now()).await.is_err());
        assert_eq!(category_names(&dashboard), vec!["Bolsas", "Educação", "Estágio"]);
    }

    #[tokio::test]
    async fn writes_check_ids_and_vocabulary() {
        let store = MemoryStore::new().with_sheet("Demands", demands(vec![row(&["1", "Bolsas", "Aberto"])]));
        let dashboard = Dashboard::new(Box::new(store), vec![demand_schema()], "me");

        let mut record = Record {
            id: "1".into(),
            category: "Bolsas".into(),
            status: "Aberto".into(),
            ..Record::default()
        };
        let err = dashboard.add_record("Demands", &record).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateId { .. }));

        record.id = "2".into();
        record.status = "Arquivado".into();
        let err = dashboard.add_record("Demands", &record).await.unwrap_err();
        assert!(matches!(err, StoreError::SchemaMismatch(_)));

        record.status = "Aberto".into();
        dashboard.add_record("Demands", &record).await.unwrap();
        let moved = dashboard.set_status("Demands", "2", "Concluído").await.unwrap();
        assert_eq!(moved.status, "Concluído");

        let table = dashboard.store().fetch("Demands").await.unwrap();
        assert_eq!(table.rows[1], row(&["2", "Bolsas", "Concluído", ""]));

        let err = dashboard.set_status("Demands", "9", "Concluído").await.unwrap_err();
        assert!(matches!(err, StoreError::UnknownRecord { .. }));
    }

    #[tokio::test]
    async fn malformed_rows_still_hold_their_id() {
        let store = MemoryStore::new().with_sheet(
            "Demands",
            demands(vec![row(&[" 5 ", "Financeiro", "Aberto", ""])]),
        );
        let dashboard = Dashboard::new(Box::new(store), vec![demand_schema()], "me");

        let record = Record {
            id: "5".into(),
            category: "Bolsas".into(),
            status: "Aberto".into(),
            ..Record::default()
        };
        let err = dashboard.add_record("Demands", &record).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateId { ref id, .. } if id == "5"));
        assert_eq!(dashboard.store().fetch("Demands").await.unwrap().rows.len(), 1);
    }

    #[tokio::test]
    async fn updates_are_signed_and_filtered_by_task() {
        let store = MemoryStore::new().with_sheet(UPDATES_SHEET, TableData::with_headers(&UPDATES_HEADER));
        let dashboard = Dashboard::new(Box::new(store), vec![], "maicon@example.com");

        dashboard.add_update("7", "Reunião com a ETEC", now()).await.unwrap();
        dashboard.add_update("8", "Outra tarefa", now()).await.unwrap();

        let updates = dashboard.updates_for("7").await.unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].user, "maicon@example.com");
        assert_eq!(updates[0].timestamp, "2024-01-15 09:00:00");

        let table = dashboard.store().fetch(UPDATES_SHEET).await.unwrap();
        assert_eq!(
            table.rows[0][..4].to_vec(),
            row(&["7", "Reunião com a ETEC", "2024-01-15 09:00:00", "maicon@example.com"])
        );
    }

    #[tokio::test]
    async fn updates_follow_the_sheet_header() {
        let store = MemoryStore::new().with_sheet(
            UPDATES_SHEET,
            TableData {
                headers: row(&["id", "user", "timestamp", "content", "task_id"]),
                rows: vec![row(&["100", "ana@example.com", "2024-01-10 08:00:00", "Primeira", "7"])],
            },
        );
        let dashboard = Dashboard::new(Box::new(store), vec![], "maicon@example.com");

        let added = dashboard.add_update("7", "Segunda", now()).await.unwrap();
        let table = dashboard.store().fetch(UPDATES_SHEET).await.unwrap();
        assert_eq!(
            table.rows[1],
            row(&[added.id.as_str(), "maicon@example.com", "2024-01-15 09:00:00", "Segunda", "7"])
        );

        let updates = dashboard.updates_for("7").await.unwrap();
        assert_eq!(
            updates.iter().map(|u| u.content.as_str()).collect::<Vec<_>>(),
            vec!["Primeira", "Segunda"]
        );
    }

    #[tokio::test]
    async fn headerless_updates_sheet_gets_the_default_header() {
        let store = MemoryStore::new().with_sheet(UPDATES_SHEET, TableData::with_headers::<&str>(&[]));
        let dashboard = Dashboard::new(Box::new(store), vec![], "me");

        dashboard.add_update("7", "Nota", now()).await.unwrap();
        let table = dashboard.store().fetch(UPDATES_SHEET).await.unwrap();
        assert_eq!(table.headers, to_strings(&UPDATES_HEADER));
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0][0], "7");
    }

    #[tokio::test]
    async fn updates_sheet_without_an_id_column_is_rejected() {
        let store = MemoryStore::new().with_sheet(UPDATES_SHEET, TableData::with_headers(&["task_id", "content"]));
        let dashboard = Dashboard::new(Box::new(store), vec![], "me");

        let err = dashboard.updates_for("7").await.unwrap_err();
        assert!(matches!(err, StoreError::SchemaMismatch(_)));
        let err = dashboard.add_update("7", "Nota", now()).await.unwrap_err();
        assert!(matches!(err, StoreError::SchemaMismatch(_)));
    }

    #[tokio::test]
    async fn update_ids_stay_unique_within_a_millisecond() {
        let store = MemoryStore::new().with_sheet(UPDATES_SHEET, TableData::with_headers(&UPDATES_HEADER));
        let dashboard = Dashboard::new(Box::new(store), vec![], "me");

        let mut ids = Vec::new();
        for _ in 0..5 {
            let update = dashboard.add_update("7", "Nota", now()).await.unwrap();
            ids.push(update.id.parse::<i64>().unwrap());
        }
        assert!(ids.windows(2).all(|pair| pair[0] < pair[1]), "{ids:?}");
    }

    #[test]
    fn next_update_id_passes_the_largest_in_use() {
        let layout = UpdateLayout::default();
        let table = TableData {
            headers: to_strings(&UPDATES_HEADER),
            rows: vec![
                row(&["7", "a", "2024-01-15 09:00:00", "me", "2000"]),
                row(&["7", "b", "2024-01-15 09:00:00", "me", "legado"]),
            ],
        };
        assert_eq!(next_update_id(&layout, &table, 1500), "2001");
        assert_eq!(next_update_id(&layout, &table, 2000), "2001");
        assert_eq!(next_update_id(&layout, &table, 3000), "3000");
    }

    #[tokio::test]
    async fn edited_updates_are_marked() {
        let store = MemoryStore::new().with_sheet(UPDATES_SHEET, TableData::with_headers(&UPDATES_HEADER));
        let dashboard = Dashboard::new(Box::new(store), vec![], "me");
        let added = dashboard.add_update("7", "Rascunho", now()).await.unwrap();

        let later = now() + chrono::Duration::minutes(90);
        let edited = dashboard.edit_update(&added.id, "Versão final", later).await.unwrap();
        assert_eq!(edited.timestamp, "2024-01-15 10:30:00 (editado)");

        let updates = dashboard.updates_for("7").await.unwrap();
        assert_eq!(updates, vec![edited]);

        let err = dashboard.edit_update("404", "x", later).await.unwrap_err();
        assert!(matches!(err, StoreError::UnknownRecord { ref sheet, .. } if sheet == UPDATES_SHEET));
    }

    #[tokio::test]
    async fn deleting_an_update_keeps_the_other_rows() {
        let store = MemoryStore::new().with_sheet(
            UPDATES_SHEET,
            TableData {
                headers: to_strings(&UPDATES_HEADER),
                rows: vec![
                    row(&["7", "Primeira", "2024-01-10 08:00:00", "me", "1"]),
                    row(&["", "sem tarefa", "", "", "2"]),
                    row(&["7", "Segunda", "2024-01-11 08:00:00", "me", "3"]),
                ],
            },
        );
        let dashboard = Dashboard::new(Box::new(store), vec![], "me");

        let deleted = dashboard.delete_update("1").await.unwrap();
        assert_eq!(deleted.content, "Primeira");

        let table = dashboard.store().fetch(UPDATES_SHEET).await.unwrap();
        assert_eq!(table.rows.iter().map(|r| r[4].as_str()).collect::<Vec<_>>(), vec!["2", "3"]);

        let err = dashboard.delete_update("1").await.unwrap_err();
        assert!(matches!(err, StoreError::UnknownRecord { .. }));
    }

    #[tokio::test]
    async fn categories_can_be_added_and_removed() {
        let store = MemoryStore::new().with_sheet(TASKS_SHEET, demands(vec![]));
        let mut dashboard = task_board(store);

        let lab = dashboard.add_category("🧪", "Lab").await.unwrap();
        assert_eq!(lab.key, "🧪 Lab");
        assert_eq!(lab.bg, format!("{}22", lab.color));
        assert!(CATEGORY_COLORS.contains(&lab.color.as_str()));
        assert_eq!(category_names(&dashboard), vec!["Bolsas", "Educação", "Estágio", "Lab"]);

        let record = Record {
            id: "1".into(),
            category: "🧪 Lab".into(),
            status: "Aberto".into(),
            ..Record::default()
        };
        dashboard.add_record(TASKS_SHEET, &record).await.unwrap();

        let err = dashboard.add_category("", "Lab").await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateId { .. }));

        let removed = dashboard.remove_category("🧪 Lab").await.unwrap();
        assert_eq!(removed, lab);
        assert_eq!(category_names(&dashboard), vec!["Bolsas", "Educação", "Estágio"]);

        let err = dashboard.remove_category("Lab").await.unwrap_err();
        assert!(matches!(err, StoreError::UnknownRecord { .. }));
    }

    #[tokio::test]
    async fn removing_the_last_category_restores_the_configured_list() {
        let store = MemoryStore::new()
            .with_sheet(TASKS_SHEET, demands(vec![]))
            .with_sheet(CATEGORIES_SHEET, lab_category());
        let mut dashboard = task_board(store);
        dashboard.refresh_at(now()).await.unwrap();
        assert_eq!(category_names(&dashboard), vec!["Lab"]);

        dashboard.remove_category("Lab").await.unwrap();
        assert_eq!(category_names(&dashboard), vec!["Bolsas", "Educação", "Estágio"]);
        let table = dashboard.store().fetch(CATEGORIES_SHEET).await.unwrap();
        assert!(table.rows.is_empty());
    }
}
