// src/mapper.rs
//! Conversion between raw sheet rows and typed records.
//!
//! Every sheet has a [`Schema`]: an ordered list of columns, each playing a
//! role in [`Record`], plus the vocabulary its category and status cells must
//! belong to. Spreadsheet APIs drop trailing empty cells, so a row shorter than
//! the schema reads the missing cells as empty; a longer row is rejected.

use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::data_types::{
    CategoryInfo, Priority, Record, TaskUpdate, Vocabulary, REQUESTS_SHEET, TASKS_SHEET,
    UPDATES_SHEET,
};
use crate::error::StoreError;

const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnRole {
    Id,
    Title,
    Category,
    Status,
    Priority,
    DueDate,
    Owner,
    Text,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub role: ColumnRole,
}

impl Column {
    pub fn new(name: &str, role: ColumnRole) -> Self {
        Column {
            name: name.to_string(),
            role,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    pub sheet: String,
    pub columns: Vec<Column>,
    pub vocabulary: Vocabulary,
}

impl Schema {
    pub fn new(sheet: &str, columns: Vec<Column>, vocabulary: Vocabulary) -> Self {
        Schema {
            sheet: sheet.to_string(),
            columns,
            vocabulary,
        }
    }

    /// Column layout of the Tasks sheet, in the order the sheet stores them.
    pub fn tasks(vocabulary: Vocabulary) -> Self {
        use ColumnRole::{Category, DueDate, Id, Owner, Status, Text, Title};
        Schema::new(
            TASKS_SHEET,
            vec![
                Column::new("title", Title),
                Column::new("responsible", Owner),
                Column::new("category", Category),
                Column::new("priority", ColumnRole::Priority),
                Column::new("status", Status),
                Column::new("description", Text),
                Column::new("attachments", Text),
                Column::new("collaborators", Text),
                Column::new("manager_feedback", Text),
                Column::new("id", Id),
                Column::new("dueDate", DueDate),
                Column::new("createdAt", Text),
            ],
            vocabulary,
        )
    }

    /// RC/PO purchase requests: the subelement is the category and the
    /// situation is the status.
    pub fn requests(vocabulary: Vocabulary) -> Self {
        use ColumnRole::{Category, Id, Owner, Status, Text, Title};
        Schema::new(
            REQUESTS_SHEET,
            vec![
                Column::new("subelement", Category),
                Column::new("date_opening", Text),
                Column::new("description", Title),
                Column::new("rc_code", Text),
                Column::new("buyer", Owner),
                Column::new("situation", Status),
                Column::new("attachments", Text),
                Column::new("po_number", Text),
                Column::new("nf_tracking", Text),
                Column::new("nf_attachments", Text),
                Column::new("id", Id),
                Column::new("created_at", Text),
            ],
            vocabulary,
        )
    }

    pub fn header(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }
}

/// Checks that a sheet's header row names the schema's columns, in order.
pub fn check_headers(headers: &[String], schema: &Schema) -> Result<(), StoreError> {
    let expected = schema.header();
    let matches = headers.len() == expected.len()
        && headers
            .iter()
            .zip(&expected)
            .all(|(got, want)| got.trim().eq_ignore_ascii_case(want));

    if matches {
        Ok(())
    } else {
        Err(StoreError::SchemaMismatch(format!(
            "sheet {} has header [{}], expected [{}]",
            schema.sheet,
            headers.join(", "),
            expected.join(", ")
        )))
    }
}

pub fn parse(raw_row: &[String], schema: &Schema) -> Result<Record, StoreError> {
    if raw_row.len() > schema.columns.len() {
        return Err(mismatch(
            schema,
            format!(
                "row has {} cells but the schema has {} columns",
                raw_row.len(),
                schema.columns.len()
            ),
        ));
    }

    if raw_row.iter().any(|cell| cell.contains(char::REPLACEMENT_CHARACTER)) {
        return Err(mismatch(schema, "row is not valid UTF-8".to_string()));
    }

    let mut record = Record::default();
    let mut fields = BTreeMap::new();

    for (i, column) in schema.columns.iter().enumerate() {
        let cell = raw_row.get(i).map(String::as_str).unwrap_or("");
        match column.role {
            ColumnRole::Id => {
                let id = cell.trim();
                if id.is_empty() {
                    return Err(mismatch(schema, "empty id".to_string()));
                }
                record.id = id.to_string();
            }
            ColumnRole::Title => record.title = cell.trim().to_string(),
            ColumnRole::Category => {
                let info = schema.vocabulary.category(cell).ok_or_else(|| {
                    mismatch(schema, format!("unknown {} {cell:?}", column.name))
                })?;
                record.category = info.name.clone();
            }
            ColumnRole::Status => {
                let status = schema.vocabulary.status(cell).ok_or_else(|| {
                    mismatch(schema, format!("unknown {} {cell:?}", column.name))
                })?;
                record.status = status.to_string();
            }
            ColumnRole::Priority => {
                record.priority = if cell.trim().is_empty() {
                    None
                } else {
                    Some(Priority::parse(cell).ok_or_else(|| {
                        mismatch(schema, format!("unknown priority {cell:?}"))
                    })?)
                };
            }
            ColumnRole::DueDate => {
                record.due_date = parse_date(cell)
                    .map_err(|reason| mismatch(schema, format!("{}: {reason}", column.name)))?;
            }
            ColumnRole::Owner => record.owner = cell.trim().to_string(),
            ColumnRole::Text if cell.is_empty() => {}
            ColumnRole::Text => {
                fields.insert(column.name.clone(), cell.to_string());
            }
        }
    }

    record.fields = fields;
    Ok(record)
}

/// Lays a record out in schema column order. Free-text columns missing from
/// `record.fields` are written empty, and empty cells are left out of
/// `fields` on parse, so `parse(serialize(r)) == r` for any record whose
/// fields are non-empty and name text columns of the schema.
pub fn serialize(record: &Record, schema: &Schema) -> Vec<String> {
    schema
        .columns
        .iter()
        .map(|column| match column.role {
            ColumnRole::Id => record.id.clone(),
            ColumnRole::Title => record.title.clone(),
            ColumnRole::Category => record.category.clone(),
            ColumnRole::Status => record.status.clone(),
            ColumnRole::Priority => record
                .priority
                .map(|p| p.as_str().to_string())
                .unwrap_or_default(),
            ColumnRole::DueDate => record
                .due_date
                .map(|d| d.format(DATE_FORMAT).to_string())
                .unwrap_or_default(),
            ColumnRole::Owner => record.owner.clone(),
            ColumnRole::Text => record.field(&column.name).to_string(),
        })
        .collect()
}

/// Accepts `YYYY-MM-DD`, an ISO date followed by a time, or `DD/MM/YYYY`.
pub fn parse_date(cell: &str) -> Result<Option<NaiveDate>, String> {
    let cell = cell.trim();
    if cell.is_empty() {
        return Ok(None);
    }

    let date_part = cell.split([' ', 'T']).next().unwrap_or(cell);
    NaiveDate::parse_from_str(date_part, DATE_FORMAT)
        .or_else(|_| NaiveDate::parse_from_str(cell, "%d/%m/%Y"))
        .map(Some)
        .map_err(|_| format!("malformed date {cell:?}"))
}

fn mismatch(schema: &Schema, reason: String) -> StoreError {
    StoreError::SchemaMismatch(format!("{}: {reason}", schema.sheet))
}

/// Column order of a new Updates sheet.
pub const UPDATES_HEADER: [&str; 5] = ["task_id", "content", "timestamp", "user", "id"];

/// Positions of the Updates columns, located by header name because older
/// sheets were written with other column orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateLayout {
    task_id: usize,
    content: usize,
    timestamp: usize,
    user: usize,
    id: usize,
    width: usize,
}

impl Default for UpdateLayout {
    fn default() -> Self {
        UpdateLayout {
            task_id: 0,
            content: 1,
            timestamp: 2,
            user: 3,
            id: 4,
            width: UPDATES_HEADER.len(),
        }
    }
}

impl UpdateLayout {
    /// Fails when any of the five columns is missing from `headers`.
    pub fn from_headers(headers: &[String]) -> Result<Self, StoreError> {
        let find = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(name))
                .ok_or_else(|| {
                    StoreError::SchemaMismatch(format!(
                        "sheet {UPDATES_SHEET} has header [{}], missing column {name}",
                        headers.join(", ")
                    ))
                })
        };
        Ok(UpdateLayout {
            task_id: find("task_id")?,
            content: find("content")?,
            timestamp: find("timestamp")?,
            user: find("user")?,
            id: find("id")?,
            width: headers.len(),
        })
    }

    pub fn parse(&self, raw_row: &[String]) -> Result<TaskUpdate, StoreError> {
        if raw_row.len() > self.width {
            return Err(StoreError::SchemaMismatch(format!(
                "update row has {} cells, expected {}",
                raw_row.len(),
                self.width
            )));
        }
        if raw_row.iter().any(|cell| cell.contains(char::REPLACEMENT_CHARACTER)) {
            return Err(StoreError::SchemaMismatch(
                "update row is not valid UTF-8".to_string(),
            ));
        }
        let cell = |i: usize| raw_row.get(i).map(|c| c.trim().to_string()).unwrap_or_default();

        let update = TaskUpdate {
            id: cell(self.id),
            task_id: cell(self.task_id),
            content: raw_row.get(self.content).cloned().unwrap_or_default(),
            timestamp: cell(self.timestamp),
            user: cell(self.user),
        };
        if update.id.is_empty() || update.task_id.is_empty() {
            return Err(StoreError::SchemaMismatch(
                "update row without id or task_id".to_string(),
            ));
        }
        Ok(update)
    }

    pub fn serialize(&self, update: &TaskUpdate) -> Vec<String> {
        let mut row = vec![String::new(); self.width];
        row[self.task_id] = update.task_id.clone();
        row[self.content] = update.content.clone();
        row[self.timestamp] = update.timestamp.clone();
        row[self.user] = update.user.clone();
        row[self.id] = update.id.clone();
        row
    }
}

/// Column order the Categories sheet is written with.
pub const CATEGORIES_HEADER: [&str; 5] = ["color", "icon", "name", "bg", "key"];

/// Reads a Categories sheet row. Columns are located by header name since
/// the sheet is edited by hand; a row without a key is skipped.
pub fn parse_category(headers: &[String], raw_row: &[String]) -> Option<CategoryInfo> {
    let get = |name: &str| {
        headers
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(name))
            .and_then(|i| raw_row.get(i))
            .map(|v| v.trim().to_string())
            .unwrap_or_default()
    };

    let key = get("key");
    if key.is_empty() {
        return None;
    }
    let name = match get("name") {
        name if name.is_empty() => key.clone(),
        name => name,
    };

    Some(CategoryInfo {
        key,
        name,
        icon: get("icon"),
        color: get("color"),
        bg: get("bg"),
    })
}

pub fn serialize_category(info: &CategoryInfo) -> Vec<String> {
    vec![
        info.color.clone(),
        info.icon.clone(),
        info.name.clone(),
        info.bg.clone(),
        info.key.clone(),
    ]
}
