// src/cloud_handler.rs
use std::fs::File;
use std::io::Read;
use std::path::Path;

use async_trait::async_trait;
use google_sheets4::api::{
    AddSheetRequest, BatchUpdateSpreadsheetRequest, ClearValuesRequest, Request, SheetProperties,
    ValueRange,
};
use google_sheets4::{hyper, hyper_rustls, Sheets};
use log::{debug, info};
use serde_json::{from_str, Value};
use yup_oauth2::{ServiceAccountAuthenticator, ServiceAccountKey};

use crate::data_types::TableData;
use crate::error::{ConfigError, StoreError};
use crate::store::TabularStore;

type Connector = hyper_rustls::HttpsConnector<hyper::client::HttpConnector>;

/// Google Sheets session. Authenticates once and is reused for every refresh.
pub struct CloudHandler {
    hub: Sheets<Connector>,
    spreadsheet_id: String,
}

impl CloudHandler {
    pub async fn connect(key: ServiceAccountKey, spreadsheet_id: &str) -> Result<Self, StoreError> {
        // Create authenticator
        let auth = ServiceAccountAuthenticator::builder(key)
            .build()
            .await
            .map_err(|err| StoreError::RemoteUnavailable(format!("authentication failed: {err}")))?;

        let connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_native_roots()
            .https_or_http()
            .enable_http1()
            .build();
        let hub = Sheets::new(hyper::Client::builder().build(connector), auth);

        info!("connected to spreadsheet {spreadsheet_id}");
        Ok(CloudHandler {
            hub,
            spreadsheet_id: spreadsheet_id.to_string(),
        })
    }

    /// Loads a service account key from a JSON key file.
    pub fn read_key(path: &Path) -> Result<ServiceAccountKey, StoreError> {
        let mut json = String::new();
        File::open(path)?.read_to_string(&mut json)?;

        from_str(&json).map_err(|err| {
            StoreError::RemoteUnavailable(format!(
                "invalid service account key {}: {err}",
                path.display()
            ))
        })
    }

    /// Accepts either a bare spreadsheet id or a full URL such as
    /// `https://docs.google.com/spreadsheets/d/<ID>/edit`.
    pub fn spreadsheet_id_from(reference: &str) -> Result<String, ConfigError> {
        let reference = reference.trim();
        if !reference.contains('/') {
            if reference.is_empty() {
                return Err(ConfigError::InvalidSpreadsheet(reference.to_string()));
            }
            return Ok(reference.to_string());
        }

        let parts: Vec<&str> = reference.split('/').collect();
        for (i, part) in parts.iter().enumerate() {
            if *part == "d" && i + 1 < parts.len() && !parts[i + 1].is_empty() {
                return Ok(parts[i + 1].to_string());
            }
        }

        Err(ConfigError::InvalidSpreadsheet(reference.to_string()))
    }

    pub async fn spreadsheet_title(&self) -> Result<String, StoreError> {
        let (_, spreadsheet) = self
            .hub
            .spreadsheets()
            .get(&self.spreadsheet_id)
            .doit()
            .await
            .map_err(|err| remote_error(&self.spreadsheet_id, err))?;

        Ok(spreadsheet
            .properties
            .and_then(|p| p.title)
            .unwrap_or_default())
    }

    async fn sheet_titles(&self) -> Result<Vec<String>, StoreError> {
        let (_, spreadsheet) = self
            .hub
            .spreadsheets()
            .get(&self.spreadsheet_id)
            .doit()
            .await
            .map_err(|err| remote_error(&self.spreadsheet_id, err))?;

        Ok(spreadsheet
            .sheets
            .unwrap_or_default()
            .into_iter()
            .filter_map(|sheet| sheet.properties.and_then(|p| p.title))
            .collect())
    }

    async fn ensure_exists(&self, sheet_name: &str) -> Result<(), StoreError> {
        if self.sheet_titles().await?.iter().any(|t| t == sheet_name) {
            Ok(())
        } else {
            Err(StoreError::NotFound(sheet_name.to_string()))
        }
    }

    async fn write_rows(&self, range: &str, rows: Vec<Vec<String>>) -> Result<(), StoreError> {
        let request = ValueRange {
            range: Some(range.to_string()),
            values: Some(
                rows.into_iter()
                    .map(|row| row.into_iter().map(Value::String).collect())
                    .collect(),
            ),
            ..Default::default()
        };
        self.hub
            .spreadsheets()
            .values_update(request, &self.spreadsheet_id, range)
            .value_input_option("RAW")
            .doit()
            .await
            .map_err(|err| remote_error(range, err))?;
        Ok(())
    }
}

#[async_trait]
impl TabularStore for CloudHandler {
    async fn fetch(&self, sheet_name: &str) -> Result<TableData, StoreError> {
        self.ensure_exists(sheet_name).await?;

        let range = format!("{}!A:Z", quote_sheet(sheet_name));
        debug!("fetching {range}");
        let (_, response) = self
            .hub
            .spreadsheets()
            .values_get(&self.spreadsheet_id, &range)
            .doit()
            .await
            .map_err(|err| remote_error(sheet_name, err))?;

        Ok(table_from_values(response))
    }

    async fn append(&self, sheet_name: &str, row: Vec<String>) -> Result<(), StoreError> {
        self.ensure_exists(sheet_name).await?;

        let range = format!("{}!A1", quote_sheet(sheet_name));
        let request = ValueRange {
            values: Some(vec![row.into_iter().map(Value::String).collect()]),
            ..Default::default()
        };
        debug!("appending to {range}");
        self.hub
            .spreadsheets()
            .values_append(request, &self.spreadsheet_id, &range)
            .value_input_option("RAW")
            .insert_data_option("INSERT_ROWS")
            .doit()
            .await
            .map_err(|err| remote_error(sheet_name, err))?;
        Ok(())
    }

    async fn update(
        &self,
        sheet_name: &str,
        row_index: usize,
        row: Vec<String>,
    ) -> Result<(), StoreError> {
        let current = self.fetch(sheet_name).await?;
        if row_index >= current.rows.len() {
            return Err(StoreError::RowOutOfBounds {
                sheet: sheet_name.to_string(),
                index: row_index,
                len: current.rows.len(),
            });
        }

        // Row 1 is the header, data rows start at A2.
        let range = format!("{}!A{}", quote_sheet(sheet_name), row_index + 2);
        debug!("updating {range}");
        self.write_rows(&range, vec![row]).await
    }

    async fn list_sheets(&self) -> Result<Vec<String>, StoreError> {
        self.sheet_titles().await
    }

    async fn create_sheet(&self, sheet_name: &str, header: Vec<String>) -> Result<(), StoreError> {
        let request = BatchUpdateSpreadsheetRequest {
            requests: Some(vec![Request {
                add_sheet: Some(AddSheetRequest {
                    properties: Some(SheetProperties {
                        title: Some(sheet_name.to_string()),
                        ..Default::default()
                    }),
                }),
                ..Default::default()
            }]),
            ..Default::default()
        };
        self.hub
            .spreadsheets()
            .batch_update(request, &self.spreadsheet_id)
            .doit()
            .await
            .map_err(|err| remote_error(sheet_name, err))?;

        info!("created sheet {sheet_name}");
        let range = format!("{}!A1", quote_sheet(sheet_name));
        self.write_rows(&range, vec![header]).await
    }

    async fn replace(&self, sheet_name: &str, data: TableData) -> Result<(), StoreError> {
        if !self.sheet_titles().await?.iter().any(|t| t == sheet_name) {
            self.create_sheet(sheet_name, data.headers.clone()).await?;
        }

        let range = format!("{}!A:Z", quote_sheet(sheet_name));
        debug!("clearing {range}");
        self.hub
            .spreadsheets()
            .values_clear(ClearValuesRequest::default(), &self.spreadsheet_id, &range)
            .doit()
            .await
            .map_err(|err| remote_error(sheet_name, err))?;

        let mut rows = Vec::with_capacity(data.rows.len() + 1);
        rows.push(data.headers);
        rows.extend(data.rows);
        self.write_rows(&format!("{}!A1", quote_sheet(sheet_name)), rows).await
    }

    fn describe(&self) -> String {
        format!("Google Sheets spreadsheet {}", self.spreadsheet_id)
    }
}

fn remote_error(context: &str, err: google_sheets4::Error) -> StoreError {
    match err {
        google_sheets4::Error::Failure(response) if response.status() == hyper::StatusCode::NOT_FOUND => {
            StoreError::NotFound(context.to_string())
        }
        other => StoreError::RemoteUnavailable(format!("{context}: {other}")),
    }
}

/// A1 notation needs sheet names quoted, with embedded quotes doubled.
fn quote_sheet(sheet_name: &str) -> String {
    format!("'{}'", sheet_name.replace('\'', "''"))
}

fn cell_to_string(cell: &Value) -> String {
    match cell {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn table_from_values(response: ValueRange) -> TableData {
    let mut data = TableData::empty();

    let Some(values) = response.values else {
        return data;
    };
    let mut rows = values.iter();

    if let Some(headers) = rows.next() {
        data.headers = headers.iter().map(|h| cell_to_string(h).trim().to_string()).collect();
    }
    // Blank rows stay in place so row indexes keep matching sheet rows.
    data.rows = rows
        .map(|row| row.iter().map(cell_to_string).collect())
        .collect();

    data
}
