use crate::error::{EstimateError, Result};
use anyhow::Context;
use csv::{ReaderBuilder, StringRecord};
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

/// A CSV table held in memory, with columns addressed by header name.
#[derive(Debug, Clone)]
pub struct RawTable {
    pub name: String,
    headers: StringRecord,
    records: Vec<StringRecord>,
}

/// One data row of a [`RawTable`].
#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    table: &'a RawTable,
    number: usize, // 1-based, header excluded
    record: &'a StringRecord,
}

impl RawTable {
    pub fn from_reader<R: Read>(name: &str, reader: R) -> Result<Self> {
        let mut reader = ReaderBuilder::new().flexible(true).from_reader(reader);
        let headers = reader.headers()?.clone();
        let records = reader.records().collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Self {
            name: name.to_string(),
            headers,
            records,
        })
    }

    pub fn from_path(name: &str, path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path).map_err(csv::Error::from)?;
        Self::from_reader(name, file)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Index of a required column.
    pub fn column(&self, column: &str) -> Result<usize> {
        self.optional_column(column)
            .ok_or_else(|| EstimateError::MissingColumn {
                table: self.name.clone(),
                column: column.to_string(),
            })
    }

    pub fn optional_column(&self, column: &str) -> Option<usize> {
        self.headers.iter().position(|header| header.trim() == column)
    }

    pub fn rows(&self) -> impl Iterator<Item = Row<'_>> {
        self.records.iter().enumerate().map(move |(i, record)| Row {
            table: self,
            number: i + 1,
            record,
        })
    }
}

impl<'a> Row<'a> {
    /// Raw field value; short rows read as empty.
    pub fn get(&self, column: usize) -> &'a str {
        self.record.get(column).unwrap_or("")
    }

    /// Number of columns declared by the table header.
    pub fn width(&self) -> usize {
        self.table.headers.len()
    }

    /// Parse a trimmed field, reporting the table, row and column on failure.
    pub fn parse<T: FromStr>(&self, column: usize) -> Result<T> {
        let value = self.get(column).trim();
        value.parse::<T>().map_err(|_| self.invalid(column, value))
    }

    /// Parse a required number; `inf` and `NaN` are rejected.
    pub fn parse_f64(&self, column: usize) -> Result<f64> {
        let value = self.get(column).trim();
        match value.parse::<f64>() {
            Ok(number) if number.is_finite() => Ok(number),
            _ => Err(self.invalid(column, value)),
        }
    }

    /// Parse a numeric field where an empty or `NaN` cell means "no value".
    pub fn parse_optional_f64(&self, column: usize) -> Result<Option<f64>> {
        let value = self.get(column).trim();
        if value.is_empty() || value.eq_ignore_ascii_case("nan") {
            return Ok(None);
        }
        self.parse_f64(column).map(Some)
    }

    pub fn invalid(&self, column: usize, value: &str) -> EstimateError {
        EstimateError::InvalidValue {
            table: self.table.name.clone(),
            row: self.number,
            column: self.table.headers.get(column).unwrap_or("?").to_string(),
            value: value.to_string(),
        }
    }
}

pub struct TableLoader {
    client: reqwest::Client,
}

impl TableLoader {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Load a table from a local path or an `http(s)://` URL.
    pub async fn load(&self, name: &str, source: &str) -> anyhow::Result<RawTable> {
        let table = if is_url(source) {
            self.load_url(name, source).await?
        } else {
            RawTable::from_path(name, Path::new(source))
                .with_context(|| format!("Failed to read {}: {}", name, source))?
        };

        log::debug!("Loaded {} rows from {} ({})", table.len(), name, source);
        Ok(table)
    }

    async fn load_url(&self, name: &str, url: &str) -> anyhow::Result<RawTable> {
        println!("🌐 Fetching {} from: {}", name, url);

        let response = self.client
            .get(url)
            .timeout(std::time::Duration::from_secs(30))
            .send()
            .await
            .with_context(|| format!("Failed to fetch URL: {}", url))?;

        if !response.status().is_success() {
            return Err(anyhow::anyhow!("HTTP request failed with status: {}", response.status()));
        }

        let content = response.bytes().await
            .with_context(|| format!("Failed to read response body from: {}", url))?;

        RawTable::from_reader(name, content.as_ref())
            .with_context(|| format!("Failed to parse {} from: {}", name, url))
    }
}

fn is_url(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}
