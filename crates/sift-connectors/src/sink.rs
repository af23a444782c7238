//! Result sink: Arrow schemas and the per-scan record buffer.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use arrow::array::{ArrayRef, Int32Array, RecordBatch, RecordBatchOptions, StringArray};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::error::ArrowError;

use crate::record::{FetchedRecord, ImageRecord, WebRecord};
use crate::request::SearchKind;

pub fn web_schema() -> SchemaRef {
    let utf8 = |name: &str| Field::new(name, DataType::Utf8, false);
    Arc::new(Schema::new(vec![
        utf8("title"),
        utf8("link"),
        utf8("snippet"),
        utf8("display_link"),
        utf8("formatted_url"),
        utf8("html_formatted_url"),
        utf8("html_title"),
        utf8("html_snippet"),
        utf8("mime"),
        utf8("file_format"),
        utf8("pagemap"),
        utf8("site"),
        Field::new("date", DataType::Utf8, true),
    ]))
}

pub fn image_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("title", DataType::Utf8, false),
        Field::new("link", DataType::Utf8, false),
        Field::new("image_url", DataType::Utf8, false),
        Field::new("thumbnail_url", DataType::Utf8, false),
        Field::new("width", DataType::Int32, false),
        Field::new("height", DataType::Int32, false),
        Field::new("thumbnail_width", DataType::Int32, false),
        Field::new("thumbnail_height", DataType::Int32, false),
        Field::new("context_link", DataType::Utf8, false),
        Field::new("mime", DataType::Utf8, false),
        Field::new("snippet", DataType::Utf8, false),
    ]))
}

pub fn schema_for(kind: SearchKind) -> SchemaRef {
    match kind {
        SearchKind::Web => web_schema(),
        SearchKind::Image => image_schema(),
    }
}

/// Accumulates a scan's records, then hands them out in fixed-size batches.
///
/// Only the projected columns are materialized.
#[derive(Debug)]
pub struct ScanBuffer {
    kind: SearchKind,
    projection: Option<Vec<usize>>,
    schema: SchemaRef,
    records: Mutex<VecDeque<FetchedRecord>>,
}

impl ScanBuffer {
    pub fn new(kind: SearchKind, projection: Option<Vec<usize>>) -> Result<Self, ArrowError> {
        let full = schema_for(kind);
        let schema = match &projection {
            Some(indices) => Arc::new(full.project(indices)?),
            None => full,
        };
        Ok(Self {
            kind,
            projection,
            schema,
            records: Mutex::new(VecDeque::new()),
        })
    }

    /// Schema of the batches this buffer produces.
    pub fn schema(&self) -> SchemaRef {
        Arc::clone(&self.schema)
    }

    pub fn fill(&self, records: Vec<FetchedRecord>) -> Result<(), ArrowError> {
        let mut guard = self.lock()?;
        guard.extend(records);
        Ok(())
    }

    /// Remove up to `batch_size` records and materialize them.
    /// Returns `None` once the buffer is empty.
    pub fn drain_batch(&self, batch_size: usize) -> Result<Option<RecordBatch>, ArrowError> {
        let chunk: Vec<FetchedRecord> = {
            let mut guard = self.lock()?;
            let n = batch_size.max(1).min(guard.len());
            guard.drain(..n).collect()
        };
        if chunk.is_empty() {
            return Ok(None);
        }
        self.to_batch(&chunk).map(Some)
    }

    /// Drain everything as a sequence of batches of at most `batch_size` rows.
    pub fn drain_all(&self, batch_size: usize) -> Result<Vec<RecordBatch>, ArrowError> {
        let mut batches = Vec::new();
        while let Some(batch) = self.drain_batch(batch_size)? {
            batches.push(batch);
        }
        Ok(batches)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, VecDeque<FetchedRecord>>, ArrowError> {
        self.records
            .lock()
            .map_err(|_| ArrowError::ComputeError("scan buffer lock poisoned".to_string()))
    }

    fn to_batch(&self, records: &[FetchedRecord]) -> Result<RecordBatch, ArrowError> {
        let width = schema_for(self.kind).fields().len();
        let indices: Vec<usize> = match &self.projection {
            Some(p) => p.clone(),
            None => (0..width).collect(),
        };

        let columns = match self.kind {
            SearchKind::Web => {
                let rows: Vec<&WebRecord> = records
                    .iter()
                    .filter_map(|r| match r {
                        FetchedRecord::Web(w) => Some(w),
                        FetchedRecord::Image(_) => None,
                    })
                    .collect();
                indices.iter().map(|&i| web_column(&rows, i)).collect::<Result<Vec<_>, _>>()?
            }
            SearchKind::Image => {
                let rows: Vec<&ImageRecord> = records
                    .iter()
                    .filter_map(|r| match r {
                        FetchedRecord::Image(img) => Some(img),
                        FetchedRecord::Web(_) => None,
                    })
                    .collect();
                indices.iter().map(|&i| image_column(&rows, i)).collect::<Result<Vec<_>, _>>()?
            }
        };

        let options = RecordBatchOptions::new().with_row_count(Some(records.len()));
        RecordBatch::try_new_with_options(self.schema(), columns, &options)
    }
}

fn strings<'a, T: 'a>(rows: &[&'a T], f: impl Fn(&'a T) -> &'a str) -> ArrayRef {
    Arc::new(StringArray::from(rows.iter().map(|r| f(*r)).collect::<Vec<&str>>())) as ArrayRef
}

fn ints<T>(rows: &[&T], f: impl Fn(&T) -> i32) -> ArrayRef {
    Arc::new(Int32Array::from(rows.iter().map(|r| f(*r)).collect::<Vec<i32>>())) as ArrayRef
}

fn web_column(rows: &[&WebRecord], index: usize) -> Result<ArrayRef, ArrowError> {
    let array = match index {
        0 => strings(rows, |r| r.title.as_str()),
        1 => strings(rows, |r| r.link.as_str()),
        2 => strings(rows, |r| r.snippet.as_str()),
        3 => strings(rows, |r| r.display_link.as_str()),
        4 => strings(rows, |r| r.formatted_url.as_str()),
        5 => strings(rows, |r| r.html_formatted_url.as_str()),
        6 => strings(rows, |r| r.html_title.as_str()),
        7 => strings(rows, |r| r.html_snippet.as_str()),
        8 => strings(rows, |r| r.mime.as_str()),
        9 => strings(rows, |r| r.file_format.as_str()),
        10 => strings(rows, |r| r.pagemap.as_str()),
        11 => strings(rows, |r| r.site.as_str()),
        12 => Arc::new(StringArray::from(
            rows.iter().map(|r| r.date.as_deref()).collect::<Vec<Option<&str>>>(),
        )) as ArrayRef,
        other => {
            return Err(ArrowError::SchemaError(format!(
                "web search column index {} out of range",
                other
            )))
        }
    };
    Ok(array)
}

fn image_column(rows: &[&ImageRecord], index: usize) -> Result<ArrayRef, ArrowError> {
    let array = match index {
        0 => strings(rows, |r| r.title.as_str()),
        1 => strings(rows, |r| r.link.as_str()),
        2 => strings(rows, |r| r.image_url.as_str()),
        3 => strings(rows, |r| r.thumbnail_url.as_str()),
        4 => ints(rows, |r| r.width),
        5 => ints(rows, |r| r.height),
        6 => ints(rows, |r| r.thumbnail_width),
        7 => ints(rows, |r| r.thumbnail_height),
        8 => strings(rows, |r| r.context_link.as_str()),
        9 => strings(rows, |r| r.mime.as_str()),
        10 => strings(rows, |r| r.snippet.as_str()),
        other => {
            return Err(ArrowError::SchemaError(format!(
                "image search column index {} out of range",
                other
            )))
        }
    };
    Ok(array)
}
