//! Annotation XML writer
//!
//! Input batches carry 2 to 4 columns in this order:
//! `url_pattern` (text), `action` (text, `include` or `exclude`),
//! optional `comment` (text), optional `score` (numeric, -1.0..=1.0).

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use arrow::array::{Array, AsArray, StringArray};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Float64Type, Schema};
use arrow::record_batch::RecordBatch;
use tracing::{debug, info};

use crate::error::AnnotationError;

pub const MAX_ANNOTATIONS: usize = 5000;
pub const MAX_FILE_BYTES: usize = 30 * 1024;

const HEADER: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<Annotations>\n";
const FOOTER: &str = "</Annotations>\n";

/// Upper bounds enforced while writing. The file bound includes the
/// closing tag written by [`AnnotationWriter::finish`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnnotationLimits {
    pub max_annotations: usize,
    pub max_bytes: usize,
}

impl Default for AnnotationLimits {
    fn default() -> Self {
        Self {
            max_annotations: MAX_ANNOTATIONS,
            max_bytes: MAX_FILE_BYTES,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AnnotationStats {
    pub annotations: usize,
    pub bytes: usize,
}

struct WriterState<W> {
    sink: Option<W>,
    stats: AnnotationStats,
}

pub struct AnnotationWriter<W: Write = BufWriter<File>> {
    limits: AnnotationLimits,
    state: Mutex<WriterState<W>>,
}

impl<W: Write> std::fmt::Debug for AnnotationWriter<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnnotationWriter")
            .field("limits", &self.limits)
            .field("stats", &self.state.try_lock().ok().map(|s| s.stats))
            .finish()
    }
}

impl AnnotationWriter<BufWriter<File>> {
    /// Create (or truncate) `path` and write the XML header.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, AnnotationError> {
        let path = path.as_ref();
        let file = File::create(path)?;
        info!("Writing annotations to {:?}", path);
        Self::new(BufWriter::new(file))
    }
}

impl<W: Write> AnnotationWriter<W> {
    pub fn new(sink: W) -> Result<Self, AnnotationError> {
        Self::with_limits(sink, AnnotationLimits::default())
    }

    pub fn with_limits(mut sink: W, limits: AnnotationLimits) -> Result<Self, AnnotationError> {
        sink.write_all(HEADER.as_bytes())?;
        Ok(Self {
            limits,
            state: Mutex::new(WriterState {
                sink: Some(sink),
                stats: AnnotationStats {
                    annotations: 0,
                    bytes: HEADER.len(),
                },
            }),
        })
    }

    pub fn stats(&self) -> Result<AnnotationStats, AnnotationError> {
        Ok(self.lock()?.stats)
    }

    /// Append one annotation per row, skipping rows whose pattern or action
    /// is null. A batch that would break a limit is rejected whole.
    ///
    /// Returns the number of annotations written.
    pub fn write_batch(&self, batch: &RecordBatch) -> Result<usize, AnnotationError> {
        let columns = Columns::try_new(batch)?;

        let mut guard = self.lock()?;
        let state = &mut *guard;
        let sink = state.sink.as_mut().ok_or(AnnotationError::Finished)?;

        let mut pending = String::new();
        let mut count = 0usize;
        for row in 0..batch.num_rows() {
            let Some(entry) = columns.entry(row)? else {
                continue;
            };
            if state.stats.annotations + count >= self.limits.max_annotations {
                return Err(AnnotationError::TooManyAnnotations {
                    max: self.limits.max_annotations,
                });
            }
            if state.stats.bytes + pending.len() + entry.len() + FOOTER.len() > self.limits.max_bytes
            {
                return Err(AnnotationError::FileTooLarge {
                    max: self.limits.max_bytes,
                });
            }
            pending.push_str(&entry);
            count += 1;
        }

        sink.write_all(pending.as_bytes())?;
        state.stats.annotations += count;
        state.stats.bytes += pending.len();
        debug!(
            "Wrote {} of {} rows as annotations ({} total)",
            count,
            batch.num_rows(),
            state.stats.annotations
        );
        Ok(count)
    }

    /// Write the closing tag and flush. Further writes fail.
    pub fn finish(&self) -> Result<AnnotationStats, AnnotationError> {
        let mut guard = self.lock()?;
        let state = &mut *guard;
        let mut sink = state.sink.take().ok_or(AnnotationError::Finished)?;
        sink.write_all(FOOTER.as_bytes())?;
        sink.flush()?;
        state.stats.bytes += FOOTER.len();
        info!(
            "Finished annotation file: {} annotations, {} bytes",
            state.stats.annotations, state.stats.bytes
        );
        Ok(state.stats)
    }

    fn lock(&self) -> Result<MutexGuard<'_, WriterState<W>>, AnnotationError> {
        self.state
            .lock()
            .map_err(|_| AnnotationError::Io(std::io::Error::other("annotation writer lock poisoned")))
    }
}

/// The batch's columns, cast to the types rows are read as.
struct Columns {
    pattern: StringArray,
    action: StringArray,
    comment: Option<StringArray>,
    score: Option<arrow::array::Float64Array>,
}

impl Columns {
    fn try_new(batch: &RecordBatch) -> Result<Self, AnnotationError> {
        check_schema(batch.schema_ref())?;
        let text = |i: usize| -> Result<StringArray, AnnotationError> {
            Ok(cast(batch.column(i), &DataType::Utf8)?.as_string::<i32>().clone())
        };
        let score = match batch.num_columns() {
            4 => Some(
                cast(batch.column(3), &DataType::Float64)?
                    .as_primitive::<Float64Type>()
                    .clone(),
            ),
            _ => None,
        };
        Ok(Self {
            pattern: text(0)?,
            action: text(1)?,
            comment: if batch.num_columns() >= 3 { Some(text(2)?) } else { None },
            score,
        })
    }

    fn entry(&self, row: usize) -> Result<Option<String>, AnnotationError> {
        if self.pattern.is_null(row) || self.action.is_null(row) {
            return Ok(None);
        }
        let comment = self
            .comment
            .as_ref()
            .filter(|c| c.is_valid(row))
            .map(|c| c.value(row));
        let score = self
            .score
            .as_ref()
            .filter(|s| s.is_valid(row))
            .map(|s| s.value(row));
        render(self.pattern.value(row), self.action.value(row), comment, score).map(Some)
    }
}

fn is_text(data_type: &DataType) -> bool {
    matches!(
        data_type,
        DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View
    )
}

fn check_schema(schema: &Schema) -> Result<(), AnnotationError> {
    let fields = schema.fields();
    if !(2..=4).contains(&fields.len()) {
        return Err(AnnotationError::Schema(format!(
            "expected 2-4 columns (url_pattern, action [, comment] [, score]), got {}",
            fields.len()
        )));
    }
    for (i, name) in ["url_pattern", "action", "comment"].iter().enumerate() {
        if let Some(field) = fields.get(i) {
            if !is_text(field.data_type()) {
                return Err(AnnotationError::Schema(format!(
                    "column {} ({}) must be text, got {}",
                    i + 1,
                    name,
                    field.data_type()
                )));
            }
        }
    }
    if let Some(score) = fields.get(3) {
        if !score.data_type().is_numeric() {
            return Err(AnnotationError::Schema(format!(
                "column 4 (score) must be numeric, got {}",
                score.data_type()
            )));
        }
    }
    Ok(())
}

fn render(
    pattern: &str,
    action: &str,
    comment: Option<&str>,
    score: Option<f64>,
) -> Result<String, AnnotationError> {
    let label = match action.to_lowercase().as_str() {
        "include" => "_include_",
        "exclude" => "_exclude_",
        other => return Err(AnnotationError::InvalidAction(other.to_string())),
    };

    let score_attr = match score {
        Some(s) if !(-1.0..=1.0).contains(&s) => return Err(AnnotationError::ScoreOutOfRange(s)),
        Some(s) => format!(" score=\"{:.1}\"", s),
        None => String::new(),
    };

    let mut xml = format!(
        "  <Annotation about=\"{}\"{}>\n    <Label name=\"{}\"/>\n",
        escape(pattern),
        score_attr,
        label
    );
    if let Some(comment) = comment.filter(|c| !c.is_empty()) {
        xml.push_str(&format!("    <Comment>{}</Comment>\n", escape(comment)));
    }
    xml.push_str("  </Annotation>\n");
    Ok(xml)
}

fn escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}
