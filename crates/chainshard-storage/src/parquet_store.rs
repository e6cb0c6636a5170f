//! Parquet shard store.
//!
//! Each shard lives in `{dir}/{prefix}-{start}-{end}.parquet` with the columns
//! `blockNumber` (UInt64), `transactionHash` (Utf8) and one Utf8 column per
//! schema field in declared order. A commit rewrites the whole file: rows are
//! written to a temporary file in the same directory, fsynced, then renamed
//! over the previous version.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow_array::{Array, ArrayRef, Int64Array, RecordBatch, StringArray, UInt64Array};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;

use chainshard_core::error::StoreError;
use chainshard_core::event::{DecodedEvent, ShardRow};
use chainshard_core::schema::EventSchema;
use chainshard_core::store::{merge_rows, rows_for_shard, ShardStore, ShardWriter};
use chainshard_core::types::ShardKey;

const EXTENSION: &str = "parquet";

/// Shard store backed by one Parquet file per shard.
#[derive(Debug, Clone)]
pub struct ParquetShardStore {
    dir: PathBuf,
}

impl ParquetShardStore {
    /// Create a store rooted at `dir`, creating the directory if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| StoreError::io(dir.display().to_string(), e))?;
        Ok(Self { dir })
    }

    /// File path of shard `key`.
    pub fn path_for(&self, key: &ShardKey) -> PathBuf {
        self.dir.join(key.file_name(EXTENSION))
    }
}

#[async_trait]
impl ShardStore for ParquetShardStore {
    async fn open(
        &self,
        key: &ShardKey,
        schema: &EventSchema,
    ) -> Result<Box<dyn ShardWriter>, StoreError> {
        let path = self.path_for(key);
        let expected = schema.column_names();

        let read_path = path.clone();
        let rows = tokio::task::spawn_blocking(move || -> Result<Vec<ShardRow>, StoreError> {
            if !read_path.exists() {
                return Ok(Vec::new());
            }
            let shard = read_shard_file(&read_path)?;
            if shard.columns != expected {
                return Err(StoreError::format(
                    read_path.display().to_string(),
                    format!(
                        "columns {:?} do not match schema columns {:?}",
                        shard.columns, expected
                    ),
                ));
            }
            // files written elsewhere need not be in block order
            Ok(merge_rows(Vec::new(), shard.rows))
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))??;

        tracing::debug!(
            shard = %key,
            path = %path.display(),
            rows = rows.len(),
            committed_through = ?rows.iter().map(|r| r.block_number).max(),
            "opened shard"
        );

        Ok(Box::new(ParquetShardWriter {
            key: key.clone(),
            schema: schema.clone(),
            path,
            rows,
        }))
    }
}

struct ParquetShardWriter {
    key: ShardKey,
    schema: EventSchema,
    path: PathBuf,
    rows: Vec<ShardRow>,
}

#[async_trait]
impl ShardWriter for ParquetShardWriter {
    fn key(&self) -> &ShardKey {
        &self.key
    }

    fn committed_through(&self) -> Option<u64> {
        self.rows.iter().map(|r| r.block_number).max()
    }

    fn row_count(&self) -> usize {
        self.rows.len()
    }

    async fn append_and_commit(
        &mut self,
        events: &[DecodedEvent],
    ) -> Result<Option<u64>, StoreError> {
        let incoming = rows_for_shard(&self.key, &self.schema, events)?;
        let merged = merge_rows(self.rows.clone(), incoming);

        let path = self.path.clone();
        let schema = self.schema.clone();
        let merged = tokio::task::spawn_blocking(move || {
            write_shard_file(&path, &schema, &merged).map(|()| merged)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))??;

        self.rows = merged;
        Ok(self.committed_through())
    }
}

// ─── File format ─────────────────────────────────────────────────────────────

/// Contents of a shard file.
#[derive(Debug, Clone)]
pub struct ShardFile {
    pub columns: Vec<String>,
    pub rows: Vec<ShardRow>,
}

impl ShardFile {
    /// Highest block number in the file.
    pub fn committed_through(&self) -> Option<u64> {
        self.rows.iter().map(|r| r.block_number).max()
    }
}

fn arrow_schema(schema: &EventSchema) -> Arc<Schema> {
    let mut fields = vec![
        Field::new("blockNumber", DataType::UInt64, false),
        Field::new("transactionHash", DataType::Utf8, false),
    ];
    fields.extend(
        schema
            .fields
            .iter()
            .map(|f| Field::new(f.name.as_str(), DataType::Utf8, false)),
    );
    Arc::new(Schema::new(fields))
}

fn writer_properties() -> WriterProperties {
    WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .set_created_by(format!("chainshard {}", env!("CARGO_PKG_VERSION")))
        .build()
}

fn write_shard_file(path: &Path, schema: &EventSchema, rows: &[ShardRow]) -> Result<(), StoreError> {
    let display = path.display().to_string();
    let dir = path
        .parent()
        .ok_or_else(|| StoreError::format(display.clone(), "shard path has no parent directory"))?;

    let arrow_schema = arrow_schema(schema);
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(arrow_schema.fields().len());
    columns.push(Arc::new(UInt64Array::from_iter_values(
        rows.iter().map(|r| r.block_number),
    )));
    columns.push(Arc::new(StringArray::from_iter_values(
        rows.iter().map(|r| r.transaction_hash.as_str()),
    )));
    for i in 0..schema.fields.len() {
        columns.push(Arc::new(StringArray::from_iter_values(
            rows.iter().map(|r| r.values.get(i).map(String::as_str).unwrap_or("")),
        )));
    }
    let batch = RecordBatch::try_new(arrow_schema.clone(), columns)
        .map_err(|e| StoreError::format(display.clone(), format!("record batch: {e}")))?;

    let mut tmp =
        tempfile::NamedTempFile::new_in(dir).map_err(|e| StoreError::io(display.clone(), e))?;
    let mut writer = ArrowWriter::try_new(tmp.as_file_mut(), arrow_schema, Some(writer_properties()))
        .map_err(|e| StoreError::format(display.clone(), format!("parquet writer init: {e}")))?;
    if batch.num_rows() > 0 {
        writer
            .write(&batch)
            .map_err(|e| StoreError::format(display.clone(), format!("parquet write: {e}")))?;
    }
    writer
        .close()
        .map_err(|e| StoreError::format(display.clone(), format!("parquet close: {e}")))?;

    tmp.as_file()
        .sync_all()
        .map_err(|e| StoreError::io(display.clone(), e))?;
    tmp.persist(path)
        .map_err(|e| StoreError::io(display.clone(), e.error))?;

    sync_dir(dir);

    tracing::trace!(path = %path.display(), rows = rows.len(), "shard file replaced");
    Ok(())
}

/// Persist a rename in `dir`. The new file is already complete, so a failure
/// here is only logged.
fn sync_dir(dir: &Path) {
    #[cfg(unix)]
    {
        if let Err(e) = File::open(dir).and_then(|d| d.sync_all()) {
            tracing::warn!(dir = %dir.display(), error = %e, "directory fsync after rename failed");
        }
    }
    #[cfg(not(unix))]
    let _ = dir;
}

/// Read every row of a shard file.
///
/// `blockNumber` may be stored as UInt64 or Int64; every other column must be
/// Utf8.
pub fn read_shard_file(path: &Path) -> Result<ShardFile, StoreError> {
    let display = path.display().to_string();
    let fmt_err = |what: &str, e: &dyn std::fmt::Display| {
        StoreError::format(display.clone(), format!("{what}: {e}"))
    };

    let file = File::open(path).map_err(|e| StoreError::io(display.clone(), e))?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)
        .map_err(|e| fmt_err("parquet reader init", &e))?;
    let columns: Vec<String> = builder
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect();
    if columns.len() < 2 || columns[0] != "blockNumber" || columns[1] != "transactionHash" {
        return Err(StoreError::format(
            display.clone(),
            format!("expected blockNumber, transactionHash as leading columns, found {columns:?}"),
        ));
    }
    let reader = builder
        .build()
        .map_err(|e| fmt_err("parquet reader build", &e))?;

    let mut rows = Vec::new();
    for batch in reader {
        let batch = batch.map_err(|e| fmt_err("parquet read batch", &e))?;
        let blocks = block_column(&batch, &display)?;
        let strings = (1..batch.num_columns())
            .map(|i| {
                batch
                    .column(i)
                    .as_any()
                    .downcast_ref::<StringArray>()
                    .ok_or_else(|| {
                        StoreError::format(
                            display.clone(),
                            format!("column '{}' is not Utf8", columns[i]),
                        )
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        for (row_idx, block_number) in blocks.into_iter().enumerate() {
            rows.push(ShardRow {
                block_number,
                transaction_hash: strings[0].value(row_idx).to_string(),
                values: strings[1..]
                    .iter()
                    .map(|col| col.value(row_idx).to_string())
                    .collect(),
            });
        }
    }
    Ok(ShardFile { columns, rows })
}

fn block_column(batch: &RecordBatch, display: &str) -> Result<Vec<u64>, StoreError> {
    let col = batch.column(0);
    if let Some(arr) = col.as_any().downcast_ref::<UInt64Array>() {
        return Ok(arr.values().to_vec());
    }
    if let Some(arr) = col.as_any().downcast_ref::<Int64Array>() {
        return arr
            .values()
            .iter()
            .map(|&v| {
                u64::try_from(v).map_err(|_| {
                    StoreError::format(display, format!("negative block number {v}"))
                })
            })
            .collect();
    }
    Err(StoreError::format(
        display,
        format!("blockNumber has unsupported type {}", col.data_type()),
    ))
}
