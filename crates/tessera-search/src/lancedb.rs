//! LanceDB search engine.
//!
//! Runs vector and full-text searches against a LanceDB table, an embedded
//! vector database built on Apache Arrow and the Lance format, and builds
//! indices on it.
//!
//! Result batches are converted column by column into [`Row`]s. The
//! `_distance` and `_score` columns LanceDB appends become the
//! [`NativeScore`] of each [`RawResult`].
//!
//! # Schema
//!
//! [`LancedbEngine::create`] writes the simple schema below; any existing
//! table can be opened with [`LancedbEngine::open`].
//!
//! | Column | Type | Purpose |
//! |--------|------|---------|
//! | `id` | Int64 | Primary key |
//! | `text` | Utf8 | Full-text searchable content |
//! | `vector` | FixedSizeList<Float32> | Embedding vector |
//!
//! # Feature Gate
//!
//! This module requires the `engine-lancedb` feature.

use crate::engine::{FtsSearchRequest, SearchEngine, VectorSearchRequest};
use crate::index::{AnnAlgorithm, IndexCatalog, IndexInfo, IndexKind, IndexSpec};
use crate::types::{DISTANCE_COLUMN, DistanceType, NativeScore, RawResult, Row, SCORE_COLUMN};
use arrow_array::cast::AsArray;
use arrow_array::types::{
    Float32Type, Float64Type, Int8Type, Int16Type, Int32Type, Int64Type, UInt8Type, UInt16Type,
    UInt32Type, UInt64Type,
};
use arrow_array::{
    Array, FixedSizeListArray, Float32Array, Int64Array, RecordBatch, RecordBatchIterator,
    StringArray,
};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::index::Index;
use lancedb::index::scalar::{
    BTreeIndexBuilder, BitmapIndexBuilder, FtsIndexBuilder, FullTextSearchQuery,
    LabelListIndexBuilder,
};
use lancedb::index::vector::{IvfHnswPqIndexBuilder, IvfHnswSqIndexBuilder, IvfPqIndexBuilder};
use lancedb::query::{ExecutableQuery, QueryBase};
use serde_json::Value;
use std::sync::Arc;
use tessera_core::{Error, Result};

const PROVIDER: &str = "lancedb";

fn engine_error(context: &str, e: lancedb::Error) -> Error {
    match e {
        lancedb::Error::Schema { message } => Error::schema(format!("{context}: {message}")),
        other => Error::provider(PROVIDER, format!("{context}: {other}")),
    }
}

/// A record for [`LancedbEngine::create`].
#[derive(Debug, Clone, PartialEq)]
pub struct TableRecord {
    pub id: i64,
    pub text: String,
    pub vector: Vec<f32>,
}

/// LanceDB-backed search engine over one table.
pub struct LancedbEngine {
    table: lancedb::Table,
}

impl LancedbEngine {
    /// Open an existing table.
    pub async fn open(db_path: &str, table_name: &str) -> Result<Self> {
        let connection = lancedb::connect(db_path)
            .execute()
            .await
            .map_err(|e| engine_error("failed to connect to LanceDB", e))?;
        let table = connection
            .open_table(table_name)
            .execute()
            .await
            .map_err(|e| engine_error("failed to open table", e))?;
        Ok(Self { table })
    }

    /// Create (or overwrite) a table holding `records`.
    ///
    /// Every record must have a vector of the same, nonzero dimension.
    pub async fn create(db_path: &str, table_name: &str, records: &[TableRecord]) -> Result<Self> {
        let dimension = records
            .first()
            .map(|r| r.vector.len())
            .ok_or_else(|| Error::validation("cannot create a table from zero records"))?;
        let batch = build_record_batch(records, dimension)?;
        let schema = batch.schema();

        let connection = lancedb::connect(db_path)
            .execute()
            .await
            .map_err(|e| engine_error("failed to connect to LanceDB", e))?;
        let table = connection
            .create_table(table_name, Box::new(RecordBatchIterator::new(vec![Ok(batch)], schema)))
            .mode(lancedb::database::CreateTableMode::Overwrite)
            .execute()
            .await
            .map_err(|e| engine_error("failed to create table", e))?;

        log::debug!("created LanceDB table {table_name} with {} rows", records.len());
        Ok(Self { table })
    }

    /// Wrap an already opened table.
    pub fn from_table(table: lancedb::Table) -> Self {
        Self { table }
    }
}

#[async_trait]
impl SearchEngine for LancedbEngine {
    async fn vector_search(&self, request: VectorSearchRequest) -> Result<Vec<RawResult>> {
        let mut query = self
            .table
            .query()
            .nearest_to(request.vector)
            .map_err(|e| engine_error("failed to create vector search", e))?
            .column(&request.column)
            .distance_type(to_lance_distance(request.metric))
            .limit(request.top_k);

        if let Some(nprobes) = request.nprobes {
            query = query.nprobes(nprobes);
        }
        if let Some(factor) = request.refine_factor {
            query = query.refine_factor(factor);
        }
        if let Some(filter) = request.filter {
            query = query.only_if(filter);
        }
        if !request.prefilter {
            query = query.postfilter();
        }

        let batches: Vec<RecordBatch> = query
            .execute()
            .await
            .map_err(|e| engine_error("vector search failed", e))?
            .try_collect()
            .await
            .map_err(|e| engine_error("failed to collect results", e))?;

        collect_results(&batches, DISTANCE_COLUMN)
    }

    async fn full_text_search(&self, request: FtsSearchRequest) -> Result<Vec<RawResult>> {
        let mut query = self
            .table
            .query()
            .full_text_search(FullTextSearchQuery::new(request.text))
            .limit(request.top_k);

        if let Some(filter) = request.filter {
            query = query.only_if(filter);
        }
        if !request.prefilter {
            query = query.postfilter();
        }

        let batches: Vec<RecordBatch> = query
            .execute()
            .await
            .map_err(|e| engine_error("full-text search failed", e))?
            .try_collect()
            .await
            .map_err(|e| engine_error("failed to collect results", e))?;

        collect_results(&batches, SCORE_COLUMN)
    }

    fn name(&self) -> &str {
        PROVIDER
    }
}

#[async_trait]
impl IndexCatalog for LancedbEngine {
    async fn list_indices(&self) -> Result<Vec<IndexInfo>> {
        let configs = self
            .table
            .list_indices()
            .await
            .map_err(|e| engine_error("failed to list indices", e))?;
        Ok(configs
            .into_iter()
            .map(|c| IndexInfo {
                name: c.name,
                index_type: c.index_type.to_string(),
                columns: c.columns,
            })
            .collect())
    }

    async fn build_index(&self, spec: &IndexSpec) -> Result<()> {
        let columns: Vec<&str> = spec.columns.iter().map(String::as_str).collect();
        self.table
            .create_index(&columns, to_lance_index(&spec.kind)?)
            .name(spec.name.clone())
            .replace(spec.replace)
            .execute()
            .await
            .map_err(|e| engine_error("index build failed", e))
    }
}

impl std::fmt::Debug for LancedbEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LancedbEngine")
            .field("table", &self.table.name())
            .finish()
    }
}

// ============================================================================
// Translation to LanceDB types
// ============================================================================

fn to_lance_distance(metric: DistanceType) -> lancedb::DistanceType {
    match metric {
        DistanceType::L2 => lancedb::DistanceType::L2,
        DistanceType::Cosine => lancedb::DistanceType::Cosine,
        DistanceType::Dot => lancedb::DistanceType::Dot,
    }
}

fn to_lance_index(kind: &IndexKind) -> Result<Index> {
    Ok(match kind {
        IndexKind::Ann(p) => {
            let distance = to_lance_distance(p.metric);
            match p.algorithm {
                AnnAlgorithm::IvfPq => {
                    let mut b = IvfPqIndexBuilder::default().distance_type(distance);
                    if let Some(n) = p.num_partitions {
                        b = b.num_partitions(n);
                    }
                    if let Some(n) = p.num_sub_vectors {
                        b = b.num_sub_vectors(n);
                    }
                    if let Some(n) = p.num_bits {
                        b = b.num_bits(n);
                    }
                    if let Some(n) = p.max_iterations {
                        b = b.max_iterations(n);
                    }
                    if let Some(n) = p.sample_rate {
                        b = b.sample_rate(n);
                    }
                    Index::IvfPq(b)
                }
                AnnAlgorithm::IvfHnswPq => {
                    let mut b = IvfHnswPqIndexBuilder::default().distance_type(distance);
                    if let Some(n) = p.num_partitions {
                        b = b.num_partitions(n);
                    }
                    if let Some(n) = p.num_sub_vectors {
                        b = b.num_sub_vectors(n);
                    }
                    if let Some(n) = p.max_iterations {
                        b = b.max_iterations(n);
                    }
                    if let Some(n) = p.sample_rate {
                        b = b.sample_rate(n);
                    }
                    if let Some(n) = p.m {
                        b = b.num_edges(n);
                    }
                    if let Some(n) = p.ef_construction {
                        b = b.ef_construction(n);
                    }
                    Index::IvfHnswPq(b)
                }
                AnnAlgorithm::IvfHnswSq => {
                    let mut b = IvfHnswSqIndexBuilder::default().distance_type(distance);
                    if let Some(n) = p.num_partitions {
                        b = b.num_partitions(n);
                    }
                    if let Some(n) = p.max_iterations {
                        b = b.max_iterations(n);
                    }
                    if let Some(n) = p.sample_rate {
                        b = b.sample_rate(n);
                    }
                    if let Some(n) = p.m {
                        b = b.num_edges(n);
                    }
                    if let Some(n) = p.ef_construction {
                        b = b.ef_construction(n);
                    }
                    Index::IvfHnswSq(b)
                }
            }
        }
        IndexKind::BTree => Index::BTree(BTreeIndexBuilder::default()),
        IndexKind::Bitmap => Index::Bitmap(BitmapIndexBuilder::default()),
        IndexKind::LabelList => Index::LabelList(LabelListIndexBuilder::default()),
        IndexKind::Fts(p) => {
            let builder = FtsIndexBuilder::default()
                .with_position(p.with_position)
                .base_tokenizer(p.base_tokenizer.clone())
                .language(&p.language)
                .map_err(|e| Error::validation(format!("unsupported FTS language: {e}")))?
                .max_token_length(p.max_token_length)
                .lower_case(p.lower_case)
                .stem(p.stem)
                .remove_stop_words(p.remove_stop_words)
                .ascii_folding(p.ascii_folding);
            Index::FTS(builder)
        }
    })
}

// ============================================================================
// Arrow conversion
// ============================================================================

fn make_schema(dimension: i32) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Int64, false),
        Field::new("text", DataType::Utf8, false),
        Field::new(
            "vector",
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, true)),
                dimension,
            ),
            false,
        ),
    ]))
}

fn build_record_batch(records: &[TableRecord], dimension: usize) -> Result<RecordBatch> {
    if let Some(bad) = records.iter().find(|r| r.vector.len() != dimension) {
        return Err(Error::schema(format!(
            "record {} has dimension {}, expected {dimension}",
            bad.id,
            bad.vector.len()
        )));
    }
    let dimension = i32::try_from(dimension)
        .map_err(|_| Error::schema(format!("dimension {dimension} is too large")))?;
    let schema = make_schema(dimension);

    let ids = Int64Array::from(records.iter().map(|r| r.id).collect::<Vec<_>>());
    let texts = StringArray::from(records.iter().map(|r| r.text.as_str()).collect::<Vec<_>>());
    let values = Float32Array::from(
        records
            .iter()
            .flat_map(|r| r.vector.iter().copied())
            .collect::<Vec<_>>(),
    );
    let vectors = FixedSizeListArray::try_new(
        Arc::new(Field::new("item", DataType::Float32, true)),
        dimension,
        Arc::new(values),
        None,
    )
    .map_err(|e| Error::schema(format!("failed to create vector array: {e}")))?;

    RecordBatch::try_new(schema, vec![Arc::new(ids), Arc::new(texts), Arc::new(vectors)])
        .map_err(|e| Error::schema(format!("failed to create RecordBatch: {e}")))
}

/// Convert result batches to raw results, lifting `score_column` out of
/// each row as its native score.
fn collect_results(batches: &[RecordBatch], score_column: &str) -> Result<Vec<RawResult>> {
    let mut results = Vec::new();
    for batch in batches {
        for mut row in batch_to_rows(batch) {
            let value = row
                .remove(score_column)
                .and_then(|v| v.as_f64())
                .ok_or_else(|| Error::schema(format!("result batch lacks '{score_column}'")))?
                as f32;
            let score = if score_column == DISTANCE_COLUMN {
                NativeScore::Distance(value)
            } else {
                NativeScore::Score(value)
            };
            results.push(RawResult { row, score });
        }
    }
    Ok(results)
}

fn batch_to_rows(batch: &RecordBatch) -> Vec<Row> {
    let schema = batch.schema();
    (0..batch.num_rows())
        .map(|i| {
            schema
                .fields()
                .iter()
                .zip(batch.columns())
                .map(|(field, column)| (field.name().clone(), value_at(column.as_ref(), i)))
                .collect()
        })
        .collect()
}

fn value_at(array: &dyn Array, i: usize) -> Value {
    if array.is_null(i) {
        return Value::Null;
    }
    match array.data_type() {
        DataType::Utf8 => Value::from(array.as_string::<i32>().value(i)),
        DataType::LargeUtf8 => Value::from(array.as_string::<i64>().value(i)),
        DataType::Boolean => Value::from(array.as_boolean().value(i)),
        DataType::Int8 => Value::from(array.as_primitive::<Int8Type>().value(i)),
        DataType::Int16 => Value::from(array.as_primitive::<Int16Type>().value(i)),
        DataType::Int32 => Value::from(array.as_primitive::<Int32Type>().value(i)),
        DataType::Int64 => Value::from(array.as_primitive::<Int64Type>().value(i)),
        DataType::UInt8 => Value::from(array.as_primitive::<UInt8Type>().value(i)),
        DataType::UInt16 => Value::from(array.as_primitive::<UInt16Type>().value(i)),
        DataType::UInt32 => Value::from(array.as_primitive::<UInt32Type>().value(i)),
        DataType::UInt64 => Value::from(array.as_primitive::<UInt64Type>().value(i)),
        DataType::Float32 => Value::from(array.as_primitive::<Float32Type>().value(i)),
        DataType::Float64 => Value::from(array.as_primitive::<Float64Type>().value(i)),
        DataType::FixedSizeList(_, _) => list_value(array.as_fixed_size_list().value(i).as_ref()),
        DataType::List(_) => list_value(array.as_list::<i32>().value(i).as_ref()),
        DataType::LargeList(_) => list_value(array.as_list::<i64>().value(i).as_ref()),
        other => {
            log::trace!("unsupported Arrow type {other} in result row");
            Value::Null
        }
    }
}

fn list_value(values: &dyn Array) -> Value {
    Value::Array((0..values.len()).map(|j| value_at(values, j)).collect())
}

// ============================================================================
// Tests
// ============================================================================
