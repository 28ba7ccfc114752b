//! Partitioned columnar file sink (Parquet)
//!
//! Records are grouped by their derived `year`/`month`/`day` values and each
//! group is written as one Parquet file under a hive-style directory layout:
//!
//! ```text
//! covid_vaccines/year=2021/month=3/day=5/part-<uuid>.parquet
//! ```
//!
//! Partition values live in the directory names, not in the files, and every
//! run appends freshly named files; unrelated partitions are never rewritten.

use crate::record::VaccinationRecord;
use crate::sinks::SinkError;
use arrow::array::{ArrayRef, Int32Array, Int64Array, StringArray, TimestampMicrosecondArray};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use std::collections::BTreeMap;
use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Partitioned Parquet writer rooted at the file store directory
pub struct PartitionedFileSink {
    root: PathBuf,
}

impl PartitionedFileSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Append one file per partition present in the dataset
    pub async fn write(&self, records: &[VaccinationRecord]) -> Result<(), SinkError> {
        let mut partitions: BTreeMap<(i32, u32, u32), Vec<&VaccinationRecord>> = BTreeMap::new();
        for record in records {
            partitions.entry(record.partition()).or_default().push(record);
        }

        let schema = file_schema();

        for ((year, month, day), rows) in &partitions {
            let dir = self
                .root
                .join(format!("year={year}"))
                .join(format!("month={month}"))
                .join(format!("day={day}"));
            std::fs::create_dir_all(&dir)?;

            let path = dir.join(format!("part-{}.parquet", Uuid::new_v4()));
            let batch = record_batch(schema.clone(), rows)?;

            let file = File::create(&path)?;
            let mut writer = ArrowWriter::try_new(file, schema.clone(), None)?;
            writer.write(&batch)?;
            writer.close()?;

            debug!(path = %path.display(), rows = rows.len(), "partition file written");
        }

        debug!(partitions = partitions.len(), "file sink write complete");
        Ok(())
    }
}

/// Columnar schema of one partition file. The partition columns are encoded
/// in the directory path and deliberately absent here.
fn file_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("vacc_id", DataType::Utf8, false),
        Field::new(
            "vacina_dataAplicacao",
            DataType::Timestamp(TimeUnit::Microsecond, None),
            false,
        ),
        Field::new("status_codigo", DataType::Int64, false),
        Field::new("vacina_codigo", DataType::Int32, false),
        Field::new("vacina_lote_codigo", DataType::Int64, false),
        Field::new("vacina_categoria_codigo", DataType::Int32, false),
        Field::new("vacina_descricao_dose_codigo", DataType::Int64, false),
        Field::new("vacina_grupo_atendimento_codigo", DataType::Int64, false),
        Field::new("paciente_id", DataType::Utf8, false),
        Field::new("paciente_nacionalidade_codigo", DataType::Int64, false),
        Field::new("estabelecimento_municipio_codigo", DataType::Int32, false),
    ]))
}

fn record_batch(
    schema: Arc<Schema>,
    rows: &[&VaccinationRecord],
) -> Result<RecordBatch, arrow::error::ArrowError> {
    let columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.vacc_id.as_str()))),
        Arc::new(TimestampMicrosecondArray::from_iter_values(
            rows.iter().map(|r| r.vacina_data_aplicacao.and_utc().timestamp_micros()),
        )),
        Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.status_codigo))),
        Arc::new(Int32Array::from_iter_values(rows.iter().map(|r| r.vacina_codigo))),
        Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.vacina_lote_codigo))),
        Arc::new(Int32Array::from_iter_values(
            rows.iter().map(|r| r.vacina_categoria_codigo),
        )),
        Arc::new(Int64Array::from_iter_values(
            rows.iter().map(|r| r.vacina_descricao_dose_codigo),
        )),
        Arc::new(Int64Array::from_iter_values(
            rows.iter().map(|r| r.vacina_grupo_atendimento_codigo),
        )),
        Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.paciente_id.as_str()))),
        Arc::new(Int64Array::from_iter_values(
            rows.iter().map(|r| r.paciente_nacionalidade_codigo),
        )),
        Arc::new(Int32Array::from_iter_values(
            rows.iter().map(|r| r.estabelecimento_municipio_codigo),
        )),
    ];

    RecordBatch::try_new(schema, columns)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

    fn record(vacc_id: &str, year: i32, month: u32, day: u32) -> VaccinationRecord {
        VaccinationRecord {
            vacc_id: vacc_id.to_string(),
            vacina_data_aplicacao: NaiveDate::from_ymd_opt(year, month, day)
                .unwrap()
                .and_hms_opt(10, 0, 0)
                .unwrap(),
            status_codigo: 1,
            vacina_codigo: 87,
            vacina_lote_codigo: 4,
            vacina_categoria_codigo: 9,
            vacina_descricao_dose_codigo: 0,
            vacina_grupo_atendimento_codigo: 2,
            paciente_id: "p-1".to_string(),
            paciente_nacionalidade_codigo: 0,
            estabelecimento_municipio_codigo: 355_030,
            year,
            month,
            day,
        }
    }

    #[tokio::test]
    async fn records_land_under_their_partition_directories() {
        let dir = tempfile::tempdir().unwrap();
        let sink = PartitionedFileSink::new(dir.path());

        let records = vec![
            record("a", 2021, 3, 5),
            record("b", 2021, 3, 5),
            record("c", 2022, 1, 9),
        ];
        sink.write(&records).await.unwrap();

        let march = dir.path().join("year=2021").join("month=3").join("day=5");
        let january = dir.path().join("year=2022").join("month=1").join("day=9");
        assert_eq!(std::fs::read_dir(&march).unwrap().count(), 1);
        assert_eq!(std::fs::read_dir(&january).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn partition_files_round_trip_without_partition_columns() {
        let dir = tempfile::tempdir().unwrap();
        let sink = PartitionedFileSink::new(dir.path());
        sink.write(&[record("a", 2021, 3, 5), record("b", 2021, 3, 5)])
            .await
            .unwrap();

        let partition = dir.path().join("year=2021").join("month=3").join("day=5");
        let entry = std::fs::read_dir(&partition).unwrap().next().unwrap().unwrap();

        let reader = ParquetRecordBatchReaderBuilder::try_new(File::open(entry.path()).unwrap())
            .unwrap()
            .build()
            .unwrap();
        let batches: Vec<_> = reader.collect::<Result<_, _>>().unwrap();

        let rows: usize = batches.iter().map(|b| b.num_rows()).sum();
        assert_eq!(rows, 2);
        assert_eq!(batches[0].schema().fields().len(), 11);
        assert!(batches[0].schema().field_with_name("year").is_err());
    }

    #[tokio::test]
    async fn repeated_runs_append_new_files_to_the_same_partition() {
        let dir = tempfile::tempdir().unwrap();
        let sink = PartitionedFileSink::new(dir.path());

        sink.write(&[record("a", 2021, 3, 5)]).await.unwrap();
        sink.write(&[record("a", 2021, 3, 5)]).await.unwrap();

        let partition = dir.path().join("year=2021").join("month=3").join("day=5");
        assert_eq!(std::fs::read_dir(&partition).unwrap().count(), 2);
    }
}
