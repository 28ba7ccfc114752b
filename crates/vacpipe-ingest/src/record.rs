//! Dataset row types for each pipeline stage
//!
//! A row moves through three shapes: [`FlatRecord`] straight out of
//! normalization (all projected cells still strings), [`EncodedRecord`] after
//! categorical encoding, and [`VaccinationRecord`] once the remaining numeric
//! columns are coerced and the partition columns derived. Each shape is only
//! constructible by the stage that produces it, so a sink can never receive a
//! half-processed row.

use chrono::{Datelike, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Replacement for absent, null, or empty cells, applied before encoding.
/// The sentinel participates in categorical encoding like any other value.
pub const ZERO_SENTINEL: &str = "0";

/// One result envelope from the search API, discarded after normalization.
#[derive(Debug, Clone, Deserialize)]
pub struct RawHit {
    /// Envelope identity, becomes `vacc_id`
    #[serde(rename = "_id")]
    pub id: String,
    /// Nested document payload
    #[serde(rename = "_source", default)]
    pub source: serde_json::Value,
}

/// A normalized, deduplicated row: projected onto the fixed column list,
/// sentinel-filled, application date parsed. Categorical columns still hold
/// their observed string values.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FlatRecord {
    pub vacc_id: String,
    pub vacina_data_aplicacao: NaiveDateTime,
    pub status: String,
    pub vacina_codigo: String,
    pub vacina_lote: String,
    pub vacina_categoria_codigo: String,
    pub vacina_descricao_dose: String,
    pub vacina_grupo_atendimento_nome: String,
    pub paciente_id: String,
    pub paciente_nacionalidade: String,
    pub estabelecimento_municipio_codigo: String,
}

/// A row after categorical encoding. The five designated columns carry their
/// integer codes under the `_codigo` canonical names; the three fixed-width
/// columns are still uncoerced strings.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedRecord {
    pub vacc_id: String,
    pub vacina_data_aplicacao: NaiveDateTime,
    pub status_codigo: i64,
    pub vacina_codigo: String,
    pub vacina_lote_codigo: i64,
    pub vacina_categoria_codigo: String,
    pub vacina_descricao_dose_codigo: i64,
    pub vacina_grupo_atendimento_codigo: i64,
    pub paciente_id: String,
    pub paciente_nacionalidade_codigo: i64,
    pub estabelecimento_municipio_codigo: String,
}

/// The finalized canonical row, read-only for all three sink writes.
///
/// `year`/`month`/`day` are derived from the application date and exist only
/// to drive the partitioned file layout.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VaccinationRecord {
    pub vacc_id: String,
    #[serde(rename = "vacina_dataAplicacao")]
    pub vacina_data_aplicacao: NaiveDateTime,
    pub status_codigo: i64,
    pub vacina_codigo: i32,
    pub vacina_lote_codigo: i64,
    pub vacina_categoria_codigo: i32,
    pub vacina_descricao_dose_codigo: i64,
    pub vacina_grupo_atendimento_codigo: i64,
    pub paciente_id: String,
    pub paciente_nacionalidade_codigo: i64,
    pub estabelecimento_municipio_codigo: i32,
    pub year: i32,
    pub month: u32,
    pub day: u32,
}

impl VaccinationRecord {
    /// Partition key triple for the file sink.
    pub fn partition(&self) -> (i32, u32, u32) {
        (self.year, self.month, self.day)
    }
}

/// Derive the partition columns from a parsed application date.
pub fn partition_values(date: &NaiveDateTime) -> (i32, u32, u32) {
    (date.year(), date.month(), date.day())
}
