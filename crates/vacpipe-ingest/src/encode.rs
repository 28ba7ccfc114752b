//! Categorical encoding of designated string columns
//!
//! Five columns carry free-form strings with low cardinality. Each distinct
//! value observed across the whole dataset is assigned a small non-negative
//! integer code; assignment order is the lexicographic sort of the distinct
//! values, so the mapping is reproducible given identical input. The encoded
//! columns take their `_codigo` canonical names.
//!
//! Mappings are built fresh every run from observed values only. Codes are
//! NOT stable across runs: anything reading an older sink snapshot must
//! interpret codes through that run's exported mapping artifact.

use crate::normalize::ParseError;
use crate::record::{EncodedRecord, FlatRecord};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::info;

/// Canonical names of the five encoded columns, paired with the source
/// column each replaces.
pub const ENCODED_COLUMNS: [(&str, &str); 5] = [
    ("status", "status_codigo"),
    ("vacina_lote", "vacina_lote_codigo"),
    ("vacina_descricao_dose", "vacina_descricao_dose_codigo"),
    ("vacina_grupoAtendimento_nome", "vacina_grupo_atendimento_codigo"),
    ("paciente_nacionalidade_enumNacionalidade", "paciente_nacionalidade_codigo"),
];

/// Per-column mapping from observed string value to assigned code
///
/// Ephemeral side artifact of a single run; not persisted by the encoder,
/// but serializable so a caller can audit or export it.
#[derive(Debug, Clone, Serialize)]
pub struct CategoryMapping {
    /// Canonical (`_codigo`) column name
    pub column: String,
    pub codes: BTreeMap<String, i64>,
}

impl CategoryMapping {
    /// Freeze a mapping over the distinct values observed for one column.
    fn freeze<'a>(column: &str, values: impl Iterator<Item = &'a str>) -> Self {
        let distinct: BTreeSet<&str> = values.collect();
        let codes = distinct
            .into_iter()
            .enumerate()
            .map(|(code, value)| (value.to_string(), code as i64))
            .collect();
        Self {
            column: column.to_string(),
            codes,
        }
    }

    pub fn code_for(&self, value: &str) -> Option<i64> {
        self.codes.get(value).copied()
    }

    /// Reverse lookup, for auditing a run's output.
    pub fn decode(&self, code: i64) -> Option<&str> {
        self.codes
            .iter()
            .find(|(_, c)| **c == code)
            .map(|(value, _)| value.as_str())
    }

    fn require(&self, column: &'static str, value: &str, vacc_id: &str) -> Result<i64, ParseError> {
        self.code_for(value).ok_or_else(|| ParseError::UnmappedCategory {
            column,
            value: value.to_string(),
            vacc_id: vacc_id.to_string(),
        })
    }
}

/// Encode the five designated columns across the whole dataset
///
/// Returns the encoded rows along with one mapping per column, in
/// [`ENCODED_COLUMNS`] order.
pub fn encode(
    records: Vec<FlatRecord>,
) -> Result<(Vec<EncodedRecord>, Vec<CategoryMapping>), ParseError> {
    let status = CategoryMapping::freeze(
        "status_codigo",
        records.iter().map(|r| r.status.as_str()),
    );
    let lote = CategoryMapping::freeze(
        "vacina_lote_codigo",
        records.iter().map(|r| r.vacina_lote.as_str()),
    );
    let dose = CategoryMapping::freeze(
        "vacina_descricao_dose_codigo",
        records.iter().map(|r| r.vacina_descricao_dose.as_str()),
    );
    let grupo = CategoryMapping::freeze(
        "vacina_grupo_atendimento_codigo",
        records.iter().map(|r| r.vacina_grupo_atendimento_nome.as_str()),
    );
    let nacionalidade = CategoryMapping::freeze(
        "paciente_nacionalidade_codigo",
        records.iter().map(|r| r.paciente_nacionalidade.as_str()),
    );

    let encoded = records
        .into_iter()
        .map(|r| {
            Ok(EncodedRecord {
                status_codigo: status.require("status", &r.status, &r.vacc_id)?,
                vacina_lote_codigo: lote.require("vacina_lote", &r.vacina_lote, &r.vacc_id)?,
                vacina_descricao_dose_codigo: dose.require(
                    "vacina_descricao_dose",
                    &r.vacina_descricao_dose,
                    &r.vacc_id,
                )?,
                vacina_grupo_atendimento_codigo: grupo.require(
                    "vacina_grupoAtendimento_nome",
                    &r.vacina_grupo_atendimento_nome,
                    &r.vacc_id,
                )?,
                paciente_nacionalidade_codigo: nacionalidade.require(
                    "paciente_nacionalidade_enumNacionalidade",
                    &r.paciente_nacionalidade,
                    &r.vacc_id,
                )?,
                vacc_id: r.vacc_id,
                vacina_data_aplicacao: r.vacina_data_aplicacao,
                vacina_codigo: r.vacina_codigo,
                vacina_categoria_codigo: r.vacina_categoria_codigo,
                paciente_id: r.paciente_id,
                estabelecimento_municipio_codigo: r.estabelecimento_municipio_codigo,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mappings = vec![status, lote, dose, grupo, nacionalidade];

    info!(
        records = encoded.len(),
        columns = mappings.len(),
        "categorical encoding complete"
    );

    Ok((encoded, mappings))
}
