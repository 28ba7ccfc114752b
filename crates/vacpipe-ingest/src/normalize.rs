//! Normalization of raw hits into the canonical flat schema
//!
//! Each hit is projected onto a declared column list: an explicit table of
//! source document paths, validated against the fixed schema before any row
//! is built, rather than an implicit prefix-stripping convention. Anything
//! not named in the projection is discarded.
//!
//! Deduplication runs over the union of all fetched batches, first by
//! `vacc_id` (first occurrence wins) and then by full-row equality. Absent,
//! null, and empty cells become the zero sentinel before typing, and the
//! application date is parsed here; a malformed date fails the whole run,
//! consistent with full-snapshot semantics.

use crate::record::{FlatRecord, RawHit, ZERO_SENTINEL};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use serde_json::Value;
use std::collections::HashSet;
use thiserror::Error;
use tracing::{debug, info};

/// Errors raised for structurally invalid records
#[derive(Debug, Error)]
pub enum ParseError {
    /// The application date could not be parsed
    #[error("record {vacc_id}: malformed application date {value:?}")]
    MalformedDate { vacc_id: String, value: String },

    /// The declared projection does not match the fixed schema
    #[error("declared projection is invalid: {0}")]
    InvalidProjection(String),

    /// A categorical value was not present in the frozen mapping. Mappings
    /// are built from the same records they encode, so this cannot occur
    /// unless the encoder is broken.
    #[error("record {vacc_id}: value {value:?} in column {column} missing from frozen mapping")]
    UnmappedCategory {
        column: &'static str,
        value: String,
        vacc_id: String,
    },
}

/// Declared projection: source document paths, in canonical column order.
/// The envelope identity is handled separately and becomes `vacc_id`.
/// Dotted segments descend into nested objects.
const SOURCE_COLUMNS: [&str; 10] = [
    "vacina_dataAplicacao",
    "status",
    "vacina_codigo",
    "vacina_lote",
    "vacina_categoria_codigo",
    "vacina_descricao_dose",
    "vacina_grupoAtendimento_nome",
    "paciente_id",
    "paciente_nacionalidade_enumNacionalidade",
    "estabelecimento_municipio_codigo",
];

/// A projected row before date parsing, used for both dedup passes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ProjectedRow {
    vacc_id: String,
    cells: [String; 10],
}

/// Flatten, project, deduplicate, and type the fetched hits
pub fn normalize(hits: Vec<RawHit>) -> Result<Vec<FlatRecord>, ParseError> {
    validate_projection()?;

    let total = hits.len();

    // Pass (a): drop duplicate vacc_ids, keeping the first occurrence.
    let mut seen_ids = HashSet::new();
    let mut rows = Vec::with_capacity(total);
    for hit in &hits {
        let row = project(hit);
        if seen_ids.insert(row.vacc_id.clone()) {
            rows.push(row);
        }
    }

    // Pass (b): drop fully identical rows among the remainder.
    let mut seen_rows = HashSet::new();
    rows.retain(|row| seen_rows.insert(row.clone()));

    debug!(fetched = total, unique = rows.len(), "deduplication complete");

    let records = rows
        .into_iter()
        .map(flat_record)
        .collect::<Result<Vec<_>, _>>()?;

    info!(records = records.len(), dropped = total - records.len(), "normalization complete");
    Ok(records)
}

/// Check the declared projection against the fixed schema before use.
fn validate_projection() -> Result<(), ParseError> {
    let mut seen = HashSet::new();
    for path in SOURCE_COLUMNS {
        if path.is_empty() {
            return Err(ParseError::InvalidProjection("empty source path".to_string()));
        }
        if !seen.insert(path) {
            return Err(ParseError::InvalidProjection(format!(
                "duplicate source path {path:?}"
            )));
        }
    }
    Ok(())
}

fn project(hit: &RawHit) -> ProjectedRow {
    ProjectedRow {
        vacc_id: if hit.id.is_empty() {
            ZERO_SENTINEL.to_string()
        } else {
            hit.id.clone()
        },
        cells: SOURCE_COLUMNS.map(|path| cell(&hit.source, path)),
    }
}

/// Resolve one projected cell, applying the zero sentinel to absent, null,
/// and empty values.
fn cell(source: &Value, path: &str) -> String {
    let mut current = source;
    for segment in path.split('.') {
        match current.get(segment) {
            Some(next) => current = next,
            None => return ZERO_SENTINEL.to_string(),
        }
    }

    match current {
        Value::Null => ZERO_SENTINEL.to_string(),
        Value::String(s) if s.is_empty() => ZERO_SENTINEL.to_string(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        // Non-scalar leaves are kept verbatim as compact JSON.
        other => other.to_string(),
    }
}

fn flat_record(row: ProjectedRow) -> Result<FlatRecord, ParseError> {
    let [date_raw, status, vacina_codigo, vacina_lote, vacina_categoria_codigo, vacina_descricao_dose, vacina_grupo_atendimento_nome, paciente_id, paciente_nacionalidade, estabelecimento_municipio_codigo] =
        row.cells;

    let vacina_data_aplicacao = parse_application_date(&row.vacc_id, &date_raw)?;

    Ok(FlatRecord {
        vacc_id: row.vacc_id,
        vacina_data_aplicacao,
        status,
        vacina_codigo,
        vacina_lote,
        vacina_categoria_codigo,
        vacina_descricao_dose,
        vacina_grupo_atendimento_nome,
        paciente_id,
        paciente_nacionalidade,
        estabelecimento_municipio_codigo,
    })
}

/// Parse the application date, accepting the formats the API has been
/// observed to emit: RFC 3339 with offset, naive datetime with optional
/// fractional seconds, and bare dates.
fn parse_application_date(vacc_id: &str, raw: &str) -> Result<NaiveDateTime, ParseError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.naive_utc());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(dt);
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(date.and_time(NaiveTime::MIN));
    }

    Err(ParseError::MalformedDate {
        vacc_id: vacc_id.to_string(),
        value: raw.to_string(),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::Datelike;
    use serde_json::json;

    fn hit(id: &str, source: Value) -> RawHit {
        serde_json::from_value(json!({ "_id": id, "_source": source })).unwrap()
    }

    fn full_source(date: &str) -> Value {
        json!({
            "vacina_dataAplicacao": date,
            "status": "final",
            "vacina_codigo": "87",
            "vacina_lote": "FA9096",
            "vacina_categoria_codigo": 9,
            "vacina_descricao_dose": "1a Dose",
            "vacina_grupoAtendimento_nome": "Outros",
            "paciente_id": "p-1",
            "paciente_nacionalidade_enumNacionalidade": "B",
            "estabelecimento_municipio_codigo": "355030"
        })
    }

    #[test]
    fn duplicate_vacc_id_keeps_first_occurrence() {
        // Same record arriving on two different pages.
        let hits = vec![
            hit("123", full_source("2021-03-05T10:00:00")),
            hit("123", full_source("2021-03-05T10:00:00")),
        ];
        let records = normalize(hits).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].vacc_id, "123");
    }

    #[test]
    fn duplicate_vacc_id_with_different_content_still_drops_second() {
        let mut second = full_source("2021-03-05T10:00:00");
        second["status"] = json!("entered-in-error");
        let hits = vec![hit("123", full_source("2021-03-05T10:00:00")), hit("123", second)];
        let records = normalize(hits).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, "final");
    }

    #[test]
    fn empty_and_missing_cells_become_zero_sentinel() {
        let mut source = full_source("2021-03-05T10:00:00");
        source["vacina_lote"] = json!("");
        source.as_object_mut().unwrap().remove("paciente_id");
        source["status"] = json!(null);

        let records = normalize(vec![hit("a", source)]).unwrap();
        assert_eq!(records[0].vacina_lote, ZERO_SENTINEL);
        assert_eq!(records[0].paciente_id, ZERO_SENTINEL);
        assert_eq!(records[0].status, ZERO_SENTINEL);
    }

    #[test]
    fn unlisted_fields_are_discarded() {
        let mut source = full_source("2021-03-05T10:00:00");
        source["estabelecimento_razaoSocial"] = json!("should be dropped");
        let records = normalize(vec![hit("a", source)]).unwrap();
        // The projected schema is fixed by the FlatRecord type; reaching here
        // means the extra field had nowhere to land.
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn numeric_cells_are_stringified() {
        let records = normalize(vec![hit("a", full_source("2021-03-05T10:00:00"))]).unwrap();
        assert_eq!(records[0].vacina_categoria_codigo, "9");
    }

    #[test]
    fn dotted_paths_descend_into_nested_objects() {
        assert_eq!(cell(&json!({ "a": { "b": "v" } }), "a.b"), "v");
        assert_eq!(cell(&json!({ "a": {} }), "a.b"), ZERO_SENTINEL);
    }

    #[test]
    fn application_date_parses_to_partition_values() {
        let records = normalize(vec![hit("a", full_source("2021-03-05T10:00:00"))]).unwrap();
        let date = records[0].vacina_data_aplicacao;
        assert_eq!((date.year(), date.month(), date.day()), (2021, 3, 5));
    }

    #[test]
    fn rfc3339_and_bare_dates_are_accepted() {
        assert!(parse_application_date("a", "2021-03-05T10:00:00.000Z").is_ok());
        assert!(parse_application_date("a", "2021-03-05").is_ok());
    }

    #[test]
    fn malformed_date_fails_the_run() {
        let err = normalize(vec![hit("bad", full_source("not-a-date"))]).unwrap_err();
        assert!(matches!(err, ParseError::MalformedDate { ref vacc_id, .. } if vacc_id == "bad"));
    }

    #[test]
    fn missing_date_is_sentinel_and_fails_the_run() {
        let mut source = full_source("2021-03-05");
        source.as_object_mut().unwrap().remove("vacina_dataAplicacao");
        let err = normalize(vec![hit("a", source)]).unwrap_err();
        assert!(matches!(err, ParseError::MalformedDate { ref value, .. } if value == ZERO_SENTINEL));
    }
}
