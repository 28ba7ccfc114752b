//! Fixed-width coercion of the remaining numeric columns
//!
//! Three code columns arrive from the API as strings (or sentinel-filled
//! zeros) and are stored as 32-bit integers in every sink. Upstream
//! sentinel and encoding guarantees mean a non-numeric or overflowing value
//! should not occur, but the cast is validated rather than assumed.
//!
//! This stage also derives the `year`/`month`/`day` partition columns from
//! the parsed application date, producing the finalized dataset.

use crate::record::{partition_values, EncodedRecord, VaccinationRecord};
use thiserror::Error;
use tracing::info;

/// Errors raised when a value cannot take its fixed-width representation
#[derive(Debug, Error)]
pub enum CoercionError {
    #[error("record {vacc_id}: column {column} value {value:?} is not numeric")]
    NotNumeric {
        column: &'static str,
        value: String,
        vacc_id: String,
    },

    #[error("record {vacc_id}: column {column} value {value:?} does not fit in 32 bits")]
    Overflow {
        column: &'static str,
        value: String,
        vacc_id: String,
    },
}

/// Cast the three numeric-code columns to `i32` and derive partition values
pub fn coerce(records: Vec<EncodedRecord>) -> Result<Vec<VaccinationRecord>, CoercionError> {
    let finalized = records
        .into_iter()
        .map(|r| {
            let (year, month, day) = partition_values(&r.vacina_data_aplicacao);
            Ok(VaccinationRecord {
                vacina_codigo: to_i32("vacina_codigo", &r.vacina_codigo, &r.vacc_id)?,
                vacina_categoria_codigo: to_i32(
                    "vacina_categoria_codigo",
                    &r.vacina_categoria_codigo,
                    &r.vacc_id,
                )?,
                estabelecimento_municipio_codigo: to_i32(
                    "estabelecimento_municipio_codigo",
                    &r.estabelecimento_municipio_codigo,
                    &r.vacc_id,
                )?,
                vacc_id: r.vacc_id,
                vacina_data_aplicacao: r.vacina_data_aplicacao,
                status_codigo: r.status_codigo,
                vacina_lote_codigo: r.vacina_lote_codigo,
                vacina_descricao_dose_codigo: r.vacina_descricao_dose_codigo,
                vacina_grupo_atendimento_codigo: r.vacina_grupo_atendimento_codigo,
                paciente_id: r.paciente_id,
                paciente_nacionalidade_codigo: r.paciente_nacionalidade_codigo,
                year,
                month,
                day,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    info!(records = finalized.len(), "type coercion complete");
    Ok(finalized)
}

/// Parse a cell as a 32-bit integer, accepting integral floats the way the
/// source data occasionally spells them ("87.0").
fn to_i32(column: &'static str, value: &str, vacc_id: &str) -> Result<i32, CoercionError> {
    let trimmed = value.trim();

    if let Ok(wide) = trimmed.parse::<i64>() {
        return i32::try_from(wide).map_err(|_| CoercionError::Overflow {
            column,
            value: value.to_string(),
            vacc_id: vacc_id.to_string(),
        });
    }

    match trimmed.parse::<f64>() {
        Ok(float) if float.fract() == 0.0 && float >= i32::MIN as f64 && float <= i32::MAX as f64 => {
            Ok(float as i32)
        }
        Ok(_) => Err(CoercionError::Overflow {
            column,
            value: value.to_string(),
            vacc_id: vacc_id.to_string(),
        }),
        Err(_) => Err(CoercionError::NotNumeric {
            column,
            value: value.to_string(),
            vacc_id: vacc_id.to_string(),
        }),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn encoded(vacc_id: &str, vacina_codigo: &str, municipio: &str) -> EncodedRecord {
        EncodedRecord {
            vacc_id: vacc_id.to_string(),
            vacina_data_aplicacao: NaiveDate::from_ymd_opt(2021, 3, 5)
                .unwrap()
                .and_hms_opt(10, 0, 0)
                .unwrap(),
            status_codigo: 1,
            vacina_codigo: vacina_codigo.to_string(),
            vacina_lote_codigo: 0,
            vacina_categoria_codigo: "9".to_string(),
            vacina_descricao_dose_codigo: 0,
            vacina_grupo_atendimento_codigo: 2,
            paciente_id: "p".to_string(),
            paciente_nacionalidade_codigo: 0,
            estabelecimento_municipio_codigo: municipio.to_string(),
        }
    }

    #[test]
    fn plain_and_float_spelled_integers_coerce() {
        let records = coerce(vec![encoded("a", "87", "355030"), encoded("b", "87.0", "0")]).unwrap();
        assert_eq!(records[0].vacina_codigo, 87);
        assert_eq!(records[0].estabelecimento_municipio_codigo, 355_030);
        assert_eq!(records[1].vacina_codigo, 87);
        assert_eq!(records[1].estabelecimento_municipio_codigo, 0);
    }

    #[test]
    fn partition_columns_are_derived_from_the_date() {
        let records = coerce(vec![encoded("a", "87", "355030")]).unwrap();
        assert_eq!(records[0].year, 2021);
        assert_eq!(records[0].month, 3);
        assert_eq!(records[0].day, 5);
    }

    #[test]
    fn non_numeric_value_is_rejected() {
        let err = coerce(vec![encoded("a", "not-a-number", "0")]).unwrap_err();
        assert!(matches!(err, CoercionError::NotNumeric { column: "vacina_codigo", .. }));
    }

    #[test]
    fn fractional_value_is_rejected() {
        let err = coerce(vec![encoded("a", "87.5", "0")]).unwrap_err();
        assert!(matches!(err, CoercionError::Overflow { .. }));
    }

    #[test]
    fn value_wider_than_32_bits_is_rejected() {
        let err = coerce(vec![encoded("a", "87", "4294967296")]).unwrap_err();
        assert!(matches!(
            err,
            CoercionError::Overflow { column: "estabelecimento_municipio_codigo", .. }
        ));
    }
}
