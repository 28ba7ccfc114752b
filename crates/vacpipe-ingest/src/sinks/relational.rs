//! Relational sink (PostgreSQL)
//!
//! Replaces the entire target table with the current snapshot: drop,
//! recreate, and batched multi-row inserts, all inside one transaction so a
//! partial write never survives a failure. The table is indexed by
//! `vacc_id` through its primary key.

use crate::config::DatabaseConfig;
use crate::record::VaccinationRecord;
use crate::sinks::SinkError;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::debug;

/// Rows per multi-row insert; 14 binds per row stays well under the
/// PostgreSQL parameter limit of 65535.
const INSERT_CHUNK_ROWS: usize = 1000;

const DROP_TABLE: &str = "DROP TABLE IF EXISTS covid_vaccines";

const CREATE_TABLE: &str = r#"
CREATE TABLE covid_vaccines (
    vacc_id TEXT PRIMARY KEY,
    "vacina_dataAplicacao" TIMESTAMP NOT NULL,
    status_codigo BIGINT NOT NULL,
    vacina_codigo INTEGER NOT NULL,
    vacina_lote_codigo BIGINT NOT NULL,
    vacina_categoria_codigo INTEGER NOT NULL,
    vacina_descricao_dose_codigo BIGINT NOT NULL,
    vacina_grupo_atendimento_codigo BIGINT NOT NULL,
    paciente_id TEXT NOT NULL,
    paciente_nacionalidade_codigo BIGINT NOT NULL,
    estabelecimento_municipio_codigo INTEGER NOT NULL,
    year INTEGER NOT NULL,
    month INTEGER NOT NULL,
    day INTEGER NOT NULL
)
"#;

const INSERT_PREFIX: &str = r#"INSERT INTO covid_vaccines (vacc_id, "vacina_dataAplicacao", status_codigo, vacina_codigo, vacina_lote_codigo, vacina_categoria_codigo, vacina_descricao_dose_codigo, vacina_grupo_atendimento_codigo, paciente_id, paciente_nacionalidade_codigo, estabelecimento_municipio_codigo, year, month, day) "#;

/// Full-replace writer for the relational table
pub struct RelationalSink {
    pool: PgPool,
}

impl RelationalSink {
    /// Open a connection pool against the configured database
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, SinkError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.url())
            .await?;

        Ok(Self { pool })
    }

    /// Build the pool without connecting
    ///
    /// The first write establishes the connection and surfaces any
    /// connection error as a write failure.
    pub fn connect_lazy(config: &DatabaseConfig) -> Result<Self, SinkError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect_lazy(&config.url())?;

        Ok(Self { pool })
    }

    /// Replace the table contents with the current dataset
    pub async fn write(&self, records: &[VaccinationRecord]) -> Result<(), SinkError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(DROP_TABLE).execute(&mut *tx).await?;
        sqlx::query(CREATE_TABLE).execute(&mut *tx).await?;

        for chunk in records.chunks(INSERT_CHUNK_ROWS) {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(INSERT_PREFIX);
            builder.push_values(chunk, |mut row, record| {
                row.push_bind(&record.vacc_id)
                    .push_bind(record.vacina_data_aplicacao)
                    .push_bind(record.status_codigo)
                    .push_bind(record.vacina_codigo)
                    .push_bind(record.vacina_lote_codigo)
                    .push_bind(record.vacina_categoria_codigo)
                    .push_bind(record.vacina_descricao_dose_codigo)
                    .push_bind(record.vacina_grupo_atendimento_codigo)
                    .push_bind(&record.paciente_id)
                    .push_bind(record.paciente_nacionalidade_codigo)
                    .push_bind(record.estabelecimento_municipio_codigo)
                    .push_bind(record.year)
                    .push_bind(record.month as i32)
                    .push_bind(record.day as i32);
            });
            builder.build().execute(&mut *tx).await?;
        }

        tx.commit().await?;

        debug!(records = records.len(), "relational replace complete");
        Ok(())
    }
}
