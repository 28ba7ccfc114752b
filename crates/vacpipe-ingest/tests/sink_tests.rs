//! Fan-out tests for the multi-sink writer
//!
//! The key-value and relational sinks point at closed local ports so their
//! writes fail without any external services; the file sink writes to a
//! temporary directory. This exercises the write policy: every sink is
//! attempted, and the first error in fixed sink order is the one returned.

use chrono::NaiveDate;
use vacpipe_ingest::config::{AwsConfig, DatabaseConfig};
use vacpipe_ingest::record::VaccinationRecord;
use vacpipe_ingest::sinks::{
    KeyValueSink, MultiSinkWriter, PartitionedFileSink, RelationalSink, SinkError,
};

fn unreachable_aws() -> AwsConfig {
    AwsConfig {
        access_key: "test".to_string(),
        secret_key: "test".to_string(),
        region: "us-east-1".to_string(),
        // Port 1 is closed; the write fails with a connection error.
        endpoint: Some("http://127.0.0.1:1".to_string()),
        table: "covid_vaccines".to_string(),
    }
}

fn unreachable_database() -> DatabaseConfig {
    DatabaseConfig {
        host: "127.0.0.1".to_string(),
        port: 1,
        user: "ingest".to_string(),
        password: "secret".to_string(),
        database: "covid_vaccines".to_string(),
        max_connections: 1,
    }
}

fn record() -> VaccinationRecord {
    VaccinationRecord {
        vacc_id: "abc-123".to_string(),
        vacina_data_aplicacao: NaiveDate::from_ymd_opt(2021, 3, 5)
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
        year: 2021,
        month: 3,
        day: 5,
    }
}

#[tokio::test]
async fn failing_sinks_do_not_prevent_the_remaining_writes() {
    let dir = tempfile::tempdir().unwrap();

    let writer = MultiSinkWriter::new(
        KeyValueSink::new(&unreachable_aws()),
        RelationalSink::connect_lazy(&unreachable_database()).unwrap(),
        PartitionedFileSink::new(dir.path()),
    );

    let err = writer.write_all(&[record()]).await.unwrap_err();

    // Both the key-value and relational writes failed; the key-value error
    // comes first in fixed sink order.
    assert!(matches!(err, SinkError::KeyValue(_)));

    // The file sink was still attempted and wrote its partition.
    let partition = dir.path().join("year=2021").join("month=3").join("day=5");
    assert_eq!(std::fs::read_dir(&partition).unwrap().count(), 1);
}
