//! Key-value sink (DynamoDB)
//!
//! Writes one item per record, keyed by `vacc_id`, using batched upserts of
//! up to 25 items per request. Unprocessed items returned by a batch are
//! retried a bounded number of times, matching batch-writer semantics.
//!
//! The table is additive-only: items from earlier runs that are absent from
//! the current snapshot are not deleted. Readers that need an exact snapshot
//! should use the relational or file sink instead.

use crate::config::AwsConfig;
use crate::record::VaccinationRecord;
use crate::sinks::SinkError;
use aws_sdk_dynamodb::{
    config::{Credentials, Region},
    types::{AttributeValue, PutRequest, WriteRequest},
    Client,
};
use std::collections::HashMap;
use tracing::debug;

/// DynamoDB caps batch writes at 25 items.
const MAX_BATCH_ITEMS: usize = 25;

/// Attempts per batch before unprocessed items fail the write.
const UNPROCESSED_RETRIES: usize = 3;

/// Batched upsert writer for the key-value table
pub struct KeyValueSink {
    client: Client,
    table: String,
}

impl KeyValueSink {
    pub fn new(config: &AwsConfig) -> Self {
        let credentials = Credentials::new(
            &config.access_key,
            &config.secret_key,
            None,
            None,
            "vacpipe-keyvalue",
        );

        let mut builder = aws_sdk_dynamodb::Config::builder()
            .credentials_provider(credentials)
            .region(Region::new(config.region.clone()));

        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        Self {
            client: Client::from_conf(builder.build()),
            table: config.table.clone(),
        }
    }

    /// Upsert every record, 25 items per underlying write
    pub async fn write(&self, records: &[VaccinationRecord]) -> Result<(), SinkError> {
        for chunk in records.chunks(MAX_BATCH_ITEMS) {
            let requests = chunk
                .iter()
                .map(write_request)
                .collect::<Result<Vec<_>, _>>()?;
            self.put_batch(requests).await?;
        }

        debug!(records = records.len(), table = %self.table, "key-value upserts complete");
        Ok(())
    }

    async fn put_batch(&self, mut requests: Vec<WriteRequest>) -> Result<(), SinkError> {
        for _ in 0..UNPROCESSED_RETRIES {
            let output = self
                .client
                .batch_write_item()
                .request_items(self.table.clone(), requests)
                .send()
                .await
                .map_err(|e| SinkError::KeyValue(e.to_string()))?;

            let unprocessed = output
                .unprocessed_items()
                .and_then(|items| items.get(&self.table))
                .cloned()
                .unwrap_or_default();

            if unprocessed.is_empty() {
                return Ok(());
            }

            debug!(remaining = unprocessed.len(), "retrying unprocessed batch items");
            requests = unprocessed;
        }

        Err(SinkError::KeyValue(format!(
            "{} item(s) still unprocessed after {} attempts",
            requests.len(),
            UNPROCESSED_RETRIES
        )))
    }
}

fn write_request(record: &VaccinationRecord) -> Result<WriteRequest, SinkError> {
    let put = PutRequest::builder()
        .set_item(Some(item(record)))
        .build()
        .map_err(|e| SinkError::KeyValue(e.to_string()))?;

    Ok(WriteRequest::builder().put_request(put).build())
}

/// One attribute per VaccinationRecord field, partition key `vacc_id`.
fn item(record: &VaccinationRecord) -> HashMap<String, AttributeValue> {
    fn s(value: impl Into<String>) -> AttributeValue {
        AttributeValue::S(value.into())
    }
    fn n(value: impl ToString) -> AttributeValue {
        AttributeValue::N(value.to_string())
    }

    HashMap::from([
        ("vacc_id".to_string(), s(&record.vacc_id)),
        (
            "vacina_dataAplicacao".to_string(),
            s(record.vacina_data_aplicacao.format("%Y-%m-%dT%H:%M:%S").to_string()),
        ),
        ("status_codigo".to_string(), n(record.status_codigo)),
        ("vacina_codigo".to_string(), n(record.vacina_codigo)),
        ("vacina_lote_codigo".to_string(), n(record.vacina_lote_codigo)),
        ("vacina_categoria_codigo".to_string(), n(record.vacina_categoria_codigo)),
        (
            "vacina_descricao_dose_codigo".to_string(),
            n(record.vacina_descricao_dose_codigo),
        ),
        (
            "vacina_grupo_atendimento_codigo".to_string(),
            n(record.vacina_grupo_atendimento_codigo),
        ),
        ("paciente_id".to_string(), s(&record.paciente_id)),
        (
            "paciente_nacionalidade_codigo".to_string(),
            n(record.paciente_nacionalidade_codigo),
        ),
        (
            "estabelecimento_municipio_codigo".to_string(),
            n(record.estabelecimento_municipio_codigo),
        ),
        ("year".to_string(), n(record.year)),
        ("month".to_string(), n(record.month)),
        ("day".to_string(), n(record.day)),
    ])
}
