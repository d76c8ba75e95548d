//! What the pipeline needs to know about a live data producer.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use obshub_types::{DataValue, Feature, RecordEncoding, RecordSchema, SystemDescription};

/// One output of a producer.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputDescriptor {
    pub name: String,
    pub schema: RecordSchema,
    pub recommended_encoding: RecordEncoding,
    /// Disabled outputs get no datastream.
    pub enabled: bool,
}

impl OutputDescriptor {
    pub fn new(name: impl Into<String>, schema: RecordSchema) -> Self {
        Self {
            name: name.into(),
            schema,
            recommended_encoding: RecordEncoding::default(),
            enabled: true,
        }
    }
}

/// A sensor, actuator or process streaming data. Producers know nothing
/// about persistence.
pub trait Producer: Send + Sync {
    fn uid(&self) -> &str;

    /// The live description. Its unique id should equal [`Producer::uid`].
    fn description(&self) -> SystemDescription;

    fn outputs(&self) -> Vec<OutputDescriptor>;

    /// The feature currently being observed, if any.
    fn current_foi(&self) -> Option<Feature> {
        None
    }

    /// Nested producers of a group. Empty for a single producer.
    fn members(&self) -> Vec<Arc<dyn Producer>> {
        Vec::new()
    }

    /// The most recent record of output `output` and when it was produced.
    /// Stored when the producer is attached.
    fn latest_record(&self, _output: &str) -> Option<(DateTime<Utc>, Vec<DataValue>)> {
        None
    }
}

/// An event published by a producer.
#[derive(Debug, Clone, PartialEq)]
pub enum ProducerEvent {
    /// New records on one output.
    Data {
        producer_uid: String,
        output_name: String,
        /// When the producer emitted the records.
        timestamp: DateTime<Utc>,
        /// Feature the records are about, overriding the current one.
        foi_uid: Option<String>,
        records: Vec<Vec<DataValue>>,
    },
    /// The producer started observing another feature.
    Foi {
        producer_uid: String,
        feature: Feature,
    },
    /// The producer's description changed.
    DescriptionChanged {
        producer_uid: String,
        description: SystemDescription,
    },
}

impl ProducerEvent {
    pub fn producer_uid(&self) -> &str {
        match self {
            Self::Data { producer_uid, .. }
            | Self::Foi { producer_uid, .. }
            | Self::DescriptionChanged { producer_uid, .. } => producer_uid,
        }
    }
}
