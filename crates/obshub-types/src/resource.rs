//! Stored resource records.

use chrono::{DateTime, Utc};
use obshub_id::ScopedId;
use serde::{Deserialize, Serialize};

use crate::geom::Geometry;
use crate::schema::{DataValue, RecordEncoding, RecordSchema};
use crate::time::TimeExtent;

/// Anything that can be matched by keywords.
pub trait Resource {
    fn name(&self) -> &str;
    fn description(&self) -> Option<&str>;
}

/// Resources with a unique identifier, a validity period and optionally a
/// location.
pub trait FeatureLike: Resource {
    fn uid(&self) -> &str;
    fn valid_time(&self) -> Option<&TimeExtent>;
    fn geometry(&self) -> Option<&Geometry>;
}

/// One version of a system (sensor, actuator, process) description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemDescription {
    pub uid: String,
    pub name: String,
    pub description: Option<String>,
    /// Period this version is valid for. Only the begin is authoritative;
    /// stores close a version when the next one starts.
    pub valid_time: TimeExtent,
    /// Parent system for group members, [`ScopedId::NONE`] otherwise.
    pub parent_id: ScopedId,
    /// Unique id of the procedure (datasheet, model) this system implements.
    pub procedure_uid: Option<String>,
    pub location: Option<Geometry>,
}

impl SystemDescription {
    /// A top-level description valid from `valid_from` onwards.
    pub fn new(uid: impl Into<String>, name: impl Into<String>, valid_from: DateTime<Utc>) -> Self {
        Self {
            uid: uid.into(),
            name: name.into(),
            description: None,
            valid_time: TimeExtent::starting_at(valid_from),
            parent_id: ScopedId::NONE,
            procedure_uid: None,
            location: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_parent(mut self, parent_id: ScopedId) -> Self {
        self.parent_id = parent_id;
        self
    }
}

impl Resource for SystemDescription {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }
}

impl FeatureLike for SystemDescription {
    fn uid(&self) -> &str {
        &self.uid
    }

    fn valid_time(&self) -> Option<&TimeExtent> {
        Some(&self.valid_time)
    }

    fn geometry(&self) -> Option<&Geometry> {
        self.location.as_ref()
    }
}

/// One version of a datastream: the channel fed by one output of a system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataStreamInfo {
    pub system_id: ScopedId,
    pub system_uid: String,
    pub output_name: String,
    pub record_schema: RecordSchema,
    pub record_encoding: RecordEncoding,
    pub valid_time: TimeExtent,
    /// Starts at 1 and increases each time the output schema changes.
    pub version: u32,
}

impl Resource for DataStreamInfo {
    fn name(&self) -> &str {
        &self.output_name
    }

    fn description(&self) -> Option<&str> {
        Some(&self.record_schema.name)
    }
}

/// A feature of interest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    pub uid: String,
    pub name: String,
    pub description: Option<String>,
    pub geometry: Option<Geometry>,
    pub valid_time: Option<TimeExtent>,
    /// Unique id of the larger feature this one samples, if any.
    pub sampled_feature_uid: Option<String>,
}

impl Feature {
    pub fn new(uid: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            name: name.into(),
            description: None,
            geometry: None,
            valid_time: None,
            sampled_feature_uid: None,
        }
    }

    pub fn with_geometry(mut self, geometry: Geometry) -> Self {
        self.geometry = Some(geometry);
        self
    }
}

impl Resource for Feature {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }
}

impl FeatureLike for Feature {
    fn uid(&self) -> &str {
        &self.uid
    }

    fn valid_time(&self) -> Option<&TimeExtent> {
        self.valid_time.as_ref()
    }

    fn geometry(&self) -> Option<&Geometry> {
        self.geometry.as_ref()
    }
}

/// A single observation record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub datastream_id: ScopedId,
    /// Feature of interest, [`ScopedId::NONE`] if there is none.
    pub foi_id: ScopedId,
    pub phenomenon_time: DateTime<Utc>,
    pub result_time: DateTime<Utc>,
    pub result: Vec<DataValue>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn system_defaults_to_top_level() {
        let t = Utc.timestamp_opt(0, 0).single().expect("valid");
        let sys = SystemDescription::new("urn:x:s1", "Station 1", t).with_description("roof");
        assert!(sys.parent_id.is_none());
        assert_eq!(sys.description(), Some("roof"));
        assert!(sys.valid_time.has_open_end());
    }

    #[test]
    fn observation_serialises_ids_as_text() {
        let t = Utc.timestamp_opt(100, 0).single().expect("valid");
        let obs = Observation {
            datastream_id: ScopedId::from_long(1, 3).expect("valid"),
            foi_id: ScopedId::NONE,
            phenomenon_time: t,
            result_time: t,
            result: vec![DataValue::Double(21.5)],
        };
        let json = serde_json::to_value(&obs).expect("serialises");
        assert_eq!(json["foi_id"], "00");
        let back: Observation = serde_json::from_value(json).expect("deserialises");
        assert_eq!(back, obs);
    }
}
