use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::event_sourcing::core::{
    AttributeError, Attributes, DomainEvent, EventId, EventType, NumericArray, DOMAIN_EVENT_ID_ATTR,
    ENTITY_ID_ATTR,
};

// ============================================================================
// Sensor Events
// ============================================================================

/// A day's worth of samples from one sensor.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorReadingsRecorded {
    pub entity_id: String,
    pub domain_event_id: EventId,
    pub readings: NumericArray,
    pub sampled_on: NaiveDate,
    pub unit: String,
    pub calibration: BTreeMap<String, f64>,
}

impl SensorReadingsRecorded {
    pub fn new(sensor_id: &str, readings: NumericArray, sampled_on: NaiveDate, unit: &str) -> Self {
        Self {
            entity_id: sensor_id.to_string(),
            domain_event_id: EventId::new(),
            readings,
            sampled_on,
            unit: unit.to_string(),
            calibration: BTreeMap::new(),
        }
    }

    pub fn with_calibration(mut self, name: &str, value: f64) -> Self {
        self.calibration.insert(name.to_string(), value);
        self
    }
}

impl DomainEvent for SensorReadingsRecorded {
    fn entity_id(&self) -> &str {
        &self.entity_id
    }

    fn domain_event_id(&self) -> &EventId {
        &self.domain_event_id
    }

    fn state(&self) -> Attributes {
        Attributes::new()
            .with(ENTITY_ID_ATTR, self.entity_id.clone())
            .with(DOMAIN_EVENT_ID_ATTR, self.domain_event_id.clone())
            .with("readings", self.readings.clone())
            .with("sampled_on", self.sampled_on)
            .with("unit", self.unit.clone())
            .with("calibration", self.calibration.clone())
    }
}

impl EventType for SensorReadingsRecorded {
    const MODULE: &'static str = module_path!();
    const QUALNAME: &'static str = "Sensor.ReadingsRecorded";

    fn from_state(mut state: Attributes) -> Result<Self, AttributeError> {
        Ok(Self {
            entity_id: state.take(ENTITY_ID_ATTR)?,
            domain_event_id: state.take(DOMAIN_EVENT_ID_ATTR)?,
            readings: state.take("readings")?,
            sampled_on: state.take("sampled_on")?,
            unit: state.take("unit")?,
            calibration: state.take("calibration")?,
        })
    }
}
