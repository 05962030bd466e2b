use std::path::Path;
use std::time::Duration;

use serde::Serialize;

use crate::error::{DatasetError, Result};
use crate::event::TimedEvent;

/// Name of the dataset served when none is requested.
pub const DEFAULT_DATASET: &str = "deep_research";

const DEEP_RESEARCH_JSON: &str = include_str!("../data/deep_research.json");
const QUICKSTART_JSON: &str = include_str!("../data/quickstart.json");

/// A named, timestamp-ordered list of events to replay.
///
/// Construction validates that timestamps never decrease and that every
/// event carries an id.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    name: String,
    events: Vec<TimedEvent>,
}

/// Listing entry for a dataset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetSummary {
    pub name: String,
    pub events: usize,
    pub duration_ms: u64,
}

impl Dataset {
    pub fn new(name: impl Into<String>, events: Vec<TimedEvent>) -> Result<Self> {
        validate(&events)?;
        Ok(Self {
            name: name.into(),
            events,
        })
    }

    /// Parse a JSON array of events.
    pub fn from_json(name: impl Into<String>, json: &str) -> Result<Self> {
        let events: Vec<TimedEvent> = serde_json::from_str(json)?;
        Self::new(name, events)
    }

    /// Load a JSON dataset from disk. The file stem becomes the name.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("custom")
            .to_string();
        let json = std::fs::read_to_string(path)?;
        let dataset = Self::from_json(name, &json)?;
        tracing::debug!(
            path = %path.display(),
            events = dataset.len(),
            "loaded dataset from file"
        );
        Ok(dataset)
    }

    /// Datasets compiled into the binary.
    pub fn builtin() -> Result<Vec<Self>> {
        Ok(vec![
            Self::from_json(DEFAULT_DATASET, DEEP_RESEARCH_JSON)?,
            Self::from_json("quickstart", QUICKSTART_JSON)?,
        ])
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn events(&self) -> &[TimedEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Offset of the last event from stream start.
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.events.last().map(|e| e.timestamp).unwrap_or(0))
    }

    /// Delay before each event, relative to the previous one.
    ///
    /// The first delay is the first timestamp itself. Summing the first `i+1`
    /// delays gives back `timestamp[i]`.
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        let mut previous = 0u64;
        self.events.iter().map(move |event| {
            let delay = event.timestamp - previous;
            previous = event.timestamp;
            Duration::from_millis(delay)
        })
    }

    pub fn summary(&self) -> DatasetSummary {
        DatasetSummary {
            name: self.name.clone(),
            events: self.events.len(),
            duration_ms: self.duration().as_millis() as u64,
        }
    }
}

fn validate(events: &[TimedEvent]) -> Result<()> {
    let mut previous = 0u64;
    for (index, event) in events.iter().enumerate() {
        if event.id.is_empty() {
            return Err(DatasetError::MissingRequired(format!("id of event #{index}")).into());
        }
        if event.timestamp < previous {
            return Err(DatasetError::OutOfOrder {
                id: event.id.clone(),
                timestamp: event.timestamp,
                previous,
            }
            .into());
        }
        previous = event.timestamp;
    }
    Ok(())
}
