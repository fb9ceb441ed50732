use std::{collections::BTreeMap, fmt::Display, str::FromStr};

use log::warn;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::PrimaryKey;

/// The literal key of the step-set every viewer falls back to
pub const DEFAULT_KEY: &str = "default";

/// Identifies one sequence of steps in a [StepSet].
///
/// User ids are numeric, so they can never collide with [DEFAULT_KEY].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StepSetKey {
    Default,
    User(PrimaryKey),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StepSetError {
    #[error("{0} is neither \"default\" nor a user id")]
    InvalidKey(String),
    #[error("Step-set {key} has no step at index {index}")]
    IndexOutOfRange { key: StepSetKey, index: usize },
}

impl Display for StepSetKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepSetKey::Default => f.write_str(DEFAULT_KEY),
            StepSetKey::User(id) => write!(f, "{}", id),
        }
    }
}

impl FromStr for StepSetKey {
    type Err = StepSetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == DEFAULT_KEY {
            return Ok(StepSetKey::Default);
        }

        s.parse()
            .map(StepSetKey::User)
            .map_err(|_| StepSetError::InvalidKey(s.to_string()))
    }
}

impl Serialize for StepSetKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for StepSetKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let key = String::deserialize(deserializer)?;
        key.parse().map_err(de::Error::custom)
    }
}

/// One instruction: a description and the images that illustrate it
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    #[serde(default)]
    pub image_urls: Vec<String>,
    #[serde(default)]
    pub description: String,
}

impl Step {
    pub fn new(description: impl Into<String>, image_urls: Vec<String>) -> Self {
        Self {
            image_urls,
            description: description.into(),
        }
    }
}

/// The instructions of a room: a default sequence of steps,
/// plus sparse per-user overrides.
///
/// The default key is always present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct StepSet(BTreeMap<StepSetKey, Vec<Step>>);

/// The shapes a stored step-set can be found in
enum StoredSteps<'a> {
    /// The current shape, keyed by [StepSetKey]
    Keyed(&'a Map<String, Value>),
    /// A bare array of steps whose descriptions were maps with a `default` entry
    Legacy(&'a [Value]),
    /// Null or anything unrecognizable
    Malformed,
}

impl<'a> StoredSteps<'a> {
    fn classify(raw: &'a Value) -> Self {
        match raw {
            Value::Object(map) if map.values().any(Value::is_array) => Self::Keyed(map),
            Value::Array(steps) => Self::Legacy(steps),
            _ => Self::Malformed,
        }
    }
}

impl StepSet {
    /// Creates a step-set with only an empty default sequence
    pub fn new() -> Self {
        Self::from_entries(BTreeMap::new())
    }

    /// Creates a step-set from entries, adding an empty default sequence if it is missing
    pub fn from_entries(mut entries: BTreeMap<StepSetKey, Vec<Step>>) -> Self {
        entries.entry(StepSetKey::Default).or_default();
        Self(entries)
    }

    /// Normalizes a stored step-set, whatever shape it was written in.
    ///
    /// Applying this to the serialized output of a previous call yields the same step-set.
    pub fn migrate(raw: &Value) -> Self {
        match StoredSteps::classify(raw) {
            StoredSteps::Keyed(map) => Self::from_keyed(map),
            StoredSteps::Legacy(steps) => {
                let steps = steps.iter().map(flatten_legacy_step).collect();
                Self::from_entries(BTreeMap::from([(StepSetKey::Default, steps)]))
            }
            StoredSteps::Malformed => Self::new(),
        }
    }

    fn from_keyed(map: &Map<String, Value>) -> Self {
        let entries = map
            .iter()
            .filter_map(|(key, value)| {
                let key = match key.parse::<StepSetKey>() {
                    Ok(key) => key,
                    Err(e) => {
                        warn!("Dropping stored steps: {}", e);
                        return None;
                    }
                };

                let steps = value
                    .as_array()?
                    .iter()
                    .filter_map(|s| Step::deserialize(s).ok())
                    .collect();

                Some((key, steps))
            })
            .collect();

        Self::from_entries(entries)
    }

    /// Returns the steps a viewer should see: their own if they have any, otherwise the default ones
    pub fn resolve(&self, viewer_id: PrimaryKey) -> &[Step] {
        self.0
            .get(&StepSetKey::User(viewer_id))
            .filter(|steps| !steps.is_empty())
            .or_else(|| self.0.get(&StepSetKey::Default))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn default_steps(&self) -> &[Step] {
        self.get(StepSetKey::Default).unwrap_or(&[])
    }

    pub fn get(&self, key: StepSetKey) -> Option<&[Step]> {
        self.0.get(&key).map(Vec::as_slice)
    }

    /// Replaces the steps of a key
    pub fn set(&mut self, key: StepSetKey, steps: Vec<Step>) {
        self.0.insert(key, steps);
    }

    pub fn keys(&self) -> impl Iterator<Item = StepSetKey> + '_ {
        self.0.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (StepSetKey, &[Step])> {
        self.0.iter().map(|(k, v)| (*k, v.as_slice()))
    }

    /// Appends an empty step to a key, creating the key if needed
    pub fn push_step(&mut self, key: StepSetKey) -> &mut Step {
        let steps = self.0.entry(key).or_default();
        let index = steps.len();
        steps.push(Step::default());

        &mut steps[index]
    }

    /// Removes the step at an index, shifting the ones after it
    pub fn remove_step(&mut self, key: StepSetKey, index: usize) -> Result<Step, StepSetError> {
        match self.0.get_mut(&key) {
            Some(steps) if index < steps.len() => Ok(steps.remove(index)),
            _ => Err(StepSetError::IndexOutOfRange { key, index }),
        }
    }

    /// Edits the description and/or images of the step at an index
    pub fn edit_step(
        &mut self,
        key: StepSetKey,
        index: usize,
        description: Option<String>,
        image_urls: Option<Vec<String>>,
    ) -> Result<&Step, StepSetError> {
        let step = self
            .0
            .get_mut(&key)
            .and_then(|steps| steps.get_mut(index))
            .ok_or(StepSetError::IndexOutOfRange { key, index })?;

        if let Some(description) = description {
            step.description = description;
        }
        if let Some(image_urls) = image_urls {
            step.image_urls = image_urls;
        }

        Ok(step)
    }
}

impl Default for StepSet {
    fn default() -> Self {
        Self::new()
    }
}

impl<'de> Deserialize<'de> for StepSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        BTreeMap::deserialize(deserializer).map(Self::from_entries)
    }
}

fn flatten_legacy_step(step: &Value) -> Step {
    let image_urls = step
        .get("imageUrls")
        .and_then(Value::as_array)
        .map(|urls| {
            urls.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let description = step
        .get("description")
        .and_then(|d| d.get(DEFAULT_KEY))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    Step {
        image_urls,
        description,
    }
}
