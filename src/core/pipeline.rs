//! Pipeline domain model

use crate::core::{
    env::{describe, EnvMap},
    step::{ModelError, Step, StepError},
};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_yaml::{Mapping, Value};

/// A pipeline definition as uploaded by a job
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pipeline {
    /// Pipeline steps, in source order
    pub steps: Vec<Step>,

    /// Pipeline level environment (`env:`), if declared
    pub env: Option<EnvMap>,

    /// Top level keys this crate does not model, kept for the server
    pub remaining: Mapping,
}

impl Pipeline {
    /// Build a pipeline from one decoded document.
    ///
    /// A bare list is shorthand for `steps:`; an empty document is an empty
    /// pipeline.
    pub fn from_value(value: Value) -> Result<Self, ModelError> {
        match value {
            Value::Null => Ok(Self::default()),
            Value::Sequence(items) => Ok(Self {
                steps: parse_steps(items)?,
                ..Self::default()
            }),
            Value::Mapping(mut mapping) => {
                let env = match mapping.shift_remove("env") {
                    Some(value) => Some(
                        EnvMap::from_value(&value)
                            .map_err(|e| ModelError::new("env", StepError::from(e)))?,
                    ),
                    None => None,
                };

                let steps = match mapping.shift_remove("steps") {
                    Some(Value::Sequence(items)) => parse_steps(items)?,
                    Some(Value::Null) | None => Vec::new(),
                    Some(other) => {
                        return Err(ModelError::new(
                            "steps",
                            StepError::InvalidGroupSteps(describe(&other)),
                        ))
                    }
                };

                Ok(Self {
                    steps,
                    env,
                    remaining: mapping,
                })
            }
            other => Err(ModelError::new(
                "pipeline",
                StepError::InvalidShape(describe(&other)),
            )),
        }
    }

    /// Total number of steps, counting those nested in groups
    pub fn step_count(&self) -> usize {
        fn count(steps: &[Step]) -> usize {
            steps.iter().map(|s| 1 + count(s.children())).sum()
        }
        count(&self.steps)
    }

    /// Number of steps (nested included) carrying a `skip` key
    pub fn skipped_count(&self) -> usize {
        fn count(steps: &[Step]) -> usize {
            steps
                .iter()
                .map(|s| usize::from(s.is_skipped()) + count(s.children()))
                .sum()
        }
        count(&self.steps)
    }

    /// The JSON body sent to the server
    pub fn to_json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }

    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}

fn parse_steps(items: Vec<Value>) -> Result<Vec<Step>, ModelError> {
    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| Step::from_value_at(item, &format!("steps[{}]", i)))
        .collect()
}

impl Serialize for Pipeline {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        for (k, v) in &self.remaining {
            map.serialize_entry(k, v)?;
        }
        if let Some(env) = &self.env {
            map.serialize_entry("env", env)?;
        }
        map.serialize_entry("steps", &self.steps)?;
        map.end()
    }
}
