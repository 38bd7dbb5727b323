//! Step domain model

use crate::core::env::{describe, scalar_to_string, EnvError, EnvMap};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_yaml::{Mapping, Value};
use thiserror::Error;

/// Why a step could not be built from its YAML value
#[derive(Debug, Error, PartialEq)]
pub enum StepError {
    #[error("unknown step type {0:?}")]
    UnknownType(String),

    #[error("step must be a mapping or a string, got {0}")]
    InvalidShape(String),

    #[error("command must be a string or a list of strings")]
    InvalidCommand,

    #[error("group step is missing its steps")]
    MissingGroupSteps,

    #[error("group steps must be a list, got {0}")]
    InvalidGroupSteps(String),

    #[error("invalid env: {0}")]
    Env(#[from] EnvError),
}

/// A step error together with where in the pipeline it occurred
#[derive(Debug, Error, PartialEq)]
#[error("{path}: {source}")]
pub struct ModelError {
    pub path: String,
    #[source]
    pub source: StepError,
}

impl ModelError {
    pub fn new(path: impl Into<String>, source: impl Into<StepError>) -> Self {
        Self {
            path: path.into(),
            source: source.into(),
        }
    }
}

/// Access to the free-form key/value bag every step kind carries.
///
/// Filters and scanners work through this trait so they do not need to know
/// every step kind. Keys this crate interprets itself (`if_changed`, `skip`)
/// live in the bag.
pub trait FieldBag {
    fn fields(&self) -> &Mapping;

    fn fields_mut(&mut self) -> &mut Mapping;

    fn field(&self, key: &str) -> Option<&Value> {
        self.fields().get(key)
    }

    fn has_field(&self, key: &str) -> bool {
        self.fields().contains_key(key)
    }

    fn set_field(&mut self, key: &str, value: Value) {
        self.fields_mut().insert(Value::String(key.to_string()), value);
    }

    /// Remove a key, keeping the order of the remaining entries
    fn remove_field(&mut self, key: &str) -> Option<Value> {
        self.fields_mut().shift_remove(key)
    }
}

/// A step that runs a command on an agent
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandStep {
    pub command: String,
    pub env: Option<EnvMap>,
    pub remaining: Mapping,
}

/// A named group of nested steps
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupStep {
    pub group: Option<String>,
    pub steps: Vec<Step>,
    pub remaining: Mapping,
}

/// A step that triggers a build of another pipeline.
///
/// Kept as a raw mapping; nothing in the upload path needs typed fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TriggerStep {
    pub contents: Mapping,
}

/// A barrier between steps (`wait` / `waiter`)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WaitStep {
    pub contents: Mapping,
}

/// A step that pauses for human input (`block`, `input`, `manual`)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputStep {
    pub contents: Mapping,
}

/// A single step in a pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Command(CommandStep),
    Group(GroupStep),
    Trigger(TriggerStep),
    Wait(WaitStep),
    Input(InputStep),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StepKind {
    Command,
    Group,
    Trigger,
    Wait,
    Input,
}

impl StepKind {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "command" | "commands" | "script" => Some(Self::Command),
            "group" => Some(Self::Group),
            "trigger" => Some(Self::Trigger),
            "wait" | "waiter" => Some(Self::Wait),
            "block" | "input" | "manual" => Some(Self::Input),
            _ => None,
        }
    }

    /// Infer the kind from an explicit `type` key or from the keys present
    fn detect(mapping: &Mapping) -> Result<Self, StepError> {
        if let Some(kind) = mapping.get("type") {
            let name = kind
                .as_str()
                .ok_or_else(|| StepError::UnknownType(describe(kind)))?;
            return Self::from_name(name).ok_or_else(|| StepError::UnknownType(name.to_string()));
        }

        const PRIORITY: [(&str, StepKind); 10] = [
            ("command", StepKind::Command),
            ("commands", StepKind::Command),
            ("script", StepKind::Command),
            ("group", StepKind::Group),
            ("trigger", StepKind::Trigger),
            ("wait", StepKind::Wait),
            ("waiter", StepKind::Wait),
            ("block", StepKind::Input),
            ("input", StepKind::Input),
            ("manual", StepKind::Input),
        ];
        for (key, kind) in PRIORITY {
            if mapping.contains_key(key) {
                return Ok(kind);
            }
        }

        // A step with only plugins is a command step with no command
        if mapping.contains_key("plugins") {
            return Ok(StepKind::Command);
        }

        let keys: Vec<String> = mapping
            .keys()
            .filter_map(|k| k.as_str().map(str::to_string))
            .collect();
        Err(StepError::UnknownType(format!("mapping with keys [{}]", keys.join(", "))))
    }
}

impl Step {
    /// Build a step from a decoded YAML value
    pub fn from_value(value: Value) -> Result<Self, ModelError> {
        Self::from_value_at(value, "step")
    }

    pub(crate) fn from_value_at(value: Value, path: &str) -> Result<Self, ModelError> {
        match value {
            Value::String(s) => {
                let kind = StepKind::from_name(&s)
                    .ok_or_else(|| ModelError::new(path, StepError::UnknownType(s.clone())))?;
                let mut contents = Mapping::new();
                contents.insert(Value::String(s), Value::Null);
                match kind {
                    StepKind::Wait => Ok(Step::Wait(WaitStep { contents })),
                    StepKind::Input => Ok(Step::Input(InputStep { contents })),
                    _ => Err(ModelError::new(
                        path,
                        StepError::InvalidShape("a bare command or group name".to_string()),
                    )),
                }
            }
            Value::Mapping(mapping) => {
                let kind = StepKind::detect(&mapping).map_err(|e| ModelError::new(path, e))?;
                match kind {
                    StepKind::Command => CommandStep::from_mapping(mapping)
                        .map(Step::Command)
                        .map_err(|e| ModelError::new(path, e)),
                    StepKind::Group => GroupStep::from_mapping(mapping, path).map(Step::Group),
                    StepKind::Trigger => Ok(Step::Trigger(TriggerStep { contents: mapping })),
                    StepKind::Wait => Ok(Step::Wait(WaitStep { contents: mapping })),
                    StepKind::Input => Ok(Step::Input(InputStep { contents: mapping })),
                }
            }
            other => Err(ModelError::new(path, StepError::InvalidShape(describe(&other)))),
        }
    }

    /// Short name of the step kind, for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Step::Command(_) => "command",
            Step::Group(_) => "group",
            Step::Trigger(_) => "trigger",
            Step::Wait(_) => "wait",
            Step::Input(_) => "input",
        }
    }

    /// Human readable label, falling back to the step kind
    pub fn label(&self) -> String {
        if let Step::Group(group) = self {
            if let Some(name) = &group.group {
                return name.clone();
            }
        }
        ["label", "name", "key"]
            .iter()
            .find_map(|k| self.field(k).and_then(Value::as_str))
            .map(str::to_string)
            .unwrap_or_else(|| self.kind().to_string())
    }

    /// Whether the step carries a `skip` key
    pub fn is_skipped(&self) -> bool {
        self.has_field("skip")
    }

    /// Nested steps, for groups
    pub fn children(&self) -> &[Step] {
        match self {
            Step::Group(group) => &group.steps,
            _ => &[],
        }
    }
}

impl FieldBag for Step {
    fn fields(&self) -> &Mapping {
        match self {
            Step::Command(s) => &s.remaining,
            Step::Group(s) => &s.remaining,
            Step::Trigger(s) => &s.contents,
            Step::Wait(s) => &s.contents,
            Step::Input(s) => &s.contents,
        }
    }

    fn fields_mut(&mut self) -> &mut Mapping {
        match self {
            Step::Command(s) => &mut s.remaining,
            Step::Group(s) => &mut s.remaining,
            Step::Trigger(s) => &mut s.contents,
            Step::Wait(s) => &mut s.contents,
            Step::Input(s) => &mut s.contents,
        }
    }
}

impl CommandStep {
    fn from_mapping(mut mapping: Mapping) -> Result<Self, StepError> {
        let mut command = String::new();
        for key in ["command", "commands", "script"] {
            if let Some(value) = mapping.shift_remove(key) {
                command = command_text(value)?;
                break;
            }
        }

        let env = match mapping.shift_remove("env") {
            Some(value) => Some(EnvMap::from_value(&value)?),
            None => None,
        };

        Ok(Self {
            command,
            env,
            remaining: mapping,
        })
    }
}

fn command_text(value: Value) -> Result<String, StepError> {
    match value {
        Value::Null => Ok(String::new()),
        Value::Sequence(lines) => {
            let lines = lines
                .iter()
                .map(|line| scalar_to_string(line).ok_or(StepError::InvalidCommand))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(lines.join("\n"))
        }
        other => scalar_to_string(&other).ok_or(StepError::InvalidCommand),
    }
}

impl GroupStep {
    fn from_mapping(mut mapping: Mapping, path: &str) -> Result<Self, ModelError> {
        // A null or non-scalar name stays in the bag as written
        let group = mapping.get("group").and_then(scalar_to_string);
        if group.is_some() {
            mapping.shift_remove("group");
        }

        let steps = match mapping.shift_remove("steps") {
            Some(Value::Sequence(items)) => items
                .into_iter()
                .enumerate()
                .map(|(i, item)| Step::from_value_at(item, &format!("{}.steps[{}]", path, i)))
                .collect::<Result<Vec<_>, _>>()?,
            Some(other) => {
                return Err(ModelError::new(path, StepError::InvalidGroupSteps(describe(&other))))
            }
            None => return Err(ModelError::new(path, StepError::MissingGroupSteps)),
        };

        Ok(Self {
            group,
            steps,
            remaining: mapping,
        })
    }
}

impl Serialize for CommandStep {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        if !self.command.is_empty() {
            map.serialize_entry("command", &self.command)?;
        }
        if let Some(env) = &self.env {
            map.serialize_entry("env", env)?;
        }
        for (k, v) in &self.remaining {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl Serialize for GroupStep {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        if let Some(group) = &self.group {
            map.serialize_entry("group", group)?;
        }
        for (k, v) in &self.remaining {
            map.serialize_entry(k, v)?;
        }
        map.serialize_entry("steps", &self.steps)?;
        map.end()
    }
}

impl Serialize for Step {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Step::Command(step) => step.serialize(serializer),
            Step::Group(step) => step.serialize(serializer),
            Step::Trigger(TriggerStep { contents })
            | Step::Wait(WaitStep { contents })
            | Step::Input(InputStep { contents }) => contents.serialize(serializer),
        }
    }
}
