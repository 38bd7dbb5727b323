//! Multi-document pipeline parsing and interpolation
//!
//! Raw bytes may hold several `---` separated YAML (or JSON) documents. Each
//! one is decoded, interpolated against the runtime environment, and turned
//! into a [`Pipeline`] only when the consumer asks for it.

pub mod interpolate;

pub use interpolate::{interpolate, interpolate_document, interpolate_value, InterpolationError};

use crate::core::{env::Environment, step::ModelError, Pipeline, RunContext};
use serde::Deserialize;
use serde_yaml::Value;
use thiserror::Error;
use tracing::debug;

/// Why a single document could not be turned into a pipeline
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("document {document}: {source}")]
    Yaml {
        document: usize,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("document {document}: interpolation failed: {source}")]
    Interpolation {
        document: usize,
        #[source]
        source: InterpolationError,
    },

    #[error("document {document}: {source}")]
    Model {
        document: usize,
        #[source]
        source: ModelError,
    },

    #[error("parsing cancelled")]
    Cancelled,
}

impl ParseError {
    /// 1-based index of the failing document, when known
    pub fn document(&self) -> Option<usize> {
        match self {
            ParseError::Yaml { document, .. }
            | ParseError::Interpolation { document, .. }
            | ParseError::Model { document, .. } => Some(*document),
            ParseError::Cancelled => None,
        }
    }
}

/// Lazy sequence of pipelines, one per document.
///
/// Single pass: each call to `next` decodes exactly one more document.
/// Nothing stops the caller from pulling past an error, but every caller in
/// this crate stops at the first one.
pub struct DocumentStream<'a> {
    documents: serde_yaml::Deserializer<'a>,
    env: &'a Environment,
    ctx: &'a RunContext,
    interpolate: bool,
    index: usize,
    cancelled: bool,
}

/// Start decoding `input`, interpolating against `env` unless `interpolate`
/// is false
pub fn parse_and_interpolate<'a>(
    ctx: &'a RunContext,
    input: &'a [u8],
    env: &'a Environment,
    interpolate: bool,
) -> DocumentStream<'a> {
    DocumentStream {
        documents: serde_yaml::Deserializer::from_slice(input),
        env,
        ctx,
        interpolate,
        index: 0,
        cancelled: false,
    }
}

impl<'a> DocumentStream<'a> {
    /// Number of documents pulled so far
    pub fn documents_read(&self) -> usize {
        self.index
    }

    fn decode(&self, document: serde_yaml::Deserializer<'a>) -> Result<Pipeline, ParseError> {
        let index = self.index;
        let mut value = Value::deserialize(document).map_err(|source| ParseError::Yaml {
            document: index,
            source,
        })?;

        if self.interpolate {
            interpolate_document(&mut value, self.env, self.ctx.prefers_runtime_env()).map_err(
                |source| ParseError::Interpolation {
                    document: index,
                    source,
                },
            )?;
        }

        let pipeline = Pipeline::from_value(value).map_err(|source| ParseError::Model {
            document: index,
            source,
        })?;
        debug!(
            document = index,
            steps = pipeline.step_count(),
            interpolated = self.interpolate,
            "Decoded pipeline document"
        );
        Ok(pipeline)
    }
}

impl<'a> Iterator for DocumentStream<'a> {
    type Item = Result<Pipeline, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cancelled {
            return None;
        }
        if self.ctx.cancel.is_cancelled() {
            self.cancelled = true;
            return Some(Err(ParseError::Cancelled));
        }

        let document = self.documents.next()?;
        self.index += 1;
        Some(self.decode(document))
    }
}
