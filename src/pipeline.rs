use std::{error::Error, fmt::Display, sync::Arc};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::executor::{ERROR_FIELD, QueryExecutor, RowSet, fold_execution};
use crate::gate::GatePolicy;
use crate::synthesis::Synthesizer;

const NO_DATA: &str = "No data";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub body: String,
    pub sender: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    pub text: String,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Stage {
    Received,
    Synthesizing,
    Gating,
    Executing,
    Answering,
    Responded,
}

impl Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Received => write!(f, "received"),
            Stage::Synthesizing => write!(f, "synthesizing"),
            Stage::Gating => write!(f, "gating"),
            Stage::Executing => write!(f, "executing"),
            Stage::Answering => write!(f, "answering"),
            Stage::Responded => write!(f, "responded"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    EmptyInput,
    SynthesisFailure { cause: String },
    InadmissibleStatement { statement: String },
    ExecutionFailure { cause: String },
    AnswerSynthesisFailure { cause: String },
}

impl PipelineError {
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::EmptyInput => Stage::Received,
            PipelineError::SynthesisFailure { .. } => Stage::Synthesizing,
            PipelineError::InadmissibleStatement { .. } => Stage::Gating,
            PipelineError::ExecutionFailure { .. } => Stage::Executing,
            PipelineError::AnswerSynthesisFailure { .. } => Stage::Answering,
        }
    }
}

impl Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineError::EmptyInput => write!(f, "Empty message."),
            PipelineError::SynthesisFailure { cause } => write!(f, "AI SQL error: {cause}"),
            PipelineError::InadmissibleStatement { .. } => {
                write!(f, "I can only answer data questions.")
            }
            PipelineError::ExecutionFailure { cause } => write!(f, "Query error: {cause}"),
            PipelineError::AnswerSynthesisFailure { cause } => {
                write!(f, "AI answer error: {cause}")
            }
        }
    }
}

impl Error for PipelineError {}

fn usable_rows(rows: RowSet) -> Result<RowSet, PipelineError> {
    let Some(first) = rows.first() else {
        return Err(PipelineError::ExecutionFailure {
            cause: NO_DATA.into(),
        });
    };
    if let Some(cause) = first.get(ERROR_FIELD) {
        let cause = match cause.as_str() {
            Some(cause) => cause.to_string(),
            None => cause.to_string(),
        };
        return Err(PipelineError::ExecutionFailure { cause });
    }
    Ok(rows)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transcript {
    pub statement: Option<String>,
    pub outcome: Result<String, PipelineError>,
}

impl Transcript {
    pub fn reply(&self) -> Reply {
        let text = match &self.outcome {
            Ok(answer) => answer.clone(),
            Err(err) => err.to_string(),
        };
        Reply { text }
    }
}

pub struct Pipeline {
    schema: String,
    synthesizer: Synthesizer,
    gate: GatePolicy,
    executor: Arc<dyn QueryExecutor>,
}

impl Pipeline {
    pub fn new(
        schema: String,
        synthesizer: Synthesizer,
        gate: GatePolicy,
        executor: Arc<dyn QueryExecutor>,
    ) -> Self {
        Self {
            schema,
            synthesizer,
            gate,
            executor,
        }
    }

    pub async fn respond(&self, message: &InboundMessage) -> Reply {
        self.run(&message.body).await.reply()
    }

    pub async fn run(&self, body: &str) -> Transcript {
        let mut statement = None;
        let outcome = self.advance(body.trim(), &mut statement).await;
        match &outcome {
            Ok(_) => info!("Stage {}", Stage::Responded),
            Err(err @ (PipelineError::EmptyInput | PipelineError::InadmissibleStatement { .. })) => {
                info!("Stopped while {}: {err:?}", err.stage())
            }
            Err(err) => warn!("Stopped while {}: {err}", err.stage()),
        }
        Transcript { statement, outcome }
    }

    async fn advance(
        &self,
        question: &str,
        statement_out: &mut Option<String>,
    ) -> Result<String, PipelineError> {
        if question.is_empty() {
            return Err(PipelineError::EmptyInput);
        }

        debug!("Stage {}", Stage::Synthesizing);
        let statement = self
            .synthesizer
            .synthesize_query(question, &self.schema)
            .await
            .map_err(|err| PipelineError::SynthesisFailure {
                cause: err.to_string(),
            })?;
        *statement_out = Some(statement.clone());

        debug!("Stage {}", Stage::Gating);
        if !self.gate.admits(&statement) {
            return Err(PipelineError::InadmissibleStatement { statement });
        }

        debug!("Stage {}", Stage::Executing);
        let rows = usable_rows(fold_execution(self.executor.execute(&statement).await))?;

        debug!("Stage {} with {} rows", Stage::Answering, rows.len());
        self.synthesizer
            .synthesize_answer(question, &rows)
            .await
            .map_err(|err| PipelineError::AnswerSynthesisFailure {
                cause: err.to_string(),
            })
    }
}
