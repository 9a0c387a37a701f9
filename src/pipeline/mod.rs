//! Request-security pipeline.
//!
//! # Data Flow
//! ```text
//! Incoming request (adapted by http/server.rs)
//!     → RequestContext
//!     → stage 1 → stage 2 → ... → stage N
//!     → Continue: handed to the application handler
//!     → Reject:   chain terminates with a structured JSON error
//! ```
//!
//! # Design Decisions
//! - Stage order is an explicit list, not framework chaining; the runner
//!   owns composition
//! - Stages are pure transforms over an owned context; the runner
//!   substitutes the returned context, so no stage sees hidden aliasing
//! - Any stage may short-circuit; rejections are final for the request

pub mod context;

use futures_util::future::BoxFuture;

pub use context::{ErrorCode, FileUpload, Identity, Rejection, RequestContext, Role};

/// Result of applying one stage to a request.
pub enum StageOutcome {
    /// Hand the (possibly transformed) context to the next stage.
    Continue(RequestContext),
    /// Terminate the chain with a structured error response.
    Reject(Rejection),
}

/// One stage of the security pipeline.
///
/// Most stages resolve synchronously; the trait is async-shaped so the
/// delay governor can suspend cooperatively without blocking the runtime.
pub trait Stage: Send + Sync {
    /// Stable name used in logs and metrics.
    fn name(&self) -> &'static str;

    fn apply<'a>(&'a self, ctx: RequestContext) -> BoxFuture<'a, StageOutcome>;
}

/// An ordered chain of stages.
pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
}

impl Pipeline {
    pub fn new(stages: Vec<Box<dyn Stage>>) -> Self {
        Self { stages }
    }

    pub fn builder() -> PipelineBuilder {
        PipelineBuilder { stages: Vec::new() }
    }

    /// Run the context through every stage in order.
    ///
    /// Returns the final context on success, or the first rejection.
    pub async fn run(&self, mut ctx: RequestContext) -> Result<RequestContext, Rejection> {
        for stage in &self.stages {
            match stage.apply(ctx).await {
                StageOutcome::Continue(next) => ctx = next,
                StageOutcome::Reject(rejection) => {
                    tracing::debug!(
                        stage = stage.name(),
                        code = rejection.code.as_str(),
                        status = rejection.status.as_u16(),
                        "Request rejected"
                    );
                    crate::observability::metrics::record_rejection(
                        stage.name(),
                        rejection.code.as_str(),
                    );
                    return Err(rejection);
                }
            }
        }
        Ok(ctx)
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }
}

pub struct PipelineBuilder {
    stages: Vec<Box<dyn Stage>>,
}

impl PipelineBuilder {
    pub fn stage(mut self, stage: impl Stage + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    pub fn build(self) -> Pipeline {
        Pipeline::new(self.stages)
    }
}
