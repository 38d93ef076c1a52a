// core/src/pipeline/execution.rs

//! `Pipeline::run`: step execution and reverse-order compensation.

use crate::core::context_data::ContextData;
use crate::core::control::{PipelineControl, PipelineResult};
use crate::error::FlowError;
use crate::pipeline::definition::{Handler, Pipeline};
use tracing::{event, instrument, Instrument, Level};

enum PhaseOutcome<Err> {
  Continue,
  Stopped,
  Failed(Err),
}

impl<TData, Err> Pipeline<TData, Err>
where
  TData: 'static + Send + Sync,
  Err: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  async fn run_phase(
    &self,
    phase: &'static str,
    handlers: Option<&Vec<Handler<TData, Err>>>,
    ctx_data: &ContextData<TData>,
  ) -> PhaseOutcome<Err> {
    let Some(handlers) = handlers else {
      return PhaseOutcome::Continue;
    };
    for (handler_idx, handler_fn) in handlers.iter().enumerate() {
      let span = tracing::debug_span!("handler", phase, handler_index = handler_idx);
      match handler_fn(ctx_data.clone()).instrument(span).await {
        Ok(PipelineControl::Continue) => {}
        Ok(PipelineControl::Stop) => {
          event!(Level::INFO, phase, "Pipeline stopped by handler.");
          return PhaseOutcome::Stopped;
        }
        Err(e) => {
          event!(Level::ERROR, phase, error = %e, "Handler failed.");
          return PhaseOutcome::Failed(e);
        }
      }
    }
    PhaseOutcome::Continue
  }

  /// Undoes completed steps, newest first. Failures are logged, never returned.
  async fn compensate(&self, completed: &[&str], ctx_data: &ContextData<TData>) {
    for step_name in completed.iter().rev() {
      let Some(handlers) = self.compensations.get(*step_name) else {
        continue;
      };
      event!(Level::WARN, step_name, "Compensating completed step.");
      for handler_fn in handlers {
        if let Err(e) = handler_fn(ctx_data.clone()).await {
          event!(Level::ERROR, step_name, error = %e, "Compensation handler failed.");
        }
      }
    }
  }

  /// Executes every step against `ctx_data`.
  ///
  /// On the first handler error the compensations of all completed steps run
  /// in reverse order and the original error is returned.
  #[instrument(
    name = "Pipeline::run",
    skip_all,
    fields(
      context_type = %std::any::type_name::<TData>(),
      num_steps = self.steps.len(),
    ),
    err(Display)
  )]
  pub async fn run(&self, ctx_data: ContextData<TData>) -> Result<PipelineResult, Err> {
    if let Some(step_name) = self.unknown_steps.first() {
      return Err(Err::from(FlowError::StepNotFound {
        step_name: step_name.clone(),
      }));
    }

    let mut completed: Vec<&str> = Vec::with_capacity(self.steps.len());

    for (step_idx, step_def) in self.steps.iter().enumerate() {
      let step_name = step_def.name.as_str();
      let step_span = tracing::info_span!("step", step_name, step_index = step_idx);

      let skipped = step_def.skip_if.as_ref().is_some_and(|skip_if| skip_if(ctx_data.clone()));
      if skipped {
        step_span.in_scope(|| event!(Level::DEBUG, "Step skipped."));
        continue;
      }

      let before = self.before.get(step_name).filter(|v| !v.is_empty());
      let on = self.on.get(step_name).filter(|v| !v.is_empty());
      let after = self.after.get(step_name).filter(|v| !v.is_empty());

      if before.is_none() && on.is_none() && after.is_none() {
        if step_def.optional {
          step_span.in_scope(|| event!(Level::DEBUG, "Optional step has no handlers, skipping."));
          continue;
        }
        self.compensate(&completed, &ctx_data).await;
        return Err(Err::from(FlowError::HandlerMissing {
          step_name: step_def.name.clone(),
        }));
      }

      for (phase, handlers) in [("before", before), ("on", on), ("after", after)] {
        match self.run_phase(phase, handlers, &ctx_data).instrument(step_span.clone()).await {
          PhaseOutcome::Continue => {}
          PhaseOutcome::Stopped => return Ok(PipelineResult::Stopped),
          PhaseOutcome::Failed(e) if step_def.optional => {
            event!(Level::WARN, step_name, error = %e, "Optional step failed, continuing.");
            break;
          }
          PhaseOutcome::Failed(e) => {
            self.compensate(&completed, &ctx_data).await;
            return Err(e);
          }
        }
      }
      completed.push(step_name);
    }

    event!(Level::DEBUG, "Pipeline completed.");
    Ok(PipelineResult::Completed)
  }
}
