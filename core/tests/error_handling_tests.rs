// tests/error_handling_tests.rs
mod common;

use atelier_flow::{ContextData, FlowError, Pipeline, PipelineControl};
use common::*;
use serial_test::serial;

#[tokio::test]
#[serial]
async fn test_hook_on_unknown_step_fails_run() {
  setup_tracing();
  let mut pipeline = Pipeline::<TestContext, TestError>::new(&[("real", false, None)]);
  pipeline.on_step("real", create_simple_handler("real", "R"));
  pipeline.on_step("typo", create_simple_handler("typo", "T"));

  let ctx = ContextData::new(TestContext::default());
  let result = pipeline.run(ctx.clone()).await;

  match result {
    Err(TestError::Flow(s)) => assert!(s.contains("StepNotFound") && s.contains("typo")),
    other => panic!("Expected StepNotFound, got {other:?}"),
  }
  assert!(ctx.read().steps_executed.is_empty());
}

#[tokio::test]
#[serial]
async fn test_pipeline_with_flow_error_type() {
  setup_tracing();
  let mut pipeline = Pipeline::<TestContext, FlowError>::new(&[("fail_task", false, None)]);
  pipeline.on_step("fail_task", |_ctx: ContextData<TestContext>| async move {
    Err::<PipelineControl, _>(anyhow::anyhow!("downstream unavailable"))
  });

  let result = pipeline.run(ContextData::new(TestContext::default())).await;
  match result {
    Err(FlowError::Handler { source }) => assert_eq!(source.to_string(), "downstream unavailable"),
    other => panic!("Expected FlowError::Handler, got {other:?}"),
  }
}
