//! Forward steps with backward compensation.
//!
//! A saga walks its steps in order. When one fails, every step that already
//! completed is compensated in reverse before the failure is returned, so the
//! caller never observes a failure ahead of its rollback.

use async_trait::async_trait;
use tracing::{debug, error, warn};

use super::error::ProvisioningError;

#[async_trait]
pub trait SagaStep<C: Send>: Send + Sync {
    fn name(&self) -> &'static str;

    async fn execute(&self, ctx: &mut C) -> Result<(), ProvisioningError>;

    /// Undo the remote effect of a completed `execute`. Steps without a
    /// remote effect keep the default no-op.
    async fn compensate(&self, _ctx: &mut C) -> Result<(), ProvisioningError> {
        Ok(())
    }
}

/// Failure of a saga run. `error` is always the forward failure that
/// triggered rollback, never a compensation error.
#[derive(Debug)]
pub struct SagaFailure {
    pub step: &'static str,
    pub error: ProvisioningError,
    pub compensation_failures: Vec<ProvisioningError>,
}

impl SagaFailure {
    pub fn into_error(self) -> ProvisioningError {
        self.error
    }
}

pub struct Saga<C: Send> {
    name: &'static str,
    steps: Vec<Box<dyn SagaStep<C>>>,
}

impl<C: Send> Saga<C> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            steps: Vec::new(),
        }
    }

    pub fn step(mut self, step: impl SagaStep<C> + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    pub async fn run(&self, ctx: &mut C) -> Result<(), SagaFailure> {
        let mut completed: Vec<&dyn SagaStep<C>> = Vec::with_capacity(self.steps.len());

        for step in &self.steps {
            debug!(saga = self.name, step = step.name(), "Executing saga step");
            match step.execute(ctx).await {
                Ok(()) => completed.push(step.as_ref()),
                Err(err) => {
                    warn!(
                        saga = self.name,
                        step = step.name(),
                        error = %err,
                        completed = completed.len(),
                        "Saga step failed, compensating"
                    );
                    let compensation_failures = self.compensate(&completed, ctx).await;
                    return Err(SagaFailure {
                        step: step.name(),
                        error: err,
                        compensation_failures,
                    });
                }
            }
        }

        Ok(())
    }

    async fn compensate(
        &self,
        completed: &[&dyn SagaStep<C>],
        ctx: &mut C,
    ) -> Vec<ProvisioningError> {
        let mut failures = Vec::new();

        for step in completed.iter().rev() {
            if let Err(err) = step.compensate(ctx).await {
                error!(
                    saga = self.name,
                    step = step.name(),
                    error = %err,
                    manual_intervention_required = true,
                    "Compensation failed"
                );
                failures.push(ProvisioningError::CompensationFailed {
                    step: step.name(),
                    message: err.to_string(),
                });
            }
        }

        failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Record {
        name: &'static str,
        fail: bool,
        fail_compensation: bool,
    }

    impl Record {
        fn ok(name: &'static str) -> Self {
            Self {
                name,
                fail: false,
                fail_compensation: false,
            }
        }
    }

    #[async_trait]
    impl SagaStep<Vec<String>> for Record {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn execute(&self, log: &mut Vec<String>) -> Result<(), ProvisioningError> {
            if self.fail {
                return Err(ProvisioningError::RemoteOperationFailed(self.name.to_string()));
            }
            log.push(format!("do:{}", self.name));
            Ok(())
        }

        async fn compensate(&self, log: &mut Vec<String>) -> Result<(), ProvisioningError> {
            if self.fail_compensation {
                return Err(ProvisioningError::RemoteOperationFailed("undo".to_string()));
            }
            log.push(format!("undo:{}", self.name));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_all_steps_run_in_order() {
        let saga = Saga::new("test").step(Record::ok("a")).step(Record::ok("b"));
        let mut log = Vec::new();
        saga.run(&mut log).await.unwrap();
        assert_eq!(log, vec!["do:a", "do:b"]);
    }

    #[tokio::test]
    async fn test_failure_compensates_completed_steps_in_reverse() {
        let saga = Saga::new("test")
            .step(Record::ok("a"))
            .step(Record::ok("b"))
            .step(Record {
                name: "c",
                fail: true,
                fail_compensation: false,
            })
            .step(Record::ok("d"));
        let mut log = Vec::new();

        let failure = saga.run(&mut log).await.unwrap_err();
        assert_eq!(failure.step, "c");
        assert!(failure.compensation_failures.is_empty());
        assert_eq!(log, vec!["do:a", "do:b", "undo:b", "undo:a"]);
    }

    #[tokio::test]
    async fn test_compensation_failure_keeps_original_error() {
        let saga = Saga::new("test")
            .step(Record {
                name: "a",
                fail: false,
                fail_compensation: true,
            })
            .step(Record::ok("b"))
            .step(Record {
                name: "c",
                fail: true,
                fail_compensation: false,
            });
        let mut log = Vec::new();

        let failure = saga.run(&mut log).await.unwrap_err();
        assert!(matches!(
            &failure.error,
            ProvisioningError::RemoteOperationFailed(msg) if msg == "c"
        ));
        assert_eq!(failure.compensation_failures.len(), 1);
        assert!(matches!(
            failure.compensation_failures[0],
            ProvisioningError::CompensationFailed { step: "a", .. }
        ));
        assert_eq!(log, vec!["do:a", "do:b", "undo:b"]);
    }
}
