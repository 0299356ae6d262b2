use std::future::Future;
use std::pin::Pin;

use log::{debug, error, warn};

use crate::error::{ProdhubError, StoreError};

type CompensationFuture = Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send>>;
type Compensation = Box<dyn FnOnce() -> CompensationFuture + Send>;

struct CompletedStep {
    name: &'static str,
    compensation: Option<Compensation>,
}

/// A multi-store operation as an ordered list of completed steps. When a
/// later step fails, `abort` runs the recorded compensations newest first.
/// Compensation is attempted once; failures are reported, never retried.
pub struct Saga {
    operation: &'static str,
    subject: String,
    completed: Vec<CompletedStep>,
}

impl Saga {
    pub fn begin(operation: &'static str, subject: impl Into<String>) -> Self {
        let subject = subject.into();
        debug!("[{}:{}] started", operation, subject);
        Self {
            operation,
            subject,
            completed: Vec::new(),
        }
    }

    pub fn set_subject(&mut self, subject: impl Into<String>) {
        self.subject = subject.into();
    }

    /// Records a step that has no side effect to undo
    pub fn step_done(&mut self, name: &'static str) {
        debug!("[{}:{}] step '{}' done", self.operation, self.subject, name);
        self.completed.push(CompletedStep {
            name,
            compensation: None,
        });
    }

    /// Records a completed step together with the action that undoes it
    pub fn step_done_with_compensation<F, Fut>(&mut self, name: &'static str, compensate: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), StoreError>> + Send + 'static,
    {
        debug!("[{}:{}] step '{}' done", self.operation, self.subject, name);
        self.completed.push(CompletedStep {
            name,
            compensation: Some(Box::new(move || Box::pin(compensate()) as CompensationFuture)),
        });
    }

    /// Unwinds after `cause`. Returns `cause` unchanged when every
    /// compensation succeeded, otherwise wraps it as a partial failure.
    pub async fn abort(self, cause: ProdhubError) -> ProdhubError {
        warn!(
            "[{}:{}] failed after {} step(s), compensating: {}",
            self.operation,
            self.subject,
            self.completed.len(),
            cause
        );

        let mut failures = Vec::new();
        for step in self.completed.into_iter().rev() {
            let Some(compensate) = step.compensation else {
                continue;
            };
            match compensate().await {
                Ok(()) => debug!(
                    "[{}:{}] compensated step '{}'",
                    self.operation, self.subject, step.name
                ),
                Err(e) => {
                    error!(
                        "[{}:{}] compensation for step '{}' failed, manual reconciliation needed: {}",
                        self.operation, self.subject, step.name, e
                    );
                    failures.push(format!("{}: {}", step.name, e));
                }
            }
        }

        if failures.is_empty() {
            cause
        } else {
            ProdhubError::Partial {
                source: Box::new(cause),
                compensation_error: failures.join("; "),
            }
        }
    }

    pub fn finish(self) {
        debug!(
            "[{}:{}] finished after {} step(s)",
            self.operation,
            self.subject,
            self.completed.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn cause() -> ProdhubError {
        ProdhubError::Persist {
            step: "last",
            message: "rejected".to_string(),
        }
    }

    #[tokio::test]
    async fn test_compensations_run_in_reverse_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut saga = Saga::begin("test", "s1");

        for name in ["first", "second", "third"] {
            let log = log.clone();
            saga.step_done_with_compensation(name, move || async move {
                log.lock().push(name);
                Ok::<(), StoreError>(())
            });
        }
        saga.step_done("read-only");

        let err = saga.abort(cause()).await;
        assert_eq!(err, cause());
        assert_eq!(*log.lock(), vec!["third", "second", "first"]);
    }

    #[tokio::test]
    async fn test_failed_compensation_marks_error_partial() {
        let mut saga = Saga::begin("test", "s2");
        saga.step_done_with_compensation("insert", || async {
            Err::<(), StoreError>(StoreError::Unavailable("gone".to_string()))
        });

        let err = saga.abort(cause()).await;
        assert!(err.is_partial());
        assert_eq!(err.root(), &cause());
        match err {
            ProdhubError::Partial {
                compensation_error, ..
            } => assert!(compensation_error.starts_with("insert:")),
            other => panic!("expected partial failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_remaining_compensations_run_after_one_fails() {
        let ran = Arc::new(Mutex::new(false));
        let mut saga = Saga::begin("test", "s3");
        {
            let ran = ran.clone();
            saga.step_done_with_compensation("early", move || async move {
                *ran.lock() = true;
                Ok::<(), StoreError>(())
            });
        }
        saga.step_done_with_compensation("late", || async {
            Err::<(), StoreError>(StoreError::Persist("nope".to_string()))
        });

        let err = saga.abort(cause()).await;
        assert!(err.is_partial());
        assert!(*ran.lock());
    }
}
