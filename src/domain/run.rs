use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::Target;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum RunStateError {
    #[error("cannot move run from {from:?} to {to:?}")]
    IllegalTransition { from: RunStatus, to: RunStatus },
    #[error("target total already set to {0}")]
    TotalAlreadySet(usize),
    #[error("target total has not been set")]
    TotalUnknown,
    #[error("run already processed all {0} targets")]
    TooManyResults(usize),
}

/// Extracted landing page fields. Missing values are empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub title: String,
    pub hero: String,
    pub cta: String,
}

impl Summary {
    pub fn is_empty(&self) -> bool {
        self.title.is_empty() && self.hero.is_empty() && self.cta.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CompanyStatus {
    Done,
    Skipped,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompanyResult {
    pub name: String,
    pub website: String,
    pub summary: Summary,
    pub roast: String,
    pub screenshot_url: Option<String>,
    pub status: CompanyStatus,
    pub error_reason: Option<String>,
}

impl CompanyResult {
    pub fn done(
        target: &Target,
        summary: Summary,
        roast: String,
        screenshot_url: Option<String>,
    ) -> Self {
        CompanyResult {
            name: target.name.clone(),
            website: target.url.clone(),
            summary,
            roast,
            screenshot_url,
            status: CompanyStatus::Done,
            error_reason: None,
        }
    }

    pub fn skipped(target: &Target, reason: impl Into<String>) -> Self {
        Self::unfinished(target, CompanyStatus::Skipped, reason.into())
    }

    pub fn error(target: &Target, reason: impl Into<String>) -> Self {
        Self::unfinished(target, CompanyStatus::Error, reason.into())
    }

    fn unfinished(target: &Target, status: CompanyStatus, reason: String) -> Self {
        CompanyResult {
            name: target.name.clone(),
            website: target.url.clone(),
            summary: Summary::default(),
            roast: String::new(),
            screenshot_url: None,
            status,
            error_reason: Some(reason),
        }
    }
}

/// One end-to-end execution of the pipeline.
///
/// All mutation goes through the methods below, which refuse anything that
/// would move the status backwards, set the total twice or record more
/// results than there are targets.
#[derive(Debug, Clone, Serialize)]
pub struct Run {
    pub run_id: Uuid,
    pub status: RunStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub total_companies: Option<usize>,
    pub processed_companies: usize,
    pub results: Vec<CompanyResult>,
    pub error_message: Option<String>,
}

impl Run {
    pub fn new(run_id: Uuid, created_at: DateTime<Utc>) -> Self {
        Run {
            run_id,
            status: RunStatus::Pending,
            created_at,
            completed_at: None,
            total_companies: None,
            processed_companies: 0,
            results: vec![],
            error_message: None,
        }
    }

    pub fn start(&mut self) -> Result<(), RunStateError> {
        self.transition(RunStatus::Running)
    }

    pub fn set_total(&mut self, total: usize) -> Result<(), RunStateError> {
        if self.status != RunStatus::Running {
            return Err(RunStateError::IllegalTransition {
                from: self.status,
                to: RunStatus::Running,
            });
        }
        match self.total_companies {
            Some(existing) => Err(RunStateError::TotalAlreadySet(existing)),
            None => {
                self.total_companies = Some(total);
                Ok(())
            }
        }
    }

    pub fn record(&mut self, result: CompanyResult) -> Result<(), RunStateError> {
        if self.status != RunStatus::Running {
            return Err(RunStateError::IllegalTransition {
                from: self.status,
                to: RunStatus::Running,
            });
        }
        let total = self.total_companies.ok_or(RunStateError::TotalUnknown)?;
        if self.processed_companies >= total {
            return Err(RunStateError::TooManyResults(total));
        }

        self.results.push(result);
        self.processed_companies += 1;
        Ok(())
    }

    pub fn complete(&mut self, now: DateTime<Utc>) -> Result<(), RunStateError> {
        self.transition(RunStatus::Completed)?;
        self.completed_at = Some(now);
        Ok(())
    }

    pub fn fail(&mut self, message: impl Into<String>, now: DateTime<Utc>) -> Result<(), RunStateError> {
        self.transition(RunStatus::Failed)?;
        self.completed_at = Some(now);
        self.error_message = Some(message.into());
        Ok(())
    }

    fn transition(&mut self, to: RunStatus) -> Result<(), RunStateError> {
        let allowed = matches!(
            (self.status, to),
            (RunStatus::Pending, RunStatus::Running)
                | (RunStatus::Pending, RunStatus::Failed)
                | (RunStatus::Running, RunStatus::Completed)
                | (RunStatus::Running, RunStatus::Failed)
        );

        match allowed {
            true => {
                self.status = to;
                Ok(())
            }
            false => Err(RunStateError::IllegalTransition {
                from: self.status,
                to,
            }),
        }
    }
}

/// Events pushed to live subscribers of a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum RunEvent {
    Progress {
        status: RunStatus,
        total_companies: Option<usize>,
        processed_companies: usize,
    },
    Company(CompanyResult),
    Finished {
        total_companies: Option<usize>,
        processed_companies: usize,
    },
    Failed {
        error_reason: String,
    },
}

impl RunEvent {
    pub fn progress(run: &Run) -> Self {
        RunEvent::Progress {
            status: run.status,
            total_companies: run.total_companies,
            processed_companies: run.processed_companies,
        }
    }

    /// The event describing how `run` ended, if it has.
    pub fn terminal(run: &Run) -> Option<Self> {
        match run.status {
            RunStatus::Completed => Some(RunEvent::Finished {
                total_companies: run.total_companies,
                processed_companies: run.processed_companies,
            }),
            RunStatus::Failed => Some(RunEvent::Failed {
                error_reason: run.error_message.clone().unwrap_or_default(),
            }),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunEvent::Finished { .. } | RunEvent::Failed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn running_run(total: usize) -> Run {
        let mut run = Run::new(Uuid::new_v4(), Utc::now());
        run.start().unwrap();
        run.set_total(total).unwrap();
        run
    }

    fn target() -> Target {
        Target::from_url("https://example.com")
    }

    #[test]
    fn lifecycle_reaches_completed_once() {
        let mut run = running_run(1);
        run.record(CompanyResult::skipped(&target(), "failed to load"))
            .unwrap();
        run.complete(Utc::now()).unwrap();

        assert_eq!(run.status, RunStatus::Completed);
        assert!(run.completed_at.is_some());
        assert!(run.start().is_err());
        assert!(run.fail("late", Utc::now()).is_err());
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.error_message, None);
    }

    #[test]
    fn failed_run_is_terminal() {
        let mut run = Run::new(Uuid::new_v4(), Utc::now());
        run.start().unwrap();
        run.fail("no session", Utc::now()).unwrap();

        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.error_message.as_deref(), Some("no session"));
        assert_eq!(run.total_companies, None);
        assert!(run.complete(Utc::now()).is_err());
        assert!(run.set_total(3).is_err());
    }

    #[test]
    fn total_is_set_once_and_bounds_results() {
        let mut run = running_run(1);
        assert_eq!(run.set_total(5), Err(RunStateError::TotalAlreadySet(1)));

        run.record(CompanyResult::error(&target(), "boom")).unwrap();
        assert_eq!(
            run.record(CompanyResult::error(&target(), "boom")),
            Err(RunStateError::TooManyResults(1))
        );
        assert_eq!(run.processed_companies, run.results.len());
    }

    #[test]
    fn results_need_a_known_total() {
        let mut run = Run::new(Uuid::new_v4(), Utc::now());
        run.start().unwrap();
        assert_eq!(
            run.record(CompanyResult::error(&target(), "boom")),
            Err(RunStateError::TotalUnknown)
        );
    }

    #[test]
    fn unfinished_results_have_empty_fields() {
        let result = CompanyResult::skipped(&target(), "failed to load");

        assert_eq!(result.status, CompanyStatus::Skipped);
        assert!(result.summary.is_empty());
        assert!(result.roast.is_empty());
        assert_eq!(result.error_reason.as_deref(), Some("failed to load"));
    }

    #[test]
    fn events_serialize_with_tag() {
        let event = RunEvent::Failed {
            error_reason: "no session".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "failed");
        assert_eq!(json["error_reason"], "no session");

        let result = CompanyResult::done(&target(), Summary::default(), "meh.".into(), None);
        let json = serde_json::to_value(RunEvent::Company(result)).unwrap();
        assert_eq!(json["event"], "company");
        assert_eq!(json["status"], "done");
        assert_eq!(json["summary"]["hero"], "");
    }

    #[test]
    fn terminal_event_follows_status() {
        let mut run = running_run(0);
        assert_eq!(RunEvent::terminal(&run), None);

        run.complete(Utc::now()).unwrap();
        assert_eq!(
            RunEvent::terminal(&run),
            Some(RunEvent::Finished {
                total_companies: Some(0),
                processed_companies: 0
            })
        );
    }
}
