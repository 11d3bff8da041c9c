use crate::config::Config;
use crate::notify::{Notification, Notifier};
use crate::parser::extract_term_grades;
use crate::portal::{Portal, PortalError};
use crate::state::{SeenStore, StateError};
use crate::types::{CourseStatus, TermSnapshot};

/// Result of one polling cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// Grades were read but some courses are still ungraded.
    Pending { waiting: Vec<String> },
    /// Every course has a grade and the summary has been sent.
    Complete,
    /// The target term could not be read from the page.
    TermMissing { consecutive: u32 },
    /// Too many misses in a row; the session was re-established.
    Recovered,
    /// An unexpected dialog was dismissed.
    Interrupted,
    /// Anything else went wrong during the cycle.
    Faulted,
}

pub struct Watcher<'a, P, N> {
    config: &'a Config,
    portal: P,
    notifier: N,
    seen: SeenStore,
    failures: u32,
}

impl<'a, P: Portal, N: Notifier> Watcher<'a, P, N> {
    pub fn new(config: &'a Config, portal: P, notifier: N, seen: SeenStore) -> Self {
        Self {
            config,
            portal,
            notifier,
            seen,
            failures: 0,
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.failures
    }

    pub fn seen(&self) -> &SeenStore {
        &self.seen
    }

    pub fn portal(&self) -> &P {
        &self.portal
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    pub fn into_portal(self) -> P {
        self.portal
    }

    pub async fn start(&mut self) -> Result<(), PortalError> {
        self.portal.login().await?;
        self.portal.open_grades().await
    }

    /// Polls until every course of the target term has a grade.
    pub async fn run(&mut self) {
        loop {
            match self.poll_once().await {
                PollOutcome::Complete => return,
                PollOutcome::Pending { waiting } => {
                    let wait = self.config.refresh_interval();
                    log::info!("Still waiting on: {:?}", waiting);
                    log::info!("Refreshing in {} seconds", wait.as_secs());
                    tokio::time::sleep(wait).await;

                    if let Err(e) = self.portal.refresh().await {
                        log::error!("Failed to refresh grade page: {}", e);
                        tokio::time::sleep(self.config.retry_delay).await;
                    }
                }
                PollOutcome::Interrupted => {}
                PollOutcome::TermMissing { .. } | PollOutcome::Recovered | PollOutcome::Faulted => {
                    tokio::time::sleep(self.config.retry_delay).await;
                }
            }
        }
    }

    pub async fn poll_once(&mut self) -> PollOutcome {
        let config = self.config;
        let term = config.target_term.as_str();

        let extracted = match self.portal.page_tables().await {
            Ok(tables) => extract_term_grades(&tables, term).map_err(|e| e.to_string()),
            Err(PortalError::Dialog(text)) => {
                log::warn!("Dismissing unexpected dialog: {}", text);
                if let Err(e) = self.portal.dismiss_dialog().await {
                    log::error!("Failed to dismiss dialog: {}", e);
                }
                return PollOutcome::Interrupted;
            }
            Err(e) => Err(e.to_string()),
        };

        let snapshot = match extracted {
            Ok(snapshot) => snapshot,
            Err(reason) => return self.record_failure(&reason).await,
        };

        self.failures = 0;
        log::info!(
            "{}: {:?}",
            term,
            snapshot.iter().map(|r| r.course_code.as_str()).collect::<Vec<_>>()
        );

        if let Err(e) = self.process_snapshot(&snapshot).await {
            log::error!("Failed to record grades: {}", e);
            return PollOutcome::Faulted;
        }

        if snapshot.is_complete() {
            self.notifier.notify(&Notification::all_released(term)).await;
            log::info!("Every course in {} has a grade, stopping", term);
            return PollOutcome::Complete;
        }

        PollOutcome::Pending {
            waiting: snapshot.pending().into_iter().map(str::to_string).collect(),
        }
    }

    /// Notifies about grades not yet reported and records them, returning
    /// the number of notifications sent.
    pub async fn process_snapshot(&mut self, snapshot: &TermSnapshot) -> Result<usize, StateError> {
        let mut sent = 0;

        for record in snapshot.iter() {
            let code = record.course_code.as_str();

            match (record.grade, self.seen.status(code)) {
                (None, CourseStatus::Unseen) => {
                    self.seen.mark_awaiting(code)?;
                    log::info!("{} ({}) has no grade yet", code, snapshot.term);
                }
                (None, CourseStatus::AwaitingGrade) => {}
                (None, CourseStatus::Graded(previous)) => {
                    log::warn!(
                        "{} was graded {} but now shows no grade, keeping the recorded grade",
                        code,
                        previous
                    );
                }
                (Some(grade), CourseStatus::Graded(previous)) if previous == grade => {}
                (Some(grade), _) => {
                    log::info!("{} ({}) = {}", code, snapshot.term, grade);
                    self.notifier
                        .notify(&Notification::grade_released(code, &snapshot.term, grade))
                        .await;
                    self.seen.mark_graded(code, grade)?;
                    sent += 1;
                }
            }
        }

        Ok(sent)
    }

    async fn record_failure(&mut self, reason: &str) -> PollOutcome {
        self.failures += 1;
        log::warn!(
            "Cannot read term '{}', session may have expired ({}/{}): {}",
            self.config.target_term,
            self.failures,
            self.config.failure_threshold,
            reason
        );

        if self.failures < self.config.failure_threshold {
            return PollOutcome::TermMissing {
                consecutive: self.failures,
            };
        }

        log::info!("Logging in again");
        match self.start().await {
            Ok(()) => {
                self.failures = 0;
                PollOutcome::Recovered
            }
            Err(e) => {
                log::error!("Failed to re-establish session: {}", e);
                PollOutcome::Faulted
            }
        }
    }
}
