use chrono::Utc;
use tracing::{debug, error, info};

use super::{PipelineStep, ProgressReporter, StepKind, StepStatus};

/// Owns the step list of one run.
///
/// Every mutation of the current step is reported once, in order. Status and
/// progress never move backwards and a finished step is frozen.
pub struct StepTracker<'a> {
    steps: Vec<PipelineStep>,
    reporter: &'a dyn ProgressReporter,
}

impl<'a> StepTracker<'a> {
    pub fn new(reporter: &'a dyn ProgressReporter) -> Self {
        Self {
            steps: Vec::new(),
            reporter,
        }
    }

    pub fn steps(&self) -> &[PipelineStep] {
        &self.steps
    }

    pub fn current(&self) -> Option<&PipelineStep> {
        self.steps.last()
    }

    /// Open the next step; the previous one must be finished
    pub fn begin(&mut self, kind: StepKind, message: impl Into<String>) {
        debug_assert!(
            self.steps.last().is_none_or(|s| s.status.is_terminal() && s.kind < kind),
            "step {} started out of order",
            kind
        );

        let mut step = PipelineStep::new(kind);
        step.status = StepStatus::InProgress;
        step.message = message.into();
        step.started_at = Some(Utc::now());
        info!("▶ {}: {}", step.name, step.message);

        self.steps.push(step);
        self.emit();
    }

    /// Raise the current step's progress; lower values are clamped up
    pub fn advance(&mut self, progress: u8, message: impl Into<String>) {
        let Some(step) = self.open_step() else {
            return;
        };
        step.progress = step.progress.max(progress.min(99));
        step.message = message.into();
        debug!("{} {}%: {}", step.name, step.progress, step.message);
        self.emit();
    }

    pub fn complete(&mut self, message: impl Into<String>) {
        let Some(step) = self.open_step() else {
            return;
        };
        step.status = StepStatus::Completed;
        step.progress = 100;
        step.message = message.into();
        step.finished_at = Some(Utc::now());
        info!("✓ {}: {}", step.name, step.message);
        self.emit();
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        let Some(step) = self.open_step() else {
            return;
        };
        let error = error.into();
        step.status = StepStatus::Failed;
        step.message = format!("{} failed", step.name);
        step.error = Some(error.clone());
        step.finished_at = Some(Utc::now());
        error!("✗ {}: {}", step.name, error);
        self.emit();
    }

    pub fn into_steps(self) -> Vec<PipelineStep> {
        self.steps
    }

    fn open_step(&mut self) -> Option<&mut PipelineStep> {
        self.steps.last_mut().filter(|s| !s.status.is_terminal())
    }

    fn emit(&self) {
        if let Some(step) = self.steps.last() {
            self.reporter.report(step);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_progress_never_decreases() {
        let seen = Mutex::new(Vec::new());
        let reporter = |step: &PipelineStep| seen.lock().unwrap().push(step.progress);
        let mut tracker = StepTracker::new(&reporter);

        tracker.begin(StepKind::ValidateInput, "checking");
        tracker.advance(40, "half");
        tracker.advance(20, "lower");
        tracker.complete("done");

        assert_eq!(*seen.lock().unwrap(), vec![0, 40, 40, 100]);
    }

    #[test]
    fn test_finished_step_is_frozen() {
        let count = Mutex::new(0);
        let reporter = |_: &PipelineStep| *count.lock().unwrap() += 1;
        let mut tracker = StepTracker::new(&reporter);

        tracker.begin(StepKind::ValidateInput, "checking");
        tracker.fail("banner image missing");
        tracker.advance(50, "ignored");
        tracker.complete("ignored");

        assert_eq!(*count.lock().unwrap(), 2);
        let steps = tracker.into_steps();
        assert_eq!(steps[0].status, StepStatus::Failed);
        assert_eq!(steps[0].error.as_deref(), Some("banner image missing"));
        assert!(steps[0].finished_at.is_some());
    }

    #[test]
    fn test_advance_stays_below_completion() {
        let reporter = |_: &PipelineStep| {};
        let mut tracker = StepTracker::new(&reporter);

        tracker.begin(StepKind::ComposeVideo, "encoding");
        tracker.advance(250, "almost");

        assert_eq!(tracker.current().map(|s| s.progress), Some(99));
        assert_eq!(tracker.current().map(|s| s.status), Some(StepStatus::InProgress));
    }
}
