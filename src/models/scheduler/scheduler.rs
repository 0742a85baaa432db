use crate::{Criticality, Task, TaskSet, TimeStep};

/// Per-run counters shared by every scheduling policy.
///
/// Zeroed at the start of each `schedule` call, monotonically incremented
/// during the run, read once the run completes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Metrics {
    pub(crate) succeeded_low: usize,
    pub(crate) failed_low: usize,
    pub(crate) succeeded_high: usize,
    pub(crate) failed_high: usize,
    pub(crate) succeeded_interrupt: usize,
    pub(crate) failed_interrupt: usize,
    pub(crate) switches: usize,
}

impl Metrics {
    pub(crate) fn clear(&mut self) {
        *self = Metrics::default();
    }

    /// Record a job outcome, keeping Interrupt jobs in their own bucket.
    pub(crate) fn record(&mut self, criticality: Criticality, success: bool) {
        let counter = match (criticality, success) {
            (Criticality::Low, true) => &mut self.succeeded_low,
            (Criticality::Low, false) => &mut self.failed_low,
            (Criticality::High, true) => &mut self.succeeded_high,
            (Criticality::High, false) => &mut self.failed_high,
            (Criticality::Interrupt, true) => &mut self.succeeded_interrupt,
            (Criticality::Interrupt, false) => &mut self.failed_interrupt,
        };
        *counter += 1;
    }

    /// Record a job outcome with Interrupt jobs folded into the High bucket,
    /// the convention of the mode-switching policies.
    pub(crate) fn record_merged(&mut self, criticality: Criticality, success: bool) {
        let merged = match criticality {
            Criticality::Low => Criticality::Low,
            _ => Criticality::High,
        };
        self.record(merged, success);
    }

    fn ratio(succeeded: usize, failed: usize) -> f64 {
        if succeeded + failed == 0 {
            return 1.0;
        }
        succeeded as f64 / (succeeded + failed) as f64
    }

    pub fn low_success_ratio(&self) -> f64 {
        Self::ratio(self.succeeded_low, self.failed_low)
    }

    pub fn high_success_ratio(&self) -> f64 {
        Self::ratio(self.succeeded_high, self.failed_high)
    }

    pub fn interrupt_success_ratio(&self) -> f64 {
        Self::ratio(self.succeeded_interrupt, self.failed_interrupt)
    }

    pub fn context_switches(&self) -> usize {
        self.switches
    }
}

/// Lifecycle of one task's current job.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Lifecycle {
    Idle,
    Ready,
    Running,
    /// RED only: denied admission, still pending until its deadline.
    Rejected,
}

/// Operating level, used both per task (FMC family) and system-wide (EDF-VD).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum CritLevel {
    LowMode,
    HighMode,
}

/// Dynamic state of one task, owned by the active scheduler instance and
/// rebuilt from the task list at the start of every run.
#[derive(Clone, Debug)]
pub(crate) struct TaskState {
    pub lifecycle: Lifecycle,
    pub level: CritLevel,
    pub wakeup_time: TimeStep,
    pub absolute_deadline: TimeStep,
    pub scheduling_deadline: TimeStep,
    /// Current scaled execution budget (FMC). Signed: repeated budget
    /// degradation can drive the scale factor below zero.
    pub low_budget: i64,
    pub exe_time: TimeStep,
    pub job_index: usize,
    pub enabled: bool,
    /// Inclusive prefix WCET sum of the RED ready queue up to this entry.
    pub wcet: TimeStep,
}

impl TaskState {
    /// State of a task released at time zero, the initial condition of the
    /// quantum-polled policies.
    pub fn released(task: &Task) -> Self {
        Self {
            lifecycle: Lifecycle::Ready,
            level: CritLevel::LowMode,
            wakeup_time: 0,
            absolute_deadline: task.period(),
            scheduling_deadline: task.period(),
            low_budget: task.low_wcet() as i64,
            exe_time: 0,
            job_index: 0,
            enabled: true,
            wcet: 0,
        }
    }

    /// State of a task awaiting its first admission check (RED).
    pub fn parked(task: &Task) -> Self {
        Self {
            lifecycle: Lifecycle::Idle,
            absolute_deadline: 0,
            scheduling_deadline: 0,
            ..Self::released(task)
        }
    }

    /// Retire the current job: advance to the next job instance and park the
    /// task until its next wakeup.
    pub fn retire(&mut self, period: TimeStep) {
        self.job_index += 1;
        self.lifecycle = Lifecycle::Idle;
        self.wakeup_time += period;
        self.exe_time = 0;
    }
}

/// Static utilisation sums and the EDF-VD scaling factor, computed once per
/// run in a fixed order: Low utilisation first, then the High sum, then λ.
pub(crate) struct UtilisationProfile {
    pub u_low: f64,
    pub u_high_low_mode: f64,
    pub lambda: f64,
}

impl UtilisationProfile {
    pub fn new(task_set: &TaskSet) -> Self {
        let u_low = task_set.low_utilisation();
        let u_high_low_mode = task_set.high_utilisation_low_mode();
        let lambda = u_high_low_mode / (1.0 - u_low);
        Self {
            u_low,
            u_high_low_mode,
            lambda,
        }
    }
}

/// Caller-contract checks shared by every policy, rejected before the tick
/// loop starts rather than surfacing as wrong metrics.
pub(crate) fn assert_preconditions(task_set: &TaskSet, quantum: TimeStep, horizon: TimeStep) {
    assert!(quantum >= 1, "quantum must be at least one tick");
    assert!(!task_set.is_empty(), "cannot schedule an empty task set");
    assert!(
        task_set.supports_horizon(horizon),
        "a task records fewer execution times than jobs released in [0, {}]",
        horizon
    );
}

/// Common contract of all scheduling policies: reset, simulate, report.
pub trait Scheduler {
    /// Display name of the policy.
    fn name(&self) -> &'static str;

    fn metrics(&self) -> &Metrics;

    /// Zeroes metrics and rebuilds dynamic state from the task list.
    fn reset(&mut self);

    /// Replaces the task list, then resets.
    fn reset_with(&mut self, task_set: TaskSet);

    /// Runs the full simulation from tick 0 to `horizon` inclusive.
    ///
    /// Re-evaluation happens every `quantum` ticks and on
    /// completion/deadline events. `quantum == 0`, an empty task set and
    /// execution-time sequences shorter than the number of jobs released
    /// within the horizon are contract violations and panic before the tick
    /// loop starts.
    fn schedule(&mut self, quantum: TimeStep, horizon: TimeStep);

    fn low_success_ratio(&self) -> f64 {
        self.metrics().low_success_ratio()
    }

    fn high_success_ratio(&self) -> f64 {
        self.metrics().high_success_ratio()
    }

    fn interrupt_success_ratio(&self) -> f64 {
        self.metrics().interrupt_success_ratio()
    }

    fn context_switches(&self) -> usize {
        self.metrics().context_switches()
    }
}
