use crate::{Criticality, TaskSet, TimeStep};

use super::scheduler::{
    assert_preconditions, CritLevel, Lifecycle, Metrics, Scheduler, TaskState, UtilisationProfile,
};

/// Flexible mixed-criticality scheduling: overruns elevate individual High
/// tasks instead of flipping one global switch, and every elevation shrinks
/// a global budget scale that is applied uniformly to the Low tasks'
/// per-task execution budgets. The nominal state is restored the instant the
/// processor goes idle.
pub struct FMCScheduler {
    task_set: TaskSet,
    states: Vec<TaskState>,
    metrics: Metrics,
    mode_switches: usize,
    budget: f64,
}

impl FMCScheduler {
    pub fn new(task_set: TaskSet) -> Self {
        let states = task_set.iter().map(TaskState::released).collect();
        Self {
            task_set,
            states,
            metrics: Metrics::default(),
            mode_switches: 0,
            budget: 1.0,
        }
    }

    /// Number of overrun-triggered task elevations during the last run.
    pub fn mode_switches(&self) -> usize {
        self.mode_switches
    }
}

impl Scheduler for FMCScheduler {
    fn name(&self) -> &'static str {
        "FMC"
    }

    fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    fn reset(&mut self) {
        self.states = self.task_set.iter().map(TaskState::released).collect();
        self.metrics.clear();
        self.mode_switches = 0;
        self.budget = 1.0;
    }

    fn reset_with(&mut self, task_set: TaskSet) {
        self.task_set = task_set;
        self.reset();
    }

    fn schedule(&mut self, quantum: TimeStep, horizon: TimeStep) {
        assert_preconditions(&self.task_set, quantum, horizon);
        self.reset();

        let profile = UtilisationProfile::new(&self.task_set);
        let lambda = profile.lambda;

        let tasks = self.task_set.get_tasks();
        let states = &mut self.states;
        let metrics = &mut self.metrics;

        for (state, task) in states.iter_mut().zip(tasks.iter()) {
            if task.criticality() == Criticality::High {
                state.scheduling_deadline = (task.period() as f64 * lambda) as TimeStep;
            }
        }

        // Elevations seen in the current High-mode episode; the cumulative
        // count survives recovery so the run can be inspected afterwards.
        let mut mode = 0usize;
        let mut mode_switches = 0usize;
        let mut budget = 1.0f64;
        let mut running: Option<usize> = None;

        for time in 0..=horizon {
            let running_event = running.map_or(false, |id| {
                let state = &states[id];
                state.exe_time >= tasks[id].execution_time(state.job_index)
                    || (state.exe_time as i64 > state.low_budget
                        && state.level == CritLevel::LowMode)
                    || time > state.absolute_deadline
            });

            if time % quantum == 0 || running_event {
                metrics.switches += 2;

                if let Some(id) = running {
                    let state = &mut states[id];
                    if state.exe_time >= tasks[id].execution_time(state.job_index) {
                        metrics.record_merged(tasks[id].criticality(), true);
                        state.retire(tasks[id].period());
                        running = None;
                    }
                }

                // Overrun of the running High task: elevate it, shrink the
                // Low tasks' budgets by the schedulability-preserving
                // adjustment. The min(0, …) clamp makes degradation
                // monotone within an episode.
                if let Some(id) = running {
                    if states[id].exe_time as i64 > states[id].low_budget
                        && states[id].level == CritLevel::LowMode
                        && tasks[id].criticality() == Criticality::High
                    {
                        mode += 1;
                        mode_switches += 1;
                        states[id].level = CritLevel::HighMode;
                        states[id].scheduling_deadline =
                            states[id].wakeup_time + tasks[id].period();
                        let u_low_task = tasks[id].low_utilisation();
                        let u_high_task = tasks[id].high_utilisation();
                        let adjustment = ((u_low_task / profile.u_high_low_mode)
                            * (1.0 - profile.u_low)
                            - u_high_task)
                            / ((1.0 - lambda) * profile.u_low);
                        budget += adjustment.min(0.0);
                        for i in 0..tasks.len() {
                            if tasks[i].criticality() == Criticality::Low {
                                states[i].low_budget =
                                    (budget * tasks[i].low_wcet() as f64) as i64;
                            }
                        }
                    }
                }

                // Deadline misses and budget misses retire alike.
                for id in 0..tasks.len() {
                    let state = &mut states[id];
                    if matches!(state.lifecycle, Lifecycle::Ready | Lifecycle::Running)
                        && (time > state.absolute_deadline
                            || (state.exe_time as i64 > state.low_budget
                                && state.level == CritLevel::LowMode))
                    {
                        metrics.record_merged(tasks[id].criticality(), false);
                        state.retire(tasks[id].period());
                        if running == Some(id) {
                            running = None;
                        }
                    }
                }

                for id in 0..tasks.len() {
                    let state = &mut states[id];
                    if state.lifecycle == Lifecycle::Idle && time >= state.wakeup_time {
                        state.lifecycle = Lifecycle::Ready;
                        state.scheduling_deadline = if tasks[id].criticality()
                            == Criticality::High
                            && state.level == CritLevel::LowMode
                        {
                            state.wakeup_time + (tasks[id].period() as f64 * lambda) as TimeStep
                        } else {
                            state.wakeup_time + tasks[id].period()
                        };
                        state.absolute_deadline = state.wakeup_time + tasks[id].period();
                    }
                }

                let mut min_id = running;
                for id in 0..tasks.len() {
                    if states[id].lifecycle == Lifecycle::Ready
                        && min_id.map_or(true, |m| {
                            states[id].scheduling_deadline < states[m].scheduling_deadline
                        })
                    {
                        min_id = Some(id);
                    }
                }
                if min_id != running {
                    if let Some(prev) = running {
                        states[prev].lifecycle = Lifecycle::Ready;
                    }
                    if let Some(next) = min_id {
                        states[next].lifecycle = Lifecycle::Running;
                    }
                    running = min_id;
                }

                // Idle processor: restore the nominal state.
                if running.is_none() && mode > 0 {
                    mode = 0;
                    budget = 1.0;
                    for id in 0..tasks.len() {
                        if states[id].lifecycle == Lifecycle::Ready
                            && running.map_or(true, |r| {
                                states[id].scheduling_deadline < states[r].scheduling_deadline
                            })
                        {
                            running = Some(id);
                        }
                        if tasks[id].criticality() == Criticality::Low {
                            states[id].low_budget = tasks[id].low_wcet() as i64;
                        } else {
                            states[id].level = CritLevel::LowMode;
                        }
                    }
                    if let Some(id) = running {
                        states[id].lifecycle = Lifecycle::Running;
                    }
                }
            }

            if let Some(id) = running {
                states[id].exe_time += 1;
            }
        }

        self.mode_switches = mode_switches;
        self.budget = budget;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Task;

    fn overrun_pair(high_c: TimeStep, high_exe: Vec<TimeStep>) -> TaskSet {
        TaskSet::new(vec![
            Task::new(1, 10, Criticality::High, 2, high_c, high_exe),
            Task::new(2, 10, Criticality::Low, 3, 0, vec![3; 4]),
        ])
    }

    #[test]
    fn test_no_overrun_keeps_nominal_budget() {
        let mut scheduler = FMCScheduler::new(overrun_pair(5, vec![2; 4]));
        scheduler.schedule(1, 30);

        assert_eq!(scheduler.mode_switches(), 0);
        assert_eq!(scheduler.budget, 1.0);
        assert_eq!(scheduler.low_success_ratio(), 1.0);
        assert_eq!(scheduler.high_success_ratio(), 1.0);
    }

    #[test]
    fn test_overrun_elevates_without_shedding() {
        // highC = 5 keeps the adjustment non-negative, so the clamp holds
        // the budget at 1 and the Low task is untouched.
        let mut scheduler = FMCScheduler::new(overrun_pair(5, vec![4, 2, 2, 2]));
        scheduler.schedule(1, 30);

        assert_eq!(scheduler.mode_switches(), 1);
        assert_eq!(scheduler.metrics().succeeded_high, 3);
        assert_eq!(scheduler.metrics().failed_low, 0);
        assert_eq!(scheduler.metrics().succeeded_low, 3);
    }

    #[test]
    fn test_budget_miss_retires_low_job_and_recovery_restores() {
        // highC = 8 drives the adjustment negative: the Low task's budget
        // shrinks below its recorded execution time and its job is retired
        // as a budget miss; idle recovery restores the nominal budget.
        let mut scheduler = FMCScheduler::new(overrun_pair(8, vec![4, 2, 2, 2]));
        scheduler.schedule(1, 30);

        assert_eq!(scheduler.mode_switches(), 1);
        assert_eq!(scheduler.metrics().succeeded_high, 3);
        assert_eq!(scheduler.metrics().failed_low, 1);
        assert_eq!(scheduler.metrics().succeeded_low, 2);
        // Recovery ran once the processor went idle.
        assert_eq!(scheduler.budget, 1.0);
        for state in &scheduler.states {
            assert_eq!(state.level, CritLevel::LowMode);
        }
    }
}
