use crate::{Criticality, TaskSet, TimeStep};

use super::scheduler::{
    assert_preconditions, CritLevel, Lifecycle, Metrics, Scheduler, TaskState, UtilisationProfile,
};

/// FMC variant that degrades by load shedding instead of budget scaling: an
/// overrun disables whole Low tasks, highest utilisation first, until the
/// remaining Low utilisation fits the degraded budget. A disabled task is
/// retired as a failure at its next release. Idle recovery re-enables
/// everything.
pub struct FMCDropScheduler {
    task_set: TaskSet,
    states: Vec<TaskState>,
    metrics: Metrics,
    mode_switches: usize,
    budget: f64,
    cur_u_low: f64,
}

impl FMCDropScheduler {
    pub fn new(task_set: TaskSet) -> Self {
        let states = task_set.iter().map(TaskState::released).collect();
        Self {
            task_set,
            states,
            metrics: Metrics::default(),
            mode_switches: 0,
            budget: 0.0,
            cur_u_low: 0.0,
        }
    }

    /// Number of overrun-triggered task elevations during the last run.
    pub fn mode_switches(&self) -> usize {
        self.mode_switches
    }
}

impl Scheduler for FMCDropScheduler {
    fn name(&self) -> &'static str {
        "FMC-Drop"
    }

    fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    fn reset(&mut self) {
        self.states = self.task_set.iter().map(TaskState::released).collect();
        self.metrics.clear();
        self.mode_switches = 0;
        self.budget = 0.0;
        self.cur_u_low = 0.0;
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

        let mut mode = 0usize;
        let mut mode_switches = 0usize;
        let mut budget = profile.u_low;
        let mut cur_u_low = profile.u_low;
        let mut running: Option<usize> = None;

        for time in 0..=horizon {
            let running_event = running.map_or(false, |id| {
                let state = &states[id];
                state.exe_time >= tasks[id].execution_time(state.job_index)
                    || (state.exe_time > tasks[id].low_wcet()
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

                // Overrun: elevate the running High task, then shed enabled
                // Low tasks greedily until their utilisation fits the
                // degraded budget.
                if let Some(id) = running {
                    if states[id].exe_time > tasks[id].low_wcet()
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
                            / (1.0 - lambda);
                        budget += adjustment.min(0.0);
                        while cur_u_low > budget && cur_u_low > 1e-4 {
                            let mut max_id = None;
                            let mut max_u = 0.0;
                            for i in 0..tasks.len() {
                                let u = tasks[i].low_utilisation();
                                if tasks[i].criticality() == Criticality::Low
                                    && states[i].enabled
                                    && (max_id.is_none() || u > max_u)
                                {
                                    max_id = Some(i);
                                    max_u = u;
                                }
                            }
                            let Some(max_id) = max_id else { break };
                            states[max_id].enabled = false;
                            cur_u_low -= max_u;
                            if running == Some(max_id) {
                                running = None;
                            }
                        }
                    }
                }

                for id in 0..tasks.len() {
                    let state = &mut states[id];
                    if matches!(state.lifecycle, Lifecycle::Ready | Lifecycle::Running)
                        && (time > state.absolute_deadline
                            || (state.exe_time > tasks[id].low_wcet()
                                && state.level == CritLevel::LowMode))
                    {
                        metrics.record_merged(tasks[id].criticality(), false);
                        state.retire(tasks[id].period());
                        if running == Some(id) {
                            running = None;
                        }
                    }
                }

                // Releases; a disabled task's job is retired on arrival.
                for id in 0..tasks.len() {
                    let state = &mut states[id];
                    if state.lifecycle == Lifecycle::Idle && time >= state.wakeup_time {
                        if !state.enabled {
                            metrics.record_merged(tasks[id].criticality(), false);
                            state.retire(tasks[id].period());
                            continue;
                        }
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
                        && states[id].enabled
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

                // Idle recovery re-admits every dropped task.
                if running.is_none() && mode > 0 {
                    mode = 0;
                    budget = profile.u_low;
                    cur_u_low = profile.u_low;
                    for id in 0..tasks.len() {
                        if states[id].lifecycle == Lifecycle::Ready
                            && running.map_or(true, |r| {
                                states[id].scheduling_deadline < states[r].scheduling_deadline
                            })
                        {
                            running = Some(id);
                        }
                        if tasks[id].criticality() == Criticality::Low {
                            states[id].enabled = true;
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
        self.cur_u_low = cur_u_low;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Task;

    // One heavy High task and two Low tasks of unequal utilisation.
    fn shedding_set() -> TaskSet {
        TaskSet::new(vec![
            Task::new(1, 30, Criticality::High, 2, 27, vec![27, 27]),
            Task::new(2, 10, Criticality::Low, 3, 0, vec![3; 4]),
            Task::new(3, 15, Criticality::Low, 3, 0, vec![3; 3]),
        ])
    }

    #[test]
    fn test_overrun_drops_low_tasks_and_recovers() {
        let mut scheduler = FMCDropScheduler::new(shedding_set());
        scheduler.schedule(1, 30);

        assert_eq!(scheduler.mode_switches(), 1);
        assert_eq!(scheduler.metrics().succeeded_high, 1);
        // Every Low job in the shedding episode is lost: deadline misses for
        // the jobs already pending, release-time retirements afterwards.
        assert_eq!(scheduler.metrics().succeeded_low, 0);
        assert_eq!(scheduler.metrics().failed_low, 5);
        // Idle recovery restored the nominal Low utilisation.
        assert!((scheduler.budget - 0.5).abs() < 1e-9);
        assert!((scheduler.cur_u_low - 0.5).abs() < 1e-9);
        for state in &scheduler.states {
            assert!(state.enabled);
        }
    }

    #[test]
    fn test_no_overrun_runs_like_edf_vd() {
        let task_set = TaskSet::new(vec![
            Task::new(1, 10, Criticality::High, 2, 5, vec![2; 4]),
            Task::new(2, 10, Criticality::Low, 3, 0, vec![3; 4]),
        ]);
        let mut scheduler = FMCDropScheduler::new(task_set);
        scheduler.schedule(1, 30);

        assert_eq!(scheduler.mode_switches(), 0);
        assert_eq!(scheduler.low_success_ratio(), 1.0);
        assert_eq!(scheduler.high_success_ratio(), 1.0);
        assert_eq!(scheduler.metrics().succeeded_low, 3);
        assert_eq!(scheduler.metrics().succeeded_high, 3);
    }
}
