use crate::{Criticality, TaskSet, TimeStep};

use super::scheduler::{
    assert_preconditions, CritLevel, Lifecycle, Metrics, Scheduler, TaskState, UtilisationProfile,
};

/// EDF with virtual deadlines: while the system is in Low mode,
/// High-criticality tasks are ordered by a λ-scaled scheduling deadline that
/// is tighter than their hard deadline. An execution overrun beyond the
/// Low-mode budget switches the whole system to High mode, shedding every
/// pending Low job; the system drops back to Low mode as soon as the
/// processor would go idle.
pub struct EDFVDScheduler {
    task_set: TaskSet,
    states: Vec<TaskState>,
    metrics: Metrics,
    mode_switches: usize,
}

impl EDFVDScheduler {
    pub fn new(task_set: TaskSet) -> Self {
        let states = task_set.iter().map(TaskState::released).collect();
        Self {
            task_set,
            states,
            metrics: Metrics::default(),
            mode_switches: 0,
        }
    }

    /// Number of Low→High mode transitions observed during the last run.
    pub fn mode_switches(&self) -> usize {
        self.mode_switches
    }
}

impl Scheduler for EDFVDScheduler {
    fn name(&self) -> &'static str {
        "EDF-VD"
    }

    fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    fn reset(&mut self) {
        self.states = self.task_set.iter().map(TaskState::released).collect();
        self.metrics.clear();
        self.mode_switches = 0;
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

        // Initial virtual deadlines for the High tasks released at t = 0.
        for (state, task) in states.iter_mut().zip(tasks.iter()) {
            if task.criticality() == Criticality::High {
                state.scheduling_deadline = (task.period() as f64 * lambda) as TimeStep;
            }
        }

        let mut mode = CritLevel::LowMode;
        let mut mode_switches = 0;
        let mut running: Option<usize> = None;

        for time in 0..=horizon {
            let running_event = running.map_or(false, |id| {
                let state = &states[id];
                state.exe_time >= tasks[id].execution_time(state.job_index)
                    || (state.exe_time > tasks[id].low_wcet() && mode == CritLevel::LowMode)
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

                // Low-mode budget exhausted: switch the system to High mode,
                // shed pending Low jobs, restore real deadlines.
                if let Some(id) = running {
                    if states[id].exe_time > tasks[id].low_wcet() && mode == CritLevel::LowMode {
                        mode = CritLevel::HighMode;
                        mode_switches += 1;
                        for i in 0..tasks.len() {
                            if tasks[i].criticality() == Criticality::High
                                && states[i].lifecycle != Lifecycle::Idle
                            {
                                states[i].scheduling_deadline =
                                    states[i].wakeup_time + tasks[i].period();
                            } else if tasks[i].criticality() == Criticality::Low
                                && states[i].lifecycle != Lifecycle::Idle
                            {
                                metrics.record_merged(tasks[i].criticality(), false);
                                states[i].retire(tasks[i].period());
                            }
                        }
                    }
                }

                for id in 0..tasks.len() {
                    let state = &mut states[id];
                    if matches!(state.lifecycle, Lifecycle::Ready | Lifecycle::Running)
                        && time > state.absolute_deadline
                    {
                        metrics.record_merged(tasks[id].criticality(), false);
                        state.retire(tasks[id].period());
                        if running == Some(id) {
                            running = None;
                        }
                    }
                }

                // Releases: in High mode a Low job is shed on arrival.
                for id in 0..tasks.len() {
                    let state = &mut states[id];
                    if state.lifecycle == Lifecycle::Idle && time >= state.wakeup_time {
                        if mode == CritLevel::HighMode
                            && tasks[id].criticality() == Criticality::Low
                        {
                            metrics.record_merged(tasks[id].criticality(), false);
                            state.retire(tasks[id].period());
                        } else {
                            state.lifecycle = Lifecycle::Ready;
                            state.scheduling_deadline = if mode == CritLevel::LowMode
                                && tasks[id].criticality() == Criticality::High
                            {
                                state.wakeup_time
                                    + (tasks[id].period() as f64 * lambda) as TimeStep
                            } else {
                                state.wakeup_time + tasks[id].period()
                            };
                            state.absolute_deadline = state.wakeup_time + tasks[id].period();
                        }
                    }
                }

                // A Low task never runs in High mode.
                if mode == CritLevel::HighMode {
                    if let Some(id) = running {
                        if tasks[id].criticality() == Criticality::Low {
                            states[id].lifecycle = Lifecycle::Ready;
                            running = None;
                        }
                    }
                }

                let mut min_id = running;
                for id in 0..tasks.len() {
                    if states[id].lifecycle == Lifecycle::Ready
                        && (mode == CritLevel::LowMode
                            || tasks[id].criticality() != Criticality::Low)
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

                // Idle processor ends the High-mode episode.
                if running.is_none() && mode == CritLevel::HighMode {
                    mode = CritLevel::LowMode;
                    for id in 0..tasks.len() {
                        if states[id].lifecycle == Lifecycle::Ready
                            && running.map_or(true, |r| {
                                states[id].scheduling_deadline < states[r].scheduling_deadline
                            })
                        {
                            running = Some(id);
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
    }
}
