use crate::{Criticality, TaskSet, TimeStep};

use super::scheduler::{assert_preconditions, Lifecycle, Metrics, Scheduler, TaskState};

/// Earliest Deadline First over absolute deadlines, re-evaluated on a fixed
/// quantum and on completion/deadline events, with unconditional preemption
/// by Interrupt-class tasks.
pub struct EarliestDeadlineFirst {
    task_set: TaskSet,
    states: Vec<TaskState>,
    metrics: Metrics,
}

impl EarliestDeadlineFirst {
    pub fn new(task_set: TaskSet) -> Self {
        let states = task_set.iter().map(TaskState::released).collect();
        Self {
            task_set,
            states,
            metrics: Metrics::default(),
        }
    }
}

impl Scheduler for EarliestDeadlineFirst {
    fn name(&self) -> &'static str {
        "EDF"
    }

    fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    fn reset(&mut self) {
        self.states = self.task_set.iter().map(TaskState::released).collect();
        self.metrics.clear();
    }

    fn reset_with(&mut self, task_set: TaskSet) {
        self.task_set = task_set;
        self.reset();
    }

    fn schedule(&mut self, quantum: TimeStep, horizon: TimeStep) {
        assert_preconditions(&self.task_set, quantum, horizon);
        self.reset();

        let tasks = self.task_set.get_tasks();
        let states = &mut self.states;
        let metrics = &mut self.metrics;

        let mut running: Option<usize> = None;

        for time in 0..=horizon {
            // An Interrupt release preempts anything but another Interrupt.
            let running_is_interrupt =
                running.map_or(false, |id| tasks[id].criticality() == Criticality::Interrupt);
            let interrupt = !running_is_interrupt
                && tasks.iter().zip(states.iter()).any(|(task, state)| {
                    task.criticality() == Criticality::Interrupt
                        && state.lifecycle == Lifecycle::Idle
                        && time >= state.wakeup_time
                });

            let running_event = running.map_or(false, |id| {
                let state = &states[id];
                state.exe_time >= tasks[id].execution_time(state.job_index)
                    || time >= state.absolute_deadline
            });

            if time % quantum == 0 || interrupt || running_event {
                metrics.switches += 1;

                // Completed job of the running task.
                if let Some(id) = running {
                    let state = &mut states[id];
                    if state.exe_time >= tasks[id].execution_time(state.job_index) {
                        metrics.record(tasks[id].criticality(), true);
                        state.retire(tasks[id].period());
                        running = None;
                    }
                }

                // Deadline sweep over every pending job.
                for id in 0..tasks.len() {
                    let state = &mut states[id];
                    if matches!(state.lifecycle, Lifecycle::Ready | Lifecycle::Running)
                        && time >= state.absolute_deadline
                    {
                        metrics.record(tasks[id].criticality(), false);
                        state.retire(tasks[id].period());
                        if running == Some(id) {
                            running = None;
                        }
                    }
                }

                // Promote released jobs.
                for id in 0..tasks.len() {
                    let state = &mut states[id];
                    if state.lifecycle == Lifecycle::Idle && time >= state.wakeup_time {
                        state.lifecycle = Lifecycle::Ready;
                        state.absolute_deadline = state.wakeup_time + tasks[id].period();
                    }
                }

                // Select the earliest absolute deadline; a ready Interrupt
                // task wins outright, first index found.
                if !running.map_or(false, |id| tasks[id].criticality() == Criticality::Interrupt) {
                    let mut min_id = running;
                    for id in 0..tasks.len() {
                        if states[id].lifecycle != Lifecycle::Ready {
                            continue;
                        }
                        if min_id.map_or(true, |m| {
                            states[id].absolute_deadline < states[m].absolute_deadline
                        }) {
                            min_id = Some(id);
                        }
                        if tasks[id].criticality() == Criticality::Interrupt {
                            min_id = Some(id);
                            break;
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
                }
            }

            if let Some(id) = running {
                states[id].exe_time += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Task;

    fn single_task_set(period: TimeStep, exe: TimeStep, jobs: usize) -> TaskSet {
        TaskSet::new(vec![Task::new(
            1,
            period,
            Criticality::Low,
            exe,
            exe,
            vec![exe; jobs],
        )])
    }

    #[test]
    fn test_single_task_all_jobs_succeed() {
        let mut scheduler = EarliestDeadlineFirst::new(single_task_set(5, 2, 11));
        scheduler.schedule(1, 50);

        // One decision per tick under quantum = 1, ticks 0..=50.
        assert_eq!(scheduler.context_switches(), 51);
        assert_eq!(scheduler.metrics().succeeded_low, 10);
        assert_eq!(scheduler.metrics().failed_low, 0);
        assert_eq!(scheduler.low_success_ratio(), 1.0);
    }

    #[test]
    fn test_overlong_job_misses_every_deadline() {
        // Recorded execution times exceed the period, so no job completes.
        let mut scheduler = EarliestDeadlineFirst::new(single_task_set(4, 10, 6));
        scheduler.schedule(1, 20);

        assert_eq!(scheduler.metrics().succeeded_low, 0);
        assert_eq!(scheduler.metrics().failed_low, 5);
        assert_eq!(scheduler.low_success_ratio(), 0.0);
    }

    #[test]
    fn test_interrupt_preempts_inside_quantum() {
        let task_set = TaskSet::new(vec![
            Task::new(1, 100, Criticality::Low, 50, 0, vec![50]),
            Task::new(2, 10, Criticality::Interrupt, 2, 0, vec![2; 4]),
        ]);
        let mut scheduler = EarliestDeadlineFirst::new(task_set);
        // A huge quantum: every decision below is event-driven.
        scheduler.schedule(1000, 30);

        assert_eq!(scheduler.metrics().succeeded_interrupt, 3);
        assert_eq!(scheduler.metrics().failed_interrupt, 0);
        assert_eq!(scheduler.interrupt_success_ratio(), 1.0);
        // The Low task never finished nor missed: empty-class convention.
        assert_eq!(scheduler.metrics().succeeded_low + scheduler.metrics().failed_low, 0);
        assert_eq!(scheduler.low_success_ratio(), 1.0);
        // Decisions: tick 0, three completions, three interrupt releases.
        assert_eq!(scheduler.context_switches(), 7);
    }

    #[test]
    fn test_repeated_runs_are_idempotent() {
        let mut scheduler = EarliestDeadlineFirst::new(single_task_set(5, 2, 11));
        scheduler.schedule(1, 50);
        let first = scheduler.metrics().clone();
        scheduler.schedule(1, 50);
        assert_eq!(*scheduler.metrics(), first);
    }

    #[test]
    fn test_reset_with_replaces_task_set() {
        let mut scheduler = EarliestDeadlineFirst::new(single_task_set(5, 2, 11));
        scheduler.schedule(1, 50);
        scheduler.reset_with(single_task_set(4, 10, 6));
        assert_eq!(scheduler.context_switches(), 0);
        scheduler.schedule(1, 20);
        assert_eq!(scheduler.metrics().failed_low, 5);
    }
}
