use crate::{Criticality, TaskSet, TimeStep};

use super::scheduler::{assert_preconditions, Lifecycle, Metrics, Scheduler, TaskState};

/// EDF with admission control: the ready queue is an ordered sequence of
/// task indices, ascending by absolute deadline, whose entries carry an
/// inclusive prefix sum of worst-case execution times (`wcet`). An entry is
/// feasible while its prefix sum fits inside its period; admission that
/// breaks feasibility evicts victims, preferring Low-criticality ones, and
/// an evicted job is held `Rejected` and retried when queue slack frees up.
/// The queue head is the running task.
pub struct REDScheduler {
    task_set: TaskSet,
    states: Vec<TaskState>,
    metrics: Metrics,
    queue: Vec<usize>,
}

impl REDScheduler {
    pub fn new(task_set: TaskSet) -> Self {
        let states = task_set.iter().map(|t| TaskState::parked(t)).collect();
        Self {
            task_set,
            states,
            metrics: Metrics::default(),
            queue: Vec::new(),
        }
    }

    /// Insert a released job at its deadline rank, updating the prefix WCET
    /// sums of every later entry. Returns `false` if any entry (the new one
    /// included) is left infeasible.
    fn enqueue(&mut self, id: usize) -> bool {
        let mut feasible = true;
        let own = self.task_set[id].effective_wcet();
        let deadline = self.states[id].absolute_deadline;

        let mut pos = self.queue.len();
        while pos > 0 {
            let neighbour = self.queue[pos - 1];
            if deadline >= self.states[neighbour].absolute_deadline {
                break;
            }
            self.states[neighbour].wcet += own;
            if self.states[neighbour].wcet > self.task_set[neighbour].period() {
                feasible = false;
            }
            pos -= 1;
        }

        let mut wcet = own;
        if pos > 0 {
            wcet += self.states[self.queue[pos - 1]].wcet;
        }
        self.states[id].wcet = wcet;
        self.queue.insert(pos, id);
        if wcet > self.task_set[id].period() {
            feasible = false;
        }
        feasible
    }

    /// Evict one victim if some queue entry is infeasible: the first
    /// overloaded entry itself when it is Low, otherwise the latest-deadline
    /// Low entry ahead of it. Returns `true` once every entry is feasible.
    fn evict_victim(&mut self) -> bool {
        let mut overload_pos = None;
        let mut last_low_pos = None;
        for (pos, &id) in self.queue.iter().enumerate() {
            if self.states[id].wcet > self.task_set[id].period() {
                overload_pos = Some(pos);
                break;
            }
            if self.task_set[id].criticality() == Criticality::Low {
                last_low_pos = Some(pos);
            }
        }
        let Some(overload_pos) = overload_pos else {
            return true;
        };

        let overload_id = self.queue[overload_pos];
        let victim_pos = match last_low_pos {
            Some(pos) if self.task_set[overload_id].criticality() != Criticality::Low => pos,
            _ => overload_pos,
        };
        let victim_id = self.queue[victim_pos];

        let own = self.task_set[victim_id].effective_wcet();
        let mut feasible = true;
        for i in victim_pos + 1..self.queue.len() {
            let id = self.queue[i];
            self.states[id].wcet -= own;
            if self.states[id].wcet > self.task_set[id].period() {
                feasible = false;
            }
        }
        self.states[victim_id].lifecycle = Lifecycle::Rejected;
        self.queue.remove(victim_pos);
        feasible
    }

    /// Remove the finished head, then, if the remainder is feasible, try to
    /// re-admit the Rejected job with the latest deadline, High first; a
    /// failed re-admission evicts it again and leaves it Rejected.
    fn remove_head(&mut self) {
        if self.queue.is_empty() {
            return;
        }
        let head = self.queue[0];
        let own = self.task_set[head].effective_wcet();
        let mut feasible = true;
        for i in 1..self.queue.len() {
            let id = self.queue[i];
            self.states[id].wcet -= own;
            if self.states[id].wcet > self.task_set[id].period() {
                feasible = false;
            }
        }
        self.queue.remove(0);

        if !feasible {
            return;
        }

        let mut chosen_low = None;
        let mut chosen_high = None;
        for id in 0..self.task_set.len() {
            if self.states[id].lifecycle != Lifecycle::Rejected {
                continue;
            }
            let deadline = self.states[id].absolute_deadline;
            match self.task_set[id].criticality() {
                Criticality::High => {
                    if chosen_high.map_or(true, |c: usize| {
                        deadline > self.states[c].absolute_deadline
                    }) {
                        chosen_high = Some(id);
                    }
                }
                Criticality::Low => {
                    if chosen_low.map_or(true, |c: usize| {
                        deadline > self.states[c].absolute_deadline
                    }) {
                        chosen_low = Some(id);
                    }
                }
                Criticality::Interrupt => {}
            }
        }
        let Some(chosen) = chosen_high.or(chosen_low) else {
            return;
        };
        if self.enqueue(chosen) {
            self.states[chosen].lifecycle = Lifecycle::Ready;
        } else {
            self.remove_id(chosen);
        }
    }

    /// Remove an arbitrary queued entry, deducting its WCET from the prefix
    /// sums behind it.
    fn remove_id(&mut self, id: usize) {
        let Some(pos) = self.queue.iter().position(|&q| q == id) else {
            return;
        };
        let own = self.task_set[id].effective_wcet();
        for i in pos + 1..self.queue.len() {
            let later = self.queue[i];
            self.states[later].wcet -= own;
        }
        self.queue.remove(pos);
    }
}

impl Scheduler for REDScheduler {
    fn name(&self) -> &'static str {
        "RED"
    }

    fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    fn reset(&mut self) {
        self.states = self.task_set.iter().map(|t| TaskState::parked(t)).collect();
        self.metrics.clear();
        self.queue.clear();
    }

    fn reset_with(&mut self, task_set: TaskSet) {
        self.task_set = task_set;
        self.reset();
    }

    fn schedule(&mut self, quantum: TimeStep, horizon: TimeStep) {
        assert_preconditions(&self.task_set, quantum, horizon);
        self.reset();

        for time in 0..=horizon {
            self.metrics.switches += 1;

            // The queue head finished its recorded execution time.
            if let Some(&head) = self.queue.first() {
                let state = &self.states[head];
                if state.exe_time >= self.task_set[head].execution_time(state.job_index) {
                    match self.task_set[head].criticality() {
                        Criticality::Low => self.metrics.succeeded_low += 1,
                        Criticality::High => self.metrics.succeeded_high += 1,
                        Criticality::Interrupt => {}
                    }
                    let period = self.task_set[head].period();
                    self.states[head].retire(period);
                    self.remove_head();
                }
            }

            // Deadline sweep covers queued and rejected jobs alike; only a
            // queued job still has WCET contributions to unwind.
            for id in 0..self.task_set.len() {
                if matches!(
                    self.states[id].lifecycle,
                    Lifecycle::Ready | Lifecycle::Rejected
                ) && time > self.states[id].absolute_deadline
                {
                    if self.states[id].lifecycle == Lifecycle::Ready {
                        self.remove_id(id);
                    }
                    self.metrics
                        .record_merged(self.task_set[id].criticality(), false);
                    let period = self.task_set[id].period();
                    self.states[id].retire(period);
                }
            }

            // Admission of released jobs, evicting until feasible.
            for id in 0..self.task_set.len() {
                if self.states[id].lifecycle == Lifecycle::Idle
                    && time >= self.states[id].wakeup_time
                {
                    self.states[id].lifecycle = Lifecycle::Ready;
                    self.states[id].absolute_deadline =
                        self.states[id].wakeup_time + self.task_set[id].period();
                    self.enqueue(id);
                    while !self.evict_victim() {}
                }
            }

            if let Some(&head) = self.queue.first() {
                self.states[head].exe_time += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Task;

    // Recomputes every prefix sum from scratch and checks queue ordering.
    fn assert_queue_consistent(scheduler: &REDScheduler) {
        let mut sum = 0;
        let mut prev_deadline = 0;
        for &id in &scheduler.queue {
            sum += scheduler.task_set[id].effective_wcet();
            assert_eq!(
                scheduler.states[id].wcet, sum,
                "stale prefix sum for task index {}",
                id
            );
            assert!(scheduler.states[id].absolute_deadline >= prev_deadline);
            prev_deadline = scheduler.states[id].absolute_deadline;
        }
    }

    fn queue_fixture() -> REDScheduler {
        REDScheduler::new(TaskSet::new(vec![
            Task::new(1, 10, Criticality::Low, 4, 0, vec![4; 3]),
            Task::new(2, 12, Criticality::Low, 5, 0, vec![5; 3]),
            Task::new(3, 6, Criticality::High, 2, 6, vec![2; 5]),
        ]))
    }

    fn admit(scheduler: &mut REDScheduler, id: usize, deadline: TimeStep) -> bool {
        scheduler.states[id].lifecycle = Lifecycle::Ready;
        scheduler.states[id].absolute_deadline = deadline;
        scheduler.enqueue(id)
    }

    #[test]
    fn test_enqueue_keeps_deadline_order_and_prefix_sums() {
        let mut scheduler = queue_fixture();
        assert!(admit(&mut scheduler, 0, 10));
        assert_queue_consistent(&scheduler);
        assert!(admit(&mut scheduler, 2, 6));
        assert_queue_consistent(&scheduler);
        assert_eq!(scheduler.queue, vec![2, 0]);
        assert_eq!(scheduler.states[2].wcet, 6);
        assert_eq!(scheduler.states[0].wcet, 10);
    }

    #[test]
    fn test_overloading_insert_evicts_exactly_one_victim() {
        let mut scheduler = queue_fixture();
        admit(&mut scheduler, 0, 10);
        admit(&mut scheduler, 2, 6);
        // Task 1 lands at the tail with a prefix sum of 15 > 12: infeasible.
        assert!(!admit(&mut scheduler, 1, 12));
        assert!(scheduler.evict_victim());
        // The overloaded entry was itself Low, so it is the victim.
        assert_eq!(scheduler.queue, vec![2, 0]);
        assert_eq!(scheduler.states[1].lifecycle, Lifecycle::Rejected);
        assert_queue_consistent(&scheduler);
    }

    #[test]
    fn test_eviction_biases_away_from_high_tasks() {
        let mut scheduler = REDScheduler::new(TaskSet::new(vec![
            Task::new(1, 8, Criticality::Low, 3, 0, vec![3; 2]),
            Task::new(2, 9, Criticality::High, 3, 7, vec![3; 2]),
        ]));
        admit(&mut scheduler, 0, 8);
        // The High job overloads its own slot, but the earlier Low entry is
        // sacrificed instead.
        assert!(!admit(&mut scheduler, 1, 9));
        assert!(scheduler.evict_victim());
        assert_eq!(scheduler.queue, vec![1]);
        assert_eq!(scheduler.states[0].lifecycle, Lifecycle::Rejected);
        assert_eq!(scheduler.states[1].wcet, 7);
        assert_queue_consistent(&scheduler);
    }

    #[test]
    fn test_remove_head_readmits_rejected_job() {
        let mut scheduler = queue_fixture();
        admit(&mut scheduler, 0, 10);
        admit(&mut scheduler, 2, 6);
        admit(&mut scheduler, 1, 12);
        while !scheduler.evict_victim() {}
        assert_eq!(scheduler.states[1].lifecycle, Lifecycle::Rejected);

        // Finishing the head frees enough worst-case slack for task 1.
        scheduler.remove_head();
        assert_eq!(scheduler.queue, vec![0, 1]);
        assert_eq!(scheduler.states[1].lifecycle, Lifecycle::Ready);
        assert_queue_consistent(&scheduler);
    }

    #[test]
    fn test_feasible_set_runs_clean() {
        let task_set = TaskSet::new(vec![
            Task::new(1, 5, Criticality::Low, 2, 0, vec![2; 5]),
            Task::new(2, 7, Criticality::High, 3, 3, vec![3; 3]),
        ]);
        let mut scheduler = REDScheduler::new(task_set);
        scheduler.schedule(1, 20);

        assert_eq!(scheduler.metrics().succeeded_low, 4);
        assert_eq!(scheduler.metrics().succeeded_high, 3);
        assert_eq!(scheduler.metrics().failed_low, 0);
        assert_eq!(scheduler.metrics().failed_high, 0);
        assert_eq!(scheduler.low_success_ratio(), 1.0);
        assert_eq!(scheduler.high_success_ratio(), 1.0);
        // One re-evaluation is charged on every tick.
        assert_eq!(scheduler.context_switches(), 21);
    }

    #[test]
    fn test_rejected_job_fails_only_at_its_deadline() {
        // Two tasks that each fill their whole period: only one fits.
        let task_set = TaskSet::new(vec![
            Task::new(1, 4, Criticality::Low, 4, 0, vec![4; 4]),
            Task::new(2, 4, Criticality::High, 4, 4, vec![4; 4]),
        ]);
        let mut scheduler = REDScheduler::new(task_set);
        scheduler.schedule(1, 12);

        // The High jobs win every admission contest.
        assert_eq!(scheduler.metrics().succeeded_high, 3);
        assert_eq!(scheduler.metrics().failed_high, 0);
        assert_eq!(scheduler.metrics().succeeded_low, 0);
        assert_eq!(scheduler.metrics().failed_low, 2);
        assert_eq!(scheduler.high_success_ratio(), 1.0);
        assert_eq!(scheduler.low_success_ratio(), 0.0);
    }

    #[test]
    fn test_repeated_runs_are_idempotent() {
        let task_set = TaskSet::new(vec![
            Task::new(1, 5, Criticality::Low, 2, 0, vec![2; 5]),
            Task::new(2, 7, Criticality::High, 3, 3, vec![3; 3]),
        ]);
        let mut scheduler = REDScheduler::new(task_set);
        scheduler.schedule(1, 20);
        let first = scheduler.metrics().clone();
        scheduler.schedule(1, 20);
        assert_eq!(*scheduler.metrics(), first);
    }
}
