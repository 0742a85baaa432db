use std::ops::Index;

use crate::utils::lcm::multiple_lcm;

use super::{Criticality, Task, TimeStep};

#[derive(Clone, Debug)]
pub struct TaskSet {
    tasks: Vec<Task>,
}

impl TaskSet {
    pub fn new(tasks: Vec<Task>) -> Self {
        Self { tasks }
    }

    pub fn get_tasks(&self) -> &Vec<Task> {
        &self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<Task> {
        self.tasks.iter()
    }

    /// Sum of Low-mode utilisations of the Low-criticality tasks.
    pub fn low_utilisation(&self) -> f64 {
        self.tasks
            .iter()
            .filter(|t| t.criticality() == Criticality::Low)
            .map(|t| t.low_utilisation())
            .sum()
    }

    /// Sum of Low-mode utilisations of the High and Interrupt tasks.
    pub fn high_utilisation_low_mode(&self) -> f64 {
        self.tasks
            .iter()
            .filter(|t| t.criticality() != Criticality::Low)
            .map(|t| t.low_utilisation())
            .sum()
    }

    /// Least common multiple of all task periods.
    pub fn hyperperiod(&self) -> TimeStep {
        multiple_lcm(&self.tasks.iter().map(|t| t.period()).collect::<Vec<_>>())
    }

    /// Whether every task records enough execution times to cover all the
    /// jobs it releases in `[0, horizon]`.
    pub fn supports_horizon(&self, horizon: TimeStep) -> bool {
        self.tasks
            .iter()
            .all(|t| t.execution_times().len() > horizon / t.period())
    }
}

impl Index<usize> for TaskSet {
    type Output = Task;

    fn index(&self, index: usize) -> &Self::Output {
        &self.tasks[index]
    }
}
