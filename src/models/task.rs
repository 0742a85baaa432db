use std::str::FromStr;

use super::{TimeStep, ID};

/// Criticality class of a task, deciding which WCET bound and eviction
/// priority apply to its jobs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Criticality {
    Low,
    High,
    Interrupt,
}

impl FromStr for Criticality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "L" => Ok(Criticality::Low),
            "H" => Ok(Criticality::High),
            "I" => Ok(Criticality::Interrupt),
            other => Err(format!("unknown criticality tag '{}'", other)),
        }
    }
}

/// A periodic task with per-criticality WCET bounds and the recorded
/// execution time of each of its job instances.
#[derive(Clone, Debug, PartialEq)]
pub struct Task {
    id: ID,
    period: TimeStep,        // T_i : period and relative deadline.
    criticality: Criticality,
    low_wcet: TimeStep,      // C_i(LO) : WCET bound assumed in Low mode.
    high_wcet: TimeStep,     // C_i(HI) : WCET bound assumed in High mode.
    execution_times: Vec<TimeStep>,
}

impl Task {
    pub fn new(
        id: ID,
        period: TimeStep,
        criticality: Criticality,
        low_wcet: TimeStep,
        high_wcet: TimeStep,
        execution_times: Vec<TimeStep>,
    ) -> Self {
        Self {
            id,
            period,
            criticality,
            low_wcet,
            high_wcet,
            execution_times,
        }
    }

    pub fn id(&self) -> ID {
        self.id
    }

    pub fn period(&self) -> TimeStep {
        self.period
    }

    pub fn criticality(&self) -> Criticality {
        self.criticality
    }

    pub fn low_wcet(&self) -> TimeStep {
        self.low_wcet
    }

    pub fn high_wcet(&self) -> TimeStep {
        self.high_wcet
    }

    pub fn execution_times(&self) -> &[TimeStep] {
        &self.execution_times
    }

    /// Recorded execution time of the job with the given sequence number.
    pub fn execution_time(&self, job_index: usize) -> TimeStep {
        self.execution_times[job_index]
    }

    /// The WCET bound admission control must assume for this task:
    /// `highC` for High tasks, `lowC` otherwise.
    pub fn effective_wcet(&self) -> TimeStep {
        match self.criticality {
            Criticality::High => self.high_wcet,
            _ => self.low_wcet,
        }
    }

    pub fn low_utilisation(&self) -> f64 {
        self.low_wcet as f64 / self.period as f64
    }

    pub fn high_utilisation(&self) -> f64 {
        self.high_wcet as f64 / self.period as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_criticality_from_str() {
        assert_eq!("L".parse::<Criticality>().unwrap(), Criticality::Low);
        assert_eq!(" H ".parse::<Criticality>().unwrap(), Criticality::High);
        assert_eq!("I".parse::<Criticality>().unwrap(), Criticality::Interrupt);
        assert!("X".parse::<Criticality>().is_err());
    }

    #[test]
    fn test_utilisation() {
        let task = Task::new(1, 10, Criticality::High, 2, 5, vec![2, 2]);
        assert!((task.low_utilisation() - 0.2).abs() < 1e-12);
        assert!((task.high_utilisation() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_effective_wcet_per_class() {
        let high = Task::new(1, 10, Criticality::High, 2, 5, vec![]);
        let low = Task::new(2, 10, Criticality::Low, 3, 0, vec![]);
        let int = Task::new(3, 10, Criticality::Interrupt, 4, 0, vec![]);
        assert_eq!(high.effective_wcet(), 5);
        assert_eq!(low.effective_wcet(), 3);
        assert_eq!(int.effective_wcet(), 4);
    }
}
