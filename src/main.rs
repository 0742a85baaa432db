use std::process;

use clap::{Arg, ArgMatches, Command};
use csv::ReaderBuilder;

use mcsim::constants::PolicyKind;
use mcsim::{
    Criticality, EarliestDeadlineFirst, EDFVDScheduler, FMCDropScheduler, FMCScheduler,
    HFMCScheduler, REDScheduler, Scheduler, Task, TaskSet, TaskSetError, TimeStep,
};

/// Reads a task-set file and returns a `TaskSet`.
///
/// One task per record: `period, criticality (L|H|I), lowC, highC` followed
/// by the recorded per-job execution times.
pub fn read_task_file(file_path: &str) -> Result<TaskSet, TaskSetError> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(file_path)?;
    let mut tasks = Vec::new();

    for (index, result) in rdr.records().enumerate() {
        let record = result?;
        let line = index + 1;

        let field = |i: usize, name: &'static str| {
            record
                .get(i)
                .map(str::trim)
                .ok_or(TaskSetError::MissingField { line, field: name })
        };
        let number = |i: usize, name: &'static str| -> Result<TimeStep, TaskSetError> {
            let raw = field(i, name)?;
            raw.parse().map_err(|_| TaskSetError::InvalidNumber {
                line,
                value: raw.to_string(),
            })
        };

        let period = number(0, "period")?;
        if period == 0 {
            return Err(TaskSetError::NonPositivePeriod { line });
        }
        let crit_raw = field(1, "criticality")?;
        let criticality: Criticality =
            crit_raw
                .parse()
                .map_err(|_| TaskSetError::InvalidCriticality {
                    line,
                    value: crit_raw.to_string(),
                })?;
        let low_wcet = number(2, "lowC")?;
        let high_wcet = number(3, "highC")?;

        let mut execution_times = Vec::new();
        for i in 4..record.len() {
            execution_times.push(number(i, "execution time")?);
        }

        tasks.push(Task::new(
            (index + 1) as u32,
            period,
            criticality,
            low_wcet,
            high_wcet,
            execution_times,
        ));
    }

    Ok(TaskSet::new(tasks))
}

pub fn build_cli_command() -> Command {
    Command::new("mcsim")
        .version("0.1.0")
        .about("Simulates mixed-criticality scheduling policies over a recorded task set")
        .arg(
            Arg::new("task_file")
                .required(true)
                .help("Path to the task-set file"),
        )
        .arg(
            Arg::new("quantum")
                .short('q')
                .long("quantum")
                .default_value("1")
                .help("Decision quantum in ticks"),
        )
        .arg(
            Arg::new("horizon")
                .short('t')
                .long("horizon")
                .help("Last simulated tick (default: the task-set hyperperiod)"),
        )
        .arg(
            Arg::new("policy")
                .short('p')
                .long("policy")
                .default_value("all")
                .value_parser(["edf", "edf-vd", "fmc", "fmc-drop", "h-fmc", "red", "all"])
                .help("Scheduling policy to simulate"),
        )
}

fn build_scheduler(kind: PolicyKind, task_set: TaskSet) -> Box<dyn Scheduler> {
    match kind {
        PolicyKind::Edf => Box::new(EarliestDeadlineFirst::new(task_set)),
        PolicyKind::EdfVd => Box::new(EDFVDScheduler::new(task_set)),
        PolicyKind::Fmc => Box::new(FMCScheduler::new(task_set)),
        PolicyKind::FmcDrop => Box::new(FMCDropScheduler::new(task_set)),
        PolicyKind::HFmc => Box::new(HFMCScheduler::new(task_set)),
        PolicyKind::Red => Box::new(REDScheduler::new(task_set)),
    }
}

fn selected_policies(matches: &ArgMatches) -> Vec<PolicyKind> {
    let policy = matches.get_one::<String>("policy").unwrap();
    match policy.as_str() {
        "all" => PolicyKind::ALL.to_vec(),
        name => PolicyKind::ALL
            .iter()
            .copied()
            .filter(|kind| kind.label() == name)
            .collect(),
    }
}

fn main() {
    // cargo run <task_file> [-q <quantum>] [-t <horizon>] [-p <policy>]
    let matches: ArgMatches = build_cli_command().get_matches();

    let task_set = match read_task_file(matches.get_one::<String>("task_file").unwrap()) {
        Ok(task_set) => task_set,
        Err(e) => {
            eprintln!("Error reading task file: {}", e);
            process::exit(5);
        }
    };
    if task_set.is_empty() {
        eprintln!("Task file contains no tasks");
        process::exit(5);
    }

    let quantum = matches
        .get_one::<String>("quantum")
        .unwrap()
        .parse::<TimeStep>()
        .unwrap_or(1)
        .max(1);
    let horizon = match matches.get_one::<String>("horizon") {
        Some(raw) => raw.parse::<TimeStep>().unwrap_or_else(|_| {
            eprintln!("Invalid horizon: '{}'", raw);
            process::exit(5);
        }),
        None => task_set.hyperperiod(),
    };

    if !task_set.supports_horizon(horizon) {
        eprintln!(
            "A task records fewer execution times than jobs released in [0, {}]",
            horizon
        );
        process::exit(5);
    }

    println!("Simulating [0, {}] with quantum {}", horizon, quantum);

    // Each policy gets its own copy of the task set; instances are driven
    // strictly one after another.
    for kind in selected_policies(&matches) {
        let mut scheduler = build_scheduler(kind, task_set.clone());
        scheduler.schedule(quantum, horizon);
        println!(
            "{:<8}  low {:.3}  high {:.3}  int {:.3}  switches {}",
            scheduler.name(),
            scheduler.low_success_ratio(),
            scheduler.high_success_ratio(),
            scheduler.interrupt_success_ratio(),
            scheduler.context_switches()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_task_file_valid() {
        let task_file_content = "\
            5, L, 2, 0, 2, 2, 2\n\
            10, H, 3, 6, 3, 4";
        let file_path = "test_tasks.csv";

        std::fs::write(file_path, task_file_content).expect("Unable to write test file");

        let task_set = read_task_file(file_path).expect("Failed to read task set");
        assert_eq!(task_set.len(), 2);

        let low = &task_set[0];
        assert_eq!(low.id(), 1);
        assert_eq!(low.period(), 5);
        assert_eq!(low.criticality(), Criticality::Low);
        assert_eq!(low.low_wcet(), 2);
        assert_eq!(low.execution_times(), &[2, 2, 2]);

        let high = &task_set[1];
        assert_eq!(high.criticality(), Criticality::High);
        assert_eq!(high.high_wcet(), 6);
        assert_eq!(high.execution_times(), &[3, 4]);

        std::fs::remove_file(file_path).expect("Failed to clean up test file");
    }

    #[test]
    fn test_read_task_file_invalid_criticality() {
        let task_file_content = "5, X, 2, 0, 2";
        let file_path = "test_invalid_crit.csv";

        std::fs::write(file_path, task_file_content).expect("Unable to write test file");

        let result = read_task_file(file_path);
        assert!(matches!(
            result,
            Err(TaskSetError::InvalidCriticality { line: 1, .. })
        ));

        std::fs::remove_file(file_path).expect("Failed to clean up test file");
    }

    #[test]
    fn test_read_task_file_missing_fields() {
        let task_file_content = "5, L, 2";
        let file_path = "test_missing_fields.csv";

        std::fs::write(file_path, task_file_content).expect("Unable to write test file");

        let result = read_task_file(file_path);
        assert!(matches!(
            result,
            Err(TaskSetError::MissingField { line: 1, .. })
        ));

        std::fs::remove_file(file_path).expect("Failed to clean up test file");
    }

    #[test]
    fn test_command_line_arguments() {
        let matches = build_cli_command().try_get_matches_from(vec![
            "mcsim",
            "tasks.csv",
            "-q",
            "10",
            "-t",
            "5000",
            "-p",
            "red",
        ]);

        assert!(matches.is_ok());
        let matches = matches.unwrap();

        assert_eq!(matches.get_one::<String>("task_file").unwrap(), "tasks.csv");
        assert_eq!(matches.get_one::<String>("quantum").unwrap(), "10");
        assert_eq!(matches.get_one::<String>("horizon").unwrap(), "5000");
        assert_eq!(selected_policies(&matches), vec![PolicyKind::Red]);
    }

    #[test]
    fn test_policy_all_expands_to_every_kind() {
        let matches = build_cli_command()
            .try_get_matches_from(vec!["mcsim", "tasks.csv"])
            .unwrap();
        assert_eq!(selected_policies(&matches).len(), 6);
    }
}
