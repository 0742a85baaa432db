use std::error::Error;
use std::fmt;

/// Errors produced while reading a task-set file.
#[derive(Debug)]
pub enum TaskSetError {
    Csv(csv::Error),
    MissingField { line: usize, field: &'static str },
    InvalidNumber { line: usize, value: String },
    InvalidCriticality { line: usize, value: String },
    NonPositivePeriod { line: usize },
}

impl fmt::Display for TaskSetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskSetError::Csv(e) => write!(f, "task file: {}", e),
            TaskSetError::MissingField { line, field } => {
                write!(f, "task file line {}: missing field '{}'", line, field)
            }
            TaskSetError::InvalidNumber { line, value } => {
                write!(f, "task file line {}: '{}' is not a valid number", line, value)
            }
            TaskSetError::InvalidCriticality { line, value } => {
                write!(f, "task file line {}: '{}' is not one of L, H, I", line, value)
            }
            TaskSetError::NonPositivePeriod { line } => {
                write!(f, "task file line {}: period must be positive", line)
            }
        }
    }
}

impl Error for TaskSetError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            TaskSetError::Csv(e) => Some(e),
            _ => None,
        }
    }
}

impl From<csv::Error> for TaskSetError {
    fn from(e: csv::Error) -> Self {
        TaskSetError::Csv(e)
    }
}
