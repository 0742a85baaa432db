use crate::models::TimeStep;
use gcd::Gcd;

fn lcm(a: TimeStep, b: TimeStep) -> TimeStep {
    (a * b) / a.gcd(b)
}

pub fn multiple_lcm(numbers: &[TimeStep]) -> TimeStep {
    numbers.iter().fold(1, |acc, &x| lcm(acc, x))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multiple_lcm() {
        assert_eq!(multiple_lcm(&[4, 6]), 12);
        assert_eq!(multiple_lcm(&[10, 15, 6]), 30);
        assert_eq!(multiple_lcm(&[]), 1);
    }
}
