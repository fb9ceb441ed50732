use std::fmt::Display;

use log::warn;

/// Collects the outcome of side effects that must never change
/// the result of the operation that triggered them.
///
/// Each failure is logged as it is recorded, nothing is ever returned as an error.
#[derive(Debug)]
pub struct BestEffort {
    task: &'static str,
    attempted: usize,
    failures: Vec<String>,
}

/// What happened to a batch of best-effort side effects
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EffectReport {
    pub attempted: usize,
    /// One entry per failed attempt, naming what it was for
    pub failures: Vec<String>,
}

impl BestEffort {
    pub fn new(task: &'static str) -> Self {
        Self {
            task,
            attempted: 0,
            failures: vec![],
        }
    }

    /// Records the result of one attempt, logging it if it failed
    pub fn record<E>(&mut self, subject: impl Display, result: Result<(), E>)
    where
        E: Display,
    {
        self.attempted += 1;

        if let Err(e) = result {
            warn!("Failed to {} for {}: {}", self.task, subject, e);
            self.failures.push(subject.to_string());
        }
    }

    pub fn finish(self) -> EffectReport {
        EffectReport {
            attempted: self.attempted,
            failures: self.failures,
        }
    }
}

impl EffectReport {
    pub fn succeeded(&self) -> usize {
        self.attempted - self.failures.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failures_are_collected_not_raised() {
        let mut effects = BestEffort::new("delete file");

        effects.record("/a.png", Ok::<(), String>(()));
        effects.record("/b.png", Err("permission denied"));
        effects.record("/c.png", Ok::<(), &str>(()));

        let report = effects.finish();

        assert_eq!(report.attempted, 3);
        assert_eq!(report.succeeded(), 2);
        assert_eq!(report.failures, vec!["/b.png".to_string()]);
    }
}
