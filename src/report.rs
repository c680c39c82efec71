// 📊 Run summaries - what a pass created, updated, skipped, or failed on

use serde::Serialize;

/// One entity that could not be processed, with the reason
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    pub entity: String,
    pub reason: String,
}

impl Failure {
    pub fn new(entity: impl Into<String>, reason: impl ToString) -> Self {
        Failure {
            entity: entity.into(),
            reason: reason.to_string(),
        }
    }
}

/// Counts shared by every batch pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PassSummary {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub errored: usize,
    pub failures: Vec<Failure>,
}

impl PassSummary {
    /// Record a per-entity failure; the pass keeps going
    pub fn fail(&mut self, entity: impl Into<String>, reason: impl ToString) {
        self.errored += 1;
        self.failures.push(Failure::new(entity, reason));
    }

    pub fn summary(&self) -> String {
        format!(
            "{} created | {} updated | {} skipped | {} errors",
            self.created, self.updated, self.skipped, self.errored
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fail_counts_and_records() {
        let mut summary = PassSummary::default();
        summary.created += 2;
        summary.fail("MSFT", "lookup timed out");

        assert_eq!(summary.errored, 1);
        assert_eq!(summary.failures[0].entity, "MSFT");
        assert_eq!(summary.failures[0].reason, "lookup timed out");
        assert_eq!(
            summary.summary(),
            "2 created | 0 updated | 0 skipped | 1 errors"
        );
    }
}
