/// Aggregated view of session progress, useful for UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionProgress {
    pub total: usize,
    pub answered: usize,
    pub current: usize,
    pub remaining_secs: Option<u32>,
    pub answered_flags: Vec<bool>,
}

impl SessionProgress {
    #[must_use]
    pub fn from_flags(
        answered_flags: Vec<bool>,
        current: usize,
        remaining_secs: Option<u32>,
    ) -> Self {
        Self {
            total: answered_flags.len(),
            answered: answered_flags.iter().filter(|answered| **answered).count(),
            current,
            remaining_secs,
            answered_flags,
        }
    }

    #[must_use]
    pub fn unanswered(&self) -> usize {
        self.total - self.answered
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.answered == self.total
    }
}
