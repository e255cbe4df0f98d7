use serde::{Deserialize, Serialize};

/// Verdict of the pre-routing scope check.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputVerdict {
    pub is_off_topic: bool,
    pub tripwire_reason: Option<String>,
    /// The classifier could not decide and passed the request through.
    pub low_confidence: bool,
}

impl InputVerdict {
    pub fn pass() -> Self {
        Self::default()
    }

    pub fn off_topic(reason: impl Into<String>) -> Self {
        Self { is_off_topic: true, tripwire_reason: Some(reason.into()), low_confidence: false }
    }

    pub fn undecided() -> Self {
        Self { is_off_topic: false, tripwire_reason: None, low_confidence: true }
    }

    pub fn is_tripped(&self) -> bool {
        self.is_off_topic
    }
}

/// Verdict of the cross-domain leak check run on a specialist draft.
///
/// `contains_order_data` is recorded for audit but does not trip the verdict.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputVerdict {
    pub contains_off_topic: bool,
    pub contains_billing_data: bool,
    pub contains_account_data: bool,
    pub contains_order_data: bool,
}

impl OutputVerdict {
    pub fn clean() -> Self {
        Self::default()
    }

    pub fn is_tripped(&self) -> bool {
        self.contains_off_topic || self.contains_billing_data || self.contains_account_data
    }

    pub fn flagged_categories(&self) -> Vec<&'static str> {
        let mut flagged = Vec::new();
        if self.contains_off_topic {
            flagged.push("off_topic");
        }
        if self.contains_billing_data {
            flagged.push("billing");
        }
        if self.contains_account_data {
            flagged.push("account");
        }
        if self.contains_order_data {
            flagged.push("order");
        }
        flagged
    }
}

#[cfg(test)]
mod tests {
    use super::{InputVerdict, OutputVerdict};

    #[test]
    fn undecided_input_passes_with_low_confidence() {
        let verdict = InputVerdict::undecided();
        assert!(!verdict.is_tripped());
        assert!(verdict.low_confidence);
    }

    #[test]
    fn billing_flag_trips_the_verdict() {
        assert!(!OutputVerdict::clean().is_tripped());

        let verdict = OutputVerdict { contains_billing_data: true, ..OutputVerdict::clean() };
        assert!(verdict.is_tripped());
        assert_eq!(verdict.flagged_categories(), vec!["billing"]);
    }

    #[test]
    fn order_flag_is_recorded_without_tripping() {
        let verdict = OutputVerdict { contains_order_data: true, ..OutputVerdict::clean() };
        assert!(!verdict.is_tripped());
        assert_eq!(verdict.flagged_categories(), vec!["order"]);
    }
}
