use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::models::question::exceeds_score_scale;
use crate::models::quiz::NegativeMarking;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct UpdateNegativeMarkingRequest {
    pub enabled: bool,
    #[validate(custom(function = "validate_non_negative"))]
    pub penalty_value: Decimal,
}

impl From<UpdateNegativeMarkingRequest> for NegativeMarking {
    fn from(req: UpdateNegativeMarkingRequest) -> Self {
        NegativeMarking {
            enabled: req.enabled,
            penalty_value: req.penalty_value,
        }
    }
}

fn validate_non_negative(value: &Decimal) -> Result<(), ValidationError> {
    if *value < Decimal::ZERO {
        return Err(ValidationError::new("negative_penalty"));
    }
    if exceeds_score_scale(*value) {
        return Err(ValidationError::new("penalty_precision"));
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecalculationFailure {
    pub attempt_id: Uuid,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecalculationReport {
    pub quiz_id: Option<Uuid>,
    pub processed: usize,
    pub updated: usize,
    /// Stale attempts left for a later run because the batch limit was reached.
    pub deferred: usize,
    pub failures: Vec<RecalculationFailure>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_penalty_is_rejected() {
        let bad = UpdateNegativeMarkingRequest {
            enabled: true,
            penalty_value: Decimal::new(-25, 2),
        };
        assert!(bad.validate().is_err());

        let ok = UpdateNegativeMarkingRequest {
            enabled: true,
            penalty_value: Decimal::ZERO,
        };
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn penalty_beyond_four_decimals_is_rejected() {
        let req = UpdateNegativeMarkingRequest {
            enabled: true,
            penalty_value: Decimal::new(12_345, 5),
        };
        assert!(req.validate().is_err());
    }
}
