//! Priority & SLA Computation
//! Mission: Deterministic urgency classification for intake tickets

use chrono::{DateTime, Duration, Utc};

use super::models::{AssetCriticality, ExposureLevel, PriorityLevel, TimeSensitivity};

/// Compute a priority level using deterministic weighting.
pub fn compute_priority(
    risk_score: f64,
    asset_criticality: AssetCriticality,
    exposure_level: ExposureLevel,
    time_sensitivity: TimeSensitivity,
) -> PriorityLevel {
    let mut adjusted = risk_score;

    adjusted += match asset_criticality {
        AssetCriticality::Low | AssetCriticality::Medium => 0.0,
        AssetCriticality::High => 10.0,
        AssetCriticality::MissionCritical => 20.0,
    };
    adjusted += match exposure_level {
        ExposureLevel::Internal => 0.0,
        ExposureLevel::External => 10.0,
    };
    adjusted += match time_sensitivity {
        TimeSensitivity::None => 0.0,
        TimeSensitivity::ExploitObserved => 10.0,
        TimeSensitivity::ActiveAttack => 15.0,
    };

    if adjusted >= 85.0 {
        PriorityLevel::P1
    } else if adjusted >= 70.0 {
        PriorityLevel::P2
    } else if adjusted >= 50.0 {
        PriorityLevel::P3
    } else {
        PriorityLevel::P4
    }
}

/// SLA deadline per priority class.
pub fn compute_sla_deadline(priority: PriorityLevel, now: DateTime<Utc>) -> DateTime<Utc> {
    let sla_hours = match priority {
        PriorityLevel::P1 => 4,
        PriorityLevel::P2 => 24,
        PriorityLevel::P3 => 72,
        PriorityLevel::P4 => 168,
    };
    now + Duration::hours(sla_hours)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_boundaries() {
        let base = |score| {
            compute_priority(
                score,
                AssetCriticality::Low,
                ExposureLevel::Internal,
                TimeSensitivity::None,
            )
        };
        assert_eq!(base(85.0), PriorityLevel::P1);
        assert_eq!(base(84.9), PriorityLevel::P2);
        assert_eq!(base(70.0), PriorityLevel::P2);
        assert_eq!(base(69.9), PriorityLevel::P3);
        assert_eq!(base(50.0), PriorityLevel::P3);
        assert_eq!(base(49.9), PriorityLevel::P4);
    }

    #[test]
    fn test_context_bonuses_stack() {
        // 50 + 20 (mission critical) + 10 (external) + 15 (active attack) = 95.
        assert_eq!(
            compute_priority(
                50.0,
                AssetCriticality::MissionCritical,
                ExposureLevel::External,
                TimeSensitivity::ActiveAttack,
            ),
            PriorityLevel::P1
        );
    }

    #[test]
    fn test_high_criticality_bonus() {
        assert_eq!(
            compute_priority(
                75.0,
                AssetCriticality::High,
                ExposureLevel::Internal,
                TimeSensitivity::None,
            ),
            PriorityLevel::P1
        );
        assert_eq!(
            compute_priority(
                75.0,
                AssetCriticality::Medium,
                ExposureLevel::Internal,
                TimeSensitivity::None,
            ),
            PriorityLevel::P2
        );
    }

    #[test]
    fn test_sla_hours_per_priority() {
        let now = Utc::now();
        assert_eq!(compute_sla_deadline(PriorityLevel::P1, now) - now, Duration::hours(4));
        assert_eq!(compute_sla_deadline(PriorityLevel::P2, now) - now, Duration::hours(24));
        assert_eq!(compute_sla_deadline(PriorityLevel::P3, now) - now, Duration::hours(72));
        assert_eq!(compute_sla_deadline(PriorityLevel::P4, now) - now, Duration::hours(168));
    }
}
