//! Finding Risk Shaping
//! Mission: Adjust severity and confidence from resolved context

use super::models::ContextSnapshot;

const SEVERITY_LADDER: [&str; 4] = ["low", "medium", "high", "critical"];

/// Raise severity one step when the asset context elevates impact.
pub fn boost_severity(base: &str, context: &ContextSnapshot) -> String {
    let elevated = context.asset.as_ref().is_some_and(|asset| {
        matches!(asset.criticality.as_str(), "high" | "mission_critical")
            || asset.exposure == "external"
    });
    if !elevated {
        return base.to_string();
    }
    let position = SEVERITY_LADDER
        .iter()
        .position(|step| *step == base)
        .unwrap_or(0);
    SEVERITY_LADDER[(position + 1).min(SEVERITY_LADDER.len() - 1)].to_string()
}

/// Confidence grows with context richness, clamped to 1.0.
pub fn compute_confidence(base: f64, context: &ContextSnapshot) -> f64 {
    let mut confidence = base;
    if context.asset.is_some() {
        confidence += 0.05;
    }
    if context.identity.is_some() {
        confidence += 0.05;
    }
    if context.baseline.is_some() {
        confidence += 0.05;
    }
    if context.patch_state.is_some() {
        confidence += 0.05;
    }
    confidence.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::models::AssetContext;

    fn context_with(criticality: &str, exposure: &str) -> ContextSnapshot {
        ContextSnapshot {
            asset: Some(AssetContext {
                asset_id: "asset-01234567".to_string(),
                criticality: criticality.to_string(),
                exposure: exposure.to_string(),
            }),
            ..ContextSnapshot::default()
        }
    }

    #[test]
    fn test_low_criticality_internal_keeps_severity() {
        assert_eq!(boost_severity("medium", &context_with("low", "internal")), "medium");
    }

    #[test]
    fn test_mission_critical_boosts_one_step() {
        assert_eq!(
            boost_severity("medium", &context_with("mission_critical", "internal")),
            "high"
        );
    }

    #[test]
    fn test_external_exposure_boosts() {
        assert_eq!(boost_severity("high", &context_with("low", "external")), "critical");
    }

    #[test]
    fn test_critical_does_not_overflow() {
        assert_eq!(
            boost_severity("critical", &context_with("mission_critical", "external")),
            "critical"
        );
    }

    #[test]
    fn test_confidence_grows_with_context_and_clamps() {
        let empty = ContextSnapshot::default();
        assert!((compute_confidence(0.5, &empty) - 0.5).abs() < 1e-9);

        let rich = context_with("low", "internal");
        assert!((compute_confidence(0.5, &rich) - 0.55).abs() < 1e-9);

        assert!((compute_confidence(0.99, &rich) - 1.0).abs() < 1e-9);
    }
}
