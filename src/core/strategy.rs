//! Pluggable scoring strategies.
//!
//! Every strategy turns a (requester, candidate) pair into a 0-100 score plus
//! rationale metadata. `execute` ranks a candidate set and truncates it to the
//! strategy's result cap.

use std::cmp::Ordering;

use crate::core::scoring::{
    calculate_distance_score, calculate_preference_score, effective_distance_km,
    precomputed_or_preference_score, round_score, shared_categories,
};
use crate::models::{
    MatchMetadata, MatchableEntity, ProposedMatch, StrategyKind, StrategySettings,
};

/// Result cap for the distance and preference strategies
pub const STANDARD_RESULT_LIMIT: usize = 50;

/// Result cap for the hybrid strategy
pub const HYBRID_RESULT_LIMIT: usize = 10;

/// Score and rationale for a single candidate
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub score: f64,
    pub metadata: MatchMetadata,
}

/// Shared contract of all scoring algorithms
pub trait ScoringStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    /// Maximum number of matches returned by `execute`
    fn result_limit(&self) -> usize;

    /// Score a candidate (0-100) with default settings
    fn score(&self, requester: &MatchableEntity, candidate: &MatchableEntity) -> f64;

    /// Score a candidate and describe why
    fn evaluate(
        &self,
        requester: &MatchableEntity,
        candidate: &MatchableEntity,
        settings: &StrategySettings,
    ) -> Evaluation;

    /// Score every candidate, rank descending and keep the top results
    fn execute(
        &self,
        requester: &MatchableEntity,
        candidates: &[MatchableEntity],
        settings: &StrategySettings,
    ) -> Vec<ProposedMatch> {
        let mut proposals: Vec<ProposedMatch> = candidates
            .iter()
            .map(|candidate| {
                let evaluation = self.evaluate(requester, candidate, settings);
                ProposedMatch {
                    entity_a: requester.reference(),
                    entity_b: candidate.reference(),
                    score: evaluation.score.clamp(0.0, 100.0),
                    metadata: evaluation.metadata,
                }
            })
            .collect();

        proposals.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        proposals.truncate(self.result_limit());
        proposals
    }
}

impl StrategyKind {
    /// Strategy implementing this kind.
    ///
    /// `Skill` is not implemented and falls back to distance.
    pub fn resolve(self) -> &'static dyn ScoringStrategy {
        match self {
            StrategyKind::Distance => &DistanceStrategy,
            StrategyKind::Preference => &PreferenceStrategy,
            StrategyKind::Hybrid => &HybridStrategy,
            StrategyKind::Skill => {
                tracing::debug!("Strategy 'skill' is not implemented, using distance");
                &DistanceStrategy
            }
        }
    }
}

fn distance_meters(requester: &MatchableEntity, candidate: &MatchableEntity) -> Option<f64> {
    effective_distance_km(requester, candidate).map(|km| km * 1000.0)
}

fn describe_distance(requester: &MatchableEntity, candidate: &MatchableEntity) -> String {
    match effective_distance_km(requester, candidate) {
        Some(km) => format!("about {:.1}km away", km),
        None => "distance unknown".to_string(),
    }
}

/// Ranks by physical proximity with a small reputation bonus
#[derive(Debug, Clone, Copy, Default)]
pub struct DistanceStrategy;

impl ScoringStrategy for DistanceStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Distance
    }

    fn result_limit(&self) -> usize {
        STANDARD_RESULT_LIMIT
    }

    fn score(&self, requester: &MatchableEntity, candidate: &MatchableEntity) -> f64 {
        calculate_distance_score(requester, candidate)
    }

    fn evaluate(
        &self,
        requester: &MatchableEntity,
        candidate: &MatchableEntity,
        settings: &StrategySettings,
    ) -> Evaluation {
        let score = self.score(requester, candidate);
        let explanation = settings
            .enable_explanation
            .then(|| format!("Candidate is {}.", describe_distance(requester, candidate)));

        Evaluation {
            score,
            metadata: MatchMetadata {
                distance_meters: distance_meters(requester, candidate),
                explanation,
                distance_score: Some(score),
                preference_match: Some(precomputed_or_preference_score(requester, candidate)),
            },
        }
    }
}

/// Ranks by overlap of category tags
#[derive(Debug, Clone, Copy, Default)]
pub struct PreferenceStrategy;

impl ScoringStrategy for PreferenceStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Preference
    }

    fn result_limit(&self) -> usize {
        STANDARD_RESULT_LIMIT
    }

    fn score(&self, requester: &MatchableEntity, candidate: &MatchableEntity) -> f64 {
        calculate_preference_score(requester, candidate)
    }

    fn evaluate(
        &self,
        requester: &MatchableEntity,
        candidate: &MatchableEntity,
        settings: &StrategySettings,
    ) -> Evaluation {
        let score = precomputed_or_preference_score(requester, candidate);
        let explanation = settings
            .enable_explanation
            .then(|| format!("{:.0}% of your interests are shared.", score));

        Evaluation {
            score,
            metadata: MatchMetadata {
                distance_meters: distance_meters(requester, candidate),
                explanation,
                distance_score: None,
                preference_match: Some(score),
            },
        }
    }
}

/// Weighted blend of the distance and preference scores
#[derive(Debug, Clone, Copy, Default)]
pub struct HybridStrategy;

impl HybridStrategy {
    fn explain(
        &self,
        requester: &MatchableEntity,
        candidate: &MatchableEntity,
        score: f64,
    ) -> String {
        let common = candidate
            .profile
            .common_categories
            .clone()
            .unwrap_or_else(|| shared_categories(requester, candidate));

        let mut message = format!("Overall score {:.1}. ", score);
        if !common.is_empty() {
            message.push_str(&format!("Shared interests: {}. ", common.join(", ")));
        }
        let distance = describe_distance(requester, candidate);
        message.push_str(&format!("Candidate is {}.", distance));
        message
    }
}

impl ScoringStrategy for HybridStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Hybrid
    }

    fn result_limit(&self) -> usize {
        HYBRID_RESULT_LIMIT
    }

    fn score(&self, requester: &MatchableEntity, candidate: &MatchableEntity) -> f64 {
        self.evaluate(requester, candidate, &StrategySettings::default()).score
    }

    fn evaluate(
        &self,
        requester: &MatchableEntity,
        candidate: &MatchableEntity,
        settings: &StrategySettings,
    ) -> Evaluation {
        let (distance_weight, preference_weight) = settings.effective_weights();

        let distance_score = calculate_distance_score(requester, candidate);
        let preference_score = precomputed_or_preference_score(requester, candidate);
        let score = round_score(distance_score * distance_weight + preference_score * preference_weight);

        let explanation = settings
            .enable_explanation
            .then(|| self.explain(requester, candidate, score));

        Evaluation {
            score,
            metadata: MatchMetadata {
                distance_meters: distance_meters(requester, candidate),
                explanation,
                distance_score: Some(distance_score),
                preference_match: Some(preference_score),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EntityProfile, EntityType, GeoPoint};

    fn requester(categories: &[&str]) -> MatchableEntity {
        MatchableEntity {
            id: "requester".to_string(),
            entity_type: EntityType::User,
            profile: EntityProfile {
                location: Some(GeoPoint::new(37.5665, 126.9780)),
                categories: Some(categories.iter().map(|c| c.to_string()).collect()),
                ..EntityProfile::default()
            },
        }
    }

    fn candidate(id: &str, distance_m: f64, categories: &[&str]) -> MatchableEntity {
        MatchableEntity {
            id: id.to_string(),
            entity_type: EntityType::Team,
            profile: EntityProfile {
                distance: Some(distance_m),
                categories: Some(categories.iter().map(|c| c.to_string()).collect()),
                ..EntityProfile::default()
            },
        }
    }

    #[test]
    fn test_hybrid_default_weights() {
        let matches = HybridStrategy.execute(
            &requester(&["sports", "gaming"]),
            &[candidate("c1", 500.0, &["sports", "gaming"])],
            &StrategySettings::default(),
        );

        // 94 * 0.7 + 100 * 0.3
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].score, 95.8);
        assert_eq!(matches[0].metadata.distance_score, Some(94.0));
        assert_eq!(matches[0].metadata.preference_match, Some(100.0));
    }

    #[test]
    fn test_hybrid_respects_custom_weights() {
        let requester = requester(&["sports"]);
        let candidates = [candidate("c1", 500.0, &["gaming"])];

        let distance_heavy = StrategySettings {
            distance_weight: 0.9,
            preference_weight: 0.1,
            ..StrategySettings::default()
        };
        let matches = HybridStrategy.execute(&requester, &candidates, &distance_heavy);
        assert!(matches[0].score > 80.0);

        let preference_only = StrategySettings {
            distance_weight: 0.0,
            preference_weight: 1.0,
            ..StrategySettings::default()
        };
        let matches = HybridStrategy.execute(&requester, &candidates, &preference_only);
        assert_eq!(matches[0].score, 0.0);
    }

    #[test]
    fn test_hybrid_explanation_names_categories_and_distance() {
        let mut candidate = candidate("c1", 1200.0, &["sports", "travel"]);
        candidate.profile.common_categories = Some(vec!["sports".to_string()]);

        let matches = HybridStrategy.execute(
            &requester(&["sports", "gaming"]),
            &[candidate],
            &StrategySettings::default(),
        );

        let explanation = matches[0].metadata.explanation.as_deref().unwrap();
        assert!(explanation.contains("sports"));
        assert!(explanation.contains("1.2km"));
    }

    #[test]
    fn test_explanation_disabled() {
        let settings = StrategySettings {
            enable_explanation: false,
            ..StrategySettings::default()
        };
        for kind in [StrategyKind::Distance, StrategyKind::Preference, StrategyKind::Hybrid] {
            let matches = kind.resolve().execute(
                &requester(&["sports"]),
                &[candidate("c1", 300.0, &["sports"])],
                &settings,
            );
            assert!(matches[0].metadata.explanation.is_none(), "{:?}", kind);
        }
    }

    #[test]
    fn test_result_caps() {
        let candidates: Vec<MatchableEntity> = (0..60)
            .map(|i| candidate(&format!("c{}", i), 100.0 * i as f64, &["sports"]))
            .collect();
        let requester = requester(&["sports"]);
        let settings = StrategySettings::default();

        assert_eq!(DistanceStrategy.execute(&requester, &candidates, &settings).len(), 50);
        assert_eq!(PreferenceStrategy.execute(&requester, &candidates, &settings).len(), 50);
        assert_eq!(HybridStrategy.execute(&requester, &candidates, &settings).len(), 10);
    }

    #[test]
    fn test_execute_sorts_descending() {
        let matches = DistanceStrategy.execute(
            &requester(&[]),
            &[
                candidate("far", 25_000.0, &[]),
                candidate("near", 200.0, &[]),
                candidate("mid", 4_000.0, &[]),
            ],
            &StrategySettings::default(),
        );

        let order: Vec<&str> = matches.iter().map(|m| m.entity_b.id.as_str()).collect();
        assert_eq!(order, vec!["near", "mid", "far"]);
    }

    #[test]
    fn test_skill_resolves_to_distance() {
        assert_eq!(StrategyKind::Skill.resolve().kind(), StrategyKind::Distance);
        assert_eq!(StrategyKind::Hybrid.resolve().kind(), StrategyKind::Hybrid);
    }

    #[test]
    fn test_preference_uses_precomputed_score() {
        let mut candidate = candidate("c1", 1000.0, &["sports"]);
        candidate.profile.category_match_score = Some(75.0);

        let matches = PreferenceStrategy.execute(
            &requester(&["sports", "gaming"]),
            &[candidate],
            &StrategySettings::default(),
        );
        assert_eq!(matches[0].score, 75.0);
        assert_eq!(matches[0].metadata.preference_match, Some(75.0));
    }
}
