use crate::core::distance::distance_between;
use crate::models::MatchableEntity;

/// Rating score used when a candidate carries no rating
pub const DEFAULT_RATING_SCORE: f64 = 70.0;

/// Share of the distance score in the distance strategy's final score
const DISTANCE_SHARE: f64 = 0.8;

/// Share of the rating bonus in the distance strategy's final score
const RATING_SHARE: f64 = 0.2;

/// Round a score to two decimal places
#[inline]
pub fn round_score(score: f64) -> f64 {
    (score * 100.0).round() / 100.0
}

/// Distance between requester and candidate in kilometers
///
/// Prefers the distance precomputed by the candidate search (meters) and
/// falls back to Haversine. `None` when either side has no location.
pub fn effective_distance_km(requester: &MatchableEntity, candidate: &MatchableEntity) -> Option<f64> {
    if let Some(meters) = candidate.profile.distance {
        return Some(meters / 1000.0);
    }

    match (requester.profile.location, candidate.profile.location) {
        (Some(from), Some(to)) => Some(distance_between(from, to)),
        _ => None,
    }
}

/// Map a distance onto the proximity step function (0.5km is a perfect score)
pub fn proximity_score(distance_km: f64) -> f64 {
    match distance_km {
        d if d <= 0.5 => 100.0,
        d if d <= 1.0 => 95.0,
        d if d <= 3.0 => 85.0,
        d if d <= 5.0 => 70.0,
        d if d <= 10.0 => 50.0,
        d if d <= 20.0 => 30.0,
        _ => 10.0,
    }
}

/// Reputation score on a 0-100 scale
///
/// A missing or zero rating counts as unrated. Ratings above the 10-point
/// scale are capped at 100.
pub fn rating_score(candidate: &MatchableEntity) -> f64 {
    match candidate.profile.average_rating {
        Some(rating) if rating > 0.0 => (rating * 10.0).clamp(0.0, 100.0),
        _ => DEFAULT_RATING_SCORE,
    }
}

/// Distance score (0-100) blending proximity (80%) with reputation (20%)
pub fn calculate_distance_score(requester: &MatchableEntity, candidate: &MatchableEntity) -> f64 {
    let Some(distance_km) = effective_distance_km(requester, candidate) else {
        return 0.0;
    };

    let blended = proximity_score(distance_km) * DISTANCE_SHARE + rating_score(candidate) * RATING_SHARE;
    round_score(blended)
}

/// Categories of the requester that the candidate shares, in requester order
///
/// Comparison is exact and case-sensitive.
pub fn shared_categories(requester: &MatchableEntity, candidate: &MatchableEntity) -> Vec<String> {
    let theirs = candidate.profile.categories();
    requester
        .profile
        .categories()
        .iter()
        .filter(|category| theirs.contains(category))
        .cloned()
        .collect()
}

/// Preference score (0-100): share of the requester's categories the candidate also has
pub fn calculate_preference_score(requester: &MatchableEntity, candidate: &MatchableEntity) -> f64 {
    let ours = requester.profile.categories();
    if ours.is_empty() || candidate.profile.categories().is_empty() {
        return 0.0;
    }

    let shared = shared_categories(requester, candidate).len() as f64;
    (shared / ours.len() as f64 * 100.0).min(100.0)
}

/// Preference score supplied by the candidate search, or computed on the fly
pub fn precomputed_or_preference_score(requester: &MatchableEntity, candidate: &MatchableEntity) -> f64 {
    candidate
        .profile
        .category_match_score
        .map(|score| score.clamp(0.0, 100.0))
        .unwrap_or_else(|| calculate_preference_score(requester, candidate))
}
