//! Aspect Significance Tests
//!
//! Ordering properties of the scorer and the selection ladders.

use voyager_transits::core::{rank_by_orb, score_aspect, tightest, Aspect, AspectScorer};

fn aspect(p1: &str, p2: &str, kind: &str, orbit: f64) -> Aspect {
    Aspect::new(p1, p2, kind, orbit)
}

// =============================================================================
// Monotonicity
// =============================================================================

#[test]
fn test_tighter_orb_scores_higher() {
    let tight = score_aspect(&aspect("Sun", "Moon", "trine", 1.0));
    let wide = score_aspect(&aspect("Sun", "Moon", "trine", 9.0));
    assert!(tight > wide, "{tight} should beat {wide}");
}

#[test]
fn test_orb_sign_does_not_matter() {
    assert_eq!(
        score_aspect(&aspect("Venus", "Mars", "square", -3.0)),
        score_aspect(&aspect("Venus", "Mars", "square", 3.0))
    );
}

#[test]
fn test_conjunction_beats_quincunx() {
    let conjunction = score_aspect(&aspect("Venus", "Mars", "conjunction", 2.0));
    let quincunx = score_aspect(&aspect("Venus", "Mars", "quincunx", 2.0));
    assert!(conjunction > quincunx);
}

#[test]
fn test_slow_pair_scores_below_personal_pair() {
    let slow = score_aspect(&aspect("Jupiter", "Saturn", "square", 1.0));
    let personal = score_aspect(&aspect("Sun", "Mars", "square", 1.0));
    assert!(slow < personal);
}

#[test]
fn test_minor_kinds_are_a_fraction_of_major() {
    let scorer = AspectScorer::default();
    let trine = scorer.score(&aspect("Sun", "Venus", "trine", 0.0));
    let minors = [
        "quincunx",
        "semisquare",
        "sesquiquadrate",
        "semisextile",
        "quintile",
        "biquintile",
    ];
    for minor in minors {
        let score = scorer.score(&aspect("Sun", "Venus", minor, 0.0));
        assert!(score < trine * 0.35, "{minor} scored {score}");
    }
}

#[test]
fn test_wide_angle_contact_is_suppressed() {
    let exact = score_aspect(&aspect("Ascendant", "Sun", "conjunction", 1.0));
    let loose = score_aspect(&aspect("Ascendant", "Sun", "conjunction", 3.0));
    assert!(loose < exact * 0.25);
}

#[test]
fn test_node_contacts_are_deprioritized() {
    let node = score_aspect(&aspect("Sun", "True_Node", "conjunction", 1.0));
    let chiron = score_aspect(&aspect("Sun", "Chiron", "conjunction", 1.0));
    assert!(node < chiron);
}

#[test]
fn test_scoring_is_deterministic() {
    let a = aspect("Moon", "Pluto", "opposition", 4.2);
    assert_eq!(score_aspect(&a), score_aspect(&a.clone()));
}

// =============================================================================
// Selection
// =============================================================================

#[test]
fn test_most_significant_prefers_luminaries() {
    let aspects = vec![
        aspect("Neptune", "Pluto", "sextile", 0.1),
        aspect("Sun", "Moon", "square", 3.0),
        aspect("Mercury", "Uranus", "quincunx", 0.5),
    ];
    let best = AspectScorer::default().most_significant(&aspects).unwrap();
    assert_eq!((best.p1_name.as_str(), best.p2_name.as_str()), ("Sun", "Moon"));
    assert!(AspectScorer::default().most_significant(&[]).is_none());
}

#[test]
fn test_top_significant_truncates() {
    let aspects = vec![
        aspect("Sun", "Moon", "trine", 1.0),
        aspect("Venus", "Mars", "trine", 1.0),
        aspect("Jupiter", "Saturn", "trine", 1.0),
    ];
    let top = AspectScorer::default().top_significant(&aspects, 2);
    assert_eq!(top.len(), 2);
    assert_eq!(top[1].p1_name, "Venus");
}

#[test]
fn test_tightest_ignores_significance() {
    let aspects = vec![
        aspect("Sun", "Moon", "conjunction", 2.0),
        aspect("Neptune", "Pluto", "sextile", -0.3),
    ];
    assert_eq!(tightest(&aspects).unwrap().p1_name, "Neptune");
    assert_eq!(rank_by_orb(&aspects)[1].p1_name, "Sun");
}

#[test]
fn test_nan_orbits_rank_last_without_panicking() {
    let aspects: Vec<Aspect> = (0..40)
        .map(|i| {
            let orbit = if i % 3 == 0 { f64::NAN } else { (i % 11) as f64 - 5.0 };
            aspect("Sun", "Moon", "trine", orbit)
        })
        .collect();
    let nan_count = aspects.iter().filter(|a| a.orbit.is_nan()).count();

    let by_orb = rank_by_orb(&aspects);
    assert_eq!(by_orb.len(), 40);
    let (finite, nan) = by_orb.split_at(40 - nan_count);
    assert!(nan.iter().all(|a| a.orbit.is_nan()));
    assert!(finite.windows(2).all(|w| w[0].orb() <= w[1].orb()));
    assert!(!tightest(&aspects).unwrap().orbit.is_nan());

    let scorer = AspectScorer::default();
    let ranked = scorer.rank_by_significance(&aspects);
    assert_eq!(ranked.len(), 40);
    let scores: Vec<f64> = ranked.iter().map(|a| scorer.score(a)).collect();
    assert!(scores.windows(2).all(|w| w[0] >= w[1]));
}

#[test]
fn test_synastry_angle_priority_overrides_score() {
    let aspects = vec![
        aspect("Mercury", "Venus", "trine", 1.0),
        aspect("Ascendant", "Ascendant", "conjunction", 3.0),
    ];
    let key = AspectScorer::default().synastry_key_aspect(&aspects).unwrap();
    assert_eq!(key.p1_name, "Ascendant");
    assert_eq!(key.p2_name, "Ascendant");
}

#[test]
fn test_synastry_prefers_tight_general_aspect_over_wide() {
    let aspects = vec![
        aspect("Sun", "Mars", "conjunction", 8.0),
        aspect("Mercury", "Jupiter", "sextile", 4.0),
    ];
    let key = AspectScorer::default().synastry_key_aspect(&aspects).unwrap();
    assert_eq!(key.p1_name, "Mercury");
}
