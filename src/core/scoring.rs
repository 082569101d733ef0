//! Aspect Significance Scorer
//!
//! Ranks aspects for headline display. Not every valid aspect matters
//! equally: a Sun-Moon trine at half a degree is news, a Neptune-Pluto
//! sextile is background.
//!
//! # Factors
//!
//! All factors multiply, so one strongly disqualifying factor can sink an
//! aspect on its own:
//!
//! | Factor | Rule |
//! |---|---|
//! | Pair base | geometric mean of the two point weights |
//! | Kind weight | major kinds high, minor kinds 10-30% of that |
//! | Kind factor | 1.0 for major kinds, 0.8 for minor |
//! | Slow pair | 0.3 when both points are social or outer planets |
//! | Angle orb | 0.2 when an angle is involved and the orb exceeds 2° |
//! | Orb | linear from 1.0 at exact down to 0.5 at 10° and beyond |
//! | Node | 0.3 when either point is a lunar node |
//!
//! The product is divided by 100.

use std::cmp::Ordering;
use std::collections::HashMap;

use lazy_static::lazy_static;
use serde::Serialize;

use super::models::{Aspect, TransitDayData};

// =============================================================================
// Point & Kind Tables
// =============================================================================

/// Priority group of a chart point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PointTier {
    Luminary,
    Angle,
    Personal,
    Social,
    Outer,
    Minor,
    Node,
    Unknown,
}

impl PointTier {
    /// Social and outer planets move slowly enough to be generational
    pub fn is_slow(self) -> bool {
        matches!(self, PointTier::Social | PointTier::Outer)
    }
}

/// Weight for points missing from the table
pub const UNKNOWN_POINT_WEIGHT: f64 = 2.0;

/// Weight for aspect kinds missing from the table
pub const UNKNOWN_KIND_WEIGHT: f64 = 1.0;

lazy_static! {
    static ref POINTS: HashMap<&'static str, (PointTier, f64)> = {
        let mut m = HashMap::new();
        m.insert("sun", (PointTier::Luminary, 10.0));
        m.insert("moon", (PointTier::Luminary, 10.0));
        m.insert("ascendant", (PointTier::Angle, 10.0));
        m.insert("medium_coeli", (PointTier::Angle, 9.0));
        m.insert("descendant", (PointTier::Angle, 8.0));
        m.insert("imum_coeli", (PointTier::Angle, 8.0));
        m.insert("mercury", (PointTier::Personal, 8.0));
        m.insert("venus", (PointTier::Personal, 8.0));
        m.insert("mars", (PointTier::Personal, 8.0));
        m.insert("jupiter", (PointTier::Social, 6.0));
        m.insert("saturn", (PointTier::Social, 6.0));
        m.insert("uranus", (PointTier::Outer, 4.0));
        m.insert("neptune", (PointTier::Outer, 4.0));
        m.insert("pluto", (PointTier::Outer, 4.0));
        m.insert("chiron", (PointTier::Minor, 3.0));
        m.insert("mean_lilith", (PointTier::Minor, 2.0));
        m.insert("true_lilith", (PointTier::Minor, 2.0));
        m.insert("mean_node", (PointTier::Node, 3.0));
        m.insert("true_node", (PointTier::Node, 3.0));
        m.insert("mean_south_node", (PointTier::Node, 3.0));
        m.insert("true_south_node", (PointTier::Node, 3.0));
        m
    };

    static ref POINT_ALIASES: HashMap<&'static str, &'static str> = {
        let mut m = HashMap::new();
        m.insert("asc", "ascendant");
        m.insert("mc", "medium_coeli");
        m.insert("midheaven", "medium_coeli");
        m.insert("dsc", "descendant");
        m.insert("desc", "descendant");
        m.insert("ic", "imum_coeli");
        m.insert("lilith", "mean_lilith");
        m.insert("north_node", "mean_node");
        m.insert("south_node", "mean_south_node");
        m
    };

    static ref KINDS: HashMap<&'static str, (bool, f64)> = {
        // (major, weight)
        let mut m = HashMap::new();
        m.insert("conjunction", (true, 10.0));
        m.insert("opposition", (true, 9.0));
        m.insert("square", (true, 9.0));
        m.insert("trine", (true, 8.0));
        m.insert("sextile", (true, 7.0));
        m.insert("quincunx", (false, 3.0));
        m.insert("semisquare", (false, 2.0));
        m.insert("sesquiquadrate", (false, 2.0));
        m.insert("quintile", (false, 2.0));
        m.insert("semisextile", (false, 1.5));
        m.insert("biquintile", (false, 1.5));
        m
    };

    static ref KIND_ALIASES: HashMap<&'static str, &'static str> = {
        let mut m = HashMap::new();
        m.insert("inconjunct", "quincunx");
        m.insert("semi_square", "semisquare");
        m.insert("semi_sextile", "semisextile");
        m.insert("sesquisquare", "sesquiquadrate");
        m.insert("sesqui_quadrate", "sesquiquadrate");
        m
    };
}

fn normalize(name: &str) -> String {
    name.trim().to_lowercase().replace([' ', '-'], "_")
}

/// Canonical table name for a point (`"Medium Coeli"` -> `"medium_coeli"`)
pub fn canonical_point(name: &str) -> String {
    let key = normalize(name);
    match POINT_ALIASES.get(key.as_str()) {
        Some(alias) => (*alias).to_string(),
        None => key,
    }
}

/// Canonical table name for an aspect kind
pub fn canonical_kind(name: &str) -> String {
    let key = normalize(name);
    match KIND_ALIASES.get(key.as_str()) {
        Some(alias) => (*alias).to_string(),
        None => key,
    }
}

/// Tier and weight of a point
pub fn point_profile(name: &str) -> (PointTier, f64) {
    let key = canonical_point(name);
    if let Some(profile) = POINTS.get(key.as_str()) {
        return *profile;
    }
    if key.contains("node") {
        return (PointTier::Node, 3.0);
    }
    (PointTier::Unknown, UNKNOWN_POINT_WEIGHT)
}

/// Whether the kind is major and its weight
pub fn kind_profile(name: &str) -> (bool, f64) {
    KINDS
        .get(canonical_kind(name).as_str())
        .copied()
        .unwrap_or((false, UNKNOWN_KIND_WEIGHT))
}

// =============================================================================
// Scorer
// =============================================================================

/// Every factor of one aspect's score
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub pair_base: f64,
    pub kind_weight: f64,
    pub kind_factor: f64,
    pub slow_pair_penalty: f64,
    pub angle_penalty: f64,
    pub orb_factor: f64,
    pub node_penalty: f64,
    pub score: f64,
}

/// Tunable significance scorer. `Default` carries the standard factors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AspectScorer {
    pub slow_pair_penalty: f64,
    pub angle_orb_threshold: f64,
    pub angle_penalty: f64,
    pub node_penalty: f64,
    pub minor_kind_factor: f64,
    /// Orb at which the orb factor bottoms out
    pub orb_falloff: f64,
    pub orb_floor: f64,
}

impl Default for AspectScorer {
    fn default() -> Self {
        Self {
            slow_pair_penalty: 0.3,
            angle_orb_threshold: 2.0,
            angle_penalty: 0.2,
            node_penalty: 0.3,
            minor_kind_factor: 0.8,
            orb_falloff: 10.0,
            orb_floor: 0.5,
        }
    }
}

/// Orb limit for the synastry angle and luminary rungs
const SYNASTRY_WIDE_ORB: f64 = 10.0;

/// Orb limit for the tight general rung
const SYNASTRY_TIGHT_ORB: f64 = 5.0;

impl AspectScorer {
    /// Score with every factor exposed
    pub fn explain(&self, aspect: &Aspect) -> ScoreBreakdown {
        let (tier1, weight1) = point_profile(&aspect.p1_name);
        let (tier2, weight2) = point_profile(&aspect.p2_name);
        let (major, kind_weight) = kind_profile(&aspect.aspect);
        let orb = aspect.orb();

        let pair_base = (weight1 * weight2).sqrt();
        let kind_factor = if major { 1.0 } else { self.minor_kind_factor };
        let slow_pair_penalty = if tier1.is_slow() && tier2.is_slow() {
            self.slow_pair_penalty
        } else {
            1.0
        };
        let has_angle = tier1 == PointTier::Angle || tier2 == PointTier::Angle;
        let angle_penalty = if has_angle && orb > self.angle_orb_threshold {
            self.angle_penalty
        } else {
            1.0
        };
        let orb_factor = if orb.is_finite() {
            (1.0 - (1.0 - self.orb_floor) * orb / self.orb_falloff).max(self.orb_floor)
        } else {
            self.orb_floor
        };
        let node_penalty = if tier1 == PointTier::Node || tier2 == PointTier::Node {
            self.node_penalty
        } else {
            1.0
        };

        let score = pair_base
            * kind_weight
            * slow_pair_penalty
            * kind_factor
            * angle_penalty
            * orb_factor
            * node_penalty
            / 100.0;

        ScoreBreakdown {
            pair_base,
            kind_weight,
            kind_factor,
            slow_pair_penalty,
            angle_penalty,
            orb_factor,
            node_penalty,
            score,
        }
    }

    pub fn score(&self, aspect: &Aspect) -> f64 {
        self.explain(aspect).score
    }

    /// Aspects by descending score. Ties keep input order.
    pub fn rank_by_significance<'a>(&self, aspects: &'a [Aspect]) -> Vec<&'a Aspect> {
        let mut scored: Vec<(f64, &Aspect)> = aspects.iter().map(|a| (self.score(a), a)).collect();
        scored.sort_by(|a, b| a.0.is_nan().cmp(&b.0.is_nan()).then_with(|| b.0.total_cmp(&a.0)));
        scored.into_iter().map(|(_, aspect)| aspect).collect()
    }

    pub fn most_significant<'a>(&self, aspects: &'a [Aspect]) -> Option<&'a Aspect> {
        self.rank_by_significance(aspects).into_iter().next()
    }

    /// Best `limit` aspects by score
    pub fn top_significant<'a>(&self, aspects: &'a [Aspect], limit: usize) -> Vec<&'a Aspect> {
        let mut ranked = self.rank_by_significance(aspects);
        ranked.truncate(limit);
        ranked
    }

    /// Key aspect for a relationship comparison.
    ///
    /// Priority ladder:
    /// 1. an angle to the same angle within 10°
    /// 2. a luminary to a luminary within 10°
    /// 3. the best-scoring aspect within 5°
    /// 4. the best-scoring aspect within 10°
    pub fn synastry_key_aspect<'a>(&self, aspects: &'a [Aspect]) -> Option<&'a Aspect> {
        let within = |limit: f64| move |aspect: &&Aspect| aspect.orb() <= limit;
        let ranked = self.rank_by_significance(aspects);

        let same_angle = |aspect: &&Aspect| {
            point_profile(&aspect.p1_name).0 == PointTier::Angle
                && canonical_point(&aspect.p1_name) == canonical_point(&aspect.p2_name)
        };
        let luminaries = |aspect: &&Aspect| {
            point_profile(&aspect.p1_name).0 == PointTier::Luminary
                && point_profile(&aspect.p2_name).0 == PointTier::Luminary
        };

        ranked
            .iter()
            .copied()
            .filter(within(SYNASTRY_WIDE_ORB))
            .find(same_angle)
            .or_else(|| {
                ranked
                    .iter()
                    .copied()
                    .filter(within(SYNASTRY_WIDE_ORB))
                    .find(luminaries)
            })
            .or_else(|| ranked.iter().copied().find(within(SYNASTRY_TIGHT_ORB)))
            .or_else(|| ranked.iter().copied().find(within(SYNASTRY_WIDE_ORB)))
    }

    /// Headline aspect of one day
    pub fn headline<'a>(&self, day: &'a TransitDayData) -> Option<&'a Aspect> {
        self.most_significant(&day.aspects)
    }
}

/// Score with the default factors
pub fn score_aspect(aspect: &Aspect) -> f64 {
    AspectScorer::default().score(aspect)
}

/// Aspects by ascending absolute orb. Ties keep input order.
pub fn rank_by_orb(aspects: &[Aspect]) -> Vec<&Aspect> {
    let mut ranked: Vec<&Aspect> = aspects.iter().collect();
    ranked.sort_by(|a, b| nan_last(a.orb(), b.orb()));
    ranked
}

/// Ascending total order with NaN after every number
fn nan_last(a: f64, b: f64) -> Ordering {
    a.is_nan().cmp(&b.is_nan()).then_with(|| a.total_cmp(&b))
}

/// Tightest aspect, ignoring significance
pub fn tightest(aspects: &[Aspect]) -> Option<&Aspect> {
    rank_by_orb(aspects).into_iter().next()
}
