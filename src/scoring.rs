use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestKind {
    Vak,
    EmotionalIntelligence,
    SoftSkills,
    PsychologicalAssistance,
}

impl TestKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TestKind::Vak => "vak",
            TestKind::EmotionalIntelligence => "emotional_intelligence",
            TestKind::SoftSkills => "soft_skills",
            TestKind::PsychologicalAssistance => "psychological_assistance",
        }
    }

    pub fn parse(raw: &str) -> Option<TestKind> {
        match raw {
            "vak" => Some(TestKind::Vak),
            "emotional_intelligence" => Some(TestKind::EmotionalIntelligence),
            "soft_skills" => Some(TestKind::SoftSkills),
            "psychological_assistance" => Some(TestKind::PsychologicalAssistance),
            _ => None,
        }
    }

    /// Screening results are confidential to psychologists.
    pub fn is_confidential(self) -> bool {
        self == TestKind::PsychologicalAssistance
    }

    pub fn profile(self) -> ScoringProfile {
        match self {
            TestKind::Vak => ScoringProfile {
                categories: categories(&[
                    ("visual", "Visual"),
                    ("auditory", "Auditory"),
                    ("kinesthetic", "Kinesthetic"),
                ]),
                interpretation: Interpretation::Dominant,
            },
            TestKind::EmotionalIntelligence => ScoringProfile {
                categories: categories(&[
                    ("self_awareness", "Self-awareness"),
                    ("self_regulation", "Self-regulation"),
                    ("motivation", "Motivation"),
                    ("empathy", "Empathy"),
                    ("social_skills", "Social skills"),
                ]),
                interpretation: Interpretation::Bands {
                    bands: bands(&[(0.0, "Low"), (50.0, "Medium"), (75.0, "High")]),
                    per_category: true,
                    attention_from: None,
                },
            },
            TestKind::SoftSkills => ScoringProfile {
                categories: categories(&[
                    ("communication", "Communication"),
                    ("teamwork", "Teamwork"),
                    ("leadership", "Leadership"),
                    ("problem_solving", "Problem solving"),
                    ("adaptability", "Adaptability"),
                ]),
                interpretation: Interpretation::Bands {
                    bands: bands(&[
                        (0.0, "Needs development"),
                        (40.0, "Developing"),
                        (60.0, "Competent"),
                        (80.0, "Outstanding"),
                    ]),
                    per_category: true,
                    attention_from: None,
                },
            },
            TestKind::PsychologicalAssistance => ScoringProfile {
                categories: categories(&[
                    ("emotional_state", "Emotional state"),
                    ("stress", "Stress"),
                    ("academic_pressure", "Academic pressure"),
                    ("social_support", "Social support"),
                ]),
                interpretation: Interpretation::Bands {
                    bands: bands(&[
                        (0.0, "No intervention"),
                        (40.0, "Follow-up recommended"),
                        (65.0, "Referral to psychologist"),
                    ]),
                    per_category: false,
                    attention_from: Some("Follow-up recommended".to_string()),
                },
            },
        }
    }
}

fn categories(defs: &[(&str, &str)]) -> Vec<CategoryDef> {
    defs.iter()
        .map(|(code, label)| CategoryDef {
            code: code.to_string(),
            label: label.to_string(),
        })
        .collect()
}

fn bands(defs: &[(f64, &str)]) -> Vec<Band> {
    defs.iter()
        .map(|(min_percent, level)| Band {
            min_percent: *min_percent,
            level: level.to_string(),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct CategoryDef {
    pub code: String,
    pub label: String,
}

/// One row of a threshold table: percents at or above `min_percent` map to `level`.
#[derive(Debug, Clone, PartialEq)]
pub struct Band {
    pub min_percent: f64,
    pub level: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Interpretation {
    /// Highest category wins; a tie is reported as multimodal.
    Dominant,
    Bands {
        bands: Vec<Band>,
        per_category: bool,
        attention_from: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoringProfile {
    pub categories: Vec<CategoryDef>,
    pub interpretation: Interpretation,
}

impl ScoringProfile {
    /// Every level this profile can produce, in ascending order.
    pub fn levels(&self) -> Vec<String> {
        match &self.interpretation {
            Interpretation::Dominant => self
                .categories
                .iter()
                .map(|c| c.label.clone())
                .chain(std::iter::once(MULTIMODAL.to_string()))
                .collect(),
            Interpretation::Bands { bands, .. } => bands.iter().map(|b| b.level.clone()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredItem {
    pub category: String,
    pub weight: f64,
    pub value: f64,
    pub max_value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryScore {
    pub category: String,
    pub label: String,
    pub total: f64,
    pub max: f64,
    pub percent: f64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub level: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestScore {
    pub categories: Vec<CategoryScore>,
    pub total: f64,
    pub max: f64,
    pub percent: f64,
    pub level: String,
    #[serde(default)]
    pub dominant: Vec<String>,
    #[serde(default)]
    pub needs_attention: bool,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ScoringError {
    #[error("no answers to score")]
    Empty,
    #[error("negative weight {weight} in category {category}")]
    NegativeWeight { category: String, weight: f64 },
    #[error("unknown category: {0}")]
    UnknownCategory(String),
    #[error("threshold table is empty")]
    EmptyBands,
}

pub const MULTIMODAL: &str = "Multimodal";

/// `Int(10*x + 0.5) / 10`, the rounding used for stored percents.
pub fn round_off_1_decimal(x: f64) -> f64 {
    ((10.0 * x) + 0.5).floor() / 10.0
}

fn percent_of(total: f64, max: f64) -> f64 {
    if max > 0.0 {
        100.0 * total / max
    } else {
        0.0
    }
}

fn band_index(bands: &[Band], percent: f64) -> Option<usize> {
    if bands.is_empty() {
        return None;
    }
    let mut idx = 0;
    for (i, b) in bands.iter().enumerate() {
        if percent + 1e-9 >= b.min_percent {
            idx = i;
        }
    }
    Some(idx)
}

/// Weighted-sum scoring: `sum(value * weight)` per category, then the
/// profile's interpretation of the totals.
pub fn score(profile: &ScoringProfile, items: &[ScoredItem]) -> Result<TestScore, ScoringError> {
    if items.is_empty() {
        return Err(ScoringError::Empty);
    }

    let mut sums: Vec<(f64, f64)> = vec![(0.0, 0.0); profile.categories.len()];
    for item in items {
        if item.weight < 0.0 {
            return Err(ScoringError::NegativeWeight {
                category: item.category.clone(),
                weight: item.weight,
            });
        }
        let Some(pos) = profile
            .categories
            .iter()
            .position(|c| c.code == item.category)
        else {
            return Err(ScoringError::UnknownCategory(item.category.clone()));
        };
        sums[pos].0 += item.value * item.weight;
        sums[pos].1 += item.max_value * item.weight;
    }

    let total: f64 = sums.iter().map(|(t, _)| t).sum();
    let max: f64 = sums.iter().map(|(_, m)| m).sum();
    // Levels are read from the stored (rounded) percent.
    let percent = round_off_1_decimal(percent_of(total, max));

    let mut categories: Vec<CategoryScore> = profile
        .categories
        .iter()
        .zip(sums.iter())
        .map(|(def, (t, m))| CategoryScore {
            category: def.code.clone(),
            label: def.label.clone(),
            total: *t,
            max: *m,
            percent: round_off_1_decimal(percent_of(*t, *m)),
            level: None,
        })
        .collect();

    let (level, dominant, needs_attention) = match &profile.interpretation {
        Interpretation::Dominant => {
            let best = sums
                .iter()
                .map(|(t, _)| *t)
                .max_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal))
                .unwrap_or(0.0);
            let dominant: Vec<String> = categories
                .iter()
                .filter(|c| (c.total - best).abs() < 1e-9)
                .map(|c| c.category.clone())
                .collect();
            let level = match dominant.as_slice() {
                [only] => categories
                    .iter()
                    .find(|c| &c.category == only)
                    .map(|c| c.label.clone())
                    .unwrap_or_else(|| only.clone()),
                _ => MULTIMODAL.to_string(),
            };
            (level, dominant, false)
        }
        Interpretation::Bands {
            bands,
            per_category,
            attention_from,
        } => {
            let idx = band_index(bands, percent).ok_or(ScoringError::EmptyBands)?;
            if *per_category {
                for c in categories.iter_mut() {
                    c.level = band_index(bands, c.percent).map(|i| bands[i].level.clone());
                }
            }
            let needs_attention = attention_from
                .as_ref()
                .and_then(|lvl| bands.iter().position(|b| &b.level == lvl))
                .map(|from| idx >= from)
                .unwrap_or(false);
            (bands[idx].level.clone(), Vec::new(), needs_attention)
        }
    };

    Ok(TestScore {
        categories,
        total,
        max,
        percent,
        level,
        dominant,
        needs_attention,
    })
}
