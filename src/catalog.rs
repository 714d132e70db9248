use crate::scoring::TestKind;
use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerOption {
    pub label: String,
    pub value: f64,
}

pub struct CatalogQuestion {
    pub text: &'static str,
    pub category: &'static str,
    pub weight: f64,
}

pub struct CatalogTest {
    pub kind: TestKind,
    pub name: &'static str,
    pub description: &'static str,
    pub questions_per_page: i64,
    pub questions: &'static [CatalogQuestion],
}

const fn q(text: &'static str, category: &'static str, weight: f64) -> CatalogQuestion {
    CatalogQuestion {
        text,
        category,
        weight,
    }
}

const VAK_QUESTIONS: &[CatalogQuestion] = &[
    q("I remember things better when I see them written down.", "visual", 1.0),
    q("I understand explanations better when they include diagrams or charts.", "visual", 1.0),
    q("I take notes with colours, arrows and drawings.", "visual", 1.0),
    q("I picture the page of the book when I try to recall something.", "visual", 1.0),
    q("I prefer listening to a lecture over reading the slides.", "auditory", 1.0),
    q("I repeat things aloud when I want to memorise them.", "auditory", 1.0),
    q("I enjoy discussing topics with classmates to understand them.", "auditory", 1.0),
    q("I remember what people said better than what they wore.", "auditory", 1.0),
    q("I learn best when I can do things with my hands.", "kinesthetic", 1.0),
    q("I find it hard to sit still for a long time while studying.", "kinesthetic", 1.0),
    q("I prefer lab sessions and practical work over theory classes.", "kinesthetic", 1.0),
    q("I move or walk around while thinking through a problem.", "kinesthetic", 1.0),
];

const EI_QUESTIONS: &[CatalogQuestion] = &[
    q("I can name the emotion I am feeling at any given moment.", "self_awareness", 1.0),
    q("I know which situations make me lose my temper.", "self_awareness", 1.0),
    q("I recognise how my mood affects my performance.", "self_awareness", 1.0),
    q("I stay calm when things do not go as planned.", "self_regulation", 1.0),
    q("I think before reacting when someone criticises me.", "self_regulation", 1.0),
    q("I can set aside negative feelings to finish a task.", "self_regulation", 1.5),
    q("I keep working towards my goals despite setbacks.", "motivation", 1.0),
    q("I set challenging goals for myself.", "motivation", 1.0),
    q("I find meaning in what I study.", "motivation", 1.0),
    q("I notice when a classmate is upset even if they do not say so.", "empathy", 1.0),
    q("I try to understand other people's points of view.", "empathy", 1.0),
    q("I listen without interrupting when others share their problems.", "empathy", 1.0),
    q("I make new friends easily.", "social_skills", 1.0),
    q("I can resolve disagreements without damaging relationships.", "social_skills", 1.5),
    q("I feel comfortable working in groups.", "social_skills", 1.0),
];

const SOFT_SKILLS_QUESTIONS: &[CatalogQuestion] = &[
    q("I express my ideas clearly when speaking in public.", "communication", 1.0),
    q("I write clear and well-structured reports.", "communication", 1.0),
    q("I adapt my message to the audience.", "communication", 1.0),
    q("I meet the commitments I make to my team.", "teamwork", 1.0),
    q("I share information and resources with my teammates.", "teamwork", 1.0),
    q("I accept and build on my teammates' ideas.", "teamwork", 1.0),
    q("I take the initiative to organise group work.", "leadership", 1.0),
    q("I motivate others to reach a shared goal.", "leadership", 1.0),
    q("I take responsibility for the decisions of the team.", "leadership", 1.5),
    q("I break complex problems into smaller parts.", "problem_solving", 1.0),
    q("I look for several alternatives before choosing a solution.", "problem_solving", 1.0),
    q("I evaluate the results of my decisions.", "problem_solving", 1.0),
    q("I adjust quickly to changes in plans.", "adaptability", 1.0),
    q("I am open to learning new tools and methods.", "adaptability", 1.0),
    q("I work well under pressure.", "adaptability", 1.0),
];

const PSYCH_QUESTIONS: &[CatalogQuestion] = &[
    q("In the last two weeks I have felt sad or down.", "emotional_state", 1.0),
    q("I have lost interest in activities I used to enjoy.", "emotional_state", 1.5),
    q("I have felt hopeless about the future.", "emotional_state", 2.0),
    q("I feel overwhelmed by my responsibilities.", "stress", 1.0),
    q("I have trouble sleeping because of worries.", "stress", 1.0),
    q("I feel tense or nervous most of the day.", "stress", 1.0),
    q("I am worried about failing my courses.", "academic_pressure", 1.0),
    q("I find it hard to concentrate on my studies.", "academic_pressure", 1.0),
    q("I have considered dropping out.", "academic_pressure", 1.5),
    q("I feel I have nobody to talk to about my problems.", "social_support", 1.0),
    q("I feel isolated from my classmates.", "social_support", 1.0),
    q("I find it hard to ask for help when I need it.", "social_support", 1.0),
];

pub const CATALOG: &[CatalogTest] = &[
    CatalogTest {
        kind: TestKind::Vak,
        name: "VAK learning styles",
        description: "Identifies whether the student learns best visually, by listening or by doing.",
        questions_per_page: 4,
        questions: VAK_QUESTIONS,
    },
    CatalogTest {
        kind: TestKind::EmotionalIntelligence,
        name: "Emotional intelligence",
        description: "Self-report of emotional competences across five dimensions.",
        questions_per_page: 5,
        questions: EI_QUESTIONS,
    },
    CatalogTest {
        kind: TestKind::SoftSkills,
        name: "Soft skills",
        description: "Self-assessment of transversal skills valued in academic and professional work.",
        questions_per_page: 5,
        questions: SOFT_SKILLS_QUESTIONS,
    },
    CatalogTest {
        kind: TestKind::PsychologicalAssistance,
        name: "Psychological assistance screening",
        description: "Screens for students who may benefit from follow-up by the psychology service.",
        questions_per_page: 4,
        questions: PSYCH_QUESTIONS,
    },
];

pub fn options_for(kind: TestKind) -> Vec<AnswerOption> {
    let labels: &[&str] = match kind {
        TestKind::Vak => &["Rarely", "Sometimes", "Often"],
        TestKind::PsychologicalAssistance => {
            &["Never", "Rarely", "Sometimes", "Often", "Almost always"]
        }
        TestKind::EmotionalIntelligence | TestKind::SoftSkills => &[
            "Strongly disagree",
            "Disagree",
            "Neutral",
            "Agree",
            "Strongly agree",
        ],
    };
    labels
        .iter()
        .enumerate()
        .map(|(i, label)| AnswerOption {
            label: label.to_string(),
            value: (i + 1) as f64,
        })
        .collect()
}

pub fn parse_options(raw: &str) -> anyhow::Result<Vec<AnswerOption>> {
    Ok(serde_json::from_str(raw)?)
}

pub fn max_option_value(options: &[AnswerOption]) -> f64 {
    options.iter().map(|o| o.value).fold(0.0, f64::max)
}

/// Inserts every built-in test whose code is not in the workspace yet.
/// Returns the number of tests inserted.
pub fn seed_catalog(conn: &Connection) -> anyhow::Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut inserted = 0;
    for test in CATALOG {
        let code = test.kind.as_str();
        let exists: Option<i64> = tx
            .query_row("SELECT 1 FROM tests WHERE code = ?", [code], |r| r.get(0))
            .optional()?;
        if exists.is_some() {
            continue;
        }

        let test_id = Uuid::new_v4().to_string();
        tx.execute(
            "INSERT INTO tests(id, code, name, description, kind, questions_per_page, active)
             VALUES(?, ?, ?, ?, ?, ?, 1)",
            (
                &test_id,
                code,
                test.name,
                test.description,
                code,
                test.questions_per_page,
            ),
        )?;

        let options = json!(options_for(test.kind)).to_string();
        for (i, question) in test.questions.iter().enumerate() {
            tx.execute(
                "INSERT INTO questions(id, test_id, idx, text, options_json, category, weight)
                 VALUES(?, ?, ?, ?, ?, ?, ?)",
                (
                    Uuid::new_v4().to_string(),
                    &test_id,
                    i as i64,
                    question.text,
                    &options,
                    question.category,
                    question.weight,
                ),
            )?;
        }
        tracing::info!(code, questions = test.questions.len(), "seeded test");
        inserted += 1;
    }
    tx.commit()?;
    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_question_category_belongs_to_its_profile() {
        for test in CATALOG {
            let profile = test.kind.profile();
            for question in test.questions {
                assert!(
                    profile.categories.iter().any(|c| c.code == question.category),
                    "{} has unknown category {}",
                    test.kind.as_str(),
                    question.category
                );
                assert!(question.weight > 0.0);
            }
            for c in &profile.categories {
                assert!(
                    test.questions.iter().any(|q| q.category == c.code),
                    "{} has no questions for {}",
                    test.kind.as_str(),
                    c.code
                );
            }
        }
    }

    #[test]
    fn options_are_one_based_likert_scales() {
        let vak = options_for(TestKind::Vak);
        assert_eq!(vak.len(), 3);
        assert_eq!(max_option_value(&vak), 3.0);
        let ei = options_for(TestKind::EmotionalIntelligence);
        assert_eq!(ei.first().map(|o| o.value), Some(1.0));
        assert_eq!(max_option_value(&ei), 5.0);

        let raw = json!(ei).to_string();
        assert_eq!(parse_options(&raw).expect("parse"), ei);
    }

    #[test]
    fn seeding_is_idempotent() {
        let dir = tempfile::tempdir().expect("temp dir");
        let conn = crate::db::open_db(dir.path()).expect("open db");
        assert_eq!(seed_catalog(&conn).expect("seed"), CATALOG.len());
        assert_eq!(seed_catalog(&conn).expect("reseed"), 0);

        let tests: i64 = conn
            .query_row("SELECT COUNT(*) FROM tests", [], |r| r.get(0))
            .expect("count tests");
        assert_eq!(tests, CATALOG.len() as i64);
        let questions: i64 = conn
            .query_row("SELECT COUNT(*) FROM questions", [], |r| r.get(0))
            .expect("count questions");
        let expected: usize = CATALOG.iter().map(|t| t.questions.len()).sum();
        assert_eq!(questions, expected as i64);
    }
}
