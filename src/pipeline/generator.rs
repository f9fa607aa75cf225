//! Practice-paper synthesis from a blueprint and the live bank.
//!
//! Each section's question count is apportioned over its chapter weights by
//! largest remainder, then every slot draws uniformly from the matching,
//! not-yet-used questions with a seeded RNG. Shortfalls never fail the call;
//! they are recorded as degradations on the paper.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rusqlite::Connection;
use uuid::Uuid;

use crate::db::repository::{insert_generated, list_live_questions};
use crate::db::DatabaseError;
use crate::models::enums::Difficulty;
use crate::models::{
    Blueprint, BlueprintSection, GeneratedPaper, GeneratedSection, GenerationConstraints,
    QuestionRecord,
};
use crate::pipeline::outcome::{Degradation, Outcome};

/// Largest-remainder apportionment of `total` over `weights`.
///
/// Leftover units go to the largest remainders; ties to the higher weight,
/// then the alphabetically first key. Output is in weight-rank order.
pub fn apportion<K: Ord + Clone>(total: u32, weights: &BTreeMap<K, f64>) -> Vec<(K, u32)> {
    let weight_sum: f64 = weights.values().filter(|w| **w > 0.0).sum();
    if weights.is_empty() || weight_sum <= 0.0 {
        return Vec::new();
    }

    let mut rows: Vec<(K, f64, u32, f64)> = weights
        .iter()
        .filter(|(_, w)| **w > 0.0)
        .map(|(k, w)| {
            let exact = total as f64 * w / weight_sum;
            let floor = exact.floor();
            (k.clone(), *w, floor as u32, exact - floor)
        })
        .collect();

    let assigned: u32 = rows.iter().map(|r| r.2).sum();
    let mut leftover = total.saturating_sub(assigned);

    let mut by_remainder: Vec<usize> = (0..rows.len()).collect();
    by_remainder.sort_by(|&a, &b| {
        rows[b]
            .3
            .total_cmp(&rows[a].3)
            .then(rows[b].1.total_cmp(&rows[a].1))
            .then(rows[a].0.cmp(&rows[b].0))
    });
    for idx in by_remainder {
        if leftover == 0 {
            break;
        }
        rows[idx].2 += 1;
        leftover -= 1;
    }

    rows.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    rows.into_iter().map(|(k, _, n, _)| (k, n)).collect()
}

/// Chapter weights for one section after applying the chapter-subset constraint.
fn effective_weights(
    section: &BlueprintSection,
    chapters: Option<&[String]>,
) -> BTreeMap<String, f64> {
    let Some(subset) = chapters else {
        return section.chapter_weight.clone();
    };
    let filtered: BTreeMap<String, f64> = section
        .chapter_weight
        .iter()
        .filter(|(tag, _)| subset.contains(tag))
        .map(|(tag, w)| (tag.clone(), *w))
        .collect();
    if filtered.values().sum::<f64>() > 0.0 {
        return filtered;
    }
    subset.iter().map(|tag| (tag.clone(), 1.0)).collect()
}

struct SectionPicker<'a> {
    section: &'a BlueprintSection,
    bank: &'a [QuestionRecord],
    allowed_chapters: Option<&'a [String]>,
}

impl<'a> SectionPicker<'a> {
    fn matches(&self, q: &QuestionRecord) -> bool {
        q.marks == self.section.marks_per_question
            && self.section.allowed_types.contains(&q.question_type)
            && self
                .allowed_chapters
                .map_or(true, |subset| subset.contains(&q.chapter_tag))
    }

    fn pool(&self, chapter: Option<&str>, used: &HashSet<Uuid>) -> Vec<&'a QuestionRecord> {
        self.bank
            .iter()
            .filter(|q| self.matches(q))
            .filter(|q| chapter.map_or(true, |c| q.chapter_tag == c))
            .filter(|q| !used.contains(&q.question_id))
            .collect()
    }
}

/// Pick from `pool`, preferring the difficulty with the largest remaining deficit.
fn pick<'a>(
    pool: &[&'a QuestionRecord],
    deficits: &BTreeMap<Difficulty, u32>,
    rng: &mut StdRng,
) -> &'a QuestionRecord {
    let mut wanted: Vec<(&Difficulty, &u32)> = deficits.iter().filter(|(_, n)| **n > 0).collect();
    wanted.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));

    for (difficulty, _) in wanted {
        let preferred: Vec<&QuestionRecord> = pool
            .iter()
            .copied()
            .filter(|q| q.difficulty == *difficulty)
            .collect();
        if !preferred.is_empty() {
            return preferred[rng.gen_range(0..preferred.len())];
        }
    }
    pool[rng.gen_range(0..pool.len())]
}

/// Synthesize a paper. Never fails; shortfalls are carried as degradations.
pub fn generate(
    blueprint: &Blueprint,
    bank: &[QuestionRecord],
    constraints: &GenerationConstraints,
    now: DateTime<Utc>,
) -> Outcome<GeneratedPaper> {
    let seed = constraints.seed.unwrap_or_else(rand::random);
    let mut rng = StdRng::seed_from_u64(seed);

    let mut bank: Vec<QuestionRecord> = bank.to_vec();
    bank.sort_by_key(|q| q.question_id);

    let subset = constraints.chapters.as_deref();
    let mut used: HashSet<Uuid> = HashSet::new();
    let mut degradations = Vec::new();
    let mut shortfall: BTreeMap<Difficulty, u32> = BTreeMap::new();
    let mut sections = Vec::with_capacity(blueprint.sections.len());
    let mut questions = Vec::new();
    let mut total_marks = 0u32;

    for section in &blueprint.sections {
        let picker = SectionPicker {
            section,
            bank: &bank,
            allowed_chapters: subset,
        };
        let weights = effective_weights(section, subset);
        let plan = apportion(section.question_count, &weights);
        let ranked: Vec<&str> = plan.iter().map(|(tag, _)| tag.as_str()).collect();

        let mut deficits: BTreeMap<Difficulty, u32> = constraints
            .difficulty_mix
            .as_ref()
            .map(|mix| apportion(section.question_count, mix).into_iter().collect())
            .unwrap_or_default();

        let mut picked_ids = Vec::new();
        for (rank, (chapter, count)) in plan.iter().enumerate() {
            for _ in 0..*count {
                let mut pool = picker.pool(Some(chapter.as_str()), &used);

                if pool.is_empty() {
                    // Nearest chapter by weight rank, closer-ranked and heavier first.
                    let mut others: Vec<usize> = (0..ranked.len()).filter(|&i| i != rank).collect();
                    others.sort_by_key(|&i| (i.abs_diff(rank), i));
                    for i in others {
                        pool = picker.pool(Some(ranked[i]), &used);
                        if !pool.is_empty() {
                            break;
                        }
                    }
                }
                if pool.is_empty() {
                    pool = picker.pool(None, &used);
                }
                if pool.is_empty() {
                    tracing::warn!(section = %section.name, chapter = %chapter, "Slot left unfilled");
                    degradations.push(Degradation::SlotUnfilled {
                        section: section.name.clone(),
                        chapter: chapter.clone(),
                    });
                    continue;
                }

                let chosen = pick(&pool, &deficits, &mut rng);
                if chosen.chapter_tag != *chapter {
                    tracing::warn!(
                        section = %section.name,
                        wanted = %chapter,
                        used = %chosen.chapter_tag,
                        "Chapter substituted"
                    );
                    degradations.push(Degradation::ChapterSubstituted {
                        section: section.name.clone(),
                        wanted: chapter.clone(),
                        used: chosen.chapter_tag.clone(),
                    });
                }
                if let Some(n) = deficits.get_mut(&chosen.difficulty) {
                    *n = n.saturating_sub(1);
                }
                used.insert(chosen.question_id);
                picked_ids.push(chosen.question_id);
                total_marks += chosen.marks;
            }
        }

        for (difficulty, missing) in deficits {
            if missing > 0 {
                *shortfall.entry(difficulty).or_default() += missing;
            }
        }

        questions.extend(picked_ids.iter().copied());
        sections.push(GeneratedSection {
            name: section.name.clone(),
            marks_per_question: section.marks_per_question,
            requested: section.question_count,
            question_ids: picked_ids,
        });
    }

    for (difficulty, missing) in shortfall {
        degradations.push(Degradation::DifficultyShortfall {
            difficulty,
            missing,
        });
    }

    let paper = GeneratedPaper {
        generated_id: Uuid::new_v4(),
        exam_name: blueprint.exam_name.clone(),
        subject: blueprint.subject.clone(),
        snapshot_id: blueprint.snapshot_id,
        seed,
        generated_at: now,
        questions,
        sections,
        total_marks,
        degraded: !degradations.is_empty(),
        degradations: degradations.clone(),
    };
    Outcome::with_degradations(paper, degradations)
}

/// Generate from the live bank of the blueprint's pair and persist the paper.
pub fn generate_and_store(
    conn: &Connection,
    blueprint: &Blueprint,
    constraints: &GenerationConstraints,
) -> Result<Outcome<GeneratedPaper>, DatabaseError> {
    let bank = list_live_questions(conn, &blueprint.exam_name, &blueprint.subject)?;
    let outcome = generate(blueprint, &bank, constraints, Utc::now());
    insert_generated(conn, &outcome.value)?;
    tracing::info!(
        generated_id = %outcome.value.generated_id,
        questions = outcome.value.questions.len(),
        degraded = outcome.is_degraded(),
        seed = outcome.value.seed,
        "Practice paper generated"
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::enums::QuestionType;
    use crate::pipeline::blueprint::analyzer::tests::paper;

    fn section(name: &str, count: u32, marks: u32, t: QuestionType, w: &[(&str, f64)]) -> BlueprintSection {
        BlueprintSection {
            name: name.into(),
            question_count: count,
            marks_per_question: marks,
            allowed_types: vec![t],
            chapter_weight: w.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
        }
    }

    fn blueprint(sections: Vec<BlueprintSection>) -> Blueprint {
        Blueprint {
            exam_name: "JEE".into(),
            subject: "Physics".into(),
            snapshot_id: 4,
            years: vec![2020, 2021],
            paper_count: 2,
            total_marks: sections.iter().map(|s| s.question_count * s.marks_per_question).sum(),
            sections,
            difficulty_mix: BTreeMap::new(),
            computed_at: Utc::now(),
        }
    }

    fn bank() -> Vec<QuestionRecord> {
        use QuestionType::*;
        let mut bank = Vec::new();
        for year in 2015..2021 {
            bank.extend(paper(
                year,
                &[(Mcq, 1, "Optics"), (Mcq, 1, "Mechanics"), (Mcq, 1, "Optics"), (Long, 5, "Thermo")],
            ));
        }
        bank
    }

    fn seeded(seed: u64) -> GenerationConstraints {
        GenerationConstraints {
            seed: Some(seed),
            ..Default::default()
        }
    }

    #[test]
    fn apportion_largest_remainder() {
        let weights: BTreeMap<String, f64> =
            [("a".to_string(), 0.5), ("b".to_string(), 0.3), ("c".to_string(), 0.2)].into();
        let plan = apportion(4, &weights);
        // 2.0, 1.2, 0.8 -> c takes the leftover unit.
        assert_eq!(plan, vec![("a".to_string(), 2), ("b".to_string(), 1), ("c".to_string(), 1)]);
        assert_eq!(plan.iter().map(|(_, n)| n).sum::<u32>(), 4);
    }

    #[test]
    fn apportion_ties_to_heavier_then_name() {
        let weights: BTreeMap<String, f64> = [("x".to_string(), 0.5), ("y".to_string(), 0.5)].into();
        assert_eq!(apportion(1, &weights), vec![("x".to_string(), 1), ("y".to_string(), 0)]);
    }

    #[test]
    fn same_seed_same_paper() {
        let bp = blueprint(vec![
            section("Section A", 4, 1, QuestionType::Mcq, &[("Optics", 0.6), ("Mechanics", 0.4)]),
            section("Section B", 2, 5, QuestionType::Long, &[("Thermo", 1.0)]),
        ]);
        let bank = bank();
        let a = generate(&bp, &bank, &seeded(11), Utc::now());
        let mut shuffled = bank.clone();
        shuffled.reverse();
        let b = generate(&bp, &shuffled, &seeded(11), Utc::now());

        assert_eq!(a.value.questions, b.value.questions);
        assert_eq!(a.value.seed, 11);
        assert!(!a.is_degraded());
        assert_eq!(a.value.questions.len(), 6);
        assert_eq!(a.value.total_marks, 14);
    }

    #[test]
    fn sections_follow_blueprint() {
        let bp = blueprint(vec![
            section("Section A", 5, 1, QuestionType::Mcq, &[("Optics", 0.6), ("Mechanics", 0.4)]),
            section("Section B", 3, 5, QuestionType::Long, &[("Thermo", 1.0)]),
        ]);
        let bank = bank();
        let by_id: BTreeMap<Uuid, &QuestionRecord> = bank.iter().map(|q| (q.question_id, q)).collect();
        let outcome = generate(&bp, &bank, &seeded(3), Utc::now());

        for (generated, expected) in outcome.value.sections.iter().zip(&bp.sections) {
            assert_eq!(generated.question_ids.len() as u32, expected.question_count);
            for id in &generated.question_ids {
                let q = by_id[id];
                assert_eq!(q.marks, expected.marks_per_question);
                assert!(expected.allowed_types.contains(&q.question_type));
            }
        }
        let optics = outcome.value.sections[0]
            .question_ids
            .iter()
            .filter(|id| by_id[*id].chapter_tag == "Optics")
            .count();
        assert_eq!(optics, 3);
    }

    #[test]
    fn no_question_repeats_within_a_paper() {
        let bp = blueprint(vec![
            section("Section A", 10, 1, QuestionType::Mcq, &[("Optics", 0.5), ("Mechanics", 0.5)]),
            section("Section B", 10, 1, QuestionType::Mcq, &[("Optics", 1.0)]),
        ]);
        let outcome = generate(&bp, &bank(), &seeded(5), Utc::now());
        let ids = &outcome.value.questions;
        let unique: HashSet<&Uuid> = ids.iter().collect();
        assert_eq!(unique.len(), ids.len());
        // 18 MCQs exist in total; 20 were requested.
        assert_eq!(ids.len(), 18);
        assert!(outcome.value.degraded);
        let unfilled = outcome
            .degradations
            .iter()
            .filter(|d| matches!(d, Degradation::SlotUnfilled { .. }))
            .count();
        assert_eq!(unfilled, 2);
    }

    #[test]
    fn empty_chapter_substitutes_nearest() {
        let bp = blueprint(vec![section(
            "Section A",
            2,
            1,
            QuestionType::Mcq,
            &[("Optics", 0.5), ("Waves", 0.5)],
        )]);
        let outcome = generate(&bp, &bank(), &seeded(9), Utc::now());
        assert_eq!(outcome.value.questions.len(), 2);
        assert!(outcome.degradations.iter().any(|d| matches!(
            d,
            Degradation::ChapterSubstituted { wanted, used, .. } if wanted == "Waves" && used == "Optics"
        )));
    }

    #[test]
    fn chapter_subset_restricts_picks() {
        let bp = blueprint(vec![section(
            "Section A",
            3,
            1,
            QuestionType::Mcq,
            &[("Optics", 0.6), ("Mechanics", 0.4)],
        )]);
        let bank = bank();
        let constraints = GenerationConstraints {
            chapters: Some(vec!["Mechanics".into()]),
            seed: Some(1),
            ..Default::default()
        };
        let outcome = generate(&bp, &bank, &constraints, Utc::now());
        let by_id: BTreeMap<Uuid, &QuestionRecord> = bank.iter().map(|q| (q.question_id, q)).collect();
        assert_eq!(outcome.value.questions.len(), 3);
        assert!(outcome
            .value
            .questions
            .iter()
            .all(|id| by_id[id].chapter_tag == "Mechanics"));
    }

    #[test]
    fn unmet_difficulty_mix_is_reported() {
        let bp = blueprint(vec![section("Section A", 4, 1, QuestionType::Mcq, &[("Optics", 1.0)])]);
        let constraints = GenerationConstraints {
            difficulty_mix: Some([(Difficulty::Easy, 0.5), (Difficulty::Hard, 0.5)].into()),
            seed: Some(2),
            ..Default::default()
        };
        let outcome = generate(&bp, &bank(), &constraints, Utc::now());
        // Every 1-mark question is EASY, so the HARD half cannot be met.
        assert!(outcome.degradations.contains(&Degradation::DifficultyShortfall {
            difficulty: Difficulty::Hard,
            missing: 2,
        }));
    }

    #[test]
    fn seed_drawn_when_absent() {
        let bp = blueprint(vec![section("Section A", 1, 1, QuestionType::Mcq, &[("Optics", 1.0)])]);
        let bank = bank();
        let outcome = generate(&bp, &bank, &GenerationConstraints::default(), Utc::now());
        let replay = generate(&bp, &bank, &seeded(outcome.value.seed), Utc::now());
        assert_eq!(outcome.value.questions, replay.value.questions);
    }
}
