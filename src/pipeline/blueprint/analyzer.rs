//! Cross-year structure inference.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::AnalyzeError;
use crate::models::enums::{Difficulty, QuestionType};
use crate::models::{Blueprint, BlueprintSection, QuestionRecord, UNCLASSIFIED};
use crate::pipeline_config::BlueprintConfig;

/// A recurring (type, marks) pattern.
type SlotKey = (QuestionType, u32);

#[derive(Default)]
struct SlotStats {
    years: BTreeSet<i32>,
    per_paper: HashMap<Uuid, u32>,
    relative_positions: Vec<f64>,
    chapters: BTreeMap<String, u32>,
}

/// Infer the blueprint of one exam/subject from its live questions.
///
/// Pure: the same questions and snapshot give the same blueprint apart from
/// `computed_at`.
pub fn analyze_questions(
    exam_name: &str,
    subject: &str,
    snapshot_id: i64,
    questions: &[QuestionRecord],
    config: &BlueprintConfig,
    now: DateTime<Utc>,
) -> Result<Blueprint, AnalyzeError> {
    let years: BTreeSet<i32> = questions.iter().map(|q| q.year).collect();
    if years.len() < 2 {
        return Err(AnalyzeError::InsufficientHistory { years: years.len() });
    }

    let mut papers: BTreeMap<Uuid, Vec<&QuestionRecord>> = BTreeMap::new();
    for q in questions {
        papers.entry(q.paper_id).or_default().push(q);
    }

    let mut slots: BTreeMap<SlotKey, SlotStats> = BTreeMap::new();
    let mut all_chapters: BTreeSet<String> = BTreeSet::new();
    for paper_questions in papers.values_mut() {
        paper_questions.sort_by_key(|q| q.position);
        let len = paper_questions.len() as f64;
        for (i, q) in paper_questions.iter().enumerate() {
            let stats = slots.entry((q.question_type, q.marks)).or_default();
            stats.years.insert(q.year);
            *stats.per_paper.entry(q.paper_id).or_default() += 1;
            stats.relative_positions.push((i as f64 + 0.5) / len);
            if q.is_classified() {
                *stats.chapters.entry(q.chapter_tag.clone()).or_default() += 1;
                all_chapters.insert(q.chapter_tag.clone());
            }
        }
    }

    let year_count = years.len();
    let mut kept: Vec<(f64, SlotKey, u32, BTreeMap<String, f64>)> = slots
        .iter()
        .filter(|(_, s)| s.years.len() * 2 > year_count && s.years.len() >= config.min_section_years)
        .map(|(key, stats)| {
            let mean_position =
                stats.relative_positions.iter().sum::<f64>() / stats.relative_positions.len() as f64;
            (
                mean_position,
                *key,
                modal_count(stats.per_paper.values().copied()),
                chapter_weights(&stats.chapters, &all_chapters, config.laplace_alpha),
            )
        })
        .collect();

    if kept.is_empty() {
        return Err(AnalyzeError::NoRecurringStructure);
    }
    kept.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

    let sections: Vec<BlueprintSection> = kept
        .into_iter()
        .enumerate()
        .map(|(i, (_, (question_type, marks), count, weights))| BlueprintSection {
            name: section_name(i),
            question_count: count,
            marks_per_question: marks,
            allowed_types: vec![question_type],
            chapter_weight: weights,
        })
        .collect();

    let total_marks = sections
        .iter()
        .map(|s| s.question_count * s.marks_per_question)
        .sum();

    Ok(Blueprint {
        exam_name: exam_name.to_string(),
        subject: subject.to_string(),
        snapshot_id,
        years: years.into_iter().collect(),
        paper_count: papers.len(),
        sections,
        total_marks,
        difficulty_mix: difficulty_mix(questions),
        computed_at: now,
    })
}

/// Most frequent value; ties go to the larger value.
fn modal_count(values: impl Iterator<Item = u32>) -> u32 {
    let mut freq: BTreeMap<u32, usize> = BTreeMap::new();
    for v in values {
        *freq.entry(v).or_default() += 1;
    }
    freq.into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then(a.0.cmp(&b.0)))
        .map_or(0, |(v, _)| v)
}

/// Laplace-smoothed chapter shares over every classified chapter of the pair.
fn chapter_weights(
    section_counts: &BTreeMap<String, u32>,
    all_chapters: &BTreeSet<String>,
    alpha: f64,
) -> BTreeMap<String, f64> {
    if section_counts.is_empty() {
        return BTreeMap::from([(UNCLASSIFIED.to_string(), 1.0)]);
    }

    let raw: BTreeMap<String, f64> = all_chapters
        .iter()
        .map(|tag| {
            let count = section_counts.get(tag).copied().unwrap_or(0) as f64;
            (tag.clone(), count + alpha)
        })
        .filter(|(_, w)| *w > 0.0)
        .collect();
    let total: f64 = raw.values().sum();
    raw.into_iter().map(|(tag, w)| (tag, w / total)).collect()
}

fn difficulty_mix(questions: &[QuestionRecord]) -> BTreeMap<Difficulty, f64> {
    let mut mix: BTreeMap<Difficulty, f64> = [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard]
        .into_iter()
        .map(|d| (d, 0.0))
        .collect();
    if questions.is_empty() {
        return mix;
    }
    for q in questions {
        *mix.entry(q.difficulty).or_default() += 1.0;
    }
    let total = questions.len() as f64;
    for share in mix.values_mut() {
        *share /= total;
    }
    mix
}

/// "Section A", "Section B", ... then "Section AA" past Z.
pub fn section_name(index: usize) -> String {
    let mut label = String::new();
    let mut n = index;
    loop {
        label.insert(0, (b'A' + (n % 26) as u8) as char);
        if n < 26 {
            break;
        }
        n = n / 26 - 1;
    }
    format!("Section {label}")
}
