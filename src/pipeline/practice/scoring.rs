//! Answer normalization and session scoring.

use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use uuid::Uuid;

use crate::models::enums::SessionStatus;
use crate::models::{
    ChapterScore, GeneratedPaper, QuestionRecord, QuestionScore, ScoredResult, SessionResponse,
    UNCLASSIFIED,
};

fn marker_wrapped() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:option\s+)?\(?([a-h]|[ivx]{1,4}|[1-9])\s*[).]?$").expect("valid marker pattern")
    })
}

/// Lowercased, single-spaced, trailing period dropped.
pub fn normalize_answer(raw: &str) -> String {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
    collapsed.trim_end_matches('.').trim().to_string()
}

fn parse_number(text: &str) -> Option<f64> {
    let cleaned: String = text.chars().filter(|c| *c != ',' && !c.is_whitespace()).collect();
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Option position named by a marker (`b`, `(b)`, `ii`, `2`), if any.
fn marker_index(normalized: &str, option_count: usize) -> Option<usize> {
    let caps = marker_wrapped().captures(normalized)?;
    let marker = caps.get(1)?.as_str();
    let index = match marker {
        "i" => 0,
        "ii" => 1,
        "iii" => 2,
        "iv" => 3,
        "v" => 4,
        "vi" => 5,
        "vii" => 6,
        "viii" => 7,
        m if m.len() == 1 && m.as_bytes()[0].is_ascii_lowercase() => (m.as_bytes()[0] - b'a') as usize,
        m => m.parse::<usize>().ok()?.checked_sub(1)?,
    };
    (index < option_count).then_some(index)
}

/// Which option an answer designates.
///
/// Option text wins over markers, so with options `2 4 6 8` the answer "4"
/// is the second option, not the fourth. Numeric text is compared by value.
fn option_index(normalized: &str, options: &[String]) -> Option<usize> {
    options
        .iter()
        .position(|o| normalize_answer(o) == normalized)
        .or_else(|| {
            let value = parse_number(normalized)?;
            options.iter().position(|o| {
                parse_number(&normalize_answer(o)).is_some_and(|v| numbers_equal(v, value))
            })
        })
        .or_else(|| marker_index(normalized, options.len()))
}

fn numbers_equal(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-9 * b.abs().max(1.0)
}

/// Compare a submitted answer with the key.
///
/// Case, whitespace and option markers are ignored; numbers compare by value;
/// for MCQs a letter and the option's text are interchangeable.
pub fn answers_match(submitted: &str, key: &str, options: &[String]) -> bool {
    let submitted = normalize_answer(submitted);
    let key = normalize_answer(key);
    if submitted.is_empty() {
        return false;
    }

    if !options.is_empty() {
        if let (Some(a), Some(b)) = (option_index(&submitted, options), option_index(&key, options)) {
            return a == b;
        }
    }
    if let (Some(a), Some(b)) = (parse_number(&submitted), parse_number(&key)) {
        return numbers_equal(a, b);
    }
    strip_marker(&submitted) == strip_marker(&key)
}

fn strip_marker(normalized: &str) -> &str {
    normalized
        .trim_start_matches("option ")
        .trim_start_matches('(')
        .trim_end_matches(')')
        .trim()
}

/// Score a session's responses against the paper's answer keys.
///
/// Responses submitted at or after `cutoff` are ignored. Questions without
/// an answer key are listed but carry no marks either way.
pub fn score_session(
    session_id: Uuid,
    status: SessionStatus,
    paper: &GeneratedPaper,
    questions: &HashMap<Uuid, QuestionRecord>,
    responses: &BTreeMap<Uuid, SessionResponse>,
    cutoff: Option<DateTime<Utc>>,
    weak_threshold: f64,
) -> ScoredResult {
    let mut per_question = Vec::with_capacity(paper.questions.len());
    let mut per_chapter: BTreeMap<String, ChapterScore> = BTreeMap::new();
    let mut total_score = 0;
    let mut max_score = 0;
    let mut answered = 0;

    for id in &paper.questions {
        let question = questions.get(id);
        let submitted = responses
            .get(id)
            .filter(|r| cutoff.map_or(true, |limit| r.submitted_at < limit))
            .map(|r| r.answer.clone());
        if submitted.is_some() {
            answered += 1;
        }

        let (chapter_tag, marks) = question
            .map(|q| (q.chapter_tag.clone(), q.marks))
            .unwrap_or_else(|| (UNCLASSIFIED.to_string(), 0));
        let correct = question.and_then(|q| {
            let key = q.answer_key.as_deref()?;
            Some(
                submitted
                    .as_deref()
                    .is_some_and(|answer| answers_match(answer, key, &q.options)),
            )
        });

        let awarded = if correct == Some(true) { marks } else { 0 };
        if let Some(is_correct) = correct {
            max_score += marks;
            total_score += awarded;
            let chapter = per_chapter.entry(chapter_tag.clone()).or_default();
            chapter.total += 1;
            if is_correct {
                chapter.correct += 1;
            }
        }

        per_question.push(QuestionScore {
            question_id: *id,
            chapter_tag,
            marks,
            submitted,
            correct,
            awarded,
        });
    }

    for score in per_chapter.values_mut() {
        score.accuracy = accuracy(score.correct, score.total);
    }
    let weak_chapters = weak_chapters(&per_chapter, weak_threshold);

    ScoredResult {
        session_id,
        status,
        total_score,
        max_score,
        answered,
        per_question,
        per_chapter,
        weak_chapters,
    }
}

pub fn accuracy(correct: u32, total: u32) -> f64 {
    if total == 0 {
        0.0
    } else {
        correct as f64 / total as f64
    }
}

/// Chapters below `threshold`, alphabetical. UNCLASSIFIED is never reported.
pub fn weak_chapters(per_chapter: &BTreeMap<String, ChapterScore>, threshold: f64) -> Vec<String> {
    per_chapter
        .iter()
        .filter(|(tag, score)| tag.as_str() != UNCLASSIFIED && score.total > 0 && score.accuracy < threshold)
        .map(|(tag, _)| tag.clone())
        .collect()
}
