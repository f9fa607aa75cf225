//! Field extraction inside one question unit: options, marks, answer, type.

use std::sync::OnceLock;

use regex::Regex;

use super::segment::QuestionUnit;
use crate::models::enums::{Difficulty, QuestionType};
use crate::pipeline_config::SegmentationConfig;

/// Fields read from a unit, before chapter tagging.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitFields {
    pub prompt_text: String,
    pub options: Vec<String>,
    pub marks: u32,
    pub answer_key: Option<String>,
    pub question_type: QuestionType,
    pub difficulty: Difficulty,
}

fn option_marker() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:\(([a-hA-H]|[ivx]{1,4}|[1-9])\)|([a-hA-H]|[ivx]{1,4})[.)])(?:\s+|$)")
            .expect("valid option marker pattern")
    })
}

/// Parenthesized or `a)` style markers inside a line, used to split inline options.
fn inline_marker() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?:^|\s)(?:\(([a-hA-H]|[ivx]{1,4}|[1-9])\)|([a-hA-H])\))\s")
            .expect("valid inline marker pattern")
    })
}

fn marks_suffix() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\s*(?:\[\s*(\d{1,3})\s*(?:marks?)?\s*\]|\(\s*(\d{1,3})\s*marks?\s*\))\s*$")
            .expect("valid marks pattern")
    })
}

fn answer_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^(?:ans|answer)\s*[:.\-]\s*(.+)$").expect("valid answer pattern")
    })
}

fn numeric_value() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[-+]?\d+(?:\.\d+)?$").expect("valid number pattern"))
}

/// Phrases exam papers use for integer/numerical-answer questions.
const NUMERIC_CUES: &[&str] = &[
    "numerical value",
    "integer type",
    "numerical answer",
    "answer in integer",
    "(numerical)",
];

/// Split a line into option texts if it opens with an option marker.
///
/// `"(a) 2 (b) 4"` gives `["2", "4"]`; a line without a leading marker gives `None`.
pub fn split_options(line: &str) -> Option<Vec<String>> {
    let line = line.trim();
    if !option_marker().is_match(line) {
        return None;
    }

    let mut starts: Vec<(usize, usize)> = Vec::new();
    for m in inline_marker().find_iter(line) {
        starts.push((m.start(), m.end()));
    }
    // Leading `a.` / `iv.` markers are not covered by the inline pattern.
    if starts.first().map_or(true, |(s, _)| *s != 0) {
        if let Some(m) = option_marker().find(line) {
            starts.insert(0, (m.start(), m.end()));
        }
    }

    let mut options = Vec::with_capacity(starts.len());
    for (i, (_, text_start)) in starts.iter().enumerate() {
        let end = starts.get(i + 1).map_or(line.len(), |(s, _)| *s);
        let text = line[*text_start..end].trim();
        if !text.is_empty() {
            options.push(text.to_string());
        }
    }
    Some(options)
}

/// Strip a trailing marks annotation (`[4]`, `[4 marks]`, `(4 marks)`).
pub fn take_marks(line: &str) -> (String, Option<u32>) {
    match marks_suffix().captures(line) {
        Some(caps) => {
            let marks = caps
                .get(1)
                .or_else(|| caps.get(2))
                .and_then(|m| m.as_str().parse().ok());
            let start = caps.get(0).map_or(line.len(), |m| m.start());
            (line[..start].trim_end().to_string(), marks)
        }
        None => (line.to_string(), None),
    }
}

pub fn is_numeric_answer(answer: &str) -> bool {
    numeric_value().is_match(answer.trim())
}

pub fn difficulty_for_marks(marks: u32, config: &SegmentationConfig) -> Difficulty {
    if marks <= config.easy_max_marks {
        Difficulty::Easy
    } else if marks >= config.hard_min_marks {
        Difficulty::Hard
    } else {
        Difficulty::Medium
    }
}

/// Read a unit's fields. `key_answer` comes from a trailing answer-key section
/// and is used only when the unit carries no inline answer line.
pub fn read_fields(
    unit: &QuestionUnit,
    key_answer: Option<&str>,
    config: &SegmentationConfig,
) -> UnitFields {
    let mut prompt_lines: Vec<String> = Vec::new();
    let mut option_lines: Vec<String> = Vec::new();
    let mut marks: Option<u32> = None;
    let mut inline_answer: Option<String> = None;

    for raw in &unit.lines {
        let (line, found_marks) = take_marks(raw);
        if found_marks.is_some() {
            marks = found_marks;
        }
        if line.is_empty() {
            continue;
        }
        if let Some(caps) = answer_line().captures(&line) {
            inline_answer = caps.get(1).map(|m| m.as_str().trim().to_string());
            continue;
        }
        match split_options(&line) {
            Some(parts)
                if !parts.is_empty()
                    && parts.iter().all(|p| p.chars().count() <= config.option_max_chars) =>
            {
                option_lines.push(line.clone());
                prompt_lines.push(line);
            }
            _ => prompt_lines.push(line),
        }
    }

    let options: Vec<String> = option_lines
        .iter()
        .filter_map(|l| split_options(l))
        .flatten()
        .collect();
    let is_mcq = options.len() >= 2;
    if is_mcq {
        prompt_lines.retain(|l| !option_lines.contains(l));
    }

    let prompt_text = prompt_lines.join(" ");
    let answer_key = inline_answer
        .or_else(|| key_answer.map(str::to_string))
        .filter(|a| !a.is_empty());
    let marks = marks.unwrap_or(1);

    let question_type = if is_mcq {
        QuestionType::Mcq
    } else if answer_key.as_deref().is_some_and(is_numeric_answer) || has_numeric_cue(&prompt_text)
    {
        QuestionType::Numeric
    } else if prompt_text.chars().count() >= config.long_prompt_chars {
        QuestionType::Long
    } else {
        QuestionType::Short
    };

    UnitFields {
        prompt_text,
        options: if is_mcq { options } else { Vec::new() },
        marks,
        answer_key,
        question_type,
        difficulty: difficulty_for_marks(marks, config),
    }
}

fn has_numeric_cue(prompt: &str) -> bool {
    let lower = prompt.to_lowercase();
    NUMERIC_CUES.iter().any(|cue| lower.contains(cue))
}
