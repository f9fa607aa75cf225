//! Splits a paper's block sequence into question units.

use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;

use regex::Regex;

use crate::models::enums::BlockSource;
use crate::models::ExtractedBlock;

/// Contiguous run of blocks that make up one question.
#[derive(Debug, Clone, PartialEq)]
pub struct QuestionUnit {
    /// Number printed on the paper (`3` for `Q3.`).
    pub number: u32,
    /// `order_index` of the block that opened the unit.
    pub first_order_index: u32,
    pub page_no: u32,
    /// First line with the number prefix removed, then the following lines.
    pub lines: Vec<String>,
}

/// Units plus answers collected from a trailing answer-key section.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Segmentation {
    pub units: Vec<QuestionUnit>,
    pub answer_key: HashMap<u32, String>,
}

fn question_start() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:[Qq]\.?\s*(\d{1,3})\s*[.):]?|(\d{1,3})\s*[.):])(?:\s+|$)(.*)$")
            .expect("valid question start pattern")
    })
}

fn answer_key_heading() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^(?:answer\s*key|answers|key\s*to\s*answers)\s*:?$")
            .expect("valid heading pattern")
    })
}

fn answer_key_entry() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?:^|\s)[Qq]?\.?\s*(\d{1,3})\s*[.):\-]\s*(\(?[A-Za-z0-9+\-./]+\)?)")
            .expect("valid answer entry pattern")
    })
}

/// Parse a question-number prefix. Returns the number and the remaining text.
pub fn parse_question_start(text: &str) -> Option<(u32, String)> {
    let caps = question_start().captures(text.trim())?;
    let number = caps
        .get(1)
        .or_else(|| caps.get(2))?
        .as_str()
        .parse()
        .ok()?;
    let rest = caps.get(3).map_or("", |m| m.as_str()).trim().to_string();
    Some((number, rest))
}

/// Most common left edge, rounded to whole points; ties go to the leftmost.
pub fn body_margin(blocks: &[&ExtractedBlock]) -> f32 {
    let mut counts: BTreeMap<i64, usize> = BTreeMap::new();
    for block in blocks {
        *counts.entry(block.region.x.round() as i64).or_default() += 1;
    }
    counts
        .iter()
        .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(a.0)))
        .map_or(0.0, |(x, _)| *x as f32)
}

/// Split blocks into question units.
///
/// A unit starts at a numbered block whose left edge sits at or left of the
/// body margin plus `margin_tolerance`. Blocks before the first unit are
/// header text and dropped. An "Answer Key" heading ends the question body;
/// the numbered entries after it are returned as `answer_key`.
pub fn segment_blocks(blocks: &[ExtractedBlock], margin_tolerance: f32) -> Segmentation {
    let readable: Vec<&ExtractedBlock> = blocks
        .iter()
        .filter(|b| b.source != BlockSource::Failed && !b.text.trim().is_empty())
        .collect();

    let key_start = readable
        .iter()
        .position(|b| answer_key_heading().is_match(b.text.trim()));
    let (body, key_section) = match key_start {
        Some(pos) => (&readable[..pos], &readable[pos + 1..]),
        None => (&readable[..], &readable[readable.len()..]),
    };

    // OCR pages carry no layout, so each page is measured against its own margin.
    let mut by_page: BTreeMap<u32, Vec<&ExtractedBlock>> = BTreeMap::new();
    for block in body {
        by_page.entry(block.page_no).or_default().push(block);
    }
    let margins: HashMap<u32, f32> = by_page
        .iter()
        .map(|(page, blocks)| (*page, body_margin(blocks)))
        .collect();

    let mut units: Vec<QuestionUnit> = Vec::new();
    for block in body {
        let margin = margins.get(&block.page_no).copied().unwrap_or(0.0);
        let starts = if block.region.x <= margin + margin_tolerance {
            parse_question_start(&block.text)
        } else {
            None
        };
        match (starts, units.last_mut()) {
            (Some((number, rest)), _) => {
                let mut lines = Vec::new();
                if !rest.is_empty() {
                    lines.push(rest);
                }
                units.push(QuestionUnit {
                    number,
                    first_order_index: block.order_index,
                    page_no: block.page_no,
                    lines,
                });
            }
            (None, Some(unit)) => unit.lines.push(block.text.trim().to_string()),
            (None, None) => {}
        }
    }

    let mut answer_key = HashMap::new();
    for block in key_section {
        for caps in answer_key_entry().captures_iter(&block.text) {
            let (Some(number), Some(answer)) = (caps.get(1), caps.get(2)) else {
                continue;
            };
            if let Ok(number) = number.as_str().parse::<u32>() {
                answer_key
                    .entry(number)
                    .or_insert_with(|| answer.as_str().to_string());
            }
        }
    }

    Segmentation { units, answer_key }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BoundingRegion;
    use uuid::Uuid;

    fn blocks(lines: &[(f32, &str)]) -> Vec<ExtractedBlock> {
        let paper_id = Uuid::new_v4();
        lines
            .iter()
            .enumerate()
            .map(|(i, (x, text))| ExtractedBlock {
                paper_id,
                page_no: 1,
                order_index: i as u32,
                text: text.to_string(),
                region: BoundingRegion {
                    x: *x,
                    y: 20.0 * i as f32,
                    width: 200.0,
                    height: 11.0,
                },
                confidence: 1.0,
                source: BlockSource::Native,
            })
            .collect()
    }

    #[test]
    fn recognizes_number_formats() {
        for text in ["1. Define", "1) Define", "Q1. Define", "Q.1 Define", "Q 1: Define", "q12 Define"] {
            let (number, rest) = parse_question_start(text).unwrap_or_else(|| panic!("{text}"));
            assert!(number == 1 || number == 12, "{text}");
            assert_eq!(rest, "Define");
        }
    }

    #[test]
    fn rejects_non_question_lines() {
        for text in ["3.5 m/s is the speed", "(1) option", "2021 Physics", "Time: 3 hours", "Answer: 4"] {
            assert!(parse_question_start(text).is_none(), "{text}");
        }
    }

    #[test]
    fn splits_units_and_drops_header() {
        let seg = segment_blocks(
            &blocks(&[
                (200.0, "Physics 2021"),
                (72.0, "1. State Newton's first law. [2]"),
                (72.0, "It is also called the law of inertia."),
                (72.0, "2. Define work."),
                (90.0, "(a) force x distance"),
            ]),
            12.0,
        );
        assert_eq!(seg.units.len(), 2);
        assert_eq!(seg.units[0].number, 1);
        assert_eq!(seg.units[0].first_order_index, 1);
        assert_eq!(seg.units[0].lines.len(), 2);
        assert_eq!(seg.units[1].first_order_index, 3);
        assert_eq!(seg.units[1].lines[1], "(a) force x distance");
    }

    #[test]
    fn indented_numbers_do_not_start_units() {
        let seg = segment_blocks(
            &blocks(&[
                (72.0, "1. Which statements hold?"),
                (72.0, "Consider the list below."),
                (110.0, "2. the second statement"),
                (72.0, "Pick all that apply."),
            ]),
            12.0,
        );
        assert_eq!(seg.units.len(), 1);
        assert_eq!(seg.units[0].lines.len(), 4);
    }

    #[test]
    fn answer_key_section_is_parsed_and_excluded() {
        let seg = segment_blocks(
            &blocks(&[
                (72.0, "1. Pick one."),
                (72.0, "2. Compute g."),
                (72.0, "Answer Key"),
                (72.0, "1. B  2. 9.8"),
            ]),
            12.0,
        );
        assert_eq!(seg.units.len(), 2);
        assert_eq!(seg.answer_key.get(&1).map(String::as_str), Some("B"));
        assert_eq!(seg.answer_key.get(&2).map(String::as_str), Some("9.8"));
    }

    #[test]
    fn margin_is_measured_per_page() {
        // Page 1 is OCR output at x=0 with more lines than page 2's body.
        let mut input = blocks(&[
            (0.0, "General Instructions"),
            (0.0, "All questions are compulsory"),
            (0.0, "Use blue ink only"),
            (0.0, "Write your roll number on top"),
            (72.0, "1. Define momentum. [2]"),
            (72.0, "2. State Hooke's law. [3]"),
            (72.0, "3. Derive the lens formula. [5]"),
        ]);
        for block in input.iter_mut().skip(4) {
            block.page_no = 2;
        }
        let seg = segment_blocks(&input, 12.0);
        let numbers: Vec<u32> = seg.units.iter().map(|u| u.number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert!(seg.units.iter().all(|u| u.page_no == 2));
    }

    #[test]
    fn failed_placeholders_are_skipped() {
        let mut input = blocks(&[(72.0, "1. Define power.")]);
        input.push(ExtractedBlock {
            text: String::new(),
            source: BlockSource::Failed,
            confidence: 0.0,
            order_index: 1,
            ..input[0].clone()
        });
        let seg = segment_blocks(&input, 12.0);
        assert_eq!(seg.units.len(), 1);
        assert_eq!(seg.units[0].lines, vec!["Define power.".to_string()]);
    }

    #[test]
    fn no_numbered_blocks_gives_no_units() {
        let seg = segment_blocks(&blocks(&[(72.0, "Instructions"), (72.0, "Read carefully")]), 12.0);
        assert!(seg.units.is_empty());
    }
}
