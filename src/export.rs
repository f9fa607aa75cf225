//! Printable A4 rendering of generated practice papers.
//!
//! PDF generation via `printpdf` built-in Helvetica. Long papers flow onto
//! extra pages; the answer key, when requested, starts on its own page.

use std::collections::HashMap;
use std::io::BufWriter;

use printpdf::*;
use uuid::Uuid;

use crate::models::enums::QuestionType;
use crate::models::{GeneratedPaper, QuestionRecord};

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("PDF font error: {0}")]
    Font(String),
    #[error("PDF save error: {0}")]
    Save(String),
}

const PAGE_W: f32 = 210.0;
const PAGE_H: f32 = 297.0;
const TOP: f32 = 280.0;
const BOTTOM: f32 = 20.0;
const LEFT: f32 = 20.0;
const WRAP_CHARS: usize = 90;
const OPTION_LETTERS: &[char] = &['a', 'b', 'c', 'd', 'e', 'f', 'g', 'h'];

/// Cursor over the document that adds pages as text runs off the bottom.
struct PageWriter {
    doc: PdfDocumentReference,
    layer: PdfLayerReference,
    font: IndirectFontRef,
    bold: IndirectFontRef,
    y: Mm,
    pages: usize,
}

impl PageWriter {
    fn new(title: &str) -> Result<Self, ExportError> {
        let (doc, page1, layer1) = PdfDocument::new(title, Mm(PAGE_W), Mm(PAGE_H), "Layer 1");
        let layer = doc.get_page(page1).get_layer(layer1);
        let font = doc
            .add_builtin_font(BuiltinFont::Helvetica)
            .map_err(|e| ExportError::Font(e.to_string()))?;
        let bold = doc
            .add_builtin_font(BuiltinFont::HelveticaBold)
            .map_err(|e| ExportError::Font(e.to_string()))?;
        Ok(Self {
            doc,
            layer,
            font,
            bold,
            y: Mm(TOP),
            pages: 1,
        })
    }

    fn new_page(&mut self) {
        self.pages += 1;
        let (page, layer) = self
            .doc
            .add_page(Mm(PAGE_W), Mm(PAGE_H), format!("Layer {}", self.pages));
        self.layer = self.doc.get_page(page).get_layer(layer);
        self.y = Mm(TOP);
    }

    fn ensure_room(&mut self, needed: f32) {
        if self.y.0 - needed < BOTTOM {
            self.new_page();
        }
    }

    fn line(&mut self, text: &str, size: f32, indent: f32, bold: bool, advance: f32) {
        self.ensure_room(advance);
        let font = if bold { &self.bold } else { &self.font };
        self.layer.use_text(text, size, Mm(LEFT + indent), self.y, font);
        self.y -= Mm(advance);
    }

    fn wrapped(&mut self, text: &str, indent: f32, max_chars: usize) {
        for line in wrap_text(text, max_chars) {
            self.line(&line, 9.0, indent, false, 4.5);
        }
    }

    fn gap(&mut self, mm: f32) {
        self.y -= Mm(mm);
    }

    fn finish(self) -> Result<Vec<u8>, ExportError> {
        let mut buf = BufWriter::new(Vec::new());
        self.doc
            .save(&mut buf)
            .map_err(|e| ExportError::Save(e.to_string()))?;
        buf.into_inner()
            .map_err(|e| ExportError::Save(e.to_string()))
    }
}

/// Render a generated paper. `questions` must hold every id the paper references;
/// missing ones print as unavailable.
pub fn render_paper_pdf(
    paper: &GeneratedPaper,
    questions: &HashMap<Uuid, QuestionRecord>,
    include_answer_key: bool,
) -> Result<Vec<u8>, ExportError> {
    let title = format!("{} {} Practice Paper", paper.exam_name, paper.subject);
    let mut w = PageWriter::new(&title)?;

    w.line(&title, 14.0, 0.0, true, 7.0);
    w.line(
        &format!(
            "Total marks: {}    Questions: {}    Paper: {}",
            paper.total_marks,
            paper.questions.len(),
            paper.generated_id
        ),
        9.0,
        0.0,
        false,
        10.0,
    );

    let mut number = 0usize;
    let mut numbered: Vec<(usize, Uuid)> = Vec::with_capacity(paper.questions.len());
    let sections: Vec<(Option<String>, Vec<Uuid>)> = if paper.sections.is_empty() {
        vec![(None, paper.questions.clone())]
    } else {
        paper
            .sections
            .iter()
            .map(|s| {
                let heading = format!(
                    "{} ({} x {} marks)",
                    s.name,
                    s.question_ids.len(),
                    s.marks_per_question
                );
                (Some(heading), s.question_ids.clone())
            })
            .collect()
    };

    for (heading, ids) in sections {
        if let Some(heading) = heading {
            w.gap(2.0);
            w.line(&heading, 11.0, 0.0, true, 7.0);
        }
        for id in ids {
            number += 1;
            numbered.push((number, id));
            write_question(&mut w, number, questions.get(&id));
            w.gap(3.0);
        }
    }

    if include_answer_key {
        w.new_page();
        w.line("Answer Key", 12.0, 0.0, true, 8.0);
        for (number, id) in &numbered {
            let answer = questions
                .get(id)
                .and_then(|q| q.answer_key.as_deref())
                .unwrap_or("-");
            w.line(&format!("{number}. {answer}"), 9.0, 5.0, false, 4.5);
        }
    }

    tracing::debug!(generated_id = %paper.generated_id, pages = w.pages, "Paper rendered");
    w.finish()
}

fn write_question(w: &mut PageWriter, number: usize, question: Option<&QuestionRecord>) {
    let Some(q) = question else {
        w.line(&format!("{number}. [question unavailable]"), 9.0, 0.0, false, 4.5);
        return;
    };

    let marks = if q.marks == 1 { "1 mark".to_string() } else { format!("{} marks", q.marks) };
    w.wrapped(&format!("{number}. {}  [{marks}]", q.prompt_text), 0.0, WRAP_CHARS);

    if q.question_type == QuestionType::Mcq {
        for (i, option) in q.options.iter().enumerate() {
            let letter = OPTION_LETTERS.get(i).copied().unwrap_or('?');
            w.wrapped(&format!("({letter}) {option}"), 6.0, WRAP_CHARS - 6);
        }
    }
}

fn wrap_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        if current.len() + word.len() + 1 > max_chars && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::enums::Difficulty;
    use crate::models::GeneratedSection;
    use chrono::Utc;

    fn question(i: usize, question_type: QuestionType) -> QuestionRecord {
        QuestionRecord {
            question_id: Uuid::new_v4(),
            paper_id: Uuid::new_v4(),
            exam_name: "JEE".into(),
            subject: "Physics".into(),
            year: 2021,
            position: i as u32 + 1,
            chapter_tag: "Optics".into(),
            marks: 4,
            question_type,
            prompt_text: format!("Question {i}: a convex lens of focal length 20 cm forms an image. ").repeat(3),
            options: if question_type == QuestionType::Mcq {
                vec!["10 cm".into(), "20 cm".into(), "40 cm".into(), "infinity".into()]
            } else {
                Vec::new()
            },
            answer_key: Some("C".into()),
            difficulty: Difficulty::Medium,
            revision: 1,
        }
    }

    fn paper_with(count: usize) -> (GeneratedPaper, HashMap<Uuid, QuestionRecord>) {
        let questions: Vec<QuestionRecord> = (0..count)
            .map(|i| question(i, if i % 2 == 0 { QuestionType::Mcq } else { QuestionType::Short }))
            .collect();
        let ids: Vec<Uuid> = questions.iter().map(|q| q.question_id).collect();
        let paper = GeneratedPaper {
            generated_id: Uuid::new_v4(),
            exam_name: "JEE".into(),
            subject: "Physics".into(),
            snapshot_id: 1,
            seed: 1,
            generated_at: Utc::now(),
            questions: ids.clone(),
            sections: vec![GeneratedSection {
                name: "Section A".into(),
                marks_per_question: 4,
                requested: count as u32,
                question_ids: ids,
            }],
            total_marks: 4 * count as u32,
            degraded: false,
            degradations: Vec::new(),
        };
        let map = questions.into_iter().map(|q| (q.question_id, q)).collect();
        (paper, map)
    }

    fn page_count(bytes: &[u8]) -> usize {
        lopdf::Document::load_mem(bytes).unwrap().get_pages().len()
    }

    #[test]
    fn renders_single_page_paper() {
        let (paper, questions) = paper_with(2);
        let bytes = render_paper_pdf(&paper, &questions, false).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
        assert_eq!(page_count(&bytes), 1);
    }

    #[test]
    fn long_paper_flows_and_key_gets_own_page() {
        let (paper, questions) = paper_with(40);
        let without = page_count(&render_paper_pdf(&paper, &questions, false).unwrap());
        let with = page_count(&render_paper_pdf(&paper, &questions, true).unwrap());
        assert!(without > 1);
        assert!(with > without);
    }

    #[test]
    fn missing_questions_still_render() {
        let (paper, _) = paper_with(3);
        let bytes = render_paper_pdf(&paper, &HashMap::new(), true).unwrap();
        assert_eq!(page_count(&bytes), 2);
    }

    #[test]
    fn wrap_respects_width() {
        let lines = wrap_text("one two three four five six", 10);
        assert!(lines.iter().all(|l| l.len() <= 10));
        assert_eq!(lines.join(" "), "one two three four five six");
    }
}
