use crate::models::{ChapterTaxonomy, UNCLASSIFIED};

/// Lowercase, punctuation to spaces, single-spaced and padded for whole-word matching.
fn normalize_for_match(text: &str) -> String {
    let mapped: String = text
        .chars()
        .map(|c| {
            if c.is_alphanumeric() {
                c.to_lowercase().next().unwrap_or(c)
            } else {
                ' '
            }
        })
        .collect();
    format!(" {} ", mapped.split_whitespace().collect::<Vec<_>>().join(" "))
}

/// Pick the chapter whose keywords overlap the question text the most.
///
/// Ties go to the chapter with the longest matched keyword, then to the
/// alphabetically first tag. No overlap at all gives [`UNCLASSIFIED`].
pub fn classify_chapter(text: &str, taxonomy: Option<&ChapterTaxonomy>) -> String {
    let Some(taxonomy) = taxonomy else {
        return UNCLASSIFIED.to_string();
    };
    let haystack = normalize_for_match(text);

    let mut best: Option<(usize, usize, &str)> = None;
    for chapter in &taxonomy.chapters {
        let mut hits = 0usize;
        let mut longest = 0usize;
        for keyword in &chapter.keywords {
            let needle = normalize_for_match(keyword);
            if needle.trim().is_empty() {
                continue;
            }
            if haystack.contains(&needle) {
                hits += 1;
                longest = longest.max(needle.trim().chars().count());
            }
        }
        if hits == 0 {
            continue;
        }
        let better = match best {
            None => true,
            Some((best_hits, best_longest, best_tag)) => {
                (hits, longest) > (best_hits, best_longest)
                    || ((hits, longest) == (best_hits, best_longest)
                        && chapter.tag.as_str() < best_tag)
            }
        };
        if better {
            best = Some((hits, longest, chapter.tag.as_str()));
        }
    }

    best.map_or_else(|| UNCLASSIFIED.to_string(), |(_, _, tag)| tag.to_string())
}
