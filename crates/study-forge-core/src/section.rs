//! Section planning for quota-driven generation.
//!
//! A quiz request is split into a fixed number of disjoint [`Section`]s,
//! each asked for an exact number of items. Sections never overlap (unlike
//! chunks) and always partition the input in order: concatenating section
//! texts gives back the input byte for byte.

use crate::models::Section;

/// Distribute `total` items across `sections` as evenly as possible.
///
/// Every element is `total / sections` or one more; the remainder goes to
/// the last sections, so 10 across 3 gives `[3, 3, 4]`. Returns an empty
/// vector when `sections == 0`.
pub fn quotas(total: usize, sections: usize) -> Vec<usize> {
    if sections == 0 {
        return Vec::new();
    }
    let base = total / sections;
    let remainder = total % sections;
    (0..sections)
        .map(|i| {
            if i >= sections - remainder {
                base + 1
            } else {
                base
            }
        })
        .collect()
}

/// Split text into sentences without losing any bytes.
///
/// A sentence ends at `.`, `!`, or `?` followed by whitespace (or the end
/// of input), or at a paragraph break. Trailing whitespace belongs to the
/// sentence it follows.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut sentences = Vec::new();
    let mut start = 0usize;
    let mut i = 0usize;

    while i < bytes.len() {
        let b = bytes[i];
        let terminal = matches!(b, b'.' | b'!' | b'?')
            && bytes.get(i + 1).map_or(true, |next| next.is_ascii_whitespace());
        let paragraph = b == b'\n' && bytes.get(i + 1) == Some(&b'\n');

        if terminal || paragraph {
            let mut end = i + 1;
            while end < bytes.len() && bytes[end].is_ascii_whitespace() {
                end += 1;
            }
            sentences.push(&text[start..end]);
            start = end;
            i = end;
        } else {
            i += 1;
        }
    }

    if start < text.len() {
        sentences.push(&text[start..]);
    }
    sentences
}

/// Partition `text` into at most `section_count` sections of whole sentences.
///
/// Sentences accumulate until the running length would pass
/// `ceil(len / section_count)`. A section is also closed early when the
/// remaining sentences are only just enough to give every later section
/// one, so the result has exactly `section_count` non-empty sections
/// whenever the text has that many sentences, and one section per sentence
/// otherwise. Quotas are left at zero; see [`assign_quotas`].
pub fn plan(text: &str, section_count: usize) -> Vec<Section> {
    let mut sections = Vec::new();
    if section_count == 0 || text.trim().is_empty() {
        return sections;
    }

    let sentences = split_sentences(text);
    let target = text.len().div_ceil(section_count);

    let mut current_start = 0usize;
    let mut offset = 0usize;

    for (i, sentence) in sentences.iter().enumerate() {
        let current_len = offset - current_start;
        if current_len > 0 && sections.len() + 1 < section_count {
            let remaining = sentences.len() - i;
            let still_needed = section_count - sections.len() - 1;
            let overflow = current_len + sentence.len() > target;
            if overflow || remaining <= still_needed {
                sections.push(Section {
                    index: sections.len(),
                    start: current_start,
                    text: text[current_start..offset].to_string(),
                    quota: 0,
                });
                current_start = offset;
            }
        }
        offset += sentence.len();
    }

    if offset > current_start {
        sections.push(Section {
            index: sections.len(),
            start: current_start,
            text: text[current_start..offset].to_string(),
            quota: 0,
        });
    }

    sections
}

/// Set each section's quota from [`quotas`] over the actual section count.
pub fn assign_quotas(sections: &mut [Section], total: usize) {
    let per_section = quotas(total, sections.len());
    for (section, quota) in sections.iter_mut().zip(per_section) {
        section.quota = quota;
    }
}
