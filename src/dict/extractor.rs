//! Feature extractor - raw corpus entry → normalized records / 特征提取
//!
//! Pure transformation, no I/O. Entries without a valid form are dropped.

use super::kana::{char_features, contains_latin};
use super::schema::{DictEntry, Entry, Form, Meaning, RawElement, RawEntry, RawSense};

/// Separator used when a sense lists several `pos` tags / 多个词性的分隔符
const POS_SEPARATOR: &str = "; ";

/// Extract an entry and its forms, `None` when no form is valid / 提取词条
pub fn extract(raw: &RawEntry) -> Option<DictEntry> {
    let mut forms = Vec::with_capacity(raw.kanji.len() + raw.readings.len());

    for el in &raw.kanji {
        if let Some(form) = build_form(&raw.seq, el, true) {
            forms.push(form);
        }
    }
    for el in &raw.readings {
        if let Some(form) = build_form(&raw.seq, el, false) {
            forms.push(form);
        }
    }

    if forms.is_empty() {
        return None;
    }

    let meanings = raw.senses.iter().filter_map(build_meaning).collect();

    Some(DictEntry {
        entry: Entry {
            id: raw.seq.clone(),
            frequency: None,
            meanings,
        },
        forms,
    })
}

/// Resolve the surface value of an element / 解析词形值
///
/// `keb`/`reb` wins; otherwise the element text is used unless it is empty
/// or carries Latin letters. Fallback values are never primary.
fn resolve_value(el: &RawElement) -> Option<(String, bool)> {
    match el.value.as_deref() {
        Some(v) if !v.is_empty() => Some((v.to_string(), el.has_priority)),
        _ => {
            let text = el.text.trim();
            if text.is_empty() || contains_latin(text) {
                None
            } else {
                Some((text.to_string(), false))
            }
        }
    }
}

fn build_form(entry_id: &str, el: &RawElement, is_kanji: bool) -> Option<Form> {
    let (value, is_primary) = resolve_value(el)?;
    let features = char_features(&value);

    // 只有常用读音需要长度（按读音长度过滤）
    let length = if is_primary && !is_kanji {
        Some(value.chars().count() as u32)
    } else {
        None
    };

    Some(Form {
        entry_id: entry_id.to_string(),
        value,
        character_set: features.char_set,
        repeat_count: features.repeat_count,
        repeat_count_normalized: features.repeat_count_normalized,
        is_primary,
        is_kanji,
        length,
    })
}

fn build_meaning(sense: &RawSense) -> Option<Meaning> {
    if sense.glosses.is_empty() {
        return None;
    }

    let pos: Vec<&str> = sense
        .pos
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect();

    Some(Meaning {
        part_of_speech: if pos.is_empty() { None } else { Some(pos.join(POS_SEPARATOR)) },
        cross_references: if sense.xrefs.is_empty() { None } else { Some(sense.xrefs.clone()) },
        glosses: sense.glosses.clone(),
    })
}
