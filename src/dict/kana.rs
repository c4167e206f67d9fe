//! Kana matcher and folding helpers / 假名匹配与折叠
//!
//! - Phonetic-script matcher: hiragana + katakana (incl. prolonged sound mark) / 假名匹配
//! - Katakana → hiragana folding / 片假名折叠为平假名
//! - Small kana folding and expansion (ゃ ⇄ や) / 小写假名折叠与展开

/// Small kana and their full-size base / 小写假名及其对应的大写假名
const SMALL_KANA: [(char, char); 12] = [
    ('ぁ', 'あ'),
    ('ぃ', 'い'),
    ('ぅ', 'う'),
    ('ぇ', 'え'),
    ('ぉ', 'お'),
    ('っ', 'つ'),
    ('ゃ', 'や'),
    ('ゅ', 'ゆ'),
    ('ょ', 'よ'),
    ('ゎ', 'わ'),
    ('ゕ', 'か'),
    ('ゖ', 'け'),
];

/// Check whether a character belongs to the kana script ranges / 是否为假名字符
pub fn is_kana(c: char) -> bool {
    matches!(c,
        '\u{3041}'..='\u{3096}' |  // Hiragana
        '\u{309D}'..='\u{309F}' |  // Hiragana iteration marks
        '\u{30A1}'..='\u{30FA}' |  // Katakana
        '\u{30FC}'..='\u{30FF}' |  // Prolonged sound mark, katakana iteration marks
        '\u{31F0}'..='\u{31FF}'    // Katakana phonetic extensions (small)
    )
}

/// Fold katakana to hiragana, everything else passes through / 片假名转平假名
pub fn to_hiragana(text: &str) -> String {
    text.chars().map(hiragana_of).collect()
}

fn hiragana_of(c: char) -> char {
    match c {
        // ァ..ヶ map 1:1 onto ぁ..ゖ
        '\u{30A1}'..='\u{30F6}' | '\u{30FD}'..='\u{30FE}' => {
            char::from_u32(c as u32 - 0x60).unwrap_or(c)
        }
        _ => c,
    }
}

/// Ordered kana characters of a value after hiragana folding / 提取假名序列
pub fn kana_chars(text: &str) -> Vec<char> {
    to_hiragana(text).chars().filter(|&c| is_kana(c)).collect()
}

/// Fold a small kana into its full-size base / 小写假名折叠
pub fn fold_small(c: char) -> char {
    SMALL_KANA
        .iter()
        .find(|(small, _)| *small == c)
        .map(|(_, base)| *base)
        .unwrap_or(c)
}

/// Expand every character into itself plus its small/full-size variants / 展开小写假名
///
/// Used for query character sets: `や` → `や ゃ`, `ゃ` → `ゃ や`.
pub fn expand_small(chars: &[char]) -> Vec<char> {
    let mut out: Vec<char> = Vec::with_capacity(chars.len() * 2);
    for &c in chars {
        let base = fold_small(c);
        push_unique(&mut out, c);
        push_unique(&mut out, base);
        for (small, full) in SMALL_KANA.iter() {
            if *full == base {
                push_unique(&mut out, *small);
            }
        }
    }
    out
}

fn push_unique(out: &mut Vec<char>, c: char) {
    if !out.contains(&c) {
        out.push(c);
    }
}

/// Distinct characters in first-occurrence order / 去重（保持首次出现顺序）
pub fn distinct(chars: &[char]) -> Vec<char> {
    let mut out = Vec::with_capacity(chars.len());
    for &c in chars {
        push_unique(&mut out, c);
    }
    out
}

/// Check for Latin letters (annotation artifacts in the corpus) / 是否包含拉丁字母
pub fn contains_latin(text: &str) -> bool {
    text.chars().any(|c| c.is_ascii_alphabetic())
}

/// Character features of one form value / 单个词形的字符特征
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharFeatures {
    pub char_set: Vec<char>,
    pub repeat_count: u32,
    pub repeat_count_normalized: u32,
}

/// Compute the character set and repeat counts of a value / 计算字符集与重复数
pub fn char_features(value: &str) -> CharFeatures {
    let all = kana_chars(value);
    let char_set = distinct(&all);
    let repeat_count = (all.len() - char_set.len()) as u32;

    let folded: Vec<char> = all.iter().map(|&c| fold_small(c)).collect();
    let repeat_count_normalized = (folded.len() - distinct(&folded).len()) as u32;

    CharFeatures {
        char_set,
        repeat_count,
        repeat_count_normalized,
    }
}
