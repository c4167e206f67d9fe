//! Dictionary record definitions / 词典记录定义

use serde::{Deserialize, Serialize};

/// One sense of an entry / 词条的一个义项
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Meaning {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub part_of_speech: Option<String>,
    /// Present only when non-empty / 仅在非空时出现
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cross_references: Option<Vec<String>>,
    pub glosses: Vec<String>,
}

/// Dictionary headword group / 词条
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    /// JMdict `ent_seq` / 词条序号
    pub id: String,
    /// External frequency, absent until enrichment / 词频（外部来源）
    pub frequency: Option<f64>,
    pub meanings: Vec<Meaning>,
}

/// One surface realization (kanji or reading) of an entry / 词形
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Form {
    pub entry_id: String,
    pub value: String,
    /// Distinct hiragana-folded kana of the value / 假名字符集
    pub character_set: Vec<char>,
    pub repeat_count: u32,
    pub repeat_count_normalized: u32,
    pub is_primary: bool,
    pub is_kanji: bool,
    /// Only set for primary reading forms / 仅常用读音词形有长度
    pub length: Option<u32>,
}

/// Entry plus its forms, the unit the loader batches / 词条及其词形
#[derive(Debug, Clone, PartialEq)]
pub struct DictEntry {
    pub entry: Entry,
    pub forms: Vec<Form>,
}

impl DictEntry {
    /// Enrichment lookup key: first primary form, else first form / 词频查询键
    pub fn slug(&self) -> Option<&str> {
        self.forms
            .iter()
            .find(|f| f.is_primary)
            .or_else(|| self.forms.first())
            .map(|f| f.value.as_str())
    }
}

/// `k_ele` / `r_ele` as read from the corpus / 原始词形元素
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawElement {
    /// `keb` / `reb` text, if the element has one
    pub value: Option<String>,
    /// Concatenated text of the whole element / 元素全部文本
    pub text: String,
    /// Element carries `ke_pri` / `re_pri`
    pub has_priority: bool,
}

/// `sense` as read from the corpus / 原始义项
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawSense {
    pub pos: Vec<String>,
    pub xrefs: Vec<String>,
    pub glosses: Vec<String>,
}

/// `entry` as read from the corpus / 原始词条
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawEntry {
    pub seq: String,
    pub kanji: Vec<RawElement>,
    pub readings: Vec<RawElement>,
    pub senses: Vec<RawSense>,
}
