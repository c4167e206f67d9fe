//! Query engine - filter request → form query plan → ranked page / 查询引擎
//!
//! Validation happens before the store is touched. Matching entries are
//! ranked by frequency (unranked last) and paginated.

use serde::{Deserialize, Serialize};

use super::error::{DictError, Result};
use super::kana::{distinct, expand_small, kana_chars};
use super::schema::Meaning;
use super::store::{DictStore, FieldValue, FormField, FormQuery};

pub const DEFAULT_LIMIT: i64 = 100;

/// The only tag that changes the query / 唯一生效的标签
const COMMON_TAG: &str = "common";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Json,
    #[serde(alias = "text")]
    Txt,
}

/// Word generation filter / 生成过滤条件
#[derive(Debug, Clone, Default)]
pub struct GenerateRequest {
    /// Reading length, required, ≥ 1
    pub length: Option<i64>,
    /// Space-delimited tags / 空格分隔的标签
    pub tags: String,
    /// Forbidden characters / 排除字符
    pub exclude: String,
    /// At least one of these must appear / 至少包含其一
    pub within: String,
    /// Fold small kana before exclude / within / repeat
    pub normalize_small: bool,
    pub allow_repeat: bool,
    pub offset: Option<i64>,
    /// Default 100; any value ≤ 0 means no limit / ≤0 表示不限制
    pub limit: Option<i64>,
}

/// Validated request, ready for the store / 已校验的查询计划
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    pub forms: FormQuery,
    pub offset: u64,
    pub limit: Option<u64>,
}

impl GenerateRequest {
    /// Validate and translate into a store query plan / 校验并生成查询计划
    pub fn plan(&self) -> Result<QueryPlan> {
        let length = self
            .length
            .ok_or_else(|| DictError::validation("length is required"))?;
        if length < 1 {
            return Err(DictError::validation(format!(
                "length must be at least 1, got {}",
                length
            )));
        }

        let offset = self.offset.unwrap_or(0);
        if offset < 0 {
            return Err(DictError::validation(format!(
                "offset must not be negative, got {}",
                offset
            )));
        }

        let limit = match self.limit.unwrap_or(DEFAULT_LIMIT) {
            l if l > 0 => Some(l as u64),
            _ => None,
        };

        let mut forms = FormQuery::new().eq(FormField::Length, FieldValue::Int(length));

        let mut common = false;
        for tag in self.tags.split_whitespace() {
            if tag == COMMON_TAG {
                common = true;
            } else {
                tracing::debug!("Ignoring unsupported tag: {}", tag);
            }
        }
        if common {
            forms = forms.eq(FormField::IsPrimary, FieldValue::Bool(true));
        }

        // 不含假名的 exclude / within 不生成条件
        let exclude = query_chars(&self.exclude, self.normalize_small);
        if !exclude.is_empty() {
            forms = forms.chars_none(exclude);
        }
        let within = query_chars(&self.within, self.normalize_small);
        if !within.is_empty() {
            forms = forms.chars_any(within);
        }

        let repeat_field = if self.normalize_small {
            FormField::RepeatCountNormalized
        } else {
            FormField::RepeatCount
        };
        forms = if self.allow_repeat {
            forms.gt(repeat_field, 0)
        } else {
            forms.eq(repeat_field, FieldValue::Int(0))
        };

        Ok(QueryPlan {
            forms,
            offset: offset as u64,
            limit,
        })
    }
}

/// Kana of a query string, hiragana-folded, optionally small-expanded / 查询字符集
pub fn query_chars(text: &str, normalize_small: bool) -> Vec<char> {
    let chars = distinct(&kana_chars(text));
    if normalize_small {
        expand_small(&chars)
    } else {
        chars
    }
}

/// Pagination metadata / 分页信息
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageMeta {
    pub offset: u64,
    /// `-1` when unlimited
    pub limit: i64,
    /// Total matches, independent of offset / limit
    pub count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<u64>,
}

impl PageMeta {
    fn new(offset: u64, limit: Option<u64>, count: u64) -> Self {
        let (previous, next) = match limit {
            Some(l) => (
                (offset > 0).then(|| offset.saturating_sub(l)),
                (offset + l < count).then_some(offset + l),
            ),
            None => (None, None),
        };
        Self {
            offset,
            limit: limit.map(|l| l as i64).unwrap_or(-1),
            count,
            previous,
            next,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneratedWord {
    /// Primary forms / 常用词形
    pub japanese: Vec<String>,
    pub english: Vec<Meaning>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerateResult {
    pub meta: PageMeta,
    pub data: Vec<GeneratedWord>,
}

impl GenerateResult {
    /// One line per word: `forms - glosses / glosses` / 纯文本输出
    ///
    /// Glosses of one meaning are joined with `", "` (`"a, b"`, not the
    /// comma-only `"a,b"` of array stringification).
    pub fn to_text(&self) -> String {
        self.data
            .iter()
            .map(|w| {
                let english: Vec<String> = w.english.iter().map(|m| m.glosses.join(", ")).collect();
                format!("{} - {}", w.japanese.join(" "), english.join(" / "))
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Read-only query engine over a store handle / 查询引擎
pub struct QueryEngine<'a> {
    store: &'a DictStore,
}

impl<'a> QueryEngine<'a> {
    pub fn new(store: &'a DictStore) -> Self {
        Self { store }
    }

    pub async fn generate(&self, req: &GenerateRequest) -> Result<GenerateResult> {
        let plan = req.plan()?;
        self.execute(&plan).await
    }

    pub async fn execute(&self, plan: &QueryPlan) -> Result<GenerateResult> {
        let count = self.store.count_matching_entries(&plan.forms).await?;
        let entries = self
            .store
            .matching_entries_by_frequency(&plan.forms, plan.offset, plan.limit)
            .await?;

        let ids: Vec<String> = entries.iter().map(|e| e.id.clone()).collect();
        let mut primary = self.store.primary_values(&ids).await?;

        let data = entries
            .into_iter()
            .map(|e| GeneratedWord {
                japanese: primary.remove(&e.id).unwrap_or_default(),
                english: e.meanings,
            })
            .collect();

        tracing::debug!("Generate: {} matches, offset {}, limit {:?}", count, plan.offset, plan.limit);

        Ok(GenerateResult {
            meta: PageMeta::new(plan.offset, plan.limit, count),
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dict::testutil::{entry, temp_store};

    fn req(length: i64) -> GenerateRequest {
        GenerateRequest {
            length: Some(length),
            ..GenerateRequest::default()
        }
    }

    async fn seeded() -> (tempfile::TempDir, DictStore) {
        let (dir, store) = temp_store().await;
        let mut batch = vec![
            entry("1582710", &[("日本", true)], &[("にほん", true)], &["Japan"]),
            entry("1", &[], &[("かさ", true)], &["umbrella"]),
            entry("2", &[], &[("はは", true)], &["mother"]),
            entry("3", &[("茶屋", false)], &[("ちゃや", false)], &["teahouse"]),
            entry("4", &[], &[("ほんや", true)], &["bookshop"]),
            entry("5", &[], &[("しゃしん", true)], &["photograph"]),
            entry("6", &[], &[("つっこむ", true)], &["to thrust into"]),
        ];
        batch[0].entry.frequency = Some(500.0);
        batch[4].entry.frequency = Some(800.0);
        store.insert_batch(&batch).await.unwrap();
        (dir, store)
    }

    #[test]
    fn test_plan_validation() {
        assert!(GenerateRequest::default().plan().unwrap_err().is_validation());
        assert!(req(0).plan().unwrap_err().is_validation());

        let mut r = req(2);
        r.offset = Some(-1);
        assert!(r.plan().unwrap_err().is_validation());

        let plan = req(2).plan().unwrap();
        assert_eq!(plan.offset, 0);
        assert_eq!(plan.limit, Some(100));

        for l in [-1, 0, -5] {
            let mut r = req(2);
            r.limit = Some(l);
            assert_eq!(r.plan().unwrap().limit, None);
        }
    }

    #[test]
    fn test_plan_predicates() {
        let mut r = req(3);
        r.tags = "common jlpt-n5".to_string();
        r.exclude = "ア".to_string();
        r.within = "やx".to_string();
        r.normalize_small = true;
        r.allow_repeat = true;

        let plan = r.plan().unwrap();
        let expected = FormQuery::new()
            .eq(FormField::Length, FieldValue::Int(3))
            .eq(FormField::IsPrimary, FieldValue::Bool(true))
            .chars_none(vec!['あ', 'ぁ'])
            .chars_any(vec!['や', 'ゃ'])
            .gt(FormField::RepeatCountNormalized, 0);
        assert_eq!(plan.forms, expected);

        // no kana in exclude / within: no set predicate at all
        let mut r = req(2);
        r.exclude = "abc".to_string();
        r.within = "漢字".to_string();
        let expected = FormQuery::new()
            .eq(FormField::Length, FieldValue::Int(2))
            .eq(FormField::RepeatCount, FieldValue::Int(0));
        assert_eq!(r.plan().unwrap().forms, expected);

        let mut r = req(4);
        r.normalize_small = true;
        let expected = FormQuery::new()
            .eq(FormField::Length, FieldValue::Int(4))
            .eq(FormField::RepeatCountNormalized, FieldValue::Int(0));
        assert_eq!(r.plan().unwrap().forms, expected);
    }

    #[tokio::test]
    async fn test_common_length_scenario() {
        let (_dir, store) = seeded().await;
        let mut r = req(3);
        r.tags = "common".to_string();

        let out = QueryEngine::new(&store).generate(&r).await.unwrap();
        // ほんや (800) outranks にほん (500); ちゃや has no length
        assert_eq!(out.meta.count, 2);
        assert_eq!(out.data[0].japanese, vec!["ほんや".to_string()]);
        assert!(out.data[1].japanese.contains(&"にほん".to_string()));
        assert_eq!(out.data[1].english[0].glosses, vec!["Japan".to_string()]);
    }

    #[tokio::test]
    async fn test_exclude_and_within() {
        let (_dir, store) = seeded().await;
        let engine = QueryEngine::new(&store);

        // ん is in every length-3 candidate's reading
        let mut r = req(3);
        r.exclude = "ん".to_string();
        let out = engine.generate(&r).await.unwrap();
        assert_eq!(out.meta.count, 0);

        let mut r = req(3);
        r.within = "ぬ".to_string();
        let out = engine.generate(&r).await.unwrap();
        assert_eq!(out.meta.count, 0);
        assert!(out.data.is_empty());

        // katakana query characters fold onto the stored hiragana
        let mut r = req(3);
        r.within = "ヤ".to_string();
        let out = engine.generate(&r).await.unwrap();
        assert_eq!(out.meta.count, 1);
        assert_eq!(out.data[0].japanese, vec!["ほんや".to_string()]);
    }

    #[tokio::test]
    async fn test_repeat_and_small_kana() {
        let (_dir, store) = seeded().await;
        let engine = QueryEngine::new(&store);

        let out = engine.generate(&req(2)).await.unwrap();
        let words: Vec<&str> = out.data.iter().map(|w| w.japanese[0].as_str()).collect();
        assert_eq!(words, vec!["かさ"]);

        let mut r = req(2);
        r.allow_repeat = true;
        let out = engine.generate(&r).await.unwrap();
        assert_eq!(out.data[0].japanese, vec!["はは".to_string()]);

        // しゃしん: し repeats, so it never passes allowRepeat=false
        let out = engine.generate(&req(4)).await.unwrap();
        assert_eq!(out.meta.count, 1);
        assert_eq!(out.data[0].japanese, vec!["つっこむ".to_string()]);

        // つっこむ repeats only once っ folds onto つ
        let mut r = req(4);
        r.normalize_small = true;
        assert_eq!(engine.generate(&r).await.unwrap().meta.count, 0);

        r.allow_repeat = true;
        let out = engine.generate(&r).await.unwrap();
        let words: Vec<&str> = out.data.iter().map(|w| w.japanese[0].as_str()).collect();
        assert_eq!(words, vec!["しゃしん", "つっこむ"]);

        r.normalize_small = false;
        let out = engine.generate(&r).await.unwrap();
        let words: Vec<&str> = out.data.iter().map(|w| w.japanese[0].as_str()).collect();
        assert_eq!(words, vec!["しゃしん"]);

        // within ゃ, normalized: ゃ expands to や too, ほんや matches
        let mut r = req(3);
        r.within = "ゃ".to_string();
        r.normalize_small = true;
        let out = engine.generate(&r).await.unwrap();
        assert_eq!(out.meta.count, 1);
        r.normalize_small = false;
        assert_eq!(engine.generate(&r).await.unwrap().meta.count, 0);
    }

    #[tokio::test]
    async fn test_pagination_invariants() {
        let (_dir, store) = seeded().await;
        let engine = QueryEngine::new(&store);

        let mut all = req(3);
        all.limit = Some(-1);
        let full = engine.generate(&all).await.unwrap();
        let total = full.meta.count;
        assert_eq!(total, 2);
        assert_eq!(full.meta.limit, -1);

        for offset in 0..4i64 {
            for limit in [-1i64, 0, 1, 2, 5] {
                let mut r = req(3);
                r.offset = Some(offset);
                r.limit = Some(limit);
                let out = engine.generate(&r).await.unwrap();
                assert_eq!(out.meta.count, total);
                let remaining = (total as i64 - offset).max(0);
                let cap = if limit > 0 { limit.min(remaining) } else { remaining };
                assert_eq!(out.data.len() as i64, cap);
                // pages are slices of the full ranking
                for (i, w) in out.data.iter().enumerate() {
                    assert_eq!(w, &full.data[offset as usize + i]);
                }
            }
        }

        let mut r = req(3);
        r.limit = Some(1);
        let first = engine.generate(&r).await.unwrap();
        assert_eq!(first.meta.previous, None);
        assert_eq!(first.meta.next, Some(1));
        r.offset = Some(1);
        let second = engine.generate(&r).await.unwrap();
        assert_eq!(second.meta.previous, Some(0));
        assert_eq!(second.meta.next, None);
    }

    #[tokio::test]
    async fn test_idempotent_and_text_output() {
        let (_dir, store) = seeded().await;
        let engine = QueryEngine::new(&store);
        let r = req(3);

        let a = engine.generate(&r).await.unwrap();
        let b = engine.generate(&r).await.unwrap();
        assert_eq!(a, b);

        let text = a.to_text();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), a.data.len());
        assert_eq!(lines[0], "ほんや - bookshop");
        assert_eq!(lines[1], "日本 にほん - Japan");
    }

    #[test]
    fn test_text_joins_glosses_with_comma_space() {
        let meaning = |glosses: &[&str]| Meaning {
            part_of_speech: None,
            cross_references: None,
            glosses: glosses.iter().map(|g| g.to_string()).collect(),
        };
        let result = GenerateResult {
            meta: PageMeta::new(0, Some(10), 1),
            data: vec![GeneratedWord {
                japanese: vec!["傘".to_string(), "かさ".to_string()],
                english: vec![meaning(&["umbrella", "parasol"]), meaning(&["bamboo hat"])],
            }],
        };
        assert_eq!(result.to_text(), "傘 かさ - umbrella, parasol / bamboo hat");
    }

    #[test]
    fn test_output_format_names() {
        let f: OutputFormat = serde_json::from_str("\"txt\"").unwrap();
        assert_eq!(f, OutputFormat::Txt);
        let f: OutputFormat = serde_json::from_str("\"json\"").unwrap();
        assert_eq!(f, OutputFormat::Json);
    }
}
