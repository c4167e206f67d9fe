//! JMdict streaming parser / JMdict 流式解析
//!
//! Pulls one `<entry>` at a time out of the corpus (a finite, non-restartable
//! sequence). Internal DTD entities (`&n;`, `&v5r;`...) are read from the
//! DOCTYPE and expanded. Broken entries are skipped; reader-level XML errors
//! end the sequence with an error.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use flate2::read::GzDecoder;
use once_cell::sync::Lazy;
use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use super::error::{DictError, Result};
use super::schema::{RawElement, RawEntry, RawSense};

/// `<!ENTITY name "expansion">` in the internal DTD subset
static ENTITY_DECL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<!ENTITY\s+([^\s%"]+)\s+"([^"]*)"\s*>"#).expect("valid entity regex")
});

const PREDEFINED_ENTITIES: [(&str, &str); 5] = [
    ("amp", "&"),
    ("lt", "<"),
    ("gt", ">"),
    ("apos", "'"),
    ("quot", "\""),
];

/// Iterator over the entries of a JMdict document / JMdict 词条迭代器
pub struct EntryReader<R: BufRead> {
    reader: Reader<R>,
    buf: Vec<u8>,
    entities: HashMap<String, String>,
    current: Option<EntryBuilder>,
    skipped: u64,
    finished: bool,
}

impl<R: BufRead> EntryReader<R> {
    pub fn new(source: R) -> Self {
        let mut reader = Reader::from_reader(source);
        reader.trim_text(true);
        // 标签配对由 EntryBuilder 检查，错配只跳过当前词条
        reader.check_end_names(false);

        let entities = PREDEFINED_ENTITIES
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        Self {
            reader,
            buf: Vec::with_capacity(4096),
            entities,
            current: None,
            skipped: 0,
            finished: false,
        }
    }

    /// Entries dropped because they could not be read / 解析失败而跳过的词条数
    pub fn skipped(&self) -> u64 {
        self.skipped
    }
}

impl<R: BufRead> Iterator for EntryReader<R> {
    type Item = Result<RawEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        loop {
            self.buf.clear();
            let event = match self.reader.read_event_into(&mut self.buf) {
                Ok(ev) => ev,
                Err(e) => {
                    self.finished = true;
                    return Some(Err(DictError::Xml(e)));
                }
            };

            match event {
                Event::DocType(dt) => {
                    let decl = String::from_utf8_lossy(&dt);
                    collect_entities(&decl, &mut self.entities);
                    tracing::debug!("Loaded {} DTD entities", self.entities.len());
                }
                Event::Start(e) => {
                    let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                    if name == "entry" {
                        if self.current.replace(EntryBuilder::default()).is_some() {
                            self.skipped += 1;
                            tracing::warn!(
                                "Skipping unterminated entry near byte {}",
                                self.reader.buffer_position()
                            );
                        }
                    } else if let Some(b) = self.current.as_mut() {
                        b.open(name);
                    }
                }
                Event::Empty(e) => {
                    if let Some(b) = self.current.as_mut() {
                        b.empty(&String::from_utf8_lossy(e.local_name().as_ref()));
                    }
                }
                Event::Text(t) => {
                    if let Some(b) = self.current.as_mut() {
                        let entities = &self.entities;
                        match t.unescape_with(|ent| entities.get(ent).map(String::as_str)) {
                            Ok(text) => b.text(&text),
                            Err(e) => b.fail(e.to_string()),
                        }
                    }
                }
                Event::CData(c) => {
                    if let Some(b) = self.current.as_mut() {
                        b.text(&String::from_utf8_lossy(&c));
                    }
                }
                Event::End(e) => {
                    let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                    if name == "entry" {
                        if let Some(b) = self.current.take() {
                            match b.finish() {
                                Ok(raw) => return Some(Ok(raw)),
                                Err(reason) => {
                                    self.skipped += 1;
                                    tracing::warn!(
                                        "Skipping malformed entry near byte {}: {}",
                                        self.reader.buffer_position(),
                                        reason
                                    );
                                }
                            }
                        }
                    } else if let Some(b) = self.current.as_mut() {
                        b.close(&name);
                    }
                }
                Event::Eof => {
                    self.finished = true;
                    if self.current.take().is_some() {
                        self.skipped += 1;
                        tracing::warn!("Skipping entry truncated by end of document");
                    }
                    return None;
                }
                _ => {}
            }
        }
    }
}

fn collect_entities(decl: &str, entities: &mut HashMap<String, String>) {
    for cap in ENTITY_DECL.captures_iter(decl) {
        entities.insert(cap[1].to_string(), cap[2].to_string());
    }
}

/// Accumulates one `<entry>` while its events stream by / 单个词条构建器
#[derive(Default)]
struct EntryBuilder {
    raw: RawEntry,
    stack: Vec<String>,
    error: Option<String>,
}

impl EntryBuilder {
    fn open(&mut self, name: String) {
        match name.as_str() {
            "k_ele" => self.raw.kanji.push(RawElement::default()),
            "r_ele" => self.raw.readings.push(RawElement::default()),
            "sense" => self.raw.senses.push(RawSense::default()),
            "keb" => {
                if let Some(el) = self.raw.kanji.last_mut() {
                    el.value.get_or_insert_with(String::new);
                }
            }
            "reb" => {
                if let Some(el) = self.raw.readings.last_mut() {
                    el.value.get_or_insert_with(String::new);
                }
            }
            "ke_pri" | "re_pri" => self.mark_priority(&name),
            "pos" | "xref" | "gloss" => {
                if let Some(sense) = self.raw.senses.last_mut() {
                    match name.as_str() {
                        "pos" => sense.pos.push(String::new()),
                        "xref" => sense.xrefs.push(String::new()),
                        _ => sense.glosses.push(String::new()),
                    }
                }
            }
            _ => {}
        }
        self.stack.push(name);
    }

    fn empty(&mut self, name: &str) {
        if name == "ke_pri" || name == "re_pri" {
            self.mark_priority(name);
        }
    }

    fn mark_priority(&mut self, name: &str) {
        let el = if name == "ke_pri" {
            self.raw.kanji.last_mut()
        } else {
            self.raw.readings.last_mut()
        };
        if let Some(el) = el {
            el.has_priority = true;
        }
    }

    fn close(&mut self, name: &str) {
        if self.stack.last().map(String::as_str) == Some(name) {
            self.stack.pop();
            return;
        }
        self.fail(format!("unexpected </{}>", name));
        // 回退到匹配的开标签，找不到则保持不变
        if let Some(pos) = self.stack.iter().rposition(|n| n == name) {
            self.stack.truncate(pos);
        }
    }

    fn fail(&mut self, reason: String) {
        self.error.get_or_insert(reason);
    }

    fn text(&mut self, text: &str) {
        let inner = self.stack.last().map(String::as_str).unwrap_or("");
        let in_kanji = self.stack.iter().any(|n| n == "k_ele");
        let in_reading = self.stack.iter().any(|n| n == "r_ele");

        match inner {
            "ent_seq" => self.raw.seq.push_str(text),
            "keb" => {
                if let Some(v) = self.raw.kanji.last_mut().and_then(|el| el.value.as_mut()) {
                    v.push_str(text);
                }
            }
            "reb" => {
                if let Some(v) = self.raw.readings.last_mut().and_then(|el| el.value.as_mut()) {
                    v.push_str(text);
                }
            }
            "pos" | "xref" | "gloss" => {
                if let Some(sense) = self.raw.senses.last_mut() {
                    let target = match inner {
                        "pos" => sense.pos.last_mut(),
                        "xref" => sense.xrefs.last_mut(),
                        _ => sense.glosses.last_mut(),
                    };
                    if let Some(s) = target {
                        s.push_str(text);
                    }
                }
            }
            _ => {}
        }

        // 元素全文（包含 ke_inf / ke_pri 等子元素文本）
        if in_kanji {
            if let Some(el) = self.raw.kanji.last_mut() {
                el.text.push_str(text);
            }
        } else if in_reading {
            if let Some(el) = self.raw.readings.last_mut() {
                el.text.push_str(text);
            }
        }
    }

    fn finish(mut self) -> std::result::Result<RawEntry, String> {
        if let Some(e) = self.error {
            return Err(e);
        }
        if let Some(open) = self.stack.last() {
            return Err(format!("unclosed <{}>", open));
        }
        let seq = self.raw.seq.trim().to_string();
        if seq.is_empty() {
            return Err("missing ent_seq".to_string());
        }
        self.raw.seq = seq;
        Ok(self.raw)
    }
}

/// Open a corpus file, `*.gz` is decompressed on the fly / 打开语料文件
pub fn open_corpus(path: &Path) -> Result<EntryReader<Box<dyn BufRead + Send>>> {
    let file = File::open(path)?;
    let is_gz = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("gz"))
        .unwrap_or(false);

    let source: Box<dyn BufRead + Send> = if is_gz {
        Box::new(BufReader::new(GzDecoder::new(file)))
    } else {
        Box::new(BufReader::new(file))
    };

    tracing::info!("Reading JMdict corpus from {:?} (gzip: {})", path, is_gz);
    Ok(EntryReader::new(source))
}

/// Parse a corpus on a blocking thread and stream entries back / 后台线程解析并流式返回
///
/// Dropping the stream stops the parser.
pub fn spawn_entry_stream(path: &Path, capacity: usize) -> Result<ReceiverStream<Result<RawEntry>>> {
    let reader = open_corpus(path)?;
    let (tx, rx) = mpsc::channel(capacity.max(1));

    tokio::task::spawn_blocking(move || {
        let mut reader = reader;
        for item in reader.by_ref() {
            if tx.blocking_send(item).is_err() {
                tracing::debug!("Entry stream receiver dropped, stopping parser");
                return;
            }
        }
        tracing::info!("Corpus parse finished, {} malformed entries skipped", reader.skipped());
    });

    Ok(ReceiverStream::new(rx))
}
