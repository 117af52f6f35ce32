use crate::models::{Chunk, ChunkMetadata};
use regex::Regex;

#[derive(Debug, Clone, Copy)]
pub struct ChunkingConfig {
    pub max_tokens: usize,
    pub overlap_tokens: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_tokens: 380,
            overlap_tokens: 60,
        }
    }
}

/// First-match-wins keyword table for topic labels.
const TOPIC_KEYWORDS: &[(&[&str], &str)] = &[
    (&["protein"], "protein"),
    (&["carbohydrate"], "carbohydrates"),
    (&["fat "], "fat"),
    (&["calorie", "energy"], "calories"),
    (&["fiber"], "fiber"),
    (&["micronutrient", "vitamin", "mineral"], "micronutrients"),
];

const KNOWN_SECTION_TITLES: &[&str] = &[
    "kata pengantar",
    "daftar isi",
    "pendahuluan",
    "metodologi",
    "kesimpulan",
];

pub struct Chunker {
    config: ChunkingConfig,
    chapter: Regex,
    bab: Regex,
    caps_heading: Regex,
}

impl Chunker {
    pub fn new(config: ChunkingConfig) -> Result<Self, regex::Error> {
        Ok(Self {
            config,
            chapter: Regex::new(r"(?i)^chapter\s+(\d+)[:.\s-]*(.*)$")?,
            bab: Regex::new(r"(?i)^bab\s+(\d+)[:.\s-]*(.*)$")?,
            caps_heading: Regex::new(r"^[A-Z0-9\s:,-]{4,}$")?,
        })
    }

    /// Splits cleaned text into token-bounded chunks with overlap carried
    /// across splits. Chapter markers update the running chapter label;
    /// generic headings seed a fresh buffer. A single sentence longer than
    /// the budget still becomes one chunk, so the budget is a soft cap.
    pub fn chunk(&self, cleaned_text: &str, source: &str, language: &str) -> Vec<Chunk> {
        let paragraphs = split_paragraphs(cleaned_text);

        let mut builder = ChunkBuilder::new(self.config, source, language);

        for paragraph in paragraphs {
            if let Some(chapter) = self.detect_chapter(&paragraph) {
                builder.set_chapter(chapter);
                builder.flush();
                continue;
            }

            if let Some(heading) = self.detect_heading(&paragraph) {
                builder.flush();
                builder.push_sentence_unbounded(&heading);
                continue;
            }

            for sentence in split_sentences(&paragraph) {
                builder.push_sentence(&sentence);
            }
        }

        builder.finish()
    }

    fn detect_chapter(&self, line: &str) -> Option<String> {
        let captures = self
            .chapter
            .captures(line)
            .map(|capture| ("Chapter", capture))
            .or_else(|| self.bab.captures(line).map(|capture| ("Bab", capture)));

        let (prefix, capture) = captures?;
        let number = capture.get(1)?.as_str();
        let title = capture.get(2).map(|m| m.as_str().trim()).unwrap_or("");

        if title.is_empty() {
            Some(format!("{prefix} {number}"))
        } else {
            Some(format!("{prefix} {number}: {title}"))
        }
    }

    fn detect_heading(&self, line: &str) -> Option<String> {
        let trimmed = line.trim();
        if trimmed.len() > 90 {
            return None;
        }
        if self.caps_heading.is_match(trimmed) {
            return Some(trimmed.to_string());
        }
        if KNOWN_SECTION_TITLES
            .iter()
            .any(|title| trimmed.eq_ignore_ascii_case(title))
        {
            return Some(trimmed.to_string());
        }
        None
    }
}

struct ChunkBuilder {
    config: ChunkingConfig,
    source: String,
    language: String,
    sentences: Vec<String>,
    tokens: usize,
    chapter: Option<String>,
    last_topic: Option<String>,
    chunks: Vec<Chunk>,
}

impl ChunkBuilder {
    fn new(config: ChunkingConfig, source: &str, language: &str) -> Self {
        Self {
            config,
            source: source.to_string(),
            language: language.to_string(),
            sentences: Vec::new(),
            tokens: 0,
            chapter: None,
            last_topic: None,
            chunks: Vec::new(),
        }
    }

    fn set_chapter(&mut self, chapter: String) {
        self.chapter = Some(chapter);
    }

    fn push_sentence(&mut self, sentence: &str) {
        let sentence_tokens = estimate_tokens(sentence);
        if self.tokens + sentence_tokens > self.config.max_tokens {
            let (overlap, overlap_tokens) = self.take_overlap();
            self.flush();
            self.sentences = overlap;
            self.tokens = overlap_tokens;
        }

        self.sentences.push(sentence.to_string());
        self.tokens += sentence_tokens;
        if let Some(topic) = infer_topic(sentence) {
            self.last_topic = Some(topic);
        }
    }

    /// Headings bypass the budget check; they start a fresh buffer.
    fn push_sentence_unbounded(&mut self, heading: &str) {
        self.sentences.push(heading.to_string());
        self.tokens += estimate_tokens(heading);
        if let Some(topic) = infer_topic(heading) {
            self.last_topic = Some(topic);
        }
    }

    /// Tail sentences of the current buffer, taken in reverse until the
    /// overlap token target is met or the buffer is exhausted.
    fn take_overlap(&self) -> (Vec<String>, usize) {
        let mut overlap = Vec::new();
        let mut overlap_tokens = 0;
        for sentence in self.sentences.iter().rev() {
            overlap_tokens += estimate_tokens(sentence);
            overlap.insert(0, sentence.clone());
            if overlap_tokens >= self.config.overlap_tokens {
                break;
            }
        }
        (overlap, overlap_tokens)
    }

    fn flush(&mut self) {
        if self.sentences.is_empty() {
            return;
        }
        let content = self.sentences.join(" ").trim().to_string();
        self.sentences.clear();
        self.tokens = 0;
        if content.is_empty() {
            return;
        }

        let topic = self.last_topic.clone().or_else(|| infer_topic(&content));
        self.chunks.push(Chunk {
            content,
            metadata: ChunkMetadata {
                source: self.source.clone(),
                chapter: self.chapter.clone(),
                topic,
                language: self.language.clone(),
            },
        });
    }

    fn finish(mut self) -> Vec<Chunk> {
        self.flush();
        self.chunks
    }
}

fn split_paragraphs(text: &str) -> Vec<String> {
    text.split("\n\n")
        .map(|paragraph| paragraph.trim().to_string())
        .filter(|paragraph| !paragraph.is_empty())
        .collect()
}

/// Splits on sentence-ending punctuation followed by whitespace and a
/// capital letter. Keeps the punctuation with the preceding sentence.
pub fn split_sentences(text: &str) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut sentences = Vec::new();
    let mut start = 0;

    let mut index = 0;
    while index < chars.len() {
        if matches!(chars[index], '.' | '!' | '?') {
            let mut cursor = index + 1;
            let mut saw_whitespace = false;
            while cursor < chars.len() && chars[cursor].is_whitespace() {
                saw_whitespace = true;
                cursor += 1;
            }
            if saw_whitespace && cursor < chars.len() && chars[cursor].is_uppercase() {
                let sentence: String = chars[start..=index].iter().collect();
                let trimmed = sentence.trim();
                if !trimmed.is_empty() {
                    sentences.push(trimmed.to_string());
                }
                start = cursor;
                index = cursor;
                continue;
            }
        }
        index += 1;
    }

    if start < chars.len() {
        let tail: String = chars[start..].iter().collect();
        let trimmed = tail.trim();
        if !trimmed.is_empty() {
            sentences.push(trimmed.to_string());
        }
    }

    sentences
}

/// Rough word-based token estimate (~0.75 words per token).
pub fn estimate_tokens(text: &str) -> usize {
    let words = text.split_whitespace().count();
    (words * 4).div_ceil(3)
}

fn infer_topic(text: &str) -> Option<String> {
    let lower = text.to_lowercase();
    for (keywords, topic) in TOPIC_KEYWORDS {
        if keywords.iter().any(|keyword| lower.contains(keyword)) {
            return Some((*topic).to_string());
        }
    }
    None
}
