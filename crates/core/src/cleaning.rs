use regex::Regex;
use std::collections::HashMap;

/// Lines matching any of these are boilerplate from scanned nutrition
/// books: copyright pages, publisher blocks, local legal notices.
const STOP_LINE_PATTERNS: &[&str] = &[
    r"(?i)all rights reserved",
    r"(?i)copyright",
    r"(?i)isbn",
    r"(?i)printed in",
    r"(?i)no part of this",
    r"(?i)for educational purposes",
    r"(?i)not intended to diagnose",
    r"(?i)medical advice",
    r"(?i)hak cipta",
    r"(?i)dilarang keras",
    r"(?i)undang-?undang",
    r"(?i)uu\s*no",
    r"(?i)penerbit",
    r"(?i)cv\.",
    r"(?i)anggota ikapi",
    r"(?i)www\.",
    r"(?i)terbit pada",
    r"(?i)editor\s*:",
    r"(?i)tata letak\s*:",
    r"(?i)desain cover\s*:",
    r"(?i)ukuran\s*:",
    r"(?i)halaman\s*:",
];

/// Ordered unit/terminology rewrites applied last. Canonical terms follow
/// the corpus language so retrieval sees one spelling per concept.
const TERM_NORMALIZATIONS: &[(&str, &str)] = &[
    (r"(?i)\bkcal\b", "kalori"),
    (r"(?i)\bkilocalories\b", "kalori"),
    (r"(?i)\bcalories\b", "kalori"),
    (r"(?i)\bcalorie\b", "kalori"),
    (r"(?i)\bgrams?\b", "gram"),
    (r"(?i)\bmilligrams?\b", "miligram"),
];

const REPEATED_LINE_THRESHOLD: usize = 5;

pub struct TextCleaner {
    stop_lines: Vec<Regex>,
    term_normalizations: Vec<(Regex, &'static str)>,
    page_number: Regex,
    bare_number: Regex,
    roman_numeral: Regex,
    publisher_block: Regex,
    broken_line: Regex,
    horizontal_whitespace: Regex,
    blank_runs: Regex,
}

impl TextCleaner {
    pub fn new() -> Result<Self, regex::Error> {
        let stop_lines = STOP_LINE_PATTERNS
            .iter()
            .map(|pattern| Regex::new(pattern))
            .collect::<Result<Vec<_>, _>>()?;
        let term_normalizations = TERM_NORMALIZATIONS
            .iter()
            .map(|(pattern, replacement)| Ok((Regex::new(pattern)?, *replacement)))
            .collect::<Result<Vec<_>, regex::Error>>()?;

        Ok(Self {
            stop_lines,
            term_normalizations,
            page_number: Regex::new(r"(?i)^page\s*\d+$")?,
            bare_number: Regex::new(r"^\d{1,4}$")?,
            roman_numeral: Regex::new(r"(?i)^(i|ii|iii|iv|v|vi|vii|viii|ix|x)$")?,
            publisher_block: Regex::new(
                r"(?is)(penerbit|cv\.)[\s\S]{0,600}?(isbn\s*:?[^\n]*|www\.[\w.-]+|hak cipta[^\n]*)",
            )?,
            broken_line: Regex::new(r"([a-z0-9,;:])\n([a-z0-9])")?,
            horizontal_whitespace: Regex::new(r"[ \t]+")?,
            blank_runs: Regex::new(r"\n{3,}")?,
        })
    }

    /// Strips boilerplate and normalizes a raw extracted text. Always
    /// returns a string, possibly empty. Idempotent on its own output.
    pub fn clean(&self, raw_text: &str) -> String {
        let lines: Vec<&str> = raw_text
            .split('\n')
            .map(|line| line.trim_end_matches('\r'))
            .collect();

        let repeated = count_repeated_lines(&lines);
        let kept: Vec<&str> = lines
            .into_iter()
            .filter_map(|line| {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    // blank lines stay: they are paragraph boundaries
                    return Some("");
                }
                if repeated.get(trimmed).copied().unwrap_or(0) >= REPEATED_LINE_THRESHOLD {
                    return None;
                }
                if self.page_number.is_match(trimmed)
                    || self.bare_number.is_match(trimmed)
                    || self.roman_numeral.is_match(trimmed)
                {
                    return None;
                }
                if self.stop_lines.iter().any(|pattern| pattern.is_match(trimmed)) {
                    return None;
                }
                Some(line)
            })
            .collect();

        let merged = kept.join("\n");
        let without_blocks = self.publisher_block.replace_all(&merged, "");
        let fixed = self.broken_line.replace_all(&without_blocks, "$1 $2");
        let despaced = fixed.replace('\u{a0}', " ");
        let spaced = self.horizontal_whitespace.replace_all(&despaced, " ");
        let collapsed = self.blank_runs.replace_all(&spaced, "\n\n");
        let normalized = collapsed.trim().to_string();

        self.apply_terminology(&normalized)
    }

    fn apply_terminology(&self, text: &str) -> String {
        let mut result = text.to_string();
        for (pattern, replacement) in &self.term_normalizations {
            result = pattern.replace_all(&result, *replacement).into_owned();
        }
        result
    }
}

fn count_repeated_lines<'a>(lines: &[&'a str]) -> HashMap<&'a str, usize> {
    let mut frequency = HashMap::new();
    for line in lines {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        *frequency.entry(trimmed).or_insert(0) += 1;
    }
    frequency
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cleaner() -> TextCleaner {
        TextCleaner::new().expect("patterns compile")
    }

    #[test]
    fn stop_lines_are_removed() {
        let cleaned = cleaner().clean("Protein builds muscle.\nCopyright 2021 Some Press\nISBN 978-1\nFat stores energy.");
        assert!(cleaned.contains("Protein builds muscle."));
        assert!(!cleaned.to_lowercase().contains("copyright"));
        assert!(!cleaned.to_lowercase().contains("isbn"));
    }

    #[test]
    fn page_markers_are_removed() {
        let cleaned = cleaner().clean("Fiber aids digestion.\nPage 12\n37\niv\nMore text here.");
        assert!(!cleaned.contains("Page 12"));
        assert!(!cleaned.contains("37"));
        assert!(!cleaned.contains("iv"));
    }

    #[test]
    fn repeated_headers_are_removed() {
        let header = "Nutrition Handbook";
        let body: Vec<String> = (0..6)
            .map(|index| format!("{header}\nUnique paragraph number {index} about protein."))
            .collect();
        let cleaned = cleaner().clean(&body.join("\n"));
        assert!(!cleaned.contains(header));
        assert!(cleaned.contains("Unique paragraph number 3"));
    }

    #[test]
    fn hard_wrapped_lines_are_merged() {
        let cleaned = cleaner().clean("Protein is essential for\nmuscle repair and growth.");
        assert!(cleaned.contains("essential for muscle repair"));
    }

    #[test]
    fn blank_runs_collapse_to_one_blank_line() {
        let cleaned = cleaner().clean("First paragraph.\n\n\n\n\nSecond paragraph.");
        assert_eq!(cleaned, "First paragraph.\n\nSecond paragraph.");
    }

    #[test]
    fn nbsp_and_runs_of_spaces_collapse() {
        let cleaned = cleaner().clean("Protein\u{a0}intake   matters\t daily.");
        assert_eq!(cleaned, "Protein intake matters daily.");
    }

    #[test]
    fn terminology_is_canonicalized() {
        let cleaned = cleaner().clean("An apple has 95 calories and 0.5 grams of fat.");
        assert!(cleaned.contains("95 kalori"));
        assert!(cleaned.contains("0.5 gram of fat"));
    }

    #[test]
    fn clean_is_idempotent() {
        let raw = "Chapter 2: Energy\n\nA meal of 600 calories covers\nroughly a third of daily needs.\n\n\n\nPage 44\nFiber slows digestion.";
        let cleaner = cleaner();
        let once = cleaner.clean(raw);
        let twice = cleaner.clean(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn empty_input_yields_empty_output() {
        assert_eq!(cleaner().clean(""), "");
    }
}
