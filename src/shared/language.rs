use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

static IGNORED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[0-9\s.,;:!?()\[\]{}"'/\-\x{2013}\x{2014}]"#).unwrap());

static SENTENCE_END: Lazy<Regex> = Lazy::new(|| Regex::new(r"[.!?]").unwrap());

const HEBREW_SHARE: f64 = 0.4;

fn is_hebrew_char(c: char) -> bool {
    ('\u{0590}'..='\u{05FF}').contains(&c)
}

/// True when Hebrew letters make up more than 40% of the letters in `text`.
///
/// Digits, whitespace and common punctuation are ignored; only Hebrew-block
/// and ASCII Latin letters are counted.
pub fn is_hebrew_dominant(text: &str) -> bool {
    if text.is_empty() {
        return false;
    }

    let letters = IGNORED.replace_all(text, "");
    if letters.is_empty() {
        return false;
    }

    let hebrew = letters.chars().filter(|c| is_hebrew_char(*c)).count();
    let latin = letters.chars().filter(char::is_ascii_alphabetic).count();
    let total = hebrew + latin;
    if total == 0 {
        return false;
    }

    hebrew as f64 / total as f64 > HEBREW_SHARE
}

/// Sentence-level vote: true when a strict majority of sentences longer than
/// ten characters are Hebrew-dominant.
pub fn is_paragraph_hebrew(text: &str) -> bool {
    if text.is_empty() {
        return false;
    }

    let sentences: Vec<&str> = SENTENCE_END
        .split(text)
        .filter(|s| s.trim().chars().count() > 10)
        .collect();

    if sentences.is_empty() {
        return is_hebrew_dominant(text);
    }

    let hebrew = sentences.iter().filter(|s| is_hebrew_dominant(s)).count();
    hebrew * 2 > sentences.len()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Rtl,
    Ltr,
}

impl Direction {
    pub fn of(text: &str) -> Self {
        if is_hebrew_dominant(text) {
            Direction::Rtl
        } else {
            Direction::Ltr
        }
    }

    pub fn of_paragraph(text: &str) -> Self {
        if is_paragraph_hebrew(text) {
            Direction::Rtl
        } else {
            Direction::Ltr
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Rtl => "rtl",
            Direction::Ltr => "ltr",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pure_scripts() {
        assert!(is_hebrew_dominant("שלום עולם"));
        assert!(!is_hebrew_dominant("hello world"));
    }

    #[test]
    fn test_mixed_line_crosses_threshold() {
        // 4 Hebrew letters against 5 Latin ones
        assert!(is_hebrew_dominant("שלום hello"));
        // 2 Hebrew letters against 3 Latin ones is exactly 40%
        assert!(!is_hebrew_dominant("של abc"));
    }

    #[test]
    fn test_no_letters_is_never_hebrew() {
        for text in ["", "   ", "12345", "3.14, (2) [4]!?", "-- / --"] {
            assert!(!is_hebrew_dominant(text), "{text:?}");
        }
    }

    #[test]
    fn test_other_scripts_do_not_count() {
        assert!(!is_hebrew_dominant("Привет мир"));
        assert!(is_hebrew_dominant("Привет שלום"));
    }

    #[test]
    fn test_paragraph_majority_vote() {
        let text = "זה משפט ארוך בעברית. This is an English sentence. עוד משפט ארוך בעברית!";
        assert!(is_paragraph_hebrew(text));

        let text = "This is an English sentence. Another English sentence. משפט ארוך בעברית.";
        assert!(!is_paragraph_hebrew(text));
    }

    #[test]
    fn test_paragraph_tie_is_not_hebrew() {
        let text = "משפט ארוך בעברית כאן. An English sentence here.";
        assert!(!is_paragraph_hebrew(text));
    }

    #[test]
    fn test_paragraph_of_short_fragments_falls_back() {
        assert!(is_paragraph_hebrew("כן. לא."));
        assert_eq!(Direction::of_paragraph("ok. no."), Direction::Ltr);
    }
}
