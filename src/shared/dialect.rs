use once_cell::sync::Lazy;
use regex::{Regex, RegexSet};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Code language recognized by the line heuristics.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    Html,
    Css,
    JavaScript,
    Sql,
    Python,
    Shell,
    Json,
    Xml,
    Generic,
}

// Tested in this order; the first match wins.
static START_PATTERNS: Lazy<Vec<(Dialect, Regex)>> = Lazy::new(|| {
    vec![
        (
            Dialect::Html,
            Regex::new(r"(?i)^(<!DOCTYPE|<html|html\s*$)").unwrap(),
        ),
        (
            Dialect::Css,
            Regex::new(r"(?i)^(\s*[\w\-#.:\[\]]+\s*\{|\s*@media|\s*@import|\s*/\*)").unwrap(),
        ),
        (
            Dialect::JavaScript,
            Regex::new(
                r"(?i)^(function|const|let|var|class|interface|import|export|if|for|while|switch|try|catch)\b",
            )
            .unwrap(),
        ),
        (
            Dialect::Sql,
            Regex::new(r"(?i)^(CREATE|SELECT|INSERT|UPDATE|DELETE|ALTER|DROP|WITH|FROM|WHERE)\b")
                .unwrap(),
        ),
        (
            Dialect::Python,
            Regex::new(r"(?i)^(def|class|import|from|if __name__|print\(|return\b)").unwrap(),
        ),
        (
            Dialect::Shell,
            Regex::new(r"(?i)^(\$|#|\w+@\w+:|\w+>\s*|npm\s+|cd\s+|git\s+|ls\s+|mkdir\s+)").unwrap(),
        ),
        (
            Dialect::Json,
            Regex::new(r#"^(\s*\{|\s*\[|\s*"[\w\-]+"\s*:)"#).unwrap(),
        ),
        (Dialect::Xml, Regex::new(r"^<[a-zA-Z][^>]*>").unwrap()),
    ]
});

/// Anything that reads like a line of code, whatever the language.
static CODE_TEXT: Lazy<RegexSet> = Lazy::new(|| {
    RegexSet::new([
        r"function\s*\(",
        r"const\s+\w+\s*=",
        r"let\s+\w+\s*=",
        r"var\s+\w+\s*=",
        r"import\s+",
        r"export\s+",
        r"class\s+\w+",
        r"interface\s+\w+",
        r"\{\s*\w+:",
        r"<\w+",
        r"\$\s*\w+",
        r"npm\s+",
        r"cd\s+",
        r"git\s+",
        r"console\.",
        r"document\.",
        r"window\.",
        r"\w+\(\)",
        r"=>\s*\{",
        r"DOCTYPE",
        r"html",
        r"head",
        r"body",
        r"meta",
        r"script",
        r"style",
        r"^[\$#]\s+",
        r"^\w+@\w+:",
        r"\w+\.\w+\(",
        // a line holding only closers belongs to the block it closes
        r"^\s*[\}\]\)]+[;,]?\s*$",
    ])
    .unwrap()
});

static HTML_CLOSE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)</(html|body)>").unwrap());

static CSS_SELECTOR: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[\w\-#.:\[\]]+\s*\{").unwrap());

static SQL_CONTINUATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(CREATE|SELECT|INSERT|UPDATE|DELETE|WITH|FROM|WHERE)").unwrap());

static SHELL_CONTINUATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(\$|#|\w+@\w+:|\w+>\s*|npm\s+|cd\s+|git\s+)").unwrap());

static JSON_CLOSE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*[\}\]]").unwrap());

static XML_CLOSE: Lazy<Regex> = Lazy::new(|| Regex::new(r"</[^>]+>").unwrap());

pub fn is_code_text(text: &str) -> bool {
    !text.is_empty() && CODE_TEXT.is_match(text)
}

impl Dialect {
    /// Dialect whose opening pattern matches `line`, if any.
    pub fn detect_start(line: &str) -> Option<Dialect> {
        let trimmed = line.trim();
        START_PATTERNS
            .iter()
            .find(|(_, pattern)| pattern.is_match(trimmed))
            .map(|(dialect, _)| *dialect)
    }

    /// Whether a block of this dialect closes after `line`, given the line
    /// that follows it. Only one line of lookahead is available; a blank or
    /// missing next line never closes a block.
    pub fn ends_block(&self, line: &str, next: Option<&str>) -> bool {
        let Some(next_raw) = next else {
            return false;
        };
        let next = next_raw.trim();
        if next.is_empty() {
            return false;
        }

        match self {
            Dialect::Html => {
                let closes = HTML_CLOSE.is_match(line) || line.trim().ends_with('>');
                closes
                    && !next.starts_with('<')
                    && !next.contains('=')
                    && !["html", "head", "body", "script", "style"]
                        .iter()
                        .any(|tag| next.contains(tag))
            }
            Dialect::Css => {
                line.contains('}')
                    && !next.starts_with('@')
                    && !next.contains('{')
                    && !next.contains(':')
                    && !CSS_SELECTOR.is_match(next)
            }
            Dialect::JavaScript => {
                (line.contains('}') || line.ends_with(';')) && !is_code_text(next)
            }
            Dialect::Python => {
                !next_raw.starts_with(' ') && !next_raw.starts_with('\t') && !is_code_text(next_raw)
            }
            Dialect::Sql => line.contains(';') && !SQL_CONTINUATION.is_match(next),
            Dialect::Shell => !SHELL_CONTINUATION.is_match(next) && !is_code_text(next),
            Dialect::Json => {
                JSON_CLOSE.is_match(line)
                    && !next.starts_with('{')
                    && !next.starts_with('[')
                    && !next.contains('"')
                    && !is_code_text(next)
            }
            Dialect::Xml => XML_CLOSE.is_match(line) && !next.contains('<') && !is_code_text(next),
            Dialect::Generic => !is_code_text(next),
        }
    }

    /// Map a fence label such as `js` or `bash` to a dialect.
    pub fn from_label(label: &str) -> Dialect {
        match label.trim().to_ascii_lowercase().as_str() {
            "html" | "htm" => Dialect::Html,
            "css" | "scss" | "sass" | "less" => Dialect::Css,
            "javascript" | "js" | "jsx" | "typescript" | "ts" | "tsx" => Dialect::JavaScript,
            "sql" | "postgres" | "mysql" | "sqlite" => Dialect::Sql,
            "python" | "py" => Dialect::Python,
            "bash" | "sh" | "shell" | "zsh" | "console" => Dialect::Shell,
            "json" => Dialect::Json,
            "xml" | "svg" => Dialect::Xml,
            _ => Dialect::Generic,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Dialect::Html => "html",
            Dialect::Css => "css",
            Dialect::JavaScript => "javascript",
            Dialect::Sql => "sql",
            Dialect::Python => "python",
            Dialect::Shell => "shell",
            Dialect::Json => "json",
            Dialect::Xml => "xml",
            Dialect::Generic => "generic",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_detection_per_dialect() {
        let cases = [
            ("<!DOCTYPE html>", Dialect::Html),
            ("html", Dialect::Html),
            ("body {", Dialect::Css),
            ("@media screen", Dialect::Css),
            ("function add(a, b) {", Dialect::JavaScript),
            ("const x = 1;", Dialect::JavaScript),
            ("SELECT * FROM users;", Dialect::Sql),
            ("def main():", Dialect::Python),
            ("print(\"hi\")", Dialect::Python),
            ("$ cargo build", Dialect::Shell),
            ("npm install", Dialect::Shell),
            ("{", Dialect::Json),
            ("\"name\": \"value\",", Dialect::Json),
            ("<note>", Dialect::Xml),
        ];

        for (line, expected) in cases {
            assert_eq!(Dialect::detect_start(line), Some(expected), "{line:?}");
        }
    }

    #[test]
    fn test_start_priority_prefers_earlier_dialects() {
        // `class` opens both javascript and python; javascript is tested first
        assert_eq!(Dialect::detect_start("class Foo:"), Some(Dialect::JavaScript));
        // `from` opens both sql and python; sql is tested first
        assert_eq!(Dialect::detect_start("from os import path"), Some(Dialect::Sql));
    }

    #[test]
    fn test_prose_does_not_start_code() {
        assert_eq!(Dialect::detect_start("שלום לכולם"), None);
        assert_eq!(Dialect::detect_start("Hello there, friend"), None);
        assert_eq!(Dialect::detect_start("  "), None);
    }

    #[test]
    fn test_code_text_battery() {
        assert!(is_code_text("console.log(x)"));
        assert!(is_code_text("items.map(f)"));
        assert!(is_code_text("}"));
        assert!(is_code_text("});"));
        assert!(!is_code_text("תודה רבה"));
        assert!(!is_code_text("Thanks a lot"));
        assert!(!is_code_text(""));
    }

    #[test]
    fn test_javascript_end() {
        let js = Dialect::JavaScript;
        assert!(js.ends_block("}", Some("תודה רבה")));
        assert!(js.ends_block("run();", Some("That is all")));
        assert!(!js.ends_block("return a + b;", Some("}")));
        assert!(!js.ends_block("let a = 1", Some("Plain words")));
        assert!(!js.ends_block("}", None));
        assert!(!js.ends_block("}", Some("   ")));
    }

    #[test]
    fn test_python_end_requires_unindented_prose() {
        let py = Dialect::Python;
        assert!(!py.ends_block("def f():", Some("    return 1")));
        assert!(py.ends_block("    return 1", Some("זה הכל")));
    }

    #[test]
    fn test_sql_end_waits_for_semicolon() {
        let sql = Dialect::Sql;
        assert!(!sql.ends_block("SELECT *", Some("Done")));
        assert!(sql.ends_block("FROM users;", Some("Done")));
        assert!(!sql.ends_block("FROM users;", Some("SELECT 1;")));
    }

    #[test]
    fn test_json_end() {
        let json = Dialect::Json;
        assert!(json.ends_block("}", Some("That was the payload")));
        assert!(!json.ends_block("}", Some("{")));
        assert!(!json.ends_block("\"a\": 1", Some("Done")));
    }

    #[test]
    fn test_css_and_html_end() {
        assert!(Dialect::Css.ends_block("}", Some("Now the markup")));
        assert!(!Dialect::Css.ends_block("}", Some("p {")));
        assert!(Dialect::Html.ends_block("</html>", Some("Save this file")));
        assert!(!Dialect::Html.ends_block("<p>", Some("<div>")));
    }

    #[test]
    fn test_shell_end() {
        let shell = Dialect::Shell;
        assert!(shell.ends_block("npm install", Some("This installs the packages")));
        assert!(!shell.ends_block("npm install", Some("git push")));
        assert!(!shell.ends_block("npm install", Some("$ npm test")));
    }

    #[test]
    fn test_xml_end() {
        let xml = Dialect::Xml;
        assert!(xml.ends_block("</note>", Some("Done here")));
        assert!(!xml.ends_block("</note>", Some("<other>")));
        assert!(!xml.ends_block("<to>Tove", Some("Done here")));
    }

    #[test]
    fn test_html_void_tag_end() {
        assert!(Dialect::Html.ends_block("<br>", Some("Some prose follows")));
        assert!(!Dialect::Html.ends_block("<br>", Some("class=\"x\"")));
    }

    #[test]
    fn test_fence_labels() {
        assert_eq!(Dialect::from_label("TS"), Dialect::JavaScript);
        assert_eq!(Dialect::from_label("bash"), Dialect::Shell);
        assert_eq!(Dialect::from_label("rust"), Dialect::Generic);
    }
}
