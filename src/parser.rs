//! Turns a pasted export blob into ordered asset records. Input is routinely
//! messy (CSV, TSV, free-pasted rows, stray header lines), so parsing never
//! fails hard: lines that carry nothing usable are skipped, tokens that are
//! not absolute http(s) URLs are dropped.

/// One input line's parsed form. `urls` keeps encountered order; the position
/// of a URL within its key decides the output filename downstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetRecord {
    pub key: String,
    pub urls: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineOutcome {
    Record(AssetRecord),
    Skipped(SkipReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Blank,
    Header,
}

/// Header labels recognized case-insensitively in the first column of an
/// exported sheet.
const HEADER_LABELS: &[&str] = &["asin", "sku", "key"];

pub fn parse_lines(input: &str) -> Vec<LineOutcome> {
    input.lines().map(parse_line).collect()
}

/// Records only, in input order. Skipped lines are dropped here; callers that
/// care about the skip decision use `parse_lines`.
pub fn parse_records(input: &str) -> Vec<AssetRecord> {
    parse_lines(input)
        .into_iter()
        .filter_map(|outcome| match outcome {
            LineOutcome::Record(record) => Some(record),
            LineOutcome::Skipped(_) => None,
        })
        .collect()
}

fn parse_line(line: &str) -> LineOutcome {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return LineOutcome::Skipped(SkipReason::Blank);
    }

    // Commas and runs of whitespace are interchangeable separators, so CSV,
    // TSV and free-pasted rows all tokenize the same way.
    let mut tokens = trimmed
        .split(|ch: char| ch == ',' || ch.is_whitespace())
        .filter(|token| !token.is_empty());

    let Some(first) = tokens.next() else {
        return LineOutcome::Skipped(SkipReason::Blank);
    };

    if HEADER_LABELS
        .iter()
        .any(|label| first.eq_ignore_ascii_case(label))
    {
        return LineOutcome::Skipped(SkipReason::Header);
    }

    let urls = tokens
        .filter(|token| is_http_url(token))
        .map(|token| token.to_string())
        .collect::<Vec<_>>();

    // A key with zero valid URLs is retained: partial exports are common and
    // such records simply produce no archive entries and no failures.
    LineOutcome::Record(AssetRecord {
        key: first.to_string(),
        urls,
    })
}

fn is_http_url(token: &str) -> bool {
    match reqwest::Url::parse(token) {
        Ok(parsed) => matches!(parsed.scheme(), "http" | "https"),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_space_delimited_rows() {
        let records = parse_records(
            "B0001 https://img.example.com/a.jpg https://img.example.com/b.jpg\n\
             B0002 https://img.example.com/c.jpg",
        );
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].key, "B0001");
        assert_eq!(records[0].urls.len(), 2);
        assert_eq!(records[1].urls, vec!["https://img.example.com/c.jpg"]);
    }

    #[test]
    fn delimiter_styles_are_equivalent() {
        let comma = parse_records("B0001,https://img.example.com/a.jpg,https://img.example.com/b.jpg");
        let tab = parse_records("B0001\thttps://img.example.com/a.jpg\thttps://img.example.com/b.jpg");
        let spaced = parse_records("B0001  https://img.example.com/a.jpg https://img.example.com/b.jpg");
        assert_eq!(comma, tab);
        assert_eq!(comma, spaced);
    }

    #[test]
    fn skips_header_and_blank_lines() {
        let outcomes = parse_lines("ASIN,Image Link 1,Image Link 2\n\n  \nB0001 https://img.example.com/a.jpg");
        assert_eq!(outcomes[0], LineOutcome::Skipped(SkipReason::Header));
        assert_eq!(outcomes[1], LineOutcome::Skipped(SkipReason::Blank));
        assert_eq!(outcomes[2], LineOutcome::Skipped(SkipReason::Blank));
        assert!(matches!(outcomes[3], LineOutcome::Record(_)));
        assert_eq!(parse_records("sku\turl\nB0001 https://img.example.com/a.jpg").len(), 1);
    }

    #[test]
    fn drops_tokens_that_are_not_absolute_http_urls() {
        let records = parse_records(
            "B0001 notaurl ftp://files.example.com/a.jpg https://img.example.com/a.jpg /relative/path.jpg",
        );
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].urls, vec!["https://img.example.com/a.jpg"]);
    }

    #[test]
    fn key_without_urls_yields_empty_record() {
        let records = parse_records("B0001\nB0002 https://img.example.com/a.jpg");
        assert_eq!(records.len(), 2);
        assert!(records[0].urls.is_empty());
        assert_eq!(records[1].urls.len(), 1);
    }

    #[test]
    fn empty_input_yields_no_records() {
        assert!(parse_records("").is_empty());
        assert!(parse_records("   \n\t\n").is_empty());
    }

    #[test]
    fn url_order_within_record_is_preserved() {
        let records = parse_records(
            "B0001 https://img.example.com/z.jpg junk https://img.example.com/a.jpg",
        );
        assert_eq!(
            records[0].urls,
            vec![
                "https://img.example.com/z.jpg",
                "https://img.example.com/a.jpg",
            ]
        );
    }
}
