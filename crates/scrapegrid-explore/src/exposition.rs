//! Prometheus text exposition parsing, just deep enough to count series.
//!
//! Each non-comment line is one sample: `name{label="value",...} value [ts]`.

use scrapegrid_core::{CompiledRule, Labels, keeps_all};

use crate::error::ScrapeError;

/// Count the series in an exposition body that survive `rules`.
pub fn count_series(body: &str, rules: &[CompiledRule]) -> Result<i64, ScrapeError> {
    let mut count = 0;
    for (idx, raw) in body.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let labels = parse_sample(line).map_err(|reason| ScrapeError::Parse {
            line: idx + 1,
            reason,
        })?;
        if rules.is_empty() || keeps_all(rules, &labels) {
            count += 1;
        }
    }
    Ok(count)
}

/// Parse one sample line into its label set (metric name under `__name__`).
fn parse_sample(line: &str) -> Result<Labels, String> {
    let name_end = line
        .find(|c: char| c == '{' || c.is_whitespace())
        .ok_or_else(|| "sample has no value".to_string())?;
    let name = &line[..name_end];
    if name.is_empty() || !name.chars().all(is_metric_char) {
        return Err(format!("invalid metric name {name:?}"));
    }

    let mut labels = Labels::new();
    labels.insert("__name__".to_string(), name.to_string());

    let mut rest = &line[name_end..];
    if let Some(after_brace) = rest.strip_prefix('{') {
        rest = parse_labels(after_brace, &mut labels)?;
    }

    let mut fields = rest.split_whitespace();
    let value = fields.next().ok_or_else(|| "sample has no value".to_string())?;
    if value.parse::<f64>().is_err() && !matches!(value, "NaN" | "+Inf" | "-Inf") {
        return Err(format!("invalid sample value {value:?}"));
    }
    Ok(labels)
}

/// Parse `k="v",...}` and return what follows the closing brace.
fn parse_labels<'a>(mut s: &'a str, labels: &mut Labels) -> Result<&'a str, String> {
    loop {
        s = s.trim_start();
        if let Some(rest) = s.strip_prefix('}') {
            return Ok(rest);
        }

        let eq = s.find('=').ok_or_else(|| "label without value".to_string())?;
        let key = s[..eq].trim();
        if key.is_empty() || !key.chars().all(is_label_char) {
            return Err(format!("invalid label name {key:?}"));
        }
        s = s[eq + 1..].trim_start();
        s = s
            .strip_prefix('"')
            .ok_or_else(|| format!("label {key:?} value is not quoted"))?;

        let mut value = String::new();
        let mut chars = s.char_indices();
        let mut end = None;
        while let Some((i, c)) = chars.next() {
            match c {
                '\\' => match chars.next() {
                    Some((_, 'n')) => value.push('\n'),
                    Some((_, other)) => value.push(other),
                    None => break,
                },
                '"' => {
                    end = Some(i);
                    break;
                }
                other => value.push(other),
            }
        }
        let end = end.ok_or_else(|| format!("label {key:?} value is unterminated"))?;
        labels.insert(key.to_string(), value);

        s = s[end + 1..].trim_start();
        if let Some(rest) = s.strip_prefix(',') {
            s = rest;
        } else if !s.starts_with('}') {
            return Err("expected ',' or '}' after label".to_string());
        }
    }
}

fn is_metric_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == ':'
}

fn is_label_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}
