//! Text exposition decoder
//!
//! Decodes the Prometheus plaintext format into metric families and then
//! flattens each family into [`Metric`] records:
//!
//! - counter / gauge / untyped: one record per sample under `"counter"`,
//!   `"gauge"` or `"value"`; NaN samples are dropped
//! - summary: one record per non-NaN quantile, keyed and tagged by quantile
//! - histogram: one record per bucket, keyed and tagged by upper bound
//!
//! Samples whose family has no `# TYPE` line are reported as gauges.
//! `_sum` and `_count` series of summaries and histograms are folded into
//! their family and not emitted.

use super::{Metric, ValueType, COUNTER_KEY, GAUGE_KEY, UNTYPED_KEY};
use crate::error::ParseError;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};

const QUANTILE_LABEL: &str = "quantile";
const BUCKET_LABEL: &str = "le";
const QUANTILE_TAG: &str = "quantile";
const BUCKET_TAG: &str = "bucket";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FamilyType {
    Counter,
    Gauge,
    Untyped,
    Summary,
    Histogram,
}

impl FamilyType {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "counter" => Some(Self::Counter),
            "gauge" => Some(Self::Gauge),
            "untyped" => Some(Self::Untyped),
            "summary" => Some(Self::Summary),
            "histogram" => Some(Self::Histogram),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct Sample {
    name: String,
    labels: Vec<(String, String)>,
    value: f64,
    line: usize,
}

impl Sample {
    fn label(&self, name: &str) -> Option<&str> {
        self.labels
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug)]
struct Family {
    name: String,
    kind: Option<FamilyType>,
    samples: Vec<Sample>,
}

#[derive(Default)]
struct Families {
    families: Vec<Family>,
    index: HashMap<String, usize>,
}

impl Families {
    fn get_or_insert(&mut self, name: &str) -> usize {
        if let Some(&i) = self.index.get(name) {
            return i;
        }
        self.families.push(Family {
            name: name.to_string(),
            kind: None,
            samples: Vec::new(),
        });
        let i = self.families.len() - 1;
        self.index.insert(name.to_string(), i);
        i
    }

    fn set_type(&mut self, name: &str, kind: FamilyType, line: usize) -> Result<(), ParseError> {
        let i = self.get_or_insert(name);
        let family = &mut self.families[i];
        if family.kind.is_some() {
            return Err(ParseError::new(
                line,
                format!("second TYPE line for metric name {:?}", name),
            ));
        }
        if !family.samples.is_empty() {
            return Err(ParseError::new(
                line,
                format!("TYPE line for {:?} must precede its samples", name),
            ));
        }
        family.kind = Some(kind);
        Ok(())
    }

    /// Family a sample belongs to: an explicitly typed family of the same
    /// name, else the summary/histogram it is a `_sum`/`_count`/`_bucket`
    /// series of, else its own (possibly new) family.
    fn resolve(&mut self, sample_name: &str) -> usize {
        if let Some(&i) = self.index.get(sample_name) {
            if self.families[i].kind.is_some() {
                return i;
            }
        }

        for suffix in ["_bucket", "_sum", "_count"] {
            let Some(base) = sample_name.strip_suffix(suffix) else {
                continue;
            };
            if let Some(&i) = self.index.get(base) {
                match (self.families[i].kind, suffix) {
                    (Some(FamilyType::Histogram), _) => return i,
                    (Some(FamilyType::Summary), "_sum" | "_count") => return i,
                    _ => {}
                }
            }
        }

        self.get_or_insert(sample_name)
    }
}

struct Cursor<'a> {
    line: &'a str,
    pos: usize,
    lineno: usize,
}

impl<'a> Cursor<'a> {
    fn new(line: &'a str, lineno: usize) -> Self {
        Self {
            line,
            pos: 0,
            lineno,
        }
    }

    fn rest(&self) -> &'a str {
        &self.line[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(' ' | '\t')) {
            self.bump();
        }
    }

    fn take_while(&mut self, f: impl Fn(char) -> bool) -> &'a str {
        let start = self.pos;
        while self.peek().is_some_and(&f) {
            self.bump();
        }
        &self.line[start..self.pos]
    }

    fn token(&mut self) -> &'a str {
        self.take_while(|c| c != ' ' && c != '\t')
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(self.lineno, message)
    }

    fn expect(&mut self, want: char) -> Result<(), ParseError> {
        match self.bump() {
            Some(c) if c == want => Ok(()),
            Some(c) => Err(self.error(format!("expected {:?}, found {:?}", want, c))),
            None => Err(self.error(format!("expected {:?}, found end of line", want))),
        }
    }
}

fn is_name_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == ':'
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == ':'
}

fn is_label_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_label_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn valid_metric_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(is_name_start) && chars.all(is_name_char)
}

fn parse_float(s: &str) -> Option<f64> {
    match s {
        "NaN" => Some(f64::NAN),
        "+Inf" | "Inf" => Some(f64::INFINITY),
        "-Inf" => Some(f64::NEG_INFINITY),
        _ => s.parse().ok().filter(|v: &f64| v.is_finite()),
    }
}

/// Formats a quantile or bucket bound the way it is conventionally written.
fn format_bound(v: f64) -> String {
    if v == f64::INFINITY {
        "+Inf".to_string()
    } else if v == f64::NEG_INFINITY {
        "-Inf".to_string()
    } else {
        v.to_string()
    }
}

fn parse_label_value(cur: &mut Cursor<'_>) -> Result<String, ParseError> {
    cur.expect('"')?;
    let mut value = String::new();
    loop {
        match cur.bump() {
            Some('"') => return Ok(value),
            Some('\\') => match cur.bump() {
                Some('\\') => value.push('\\'),
                Some('"') => value.push('"'),
                Some('n') => value.push('\n'),
                Some(c) => return Err(cur.error(format!("invalid escape sequence \\{}", c))),
                None => return Err(cur.error("unterminated label value")),
            },
            Some(c) => value.push(c),
            None => return Err(cur.error("unterminated label value")),
        }
    }
}

fn parse_labels(cur: &mut Cursor<'_>) -> Result<Vec<(String, String)>, ParseError> {
    cur.expect('{')?;
    let mut labels: Vec<(String, String)> = Vec::new();
    loop {
        cur.skip_ws();
        if cur.peek() == Some('}') {
            cur.bump();
            return Ok(labels);
        }

        if !cur.peek().is_some_and(is_label_start) {
            return Err(cur.error(format!("invalid label name in {:?}", cur.rest())));
        }
        let name = cur.take_while(is_label_char).to_string();
        cur.skip_ws();
        cur.expect('=')?;
        cur.skip_ws();
        let value = parse_label_value(cur)?;

        if labels.iter().any(|(k, _)| *k == name) {
            return Err(cur.error(format!("duplicate label name {:?}", name)));
        }
        labels.push((name, value));

        cur.skip_ws();
        match cur.bump() {
            Some(',') => continue,
            Some('}') => return Ok(labels),
            Some(c) => return Err(cur.error(format!("expected ',' or '}}', found {:?}", c))),
            None => return Err(cur.error("unterminated label set")),
        }
    }
}

fn parse_sample(line: &str, lineno: usize) -> Result<Sample, ParseError> {
    let mut cur = Cursor::new(line, lineno);

    if !cur.peek().is_some_and(is_name_start) {
        return Err(cur.error(format!("invalid metric name in {:?}", line)));
    }
    let name = cur.take_while(is_name_char).to_string();

    cur.skip_ws();
    let labels = if cur.peek() == Some('{') {
        parse_labels(&mut cur)?
    } else {
        Vec::new()
    };

    cur.skip_ws();
    let raw_value = cur.token();
    if raw_value.is_empty() {
        return Err(cur.error(format!("missing value for {:?}", name)));
    }
    let value = parse_float(raw_value)
        .ok_or_else(|| cur.error(format!("invalid value {:?}", raw_value)))?;

    cur.skip_ws();
    let raw_timestamp = cur.token();
    if !raw_timestamp.is_empty() && raw_timestamp.parse::<i64>().is_err() {
        return Err(cur.error(format!("invalid timestamp {:?}", raw_timestamp)));
    }

    cur.skip_ws();
    if !cur.rest().is_empty() {
        return Err(cur.error(format!("unexpected trailing text {:?}", cur.rest())));
    }

    Ok(Sample {
        name,
        labels,
        value,
        line: lineno,
    })
}

fn parse_comment(families: &mut Families, body: &str, lineno: usize) -> Result<(), ParseError> {
    let mut parts = body.split_whitespace();
    match parts.next() {
        Some("TYPE") => {
            let name = parts
                .next()
                .ok_or_else(|| ParseError::new(lineno, "TYPE line without metric name"))?;
            if !valid_metric_name(name) {
                return Err(ParseError::new(lineno, format!("invalid metric name {:?}", name)));
            }
            let raw = parts
                .next()
                .ok_or_else(|| ParseError::new(lineno, format!("TYPE line for {:?} without type", name)))?;
            let kind = FamilyType::from_name(raw)
                .ok_or_else(|| ParseError::new(lineno, format!("unknown metric type {:?}", raw)))?;
            families.set_type(name, kind, lineno)
        }
        Some("HELP") => {
            let name = parts
                .next()
                .ok_or_else(|| ParseError::new(lineno, "HELP line without metric name"))?;
            if !valid_metric_name(name) {
                return Err(ParseError::new(lineno, format!("invalid metric name {:?}", name)));
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

fn decode(body: &str) -> Result<Vec<Family>, ParseError> {
    let mut families = Families::default();

    for (i, raw) in body.lines().enumerate() {
        let lineno = i + 1;
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(comment) = line.strip_prefix('#') {
            parse_comment(&mut families, comment, lineno)?;
            continue;
        }

        let sample = parse_sample(line, lineno)?;
        let idx = families.resolve(&sample.name);
        families.families[idx].samples.push(sample);
    }

    Ok(families.families)
}

fn merge_tags(base: &BTreeMap<String, String>, sample: &Sample, skip: &str) -> BTreeMap<String, String> {
    let mut tags = base.clone();
    for (k, v) in &sample.labels {
        if k != skip {
            tags.insert(k.clone(), v.clone());
        }
    }
    tags
}

fn flatten(
    family: Family,
    now: DateTime<Utc>,
    tags: &BTreeMap<String, String>,
    out: &mut Vec<Metric>,
) -> Result<(), ParseError> {
    let scalar = |kind: Option<FamilyType>| match kind {
        Some(FamilyType::Counter) => Some((ValueType::Counter, COUNTER_KEY)),
        Some(FamilyType::Untyped) => Some((ValueType::Untyped, UNTYPED_KEY)),
        Some(FamilyType::Gauge) | None => Some((ValueType::Gauge, GAUGE_KEY)),
        _ => None,
    };

    if let Some((vtype, key)) = scalar(family.kind) {
        for sample in family.samples {
            if sample.value.is_nan() {
                continue;
            }
            out.push(
                Metric::new(now, &family.name, merge_tags(tags, &sample, ""))
                    .with_type(vtype)
                    .with_value(key, sample.value),
            );
        }
        return Ok(());
    }

    let histogram = family.kind == Some(FamilyType::Histogram);
    let (label, tag, series) = if histogram {
        (BUCKET_LABEL, BUCKET_TAG, format!("{}_bucket", family.name))
    } else {
        (QUANTILE_LABEL, QUANTILE_TAG, family.name.clone())
    };

    for sample in family.samples {
        if sample.name != series {
            // _sum / _count
            continue;
        }

        let bound = sample
            .label(label)
            .ok_or_else(|| {
                ParseError::new(sample.line, format!("{:?} sample without {:?} label", family.name, label))
            })
            .and_then(|raw| {
                parse_float(raw).ok_or_else(|| {
                    ParseError::new(sample.line, format!("invalid {:?} label value {:?}", label, raw))
                })
            })?;

        if !histogram && sample.value.is_nan() {
            continue;
        }

        let bound = format_bound(bound);
        let vtype = if histogram {
            ValueType::Histogram
        } else {
            ValueType::Summary
        };
        out.push(
            Metric::new(now, &family.name, merge_tags(tags, &sample, label))
                .with_type(vtype)
                .with_value(bound.clone(), sample.value)
                .with_tag(tag, bound),
        );
    }

    Ok(())
}

/// Decodes an exposition body into flattened metrics stamped with `now`.
pub fn parse_exposition(now: DateTime<Utc>, body: &str) -> Result<Vec<Metric>, ParseError> {
    parse_exposition_with_tags(now, body, &BTreeMap::new())
}

/// Like [`parse_exposition`], seeding every metric with `tags`. Sample labels
/// replace caller tags with the same key.
pub fn parse_exposition_with_tags(
    now: DateTime<Utc>,
    body: &str,
    tags: &BTreeMap<String, String>,
) -> Result<Vec<Metric>, ParseError> {
    let mut metrics = Vec::new();
    for family in decode(body)? {
        flatten(family, now, tags, &mut metrics)?;
    }
    Ok(metrics)
}
