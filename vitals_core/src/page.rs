//! Page scanning: captured HTML pages into raw row fragments.
//!
//! The source site renders three page types. Each scanner finds the
//! elements that carry one day's values and emits a [`RawRow`] with the date
//! text and labeled field texts, untouched. Parsing the texts is the
//! extractor's job.
//!
//! This is a small tag scanner, not a general HTML parser. It matches
//! elements by tag name and class tokens, pairs nested tags of the same name
//! by depth, and decodes the handful of entities that appear in the pages.

use crate::extract::{EXERCISE_FIELD, MASS_FIELD, WAIST_FIELD};
use crate::RawRow;

/// A matched element: its opening tag and the markup between open and close
#[derive(Clone, Copy, Debug)]
struct Element<'a> {
    open_tag: &'a str,
    inner: &'a str,
}

impl<'a> Element<'a> {
    fn attr(&self, name: &str) -> Option<String> {
        parse_attrs(self.open_tag)
            .into_iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| decode_entities(&v))
    }

    fn has_classes(&self, classes: &[&str]) -> bool {
        if classes.is_empty() {
            return true;
        }
        let Some(class_attr) = self.attr("class") else {
            return false;
        };
        let tokens: Vec<&str> = class_attr.split_whitespace().collect();
        classes.iter().all(|c| tokens.contains(c))
    }

    fn text(&self) -> String {
        inner_text(self.inner)
    }

    fn find_all(&self, tag: &str, classes: &[&str]) -> Vec<Element<'a>> {
        find_elements(self.inner, tag, classes)
    }

    fn find(&self, tag: &str, classes: &[&str]) -> Option<Element<'a>> {
        self.find_all(tag, classes).into_iter().next()
    }
}

/// Calorie diary: one row per `div.printDiary` day block
///
/// Fields are labeled by the block's `data-occasioname` values plus
/// `Exercise`. A day block without an `h1` yields a row with an empty date,
/// which the extractor counts as malformed.
pub fn scan_calorie_diary(html: &str) -> Vec<RawRow> {
    let mut rows = Vec::new();

    for day in find_elements(html, "div", &["printDiary"]) {
        let date_text = day.find("h1", &[]).map(|h| h.text()).unwrap_or_default();
        let mut row = RawRow::new(date_text);

        for occasion in day.find_all("div", &["occasionTags"]) {
            let Some(name) = occasion.attr("data-occasioname") else {
                tracing::debug!("Meal block without data-occasioname ignored");
                continue;
            };
            if let Some(subtotal) = occasion.find("th", &["colNutri", "subtot"]) {
                row = row.with_field(name.trim(), subtotal.text());
            }
        }

        if let Some(exercise) = day.find("div", &["occasionExercise"]) {
            if let Some(subtotal) = exercise.find("th", &["colNutri", "subtot"]) {
                row = row.with_field(EXERCISE_FIELD, subtotal.text());
            }
        }

        rows.push(row);
    }

    tracing::debug!("Scanned {} diary days", rows.len());
    rows
}

/// Mass log: rows of `table.dataTableContent` with a date and weight cell
pub fn scan_mass_log(html: &str) -> Vec<RawRow> {
    scan_measure_table(
        html,
        &["dataTableContent"],
        &["colWeight", "colorPrimary"],
        MASS_FIELD,
    )
}

/// Waist log: rows of `table.dataTableContent.dataTableOther`
pub fn scan_waist_log(html: &str) -> Vec<RawRow> {
    scan_measure_table(
        html,
        &["dataTableContent", "dataTableOther"],
        &["colMeasureType"],
        WAIST_FIELD,
    )
}

fn scan_measure_table(
    html: &str,
    table_classes: &[&str],
    value_classes: &[&str],
    label: &str,
) -> Vec<RawRow> {
    let mut rows = Vec::new();

    for table in find_elements(html, "table", table_classes) {
        for tr in table.find_all("tr", &[]) {
            // Header and spacer rows lack one of the cells
            let (Some(date), Some(value)) = (
                tr.find("td", &["colDate"]),
                tr.find("td", value_classes),
            ) else {
                continue;
            };
            rows.push(RawRow::new(date.text()).with_field(label, value.text()));
        }
    }

    tracing::debug!("Scanned {} {} rows", rows.len(), label);
    rows
}

// ============================================================================
// Tag scanning
// ============================================================================

/// Find every `tag` element whose class list contains all of `classes`
fn find_elements<'a>(html: &'a str, tag: &str, classes: &[&str]) -> Vec<Element<'a>> {
    // ASCII lowercasing keeps byte offsets aligned with `html`
    let lower = html.to_ascii_lowercase();
    let tag = tag.to_ascii_lowercase();
    let open_pat = format!("<{}", tag);

    let mut found = Vec::new();
    let mut pos = 0;

    while let Some(rel) = lower[pos..].find(&open_pat) {
        let start = pos + rel;
        pos = start + open_pat.len();

        if !is_tag_boundary(&lower, pos) {
            continue;
        }
        let Some(gt) = lower[start..].find('>') else {
            break;
        };
        let open_end = start + gt + 1;
        let open_tag = &html[start..open_end];

        let inner = if open_tag.ends_with("/>") {
            ""
        } else {
            match matching_close(&lower, &tag, open_end) {
                Some(close) => &html[open_end..close],
                None => &html[open_end..],
            }
        };

        let element = Element { open_tag, inner };
        if element.has_classes(classes) {
            found.push(element);
        }
    }

    found
}

/// Byte offset of the `</tag` that closes an element opened before `from`
fn matching_close(lower: &str, tag: &str, from: usize) -> Option<usize> {
    let open_pat = format!("<{}", tag);
    let close_pat = format!("</{}", tag);
    let mut depth = 1usize;
    let mut pos = from;

    loop {
        let next_open = lower[pos..].find(&open_pat).map(|i| pos + i);
        let next_close = lower[pos..].find(&close_pat).map(|i| pos + i)?;

        match next_open {
            Some(open) if open < next_close => {
                let after = open + open_pat.len();
                if is_tag_boundary(lower, after) {
                    let self_closing = lower[open..]
                        .find('>')
                        .map(|gt| lower[open..open + gt + 1].ends_with("/>"))
                        .unwrap_or(false);
                    if !self_closing {
                        depth += 1;
                    }
                }
                pos = after;
            }
            _ if !is_tag_boundary(lower, next_close + close_pat.len()) => {
                pos = next_close + close_pat.len();
            }
            _ => {
                depth -= 1;
                if depth == 0 {
                    return Some(next_close);
                }
                pos = next_close + close_pat.len();
            }
        }
    }
}

/// `<td` must not match `<tdata`
fn is_tag_boundary(lower: &str, at: usize) -> bool {
    match lower[at..].chars().next() {
        Some(c) => c.is_ascii_whitespace() || c == '>' || c == '/',
        None => false,
    }
}

/// Attributes of an opening tag, in order
fn parse_attrs(open_tag: &str) -> Vec<(String, String)> {
    let body = open_tag
        .trim_start_matches('<')
        .trim_end_matches('>')
        .trim_end_matches('/');
    // Skip the tag name
    let body = match body.find(|c: char| c.is_ascii_whitespace()) {
        Some(i) => &body[i..],
        None => return Vec::new(),
    };

    let chars: Vec<char> = body.chars().collect();
    let mut attrs = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        while i < chars.len() && chars[i].is_whitespace() {
            i += 1;
        }
        let name_start = i;
        while i < chars.len() && !chars[i].is_whitespace() && chars[i] != '=' {
            i += 1;
        }
        let name: String = chars[name_start..i].iter().collect();
        if name.is_empty() {
            i += 1;
            continue;
        }

        while i < chars.len() && chars[i].is_whitespace() {
            i += 1;
        }
        let mut value = String::new();
        if i < chars.len() && chars[i] == '=' {
            i += 1;
            while i < chars.len() && chars[i].is_whitespace() {
                i += 1;
            }
            if i < chars.len() && (chars[i] == '"' || chars[i] == '\'') {
                let quote = chars[i];
                i += 1;
                let value_start = i;
                while i < chars.len() && chars[i] != quote {
                    i += 1;
                }
                value = chars[value_start..i].iter().collect();
                i += 1;
            } else {
                let value_start = i;
                while i < chars.len() && !chars[i].is_whitespace() {
                    i += 1;
                }
                value = chars[value_start..i].iter().collect();
            }
        }
        attrs.push((name, value));
    }

    attrs
}

/// Text content with tags removed, entities decoded and whitespace collapsed
fn inner_text(markup: &str) -> String {
    let mut stripped = String::with_capacity(markup.len());
    let mut in_tag = false;
    for ch in markup.chars() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => {
                in_tag = false;
                stripped.push(' ');
            }
            _ if !in_tag => stripped.push(ch),
            _ => {}
        }
    }

    decode_entities(&stripped)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
