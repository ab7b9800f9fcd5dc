//! Line-oriented diff utilities for patch previews.
//!
//! Lines are compared whole, terminator included. The emitted [`DiffLine`]s
//! drop the terminator from their text and flag lines that had none, which is
//! enough for [`replay`] to rebuild the new content byte for byte.

use std::collections::HashMap;
use std::fmt::Write;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unchanged lines kept on each side of a change when collapsing.
pub const DEFAULT_CONTEXT_LINES: usize = 3;

/// Beyond this edit distance the minimal script is abandoned in favour of
/// replacing the whole differing middle section.
const MAX_EDIT_DISTANCE: usize = 2_048;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffLineKind {
    Context,
    Add,
    Remove,
    Hunk,
}

/// One rendered line of a diff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffLine {
    #[serde(rename = "type")]
    pub kind: DiffLineKind,
    pub content: String,
    /// 1-based line number in the old content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_line: Option<usize>,
    /// 1-based line number in the new content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_line: Option<usize>,
    /// Set when the source line had no trailing newline.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub missing_newline: bool,
}

impl DiffLine {
    fn hunk(header: String) -> Self {
        Self {
            kind: DiffLineKind::Hunk,
            content: header,
            old_line: None,
            new_line: None,
            missing_newline: false,
        }
    }

    pub fn is_change(&self) -> bool {
        matches!(self.kind, DiffLineKind::Add | DiffLineKind::Remove)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReplayError {
    #[error("malformed hunk header '{0}'")]
    MalformedHunk(String),
    #[error("diff refers to old line {line} but the old content has {available} lines")]
    OutOfRange { line: usize, available: usize },
    #[error("old line {line} does not match the diff")]
    Mismatch { line: usize },
}

/// Old/new ranges parsed from a `@@ -a,b +c,d @@` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HunkHeader {
    pub old_start: usize,
    pub old_count: usize,
    pub new_start: usize,
    pub new_count: usize,
}

impl HunkHeader {
    pub fn parse(header: &str) -> Option<Self> {
        let inner = header.strip_prefix("@@ ")?;
        let (ranges, _) = inner.split_once(" @@")?;
        let (old, new) = ranges.split_once(' ')?;
        let (old_start, old_count) = parse_range(old.strip_prefix('-')?)?;
        let (new_start, new_count) = parse_range(new.strip_prefix('+')?)?;
        Some(Self {
            old_start,
            old_count,
            new_start,
            new_count,
        })
    }

    /// Number of old lines that precede the hunk.
    fn old_offset(&self) -> usize {
        if self.old_count == 0 {
            self.old_start
        } else {
            self.old_start.saturating_sub(1)
        }
    }
}

impl std::fmt::Display for HunkHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("@@ -")?;
        write_range(f, self.old_start, self.old_count)?;
        f.write_str(" +")?;
        write_range(f, self.new_start, self.new_count)?;
        f.write_str(" @@")
    }
}

fn write_range(f: &mut std::fmt::Formatter<'_>, start: usize, count: usize) -> std::fmt::Result {
    if count == 1 {
        write!(f, "{start}")
    } else {
        write!(f, "{start},{count}")
    }
}

fn parse_range(range: &str) -> Option<(usize, usize)> {
    match range.split_once(',') {
        Some((start, count)) => Some((start.parse().ok()?, count.parse().ok()?)),
        None => Some((range.parse().ok()?, 1)),
    }
}

/// Compute the diff lines that turn `old` into `new`.
///
/// With `Some(context)`, unchanged runs longer than `2 * context` are
/// collapsed and every hunk starts with a [`DiffLineKind::Hunk`] line. With
/// `None`, all lines are emitted and no hunk lines appear. Identical inputs
/// yield an empty vector.
pub fn compute_diff_lines(old: &str, new: &str, context: Option<usize>) -> Vec<DiffLine> {
    let old_lines = split_lines_with_terminator(old);
    let new_lines = split_lines_with_terminator(new);
    let records = collect_line_records(&old_lines, &new_lines);

    if !records.iter().any(|record| record.kind != DiffLineKind::Context) {
        return Vec::new();
    }

    match context {
        None => records.iter().map(LineRecord::to_diff_line).collect(),
        Some(context) => {
            let mut lines = Vec::new();
            for (start, end) in compute_hunk_ranges(&records, context) {
                let slice = &records[start..=end];
                lines.push(DiffLine::hunk(hunk_header(slice).to_string()));
                lines.extend(slice.iter().map(LineRecord::to_diff_line));
            }
            lines
        }
    }
}

/// Count `(additions, deletions)`.
pub fn count_changes(lines: &[DiffLine]) -> (usize, usize) {
    lines
        .iter()
        .fold((0, 0), |(additions, deletions), line| match line.kind {
            DiffLineKind::Add => (additions + 1, deletions),
            DiffLineKind::Remove => (additions, deletions + 1),
            _ => (additions, deletions),
        })
}

/// Rebuild the new content from `old` and a diff produced by
/// [`compute_diff_lines`], with or without collapsed context.
pub fn replay(old: &str, lines: &[DiffLine]) -> Result<String, ReplayError> {
    let old_lines = split_lines_with_terminator(old);
    let mut cursor = 0usize;
    let mut output = String::with_capacity(old.len());

    let copy_until = |output: &mut String, cursor: &mut usize, target: usize| {
        if target > old_lines.len() {
            return Err(ReplayError::OutOfRange {
                line: target,
                available: old_lines.len(),
            });
        }
        while *cursor < target {
            output.push_str(old_lines[*cursor]);
            *cursor += 1;
        }
        Ok(())
    };

    for line in lines {
        match line.kind {
            DiffLineKind::Hunk => {
                let header = HunkHeader::parse(&line.content)
                    .ok_or_else(|| ReplayError::MalformedHunk(line.content.clone()))?;
                copy_until(&mut output, &mut cursor, header.old_offset())?;
            }
            DiffLineKind::Context | DiffLineKind::Remove => {
                let Some(source) = old_lines.get(cursor) else {
                    return Err(ReplayError::OutOfRange {
                        line: cursor + 1,
                        available: old_lines.len(),
                    });
                };
                if strip_terminator(source) != line.content {
                    return Err(ReplayError::Mismatch { line: cursor + 1 });
                }
                if line.kind == DiffLineKind::Context {
                    output.push_str(source);
                }
                cursor += 1;
            }
            DiffLineKind::Add => {
                output.push_str(&line.content);
                if !line.missing_newline {
                    output.push('\n');
                }
            }
        }
    }

    copy_until(&mut output, &mut cursor, old_lines.len())?;
    Ok(output)
}

/// Render diff lines as plain unified-diff text.
pub fn format_unified(lines: &[DiffLine]) -> String {
    let mut output = String::new();
    for line in lines {
        let prefix = match line.kind {
            DiffLineKind::Hunk => {
                let _ = writeln!(output, "{}", line.content);
                continue;
            }
            DiffLineKind::Add => '+',
            DiffLineKind::Remove => '-',
            DiffLineKind::Context => ' ',
        };
        let _ = writeln!(output, "{prefix}{}", line.content);
        if line.missing_newline {
            output.push_str("\\ No newline at end of file\n");
        }
    }
    output
}

fn split_lines_with_terminator(text: &str) -> Vec<&str> {
    text.split_inclusive('\n').collect()
}

fn strip_terminator(line: &str) -> &str {
    line.strip_suffix('\n').unwrap_or(line)
}

#[derive(Debug)]
struct LineRecord<'a> {
    kind: DiffLineKind,
    old_line: Option<usize>,
    new_line: Option<usize>,
    text: &'a str,
    /// Old lines consumed before this record.
    old_offset: usize,
    /// New lines produced before this record.
    new_offset: usize,
}

impl LineRecord<'_> {
    fn to_diff_line(&self) -> DiffLine {
        DiffLine {
            kind: self.kind,
            content: strip_terminator(self.text).to_string(),
            old_line: self.old_line,
            new_line: self.new_line,
            missing_newline: !self.text.ends_with('\n'),
        }
    }
}

fn collect_line_records<'a>(old_lines: &[&'a str], new_lines: &[&'a str]) -> Vec<LineRecord<'a>> {
    let (old_tokens, new_tokens) = encode_line_sequences(old_lines, new_lines);
    let mut records = Vec::with_capacity(old_lines.len().max(new_lines.len()));
    let mut old_index = 0usize;
    let mut new_index = 0usize;

    for edit in diff_tokens(&old_tokens, &new_tokens) {
        let (kind, old_line, new_line, text) = match edit {
            Edit::Equal => (
                DiffLineKind::Context,
                Some(old_index + 1),
                Some(new_index + 1),
                old_lines[old_index],
            ),
            Edit::Delete => (
                DiffLineKind::Remove,
                Some(old_index + 1),
                None,
                old_lines[old_index],
            ),
            Edit::Insert => (
                DiffLineKind::Add,
                None,
                Some(new_index + 1),
                new_lines[new_index],
            ),
        };
        records.push(LineRecord {
            kind,
            old_line,
            new_line,
            text,
            old_offset: old_index,
            new_offset: new_index,
        });
        if old_line.is_some() {
            old_index += 1;
        }
        if new_line.is_some() {
            new_index += 1;
        }
    }

    records
}

/// Map every distinct line to a small integer so the edit script compares
/// integers rather than strings.
fn encode_line_sequences<'a>(
    old_lines: &[&'a str],
    new_lines: &[&'a str],
) -> (Vec<usize>, Vec<usize>) {
    let mut token_map: HashMap<&'a str, usize> = HashMap::new();
    let old_encoded = encode_line_list(old_lines, &mut token_map);
    let new_encoded = encode_line_list(new_lines, &mut token_map);
    (old_encoded, new_encoded)
}

fn encode_line_list<'a>(lines: &[&'a str], map: &mut HashMap<&'a str, usize>) -> Vec<usize> {
    lines
        .iter()
        .map(|line| {
            let next = map.len();
            *map.entry(*line).or_insert(next)
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Edit {
    Equal,
    Delete,
    Insert,
}

/// Edit script with the common prefix and suffix handled outside Myers.
fn diff_tokens(old: &[usize], new: &[usize]) -> Vec<Edit> {
    let prefix = old
        .iter()
        .zip(new.iter())
        .take_while(|(a, b)| a == b)
        .count();
    let suffix = old[prefix..]
        .iter()
        .rev()
        .zip(new[prefix..].iter().rev())
        .take_while(|(a, b)| a == b)
        .count();

    let old_middle = &old[prefix..old.len() - suffix];
    let new_middle = &new[prefix..new.len() - suffix];

    let mut edits = vec![Edit::Equal; prefix];
    edits.extend(myers_diff(old_middle, new_middle).unwrap_or_else(|| {
        let mut replaced = vec![Edit::Delete; old_middle.len()];
        replaced.extend(std::iter::repeat_n(Edit::Insert, new_middle.len()));
        replaced
    }));
    edits.extend(std::iter::repeat_n(Edit::Equal, suffix));
    edits
}

/// Myers' O((N+M)D) shortest edit script. Returns `None` when the edit
/// distance exceeds [`MAX_EDIT_DISTANCE`].
fn myers_diff(old: &[usize], new: &[usize]) -> Option<Vec<Edit>> {
    let n = old.len() as isize;
    let m = new.len() as isize;
    if n == 0 {
        return Some(vec![Edit::Insert; new.len()]);
    }
    if m == 0 {
        return Some(vec![Edit::Delete; old.len()]);
    }

    let max_d = (old.len() + new.len()).min(MAX_EDIT_DISTANCE) as isize;
    let offset = max_d + 1;
    let mut v = vec![0isize; (2 * offset + 1) as usize];
    // trace[d] holds v[-d-1..=d+1] as it was before round d.
    let mut trace: Vec<Vec<isize>> = Vec::new();

    for d in 0..=max_d {
        trace.push(v[(offset - d - 1) as usize..=(offset + d + 1) as usize].to_vec());

        let mut k = -d;
        while k <= d {
            let idx = (k + offset) as usize;
            let mut x = if k == -d || (k != d && v[idx - 1] < v[idx + 1]) {
                v[idx + 1]
            } else {
                v[idx - 1] + 1
            };
            let mut y = x - k;
            while x < n && y < m && old[x as usize] == new[y as usize] {
                x += 1;
                y += 1;
            }
            v[idx] = x;

            if x >= n && y >= m {
                return Some(backtrack(&trace, n, m));
            }
            k += 2;
        }
    }

    None
}

fn backtrack(trace: &[Vec<isize>], n: isize, m: isize) -> Vec<Edit> {
    let mut edits = Vec::new();
    let mut x = n;
    let mut y = m;

    for (d, window) in trace.iter().enumerate().rev() {
        let d = d as isize;
        let at = |k: isize| window[(k + d + 1) as usize];
        let k = x - y;
        let prev_k = if k == -d || (k != d && at(k - 1) < at(k + 1)) {
            k + 1
        } else {
            k - 1
        };
        let prev_x = at(prev_k);
        let prev_y = prev_x - prev_k;

        while x > prev_x && y > prev_y {
            edits.push(Edit::Equal);
            x -= 1;
            y -= 1;
        }
        if d > 0 {
            edits.push(if x == prev_x {
                Edit::Insert
            } else {
                Edit::Delete
            });
            x = prev_x;
            y = prev_y;
        }
    }

    edits.reverse();
    edits
}

/// Inclusive record ranges for each hunk. Two changes share a hunk unless
/// more than `2 * context` unchanged lines separate them.
fn compute_hunk_ranges(records: &[LineRecord<'_>], context: usize) -> Vec<(usize, usize)> {
    let last = records.len().saturating_sub(1);
    let mut ranges: Vec<(usize, usize)> = Vec::new();

    for (idx, record) in records.iter().enumerate() {
        if record.kind == DiffLineKind::Context {
            continue;
        }
        let start = idx.saturating_sub(context);
        let end = (idx + context).min(last);
        match ranges.last_mut() {
            Some((_, current_end)) if start <= *current_end + 1 => {
                *current_end = end.max(*current_end);
            }
            _ => ranges.push((start, end)),
        }
    }

    ranges
}

fn hunk_header(slice: &[LineRecord<'_>]) -> HunkHeader {
    let old_count = slice
        .iter()
        .filter(|record| record.kind != DiffLineKind::Add)
        .count();
    let new_count = slice
        .iter()
        .filter(|record| record.kind != DiffLineKind::Remove)
        .count();
    let (old_offset, new_offset) = slice
        .first()
        .map(|record| (record.old_offset, record.new_offset))
        .unwrap_or_default();

    // An empty range names the line before it, as unified diffs do.
    let start = |offset: usize, count: usize| if count == 0 { offset } else { offset + 1 };

    HunkHeader {
        old_start: start(old_offset, old_count),
        old_count,
        new_start: start(new_offset, new_count),
        new_count,
    }
}
