use crate::error::DiffError;
use crate::types::ChangeSet;
use regex::Regex;
use std::sync::LazyLock;

/// Status letter plus optional similarity score (`R087`, `C100`)
static STATUS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?P<kind>[A-Z])(?P<score>[0-9]{0,3})$").expect("valid status regex"));

/// Parse `git diff --name-status` output into a [`ChangeSet`]
///
/// Fields are tab separated; lines without tabs are split on whitespace. Lines that
/// cannot be classified are skipped with a warning and returned alongside the change
/// set; parsing always continues.
pub fn parse_name_status(text: &str) -> (ChangeSet, Vec<DiffError>) {
    let mut changes = ChangeSet::default();
    let mut errors = Vec::new();

    for (idx, raw) in text.lines().enumerate() {
        let line = raw.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }

        if let Err(err) = classify_line(idx + 1, line, &mut changes) {
            tracing::warn!("Skipping diff line: {}", err);
            errors.push(err);
        }
    }

    tracing::debug!(
        "Parsed diff: {} added, {} modified, {} deleted, {} renamed, {} skipped lines",
        changes.added.len(),
        changes.modified.len(),
        changes.deleted.len(),
        changes.renamed.len(),
        errors.len()
    );

    (changes, errors)
}

fn classify_line(line_no: usize, line: &str, changes: &mut ChangeSet) -> Result<(), DiffError> {
    let malformed = |reason: &str| DiffError::MalformedLine {
        line_no,
        line: line.to_string(),
        reason: reason.to_string(),
    };

    let fields: Vec<&str> = if line.contains('\t') {
        line.split('\t').map(str::trim).collect()
    } else {
        line.split_whitespace().collect()
    };

    let (status, paths) = fields
        .split_first()
        .ok_or_else(|| malformed("empty line"))?;
    let caps = STATUS
        .captures(status)
        .ok_or_else(|| malformed("unrecognised status"))?;
    let kind = &caps["kind"];
    let has_score = !caps["score"].is_empty();

    if paths.iter().any(|p| p.is_empty()) {
        return Err(malformed("empty path"));
    }

    match (kind, has_score, paths) {
        ("A", false, [path]) => {
            changes.added.insert(path.to_string());
        }
        ("M", false, [path]) => {
            changes.modified.insert(path.to_string());
        }
        ("D", false, [path]) => {
            changes.deleted.insert(path.to_string());
        }
        ("R", _, [old, new]) => {
            changes.renamed.insert((old.to_string(), new.to_string()));
        }
        ("A" | "M" | "D", false, _) => {
            return Err(malformed("expected exactly one path"));
        }
        ("R", _, _) => {
            return Err(malformed("rename needs old and new path"));
        }
        ("C" | "T" | "U" | "X", _, _) => {
            return Err(malformed("unsupported status"));
        }
        _ => {
            return Err(malformed("unrecognised status"));
        }
    }

    Ok(())
}
