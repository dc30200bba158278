//! CLI command implementations.
//!
//! Every command writes to a caller-supplied sink so the output can be
//! captured in tests.

use anyhow::{Context, Result};
use plumbline_core::{ObjectId, ObjectType};
use plumbline_odb::{Object, Repository, StatusOptions};
use plumbline_parse::{
    DiffFormat, Identity, ParentChangeKind, StatusKind, TreeDifference, TreeDifferenceEntry,
    TreeEntry,
};
use serde_json::{json, Value};
use std::io::{self, Write};

/// Output mode shared by all commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Output {
    /// Porcelain-like text.
    #[default]
    Text,
    /// One JSON document per command.
    Json,
}

/// Prints an object. Blobs are streamed verbatim.
pub fn cat(repo: &Repository, revision: &str, output: Output, out: &mut dyn Write) -> Result<()> {
    let id = repo.resolve(revision)?;
    let header = repo
        .odb()
        .read_object_header(&id, None)?
        .with_context(|| format!("object {id} not found"))?;
    tracing::info!(revision = %revision, id = %id, object_type = %header.object_type, "cat");

    if header.object_type == ObjectType::Blob && output == Output::Text {
        let mut stream = repo.odb().stream_blob(&id)?;
        io::copy(&mut stream, out)?;
        return Ok(());
    }

    let object = repo.odb().read(&id)?;
    match output {
        Output::Json => write_json(out, &object_json(&object)),
        Output::Text => write_object(&object, out),
    }
}

fn write_object(object: &Object, out: &mut dyn Write) -> Result<()> {
    match object {
        Object::Commit(commit) => {
            writeln!(out, "tree {}", commit.tree_id())?;
            for parent in commit.parent_ids() {
                writeln!(out, "parent {parent}")?;
            }
            writeln!(out, "author {}", identity_line(commit.author()))?;
            writeln!(out, "committer {}", identity_line(commit.committer()))?;
            writeln!(out)?;
            write!(out, "{}", commit.message())?;
        }
        Object::Tree(tree) => {
            for entry in tree.entries() {
                write_tree_entry(entry, out)?;
            }
        }
        Object::Tag(tag) => {
            writeln!(out, "object {}", tag.target_id())?;
            writeln!(out, "type {}", tag.target_type())?;
            writeln!(out, "tag {}", tag.name())?;
            if let Some(tagger) = tag.tagger() {
                writeln!(out, "tagger {}", identity_line(tagger))?;
            }
            writeln!(out)?;
            write!(out, "{}", tag.message())?;
        }
        Object::Blob(blob) => out.write_all(blob.content())?,
    }
    Ok(())
}

/// Prints the type and size of an object, or of a path inside a tree-ish.
pub fn header(
    repo: &Repository,
    revision: &str,
    path: Option<&str>,
    output: Output,
    out: &mut dyn Write,
) -> Result<()> {
    let id = repo.resolve(revision)?;
    let header = repo.odb().read_object_header(&id, path)?;
    match (output, header) {
        (Output::Json, header) => write_json(
            out,
            &header.map_or(Value::Null, |h| {
                json!({ "id": h.id, "type": h.object_type, "size": h.size })
            }),
        ),
        (Output::Text, Some(h)) => {
            writeln!(out, "{} {} {}", h.id, h.object_type, h.size)?;
            Ok(())
        }
        (Output::Text, None) => {
            let spec = path.map_or_else(|| revision.to_string(), |p| format!("{revision}:{p}"));
            writeln!(out, "{spec} missing")?;
            Ok(())
        }
    }
}

/// Lists a tree.
pub fn ls_tree(
    repo: &Repository,
    treeish: &str,
    recursive: bool,
    paths: &[String],
    output: Output,
    out: &mut dyn Write,
) -> Result<()> {
    let entries = repo.ls_tree(treeish, recursive, paths)?;
    match output {
        Output::Json => write_json(out, &Value::Array(entries.iter().map(tree_entry_json).collect())),
        Output::Text => {
            for entry in &entries {
                write_tree_entry(entry, out)?;
            }
            Ok(())
        }
    }
}

/// Options for [`diff`].
#[derive(Debug, Clone, Default)]
pub struct DiffArgs {
    /// Old side, or the commit to show when `to` is absent.
    pub from: String,
    /// New side.
    pub to: Option<String>,
    /// Print only status letters and paths.
    pub name_status: bool,
    /// Detect copies as well as renames.
    pub find_copies: bool,
    /// Limit to these paths.
    pub paths: Vec<String>,
}

/// Diffs two trees, or one commit against its parents.
pub fn diff(repo: &Repository, args: &DiffArgs, output: Output, out: &mut dyn Write) -> Result<()> {
    let from = repo.resolve(&args.from)?;
    let format = if args.name_status {
        DiffFormat::NameStatus
    } else {
        DiffFormat::Raw
    };
    let difference = match &args.to {
        Some(to) => {
            let to = repo.resolve(to)?;
            let options = plumbline_odb::DiffOptions {
                format,
                detect_copies: args.find_copies,
                paths: args.paths.clone(),
                ..Default::default()
            };
            repo.diff_tree(&from, &to, &options)?
        }
        None => repo.diff_commit(&from)?,
    };
    tracing::info!(from = %from, entries = difference.len(), "diff");

    match output {
        Output::Json => write_json(out, &difference_json(&difference)),
        Output::Text => {
            for entry in difference.iter() {
                write_difference_entry(entry, format, out)?;
            }
            Ok(())
        }
    }
}

/// Summarizes the working copy.
pub fn status(
    repo: &Repository,
    options: &StatusOptions,
    output: Output,
    out: &mut dyn Write,
) -> Result<()> {
    let snapshot = repo.status(options)?;
    if output == Output::Json {
        let entries: Vec<Value> = snapshot
            .entries
            .iter()
            .map(|e| {
                json!({
                    "path": e.path,
                    "staged": status_letter(e.staged).to_string(),
                    "unstaged": status_letter(e.unstaged).to_string(),
                    "original_path": e.original_path,
                })
            })
            .collect();
        let unmerged: Vec<&plumbline_core::StringUtf8> =
            snapshot.unmerged.iter().map(|u| &u.path).collect();
        return write_json(
            out,
            &json!({
                "branch": {
                    "head": snapshot.branch.head,
                    "oid": snapshot.branch.oid,
                    "upstream": snapshot.branch.upstream,
                    "ahead": snapshot.branch.ahead,
                    "behind": snapshot.branch.behind,
                },
                "stash": snapshot.stash_count,
                "entries": entries,
                "unmerged": unmerged,
                "untracked": snapshot.untracked,
                "ignored": snapshot.ignored,
                "clean": snapshot.is_clean(),
            }),
        );
    }

    let branch = &snapshot.branch;
    match &branch.head {
        Some(head) => write!(out, "## {head}")?,
        None => write!(out, "## HEAD (detached)")?,
    }
    if let Some(upstream) = &branch.upstream {
        write!(out, "...{upstream} [ahead {}, behind {}]", branch.ahead, branch.behind)?;
    }
    writeln!(out)?;
    for entry in &snapshot.entries {
        write!(
            out,
            "{}{} {}",
            status_letter(entry.staged),
            status_letter(entry.unstaged),
            entry.path
        )?;
        if let Some(original) = &entry.original_path {
            write!(out, " <- {original}")?;
        }
        writeln!(out)?;
    }
    for entry in &snapshot.unmerged {
        writeln!(
            out,
            "{}{} {}",
            entry.code[0] as char, entry.code[1] as char, entry.path
        )?;
    }
    for path in &snapshot.untracked {
        writeln!(out, "?? {path}")?;
    }
    for path in &snapshot.ignored {
        writeln!(out, "!! {path}")?;
    }
    Ok(())
}

/// Lists references.
pub fn refs(repo: &Repository, prefix: Option<&str>, output: Output, out: &mut dyn Write) -> Result<()> {
    let references = repo.references(prefix)?;
    match output {
        Output::Json => write_json(
            out,
            &Value::Array(
                references
                    .iter()
                    .map(|r| {
                        json!({
                            "name": r.name,
                            "id": r.id,
                            "type": r.object_type,
                            "symref": r.symref,
                            "upstream": r.upstream,
                        })
                    })
                    .collect(),
            ),
        ),
        Output::Text => {
            for reference in &references {
                writeln!(out, "{} {}\t{}", reference.id, reference.object_type, reference.name)?;
            }
            Ok(())
        }
    }
}

/// Prints the tool and git versions.
pub fn version(repo: &Repository, output: Output, out: &mut dyn Write) -> Result<()> {
    let git = repo.git_version()?;
    let tool = env!("CARGO_PKG_VERSION");
    match output {
        Output::Json => write_json(out, &json!({ "plumbline": tool, "git": git })),
        Output::Text => {
            writeln!(out, "plumbline {tool}")?;
            writeln!(out, "git {git}")?;
            Ok(())
        }
    }
}

fn write_json(out: &mut dyn Write, value: &Value) -> Result<()> {
    serde_json::to_writer_pretty(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}

fn identity_line(identity: &Identity) -> String {
    let offset = identity.tz_offset_seconds();
    let sign = if offset < 0 { '-' } else { '+' };
    let minutes = offset.unsigned_abs() / 60;
    format!(
        "{} <{}> {} {sign}{:02}{:02}",
        identity.name,
        identity.email,
        identity.timestamp(),
        minutes / 60,
        minutes % 60
    )
}

fn identity_json(identity: &Identity) -> Value {
    json!({
        "name": identity.name,
        "email": identity.email,
        "timestamp": identity.timestamp(),
        "tz_offset_seconds": identity.tz_offset_seconds(),
    })
}

fn write_tree_entry(entry: &TreeEntry, out: &mut dyn Write) -> io::Result<()> {
    writeln!(out, "{} {} {}\t{}", entry.mode, entry.object_type, entry.id, entry.name)
}

fn tree_entry_json(entry: &TreeEntry) -> Value {
    json!({
        "mode": entry.mode.to_string(),
        "type": entry.object_type,
        "id": entry.id,
        "name": entry.name,
    })
}

fn object_json(object: &Object) -> Value {
    match object {
        Object::Commit(commit) => json!({
            "id": commit.id(),
            "type": ObjectType::Commit,
            "tree": commit.tree_id(),
            "parents": commit.parent_ids(),
            "author": identity_json(commit.author()),
            "committer": identity_json(commit.committer()),
            "message": commit.message(),
        }),
        Object::Tree(tree) => json!({
            "id": tree.id(),
            "type": ObjectType::Tree,
            "entries": tree.entries().iter().map(tree_entry_json).collect::<Vec<_>>(),
        }),
        Object::Tag(tag) => json!({
            "id": tag.id(),
            "type": ObjectType::Tag,
            "name": tag.name(),
            "target": tag.target_id(),
            "target_type": tag.target_type(),
            "tagger": tag.tagger().map(identity_json),
            "message": tag.message(),
        }),
        Object::Blob(blob) => json!({
            "id": blob.id(),
            "type": ObjectType::Blob,
            "size": blob.len(),
            "text": blob.text(),
        }),
    }
}

fn write_difference_entry(
    entry: &TreeDifferenceEntry,
    format: DiffFormat,
    out: &mut dyn Write,
) -> io::Result<()> {
    let status = match entry.confidence() {
        Some(score) => format!("{}{score:03}", entry.status_char()),
        None => entry.status_char().to_string(),
    };
    if format == DiffFormat::Raw {
        match entry {
            TreeDifferenceEntry::Merged(merged) => {
                write!(out, "::")?;
                for parent in &merged.parents {
                    write!(out, "{} ", parent.old_mode)?;
                }
                write!(out, "{} ", merged.new_mode)?;
                for parent in &merged.parents {
                    write!(out, "{} ", short(&parent.old_id))?;
                }
                let kinds: String = merged.parents.iter().map(|p| parent_letter(p.kind)).collect();
                return writeln!(out, "{} {kinds}\t{}", short(&merged.new_id), merged.path);
            }
            TreeDifferenceEntry::Renamed(renamed) | TreeDifferenceEntry::Copied(renamed) => {
                let c = &renamed.change;
                return writeln!(
                    out,
                    ":{} {} {} {} {status}\t{}\t{}",
                    c.old_mode,
                    c.new_mode,
                    short(&c.old_id),
                    short(&c.new_id),
                    renamed.original_path,
                    c.path
                );
            }
            TreeDifferenceEntry::Added(c)
            | TreeDifferenceEntry::Deleted(c)
            | TreeDifferenceEntry::Modified(c)
            | TreeDifferenceEntry::TypeChanged(c)
            | TreeDifferenceEntry::Unmerged(c)
            | TreeDifferenceEntry::Unknown(c) => {
                return writeln!(
                    out,
                    ":{} {} {} {} {status}\t{}",
                    c.old_mode,
                    c.new_mode,
                    short(&c.old_id),
                    short(&c.new_id),
                    c.path
                );
            }
        }
    }
    match entry {
        TreeDifferenceEntry::Renamed(renamed) | TreeDifferenceEntry::Copied(renamed) => writeln!(
            out,
            "{status}\t{}\t{}",
            renamed.original_path, renamed.change.path
        ),
        other => writeln!(out, "{status}\t{}", other.path()),
    }
}

fn difference_json(difference: &TreeDifference) -> Value {
    let entries = difference
        .iter()
        .map(|entry| {
            let mut value = json!({
                "status": entry.status_char().to_string(),
                "path": entry.path(),
                "confidence": entry.confidence(),
            });
            match entry {
                TreeDifferenceEntry::Renamed(renamed) | TreeDifferenceEntry::Copied(renamed) => {
                    value["original_path"] = json!(renamed.original_path);
                    value["old_id"] = json!(renamed.change.old_id);
                    value["new_id"] = json!(renamed.change.new_id);
                }
                TreeDifferenceEntry::Merged(merged) => {
                    value["new_id"] = json!(merged.new_id);
                    value["parents"] = merged
                        .parents
                        .iter()
                        .map(|p| json!({ "kind": parent_letter(p.kind).to_string(), "old_id": p.old_id }))
                        .collect();
                }
                TreeDifferenceEntry::Added(c)
                | TreeDifferenceEntry::Deleted(c)
                | TreeDifferenceEntry::Modified(c)
                | TreeDifferenceEntry::TypeChanged(c)
                | TreeDifferenceEntry::Unmerged(c)
                | TreeDifferenceEntry::Unknown(c) => {
                    value["old_id"] = json!(c.old_id);
                    value["new_id"] = json!(c.new_id);
                }
            }
            value
        })
        .collect();
    Value::Array(entries)
}

fn short(id: &ObjectId) -> String {
    id.to_short_hex(7)
}

/// Porcelain letter for a status kind, `.` when unchanged.
pub fn status_letter(kind: StatusKind) -> char {
    match kind {
        StatusKind::Unmodified => '.',
        StatusKind::Modified => 'M',
        StatusKind::TypeChanged => 'T',
        StatusKind::Added => 'A',
        StatusKind::Deleted => 'D',
        StatusKind::Renamed => 'R',
        StatusKind::Copied => 'C',
        StatusKind::Unmerged => 'U',
    }
}

fn parent_letter(kind: ParentChangeKind) -> char {
    match kind {
        ParentChangeKind::Added => 'A',
        ParentChangeKind::Deleted => 'D',
        ParentChangeKind::Modified => 'M',
        ParentChangeKind::TypeChanged => 'T',
        ParentChangeKind::Unmerged => 'U',
        ParentChangeKind::Unknown => 'X',
        ParentChangeKind::RenamedInParent => 'R',
        ParentChangeKind::CopiedInParent => 'C',
    }
}
