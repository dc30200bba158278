//! End-to-end tests against throwaway repositories built with the git binary.

use plumbline_core::{ObjectId, ObjectType};
use plumbline_odb::{Blob, Commit, DiffOptions, Object, OdbError, Repository, StatusOptions, Tag, Tree};
use plumbline_parse::{DiffFormat, ParentChangeKind, StatusKind, TreeDifferenceEntry};
use plumbline_process::GitConfig;
use pretty_assertions::assert_eq;
use std::io::Read;
use std::path::Path;
use std::thread;
use tempfile::TempDir;

fn git(dir: &Path, args: &[&str]) -> String {
    let output = git_raw(dir, args);
    assert!(
        output.status.success(),
        "git {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8(output.stdout).unwrap().trim().to_string()
}

fn git_raw(dir: &Path, args: &[&str]) -> std::process::Output {
    std::process::Command::new("git")
        .args(args)
        .current_dir(dir)
        .env("GIT_CONFIG_NOSYSTEM", "1")
        .env("GIT_AUTHOR_DATE", "1600000000 +0000")
        .env("GIT_COMMITTER_DATE", "1600000000 +0000")
        .output()
        .expect("git is installed")
}

fn write(dir: &Path, path: &str, content: &str) {
    let path = dir.join(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, content).unwrap();
}

struct Fixture {
    dir: TempDir,
    repo: Repository,
    first: ObjectId,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        git(root, &["init", "-q"]);
        git(root, &["symbolic-ref", "HEAD", "refs/heads/main"]);
        git(root, &["config", "user.name", "Test Author"]);
        git(root, &["config", "user.email", "test@example.com"]);
        git(root, &["config", "commit.gpgsign", "false"]);
        git(root, &["config", "tag.gpgsign", "false"]);

        write(root, "a.txt", "hello\n");
        write(root, "dir/b.txt", "nested\n");
        write(root, "old.txt", "a file that will be renamed\nwith enough lines\nto score\n");
        git(root, &["add", "."]);
        git(root, &["commit", "-q", "-m", "Initial commit\n\nWith a body."]);
        let first = ObjectId::from_hex(&git(root, &["rev-parse", "HEAD"])).unwrap();

        let repo = Repository::open(GitConfig::default().with_working_dir(root));
        Self { dir, repo, first }
    }

    fn root(&self) -> &Path {
        self.dir.path()
    }

    fn head(&self) -> ObjectId {
        ObjectId::from_hex(&git(self.root(), &["rev-parse", "HEAD"])).unwrap()
    }
}

#[test]
fn test_reads_commit_and_resolves_children() {
    let fx = Fixture::new();
    let odb = fx.repo.odb();

    let commit: Commit = odb.read_object(&fx.first).unwrap();
    assert_eq!(commit.id(), fx.first);
    assert_eq!(commit.first_line(), "Initial commit");
    assert_eq!(commit.message(), "Initial commit\n\nWith a body.\n");
    assert_eq!(commit.author().name, "Test Author");
    assert_eq!(commit.author().timestamp(), 1_600_000_000);
    assert!(commit.parent_ids().is_empty());
    assert!(commit.parent(0).unwrap().is_none());

    let tree = commit.tree().unwrap();
    let names: Vec<String> = tree.entries().iter().map(|e| e.name.to_string()).collect();
    assert_eq!(names, vec!["a.txt", "dir", "old.txt"]);

    match tree.entry_object("a.txt").unwrap() {
        Some(Object::Blob(blob)) => assert_eq!(blob.content().as_ref(), b"hello\n"),
        other => panic!("unexpected {other:?}"),
    }
    let subtree = tree.subtree("dir").unwrap().unwrap();
    assert_eq!(subtree.entries()[0].name, "b.txt");
}

#[test]
fn test_read_dispatches_on_reported_type() {
    let fx = Fixture::new();
    let object = fx.repo.odb().read(&fx.first).unwrap();
    assert_eq!(object.object_type(), ObjectType::Commit);
    assert_eq!(object.id(), fx.first);
}

#[test]
fn test_headers_and_paths() {
    let fx = Fixture::new();
    let odb = fx.repo.odb();

    let header = odb.read_object_header(&fx.first, Some("a.txt")).unwrap().unwrap();
    assert_eq!(header.object_type, ObjectType::Blob);
    assert_eq!(header.size, 6);

    assert!(odb.read_object_header(&fx.first, Some("nope.txt")).unwrap().is_none());
    let commit_header = odb.read_object_header(&fx.first, None).unwrap().unwrap();
    assert_eq!(commit_header.object_type, ObjectType::Commit);

    let dir = odb.read_tree_at(&fx.first, "dir").unwrap().unwrap();
    assert_eq!(dir.len(), 1);
    assert!(odb.read_tree_at(&fx.first, "missing").unwrap().is_none());
    assert!(matches!(
        odb.read_tree_at(&fx.first, "a.txt"),
        Err(OdbError::TypeMismatch { .. })
    ));

    let commit: Commit = odb.read_object(&fx.first).unwrap();
    let only_files = odb
        .read_filtered_tree(&commit.tree_id(), |entry| !entry.is_tree())
        .unwrap();
    assert_eq!(only_files.len(), 2);
}

#[test]
fn test_missing_and_mismatched_objects() {
    let fx = Fixture::new();
    let odb = fx.repo.odb();

    assert!(matches!(
        odb.read_object::<Commit>(&ObjectId::ZERO),
        Err(OdbError::ObjectNotFound(_))
    ));
    match odb.read_object::<Tree>(&fx.first) {
        Err(OdbError::TypeMismatch {
            expected, actual, ..
        }) => {
            assert_eq!(expected, ObjectType::Tree);
            assert_eq!(actual, ObjectType::Commit);
        }
        other => panic!("unexpected {other:?}"),
    }
    // The channel is still in step after both failures.
    let commit: Commit = odb.read_object(&fx.first).unwrap();
    assert_eq!(commit.id(), fx.first);
}

#[test]
fn test_cache_serves_repeated_reads() {
    let fx = Fixture::new();
    let odb = fx.repo.odb();
    let _: Commit = odb.read_object(&fx.first).unwrap();
    let _: Commit = odb.read_object(&fx.first).unwrap();
    let stats = odb.cache_stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.size, 1);
}

#[test]
fn test_streams_large_blob_and_keeps_channel_usable() {
    let fx = Fixture::new();
    let big: String = (0..20_000).map(|i| format!("line {i}\n")).collect();
    write(fx.root(), "big.txt", &big);
    let big_id = ObjectId::from_hex(&git(fx.root(), &["hash-object", "-w", "big.txt"])).unwrap();
    let odb = fx.repo.odb();

    let mut stream = odb.stream_blob(&big_id).unwrap();
    assert_eq!(stream.header().size, big.len() as u64);
    let mut content = String::new();
    stream.read_to_string(&mut content).unwrap();
    assert_eq!(content, big);
    drop(stream);

    // Abandon a stream part way; dropping it drains the rest.
    let mut partial = odb.stream_blob(&big_id).unwrap();
    let mut head = [0u8; 10];
    partial.read_exact(&mut head).unwrap();
    assert_eq!(&head, b"line 0\nlin");
    drop(partial);

    let blob: Blob = odb.read_object(&big_id).unwrap();
    assert_eq!(blob.len(), big.len());

    assert!(matches!(
        odb.stream_blob(&fx.first),
        Err(OdbError::TypeMismatch { .. })
    ));
    let commit: Commit = odb.read_object(&fx.first).unwrap();
    assert_eq!(commit.id(), fx.first);
}

#[test]
fn test_concurrent_reads_are_not_interleaved() {
    let fx = Fixture::new();
    let mut expected = Vec::new();
    for i in 0..16 {
        let content = format!("blob {i}\n").repeat(i * 300 + 1);
        let name = format!("blob{i}.txt");
        write(fx.root(), &name, &content);
        let id = ObjectId::from_hex(&git(fx.root(), &["hash-object", "-w", &name])).unwrap();
        expected.push((id, content));
    }

    let odb = fx.repo.odb().clone();
    thread::scope(|scope| {
        for worker in 0..8 {
            let odb = odb.clone();
            let expected = &expected;
            scope.spawn(move || {
                for round in 0..4 {
                    for (i, (id, content)) in expected.iter().enumerate() {
                        if (i + worker + round) % 3 == 0 {
                            let mut text = String::new();
                            odb.stream_blob(id).unwrap().read_to_string(&mut text).unwrap();
                            assert_eq!(&text, content);
                        } else {
                            let blob: Blob = odb.read_object(id).unwrap();
                            assert_eq!(blob.text(), content.as_str());
                        }
                    }
                }
            });
        }
    });
}

#[test]
fn test_read_many_pipelines_requests() {
    let fx = Fixture::new();
    let odb = fx.repo.odb();
    let commit: Commit = odb.read_object(&fx.first).unwrap();

    let ids = [fx.first, commit.tree_id(), ObjectId::ZERO];
    let objects = odb.read_many(&ids).unwrap();
    assert_eq!(objects.len(), 3);
    assert!(matches!(objects[0], Some(Object::Commit(_))));
    assert!(matches!(objects[1], Some(Object::Tree(_))));
    assert!(objects[2].is_none());
}

#[test]
fn test_dispose_and_dropped_database() {
    let fx = Fixture::new();
    let commit: Commit = fx.repo.odb().read_object(&fx.first).unwrap();

    fx.repo.odb().dispose();
    assert!(fx.repo.odb().is_disposed());
    assert!(matches!(
        fx.repo.odb().read_object::<Commit>(&fx.first),
        Err(OdbError::Disposed)
    ));

    let Fixture { repo, .. } = fx;
    drop(repo);
    assert!(matches!(commit.tree(), Err(OdbError::Disposed)));
}

#[test]
fn test_annotated_tags() {
    let fx = Fixture::new();
    git(fx.root(), &["tag", "-a", "v1.0", "-m", "Release one"]);

    let refs = fx.repo.references(Some("refs/tags")).unwrap();
    assert_eq!(refs.len(), 1);
    assert_eq!(refs[0].name, "refs/tags/v1.0");
    assert_eq!(refs[0].object_type, ObjectType::Tag);
    assert!(refs[0].is_tag());

    let tag: Tag = fx.repo.odb().read_object(&refs[0].id).unwrap();
    assert_eq!(tag.name(), "v1.0");
    assert_eq!(tag.target_id(), fx.first);
    assert_eq!(tag.tagger().unwrap().email, "test@example.com");
    match tag.target_object().unwrap() {
        Object::Commit(commit) => assert_eq!(commit.id(), fx.first),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn test_references_and_listing() {
    let fx = Fixture::new();
    let refs = fx.repo.references(None).unwrap();
    let main = refs.iter().find(|r| r.name == "refs/heads/main").unwrap();
    assert_eq!(main.id, fx.first);
    assert!(main.is_branch());
    assert_eq!(main.short_name(), "main");

    let entries = fx.repo.ls_tree("HEAD", true, &[]).unwrap();
    let paths: Vec<String> = entries.iter().map(|e| e.name.to_string()).collect();
    assert_eq!(paths, vec!["a.txt", "dir/b.txt", "old.txt"]);

    let limited = fx.repo.ls_tree("HEAD", false, &["dir".to_string()]).unwrap();
    assert_eq!(limited.len(), 1);
    assert!(limited[0].is_tree());

    assert_eq!(fx.repo.resolve("HEAD").unwrap(), fx.first);
    assert!(fx.repo.resolve("does-not-exist").is_err());
    assert!(!fx.repo.git_version().unwrap().is_empty());
}

#[test]
fn test_status_snapshot() {
    let fx = Fixture::new();
    write(fx.root(), "a.txt", "changed\n");
    write(fx.root(), "staged.txt", "new\n");
    git(fx.root(), &["add", "staged.txt"]);
    write(fx.root(), "scratch.txt", "untracked\n");

    let status = fx.repo.status(&StatusOptions::default()).unwrap();
    assert_eq!(status.branch.head.as_ref().unwrap(), "main");
    assert_eq!(status.branch.oid, Some(fx.first));
    assert_eq!(status.staged.added, 1);
    assert_eq!(status.unstaged.modified, 1);
    assert_eq!(status.untracked.len(), 1);
    assert_eq!(status.untracked[0], "scratch.txt");
    assert!(!status.is_clean());

    let modified = status.entries.iter().find(|e| e.path == "a.txt").unwrap();
    assert_eq!(modified.staged, StatusKind::Unmodified);
    assert_eq!(modified.unstaged, StatusKind::Modified);
}

#[test]
fn test_diff_tree_detects_renames() {
    let fx = Fixture::new();
    git(fx.root(), &["mv", "old.txt", "new.txt"]);
    write(fx.root(), "a.txt", "hello again\n");
    git(fx.root(), &["commit", "-q", "-am", "Rename and edit"]);
    let second = fx.head();

    let diff = fx
        .repo
        .diff_tree(&fx.first, &second, &DiffOptions::default())
        .unwrap();
    assert_eq!(diff.len(), 2);
    let renamed = diff
        .iter()
        .find_map(|entry| match entry {
            TreeDifferenceEntry::Renamed(renamed) => Some(renamed),
            _ => None,
        })
        .unwrap();
    assert_eq!(renamed.original_path, "old.txt");
    assert_eq!(renamed.change.path, "new.txt");
    assert_eq!(renamed.confidence, 100);
    assert!(diff
        .iter()
        .any(|entry| matches!(entry, TreeDifferenceEntry::Modified(c) if c.path == "a.txt")));

    let names = fx
        .repo
        .diff_tree(
            &fx.first,
            &second,
            &DiffOptions {
                format: DiffFormat::NameStatus,
                ..DiffOptions::default()
            },
        )
        .unwrap();
    assert_eq!(names.len(), 2);

    let commit_diff = fx.repo.diff_commit(&second).unwrap();
    assert_eq!(commit_diff.len(), 2);
    let root_diff = fx.repo.diff_commit(&fx.first).unwrap();
    assert_eq!(root_diff.len(), 3);
    assert!(root_diff
        .iter()
        .all(|entry| matches!(entry, TreeDifferenceEntry::Added(_))));
}

#[test]
fn test_merge_commit_diff_is_combined() {
    let fx = Fixture::new();
    let root = fx.root();
    git(root, &["checkout", "-q", "-b", "topic"]);
    write(root, "a.txt", "topic side\n");
    git(root, &["commit", "-q", "-am", "Topic change"]);
    git(root, &["checkout", "-q", "main"]);
    write(root, "a.txt", "main side\n");
    git(root, &["commit", "-q", "-am", "Main change"]);

    let merge = git_raw(root, &["merge", "-q", "--no-edit", "topic"]);
    assert!(!merge.status.success());
    write(root, "a.txt", "resolved\n");
    git(root, &["add", "a.txt"]);
    git(root, &["commit", "-q", "--no-edit"]);
    let merge_id = fx.head();

    let merge_commit: Commit = fx.repo.odb().read_object(&merge_id).unwrap();
    assert!(merge_commit.is_merge());
    let first_parent = merge_commit.parent(0).unwrap().unwrap();
    assert_eq!(first_parent.first_line(), "Main change");

    let diff = fx.repo.diff_commit(&merge_id).unwrap();
    assert_eq!(diff.len(), 1);
    match &diff.entries[0] {
        TreeDifferenceEntry::Merged(merged) => {
            assert_eq!(merged.path, "a.txt");
            assert_eq!(merged.parents.len(), 2);
            assert!(merged
                .parents
                .iter()
                .all(|p| p.kind == ParentChangeKind::Modified));
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(diff.entries[0].confidence(), None);
}

#[test]
fn test_failed_command_is_categorized() {
    let dir = tempfile::tempdir().unwrap();
    let repo = Repository::open(GitConfig::default().with_working_dir(dir.path()));
    match repo.status(&StatusOptions::default()) {
        Err(OdbError::Process(plumbline_process::ProcessError::Git(err))) => {
            assert!(matches!(
                err,
                plumbline_process::GitError::NotARepository { .. }
            ));
            assert_eq!(err.exit_code(), 128);
        }
        other => panic!("unexpected {other:?}"),
    }
}
