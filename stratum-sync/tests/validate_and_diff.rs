mod common;

use std::fs;

use assert_fs::prelude::*;
use predicates::prelude::*;
use stratum_sync::diff::diff_update;
use stratum_sync::validate::{validate, InfractionKind};
use stratum_sync::{ReconcileError, SourceOptions};
use tempfile::TempDir;

use common::*;

fn initialised() -> (TempDir, TempDir, std::path::PathBuf) {
    let tpl = template_fixture();
    let work = TempDir::new().unwrap();
    let root = project_root(&work, "demo");
    engine().init(&root, init_opts(&tpl, &["api"])).expect("init");
    (tpl, work, root)
}

#[test]
fn fresh_project_validates_clean() {
    let (_tpl, _work, root) = initialised();
    let report = validate(&root).expect("validate");
    assert!(report.is_clean(), "{:?}", report.infractions);
    assert!(report.checked >= 5);
}

#[test]
fn modified_and_deleted_files_are_infractions() {
    let (_tpl, _work, root) = initialised();
    write(&root, "pyproject.toml", "[project]\nname = \"hijacked\"\n");
    fs::remove_file(root.join("README.md")).unwrap();
    write(&root, "apps/api/views.py", "# editable edits never count\n");

    let report = validate(&root).expect("validate");
    let found: Vec<_> = report
        .infractions
        .iter()
        .map(|i| (i.path.as_str(), i.kind))
        .collect();
    assert_eq!(
        found,
        vec![
            ("README.md", InfractionKind::Deleted),
            ("pyproject.toml", InfractionKind::Modified),
        ]
    );
}

#[test]
fn protected_list_narrows_the_check() {
    let (_tpl, _work, root) = initialised();
    write(&root, "pyproject.toml", "[project]\nname = \"hijacked\"\n");
    write(&root, "manage.py", "# edited\n");
    write(&root, ".protected_files.yaml", "protected_files:\n  - manage.py\n  - .github/\n");

    let report = validate(&root).expect("validate");
    assert_eq!(report.checked, 2);
    assert_eq!(report.infractions.len(), 1);
    assert_eq!(report.infractions[0].path, "manage.py");
}

#[test]
fn validate_requires_a_project() {
    let dir = assert_fs::TempDir::new().unwrap();
    let err = validate(dir.path()).unwrap_err();
    assert!(matches!(err, ReconcileError::NotInitialized { .. }));
}

#[test]
fn clean_project_has_no_diff() {
    let (_tpl, _work, root) = initialised();
    let diffs = diff_update(&engine(), &root, &SourceOptions::default()).expect("diff");
    assert!(diffs.is_empty(), "{diffs:?}");
}

#[test]
fn local_edit_produces_unified_diff_without_writing() {
    let (_tpl, _work, root) = initialised();
    let edited = format!("{}# manual tweak\n", read(&root, "manage.py"));
    write(&root, "manage.py", &edited);
    write(&root, "apps/api/views.py", "# editable\n");

    let diffs = diff_update(&engine(), &root, &SourceOptions::default()).expect("diff");
    assert_eq!(diffs.len(), 1, "{diffs:?}");
    let diff = &diffs[0].unified_diff;
    assert!(diff.contains("--- a/manage.py"));
    assert!(diff.contains("+++ b/manage.py"));
    assert!(diff.contains("-# manual tweak"));

    let project = assert_fs::fixture::ChildPath::new(root.join("manage.py"));
    project.assert(predicate::str::contains("# manual tweak"));
}

#[test]
fn upstream_template_change_shows_in_diff() {
    let (tpl, _work, root) = initialised();
    let dir = assert_fs::fixture::ChildPath::new(tpl.path().join("templates/project"));
    dir.child("Makefile").write_str("test:\n\tpytest\n").unwrap();

    let diffs = diff_update(&engine(), &root, &SourceOptions::default()).expect("diff");
    let makefile = diffs
        .iter()
        .find(|d| d.path.ends_with("Makefile"))
        .expect("Makefile diff");
    assert!(makefile.unified_diff.contains("+\tpytest"));
    assert!(!root.join("Makefile").exists());
}
