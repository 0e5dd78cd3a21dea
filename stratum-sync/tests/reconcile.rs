mod common;

use std::fs;
use std::thread::sleep;
use std::time::Duration;

use filetime::{set_file_mtime, FileTime};
use serde_json::Value;
use stratum_core::{lock, ServiceName};
use stratum_sync::{Engine, ReconcileError, SourceOptions, UpdateOptions, WriteResult};
use tempfile::TempDir;

use common::*;

fn svc(name: &str) -> ServiceName {
    name.parse().expect("service name")
}

fn settings(root: &std::path::Path) -> Value {
    serde_yaml::from_str(&read(root, "settings.yaml")).expect("settings yaml")
}

#[test]
fn init_bootstraps_project_services_and_lock() {
    let tpl = template_fixture();
    let work = TempDir::new().unwrap();
    let root = project_root(&work, "billing-svc");

    let outcome = engine().init(&root, init_opts(&tpl, &[])).expect("init");

    for rel in [
        "manage.py",
        "pyproject.toml",
        "billing_svc/__init__.py",
        ".github/workflows/ci.yml",
        "apps/__init__.py",
        "apps/api/__init__.py",
        "apps/api/apps.py",
        "apps/api/service.yaml",
        ".stratum.lock",
    ] {
        assert!(root.join(rel).exists(), "missing {rel}");
    }
    assert!(read(&root, "apps/api/apps.py").contains("class ApiConfig:"));

    let record = &outcome.record;
    assert_eq!(record.project.as_str(), "billing_svc");
    assert_eq!(record.service_names(), vec![svc("api")]);
    assert_eq!(record.created_at, record.last_run);
    assert_eq!(record.services[0].bootstrapped_at, record.created_at);
    assert_eq!(record.template.version, 2);
    assert_eq!(
        record.applied_actions,
        vec!["v1/apps-package", "v2/service-fragments", "v2/service-packages"]
    );
    assert!(record.files.contains_key("pyproject.toml"));
    assert!(record.files.keys().all(|k| !k.starts_with("apps/")));

    assert_eq!(settings(&root)["INSTALLED_APPS"][1], Value::from("apps.api"));
    let pyproject: toml::Value = toml::from_str(&read(&root, "pyproject.toml")).unwrap();
    assert_eq!(pyproject["project"]["dependencies"][1].as_str(), Some("api-sdk"));
    let readme = read(&root, "README.md");
    assert!(readme.starts_with("# billing_svc\n"));
    assert!(readme.contains("- **summary**: api service"));

    let saved = lock::load_at(&root).expect("lock");
    assert_eq!(&saved, record);
}

#[test]
fn init_then_update_changes_nothing_but_last_run() {
    let tpl = template_fixture();
    let work = TempDir::new().unwrap();
    let root = project_root(&work, "demo");
    let first = engine().init(&root, init_opts(&tpl, &["api"])).expect("init");

    let old = FileTime::from_unix_time(1_600_000_000, 0);
    for key in first.record.files.keys() {
        set_file_mtime(root.join(key), old).unwrap();
    }
    sleep(Duration::from_millis(10));

    let outcome = engine()
        .update(&root, &UpdateOptions::default())
        .expect("update");
    assert_eq!(outcome.changed().count(), 0, "{:?}", outcome.writes);
    for key in first.record.files.keys() {
        let mtime = FileTime::from_last_modification_time(&fs::metadata(root.join(key)).unwrap());
        assert_eq!(mtime, old, "{key} was rewritten");
    }

    let mut after = lock::load_at(&root).unwrap();
    assert!(after.last_run > first.record.last_run);
    after.last_run = first.record.last_run;
    assert_eq!(after, first.record);
}

#[test]
fn init_add_service_update_scenario() {
    let tpl = template_fixture();
    let work = TempDir::new().unwrap();
    let root = project_root(&work, "demo");

    let t0 = engine().init(&root, init_opts(&tpl, &["api"])).expect("init").record;
    sleep(Duration::from_millis(10));

    let added = engine()
        .add_service(&root, svc("worker"), &SourceOptions::default())
        .expect("add service");
    let t1 = added.record;
    assert!(t1.last_run > t0.last_run);
    assert_eq!(t1.created_at, t0.created_at);
    assert_eq!(t1.service_names(), vec![svc("api"), svc("worker")]);
    assert_eq!(t1.services[0], t0.services[0]);
    assert_eq!(t1.services[1].bootstrapped_at, t1.last_run);
    assert!(root.join("apps/worker/apps.py").exists());
    assert_eq!(
        settings(&root)["INSTALLED_APPS"],
        serde_json::json!(["django.contrib.admin", "apps.api", "apps.worker"])
    );
    assert!(read(&root, "README.md").contains("### worker"));
    sleep(Duration::from_millis(10));

    let t2 = engine()
        .update(&root, &UpdateOptions::default())
        .expect("update");
    assert_eq!(t2.changed().count(), 0, "{:?}", t2.writes);
    let mut record = t2.record;
    assert!(record.last_run > t1.last_run);
    record.last_run = t1.last_run;
    assert_eq!(record, t1);
}

#[test]
fn init_refuses_existing_project_without_writing() {
    let tpl = template_fixture();
    let work = TempDir::new().unwrap();
    let root = project_root(&work, "legacy");
    write(&root, "pyproject.toml", "[project]\nname = \"legacy\"\n");

    let err = engine().init(&root, init_opts(&tpl, &[])).unwrap_err();
    assert!(matches!(err, ReconcileError::AlreadyInitialized { ref marker, .. } if marker == "pyproject.toml"));
    assert_eq!(fs::read_dir(&root).unwrap().count(), 1);
    assert_eq!(read(&root, "pyproject.toml"), "[project]\nname = \"legacy\"\n");
}

#[test]
fn init_rejects_duplicate_service_names() {
    let tpl = template_fixture();
    let work = TempDir::new().unwrap();
    let root = project_root(&work, "demo");
    let err = engine().init(&root, init_opts(&tpl, &["api", "api"])).unwrap_err();
    assert!(matches!(err, ReconcileError::ServiceAlreadyExists { .. }));
    assert!(!root.exists());
}

#[test]
fn add_service_twice_leaves_lock_unchanged() {
    let tpl = template_fixture();
    let work = TempDir::new().unwrap();
    let root = project_root(&work, "demo");
    engine().init(&root, init_opts(&tpl, &["api"])).expect("init");
    engine()
        .add_service(&root, svc("worker"), &SourceOptions::default())
        .expect("first add");
    let before = fs::read(lock::lock_path(&root)).unwrap();

    let err = engine()
        .add_service(&root, svc("worker"), &SourceOptions::default())
        .unwrap_err();
    assert!(matches!(err, ReconcileError::ServiceAlreadyExists { .. }));
    assert_eq!(fs::read(lock::lock_path(&root)).unwrap(), before);
}

#[test]
fn add_service_refuses_populated_directory() {
    let tpl = template_fixture();
    let work = TempDir::new().unwrap();
    let root = project_root(&work, "demo");
    engine().init(&root, init_opts(&tpl, &["api"])).expect("init");
    write(&root, "apps/billing/models.py", "# hand written\n");

    let err = engine()
        .add_service(&root, svc("billing"), &SourceOptions::default())
        .unwrap_err();
    assert!(matches!(err, ReconcileError::ServiceAlreadyExists { .. }));
    assert_eq!(read(&root, "apps/billing/models.py"), "# hand written\n");
}

#[test]
fn operations_on_uninitialised_or_corrupt_projects() {
    let work = TempDir::new().unwrap();
    let root = project_root(&work, "empty");
    fs::create_dir_all(&root).unwrap();

    let err = engine()
        .update(&root, &UpdateOptions::default())
        .unwrap_err();
    assert!(matches!(err, ReconcileError::NotInitialized { .. }));

    fs::write(lock::lock_path(&root), "project: [not, a, name\n").unwrap();
    let err = engine()
        .add_service(&root, svc("api"), &SourceOptions::default())
        .unwrap_err();
    assert!(matches!(err, ReconcileError::LockStoreCorrupt(_)));
}

#[test]
fn conflicting_fragments_abort_update_without_writes() {
    let tpl = template_fixture();
    let work = TempDir::new().unwrap();
    let root = project_root(&work, "demo");
    engine().init(&root, init_opts(&tpl, &["api", "worker"])).expect("init");
    write(&root, "apps/api/service.yaml", "settings:\n  CACHE_TTL: 60\n");
    write(&root, "apps/worker/service.yaml", "settings:\n  CACHE_TTL: 300\n");
    let settings_before = read(&root, "settings.yaml");
    let lock_before = fs::read(lock::lock_path(&root)).unwrap();

    let err = engine()
        .update(&root, &UpdateOptions::default())
        .unwrap_err();
    match err {
        ReconcileError::ConsolidationConflict { artifact, key, services } => {
            assert_eq!(artifact, "settings.yaml");
            assert_eq!(key, "CACHE_TTL");
            assert_eq!(services, vec!["api".to_string(), "worker".to_string()]);
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(read(&root, "settings.yaml"), settings_before);
    assert_eq!(fs::read(lock::lock_path(&root)).unwrap(), lock_before);
}

#[test]
fn update_restores_framework_files_and_preserves_editable_ones() {
    let tpl = template_fixture();
    let work = TempDir::new().unwrap();
    let root = project_root(&work, "demo");
    engine().init(&root, init_opts(&tpl, &["api"])).expect("init");
    let pristine = read(&root, "manage.py");

    write(&root, "manage.py", "# local hack\n");
    write(&root, "apps/api/views.py", "# my views\n");

    let outcome = engine()
        .update(&root, &UpdateOptions::default())
        .expect("update");
    assert!(outcome
        .writes
        .iter()
        .any(|w| matches!(w, WriteResult::Written { path } if path.ends_with("manage.py"))));
    assert_eq!(read(&root, "manage.py"), pristine);
    assert_eq!(read(&root, "apps/api/views.py"), "# my views\n");
}

#[test]
fn dry_run_update_touches_nothing() {
    let tpl = template_fixture();
    let work = TempDir::new().unwrap();
    let root = project_root(&work, "demo");
    engine().init(&root, init_opts(&tpl, &["api"])).expect("init");
    write(&root, "manage.py", "# local hack\n");
    let lock_before = fs::read(lock::lock_path(&root)).unwrap();

    let outcome = engine()
        .update(
            &root,
            &UpdateOptions {
                dry_run: true,
                ..Default::default()
            },
        )
        .expect("dry run");
    assert!(outcome.dry_run);
    assert!(outcome
        .writes
        .iter()
        .any(|w| matches!(w, WriteResult::WouldWrite { path } if path.ends_with("manage.py"))));
    assert_eq!(read(&root, "manage.py"), "# local hack\n");
    assert_eq!(fs::read(lock::lock_path(&root)).unwrap(), lock_before);
}

#[test]
fn manifest_bump_runs_new_post_actions_once() {
    let tpl = template_fixture();
    let work = TempDir::new().unwrap();
    let root = project_root(&work, "demo");
    engine().init(&root, init_opts(&tpl, &["api"])).expect("init");

    write(&root, "apps/legacy/apps.py", "class LegacyConfig:\n    name = \"apps.legacy\"\n");
    write(tpl.path(), "templates/manifest.yaml", "version: 3\n");

    let outcome = engine()
        .update(&root, &UpdateOptions::default())
        .expect("update");
    assert_eq!(outcome.actions.len(), 1);
    assert_eq!(outcome.actions[0].id, "v3/adopt-services");
    assert_eq!(outcome.actions[0].outcome.adopted, vec![svc("legacy")]);

    let record = outcome.record;
    assert_eq!(record.template.version, 3);
    assert!(record.has_applied("v3/adopt-services"));
    assert_eq!(record.service_names(), vec![svc("api"), svc("legacy")]);
    assert_eq!(
        settings(&root)["INSTALLED_APPS"],
        serde_json::json!(["django.contrib.admin", "apps.api", "apps.legacy"])
    );

    let again = engine()
        .update(&root, &UpdateOptions::default())
        .expect("second update");
    assert!(again.actions.is_empty());
}

#[test]
fn files_dropped_by_the_template_are_removed_only_when_unmodified() {
    let tpl = template_fixture();
    write(tpl.path(), "templates/project/setup.cfg", "[flake8]\n");
    write(tpl.path(), "templates/project/tox.ini", "[tox]\n");
    let work = TempDir::new().unwrap();
    let root = project_root(&work, "demo");
    engine().init(&root, init_opts(&tpl, &["api"])).expect("init");

    fs::remove_file(tpl.path().join("templates/project/setup.cfg")).unwrap();
    fs::remove_file(tpl.path().join("templates/project/tox.ini")).unwrap();
    write(&root, "tox.ini", "[tox]\nenvlist = py312\n");

    let outcome = engine()
        .update(&root, &UpdateOptions::default())
        .expect("update");
    assert!(!root.join("setup.cfg").exists());
    assert!(root.join("tox.ini").exists());
    assert!(outcome
        .writes
        .iter()
        .any(|w| matches!(w, WriteResult::Preserved { path } if path.ends_with("tox.ini"))));
    assert!(!outcome.record.files.contains_key("setup.cfg"));
    assert!(!outcome.record.files.contains_key("tox.ini"));
}

#[test]
fn remote_sources_are_fetched_and_recorded() {
    let tpl = template_fixture();
    let work = TempDir::new().unwrap();
    let root = project_root(&work, "demo");
    let fetcher = MirrorFetcher::new(tpl.path());
    let engine = Engine::with_fetcher(fetcher);

    let mut opts = init_opts(&tpl, &["api"]);
    opts.source = SourceOptions {
        template: Some("gh:acme/django-stratum".into()),
        vcs_ref: Some("v1.2.0".into()),
    };
    let outcome = engine.init(&root, opts).expect("init");
    assert_eq!(outcome.record.template.source, "https://github.com/acme/django-stratum.git");
    assert_eq!(outcome.record.template.vcs_ref.as_deref(), Some("v1.2.0"));

    engine
        .update(&root, &UpdateOptions::default())
        .expect("update from recorded source");
}

#[test]
fn unreachable_remote_is_template_source_not_found() {
    let work = TempDir::new().unwrap();
    let root = project_root(&work, "demo");
    let err = engine()
        .init(
            &root,
            stratum_sync::InitOptions {
                source: SourceOptions {
                    template: Some("https://example.invalid/tpl".into()),
                    vcs_ref: None,
                },
                ..Default::default()
            },
        )
        .unwrap_err();
    assert!(matches!(err, ReconcileError::TemplateSourceNotFound { .. }));
    assert!(!root.exists());
}

#[test]
fn data_pairs_persist_across_updates() {
    let tpl = template_fixture();
    write(tpl.path(), "templates/project/.python-version.jinja", "{{ python_version }}\n");
    let work = TempDir::new().unwrap();
    let root = project_root(&work, "demo");

    let mut opts = init_opts(&tpl, &["api"]);
    opts.data.insert("python_version".into(), "3.12".into());
    engine().init(&root, opts).expect("init");
    assert_eq!(read(&root, ".python-version"), "3.12\n");

    let outcome = engine()
        .update(&root, &UpdateOptions::default())
        .expect("update");
    assert_eq!(outcome.changed().count(), 0);
}

#[test]
fn django_html_templates_directory_does_not_hijack_update() {
    let tpl = template_fixture();
    write(tpl.path(), "templates/project/templates/base.html", "<html>{% block body %}{% endblock %}</html>\n");
    write(tpl.path(), "templates/project/templates/demo/index.html", "<h1>demo</h1>\n");
    let work = TempDir::new().unwrap();
    let root = project_root(&work, "demo");
    engine().init(&root, init_opts(&tpl, &["api"])).expect("init");
    assert!(root.join("templates/base.html").is_file());

    let outcome = engine()
        .update(&root, &UpdateOptions::default())
        .expect("update falls back to the recorded template");
    assert_eq!(outcome.changed().count(), 0);
    assert_eq!(
        outcome.record.template.source,
        fs::canonicalize(tpl.path()).unwrap().display().to_string()
    );
}

#[test]
fn add_service_from_a_newer_template_records_its_origin() {
    let tpl = template_fixture();
    let work = TempDir::new().unwrap();
    let root = project_root(&work, "demo");
    engine().init(&root, init_opts(&tpl, &["api"])).expect("init");

    let newer = template_fixture();
    write(newer.path(), "templates/manifest.yaml", "version: 3\n");
    write(newer.path(), "templates/app/VERSION.jinja", "{{ template_version }}\n");

    let outcome = engine()
        .add_service(&root, svc("worker"), &source_of(&newer))
        .expect("add service");
    assert_eq!(read(&root, "apps/worker/VERSION"), "3\n");
    assert_eq!(outcome.record.template.version, 3);
    assert_eq!(
        outcome.record.template.source,
        fs::canonicalize(newer.path()).unwrap().display().to_string()
    );
    assert_eq!(lock::load_at(&root).unwrap().template, outcome.record.template);
}
