#![allow(dead_code)]

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};

use stratum_sync::{Engine, FetchError, InitOptions, SourceOptions, TemplateFetcher};
use tempfile::TempDir;

pub fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
    fs::write(path, content).expect("write");
}

pub fn read(root: &Path, rel: &str) -> String {
    fs::read_to_string(root.join(rel)).unwrap_or_else(|e| panic!("read {rel}: {e}"))
}

/// A Django-flavoured template set: `templates/{project,app}` plus a
/// manifest at version 2.
pub fn template_fixture() -> TempDir {
    let tpl = TempDir::new().expect("template dir");
    let root = tpl.path();
    write(root, "templates/manifest.yaml", "version: 2\n");

    write(
        root,
        "templates/project/pyproject.toml.jinja",
        r#"[project]
name = "{{ project_name }}"
version = "0.1.0"
requires-python = ">=3.12"
dependencies = ["django>=5"]

[tool.ruff]
line-length = 100
target-version = "py312"
"#,
    );
    write(
        root,
        "templates/project/settings.yaml.jinja",
        "ROOT_URLCONF: {{ project_name }}.urls\nINSTALLED_APPS:\n- django.contrib.admin\n",
    );
    write(root, "templates/project/README.md.jinja", "# {{ project_name }}\n");
    write(root, "templates/project/manage.py.jinja", "#!/usr/bin/env python\n# {{ project_name }}\n");
    write(root, "templates/project/{{ project_name }}/__init__.py", "");
    write(
        root,
        "templates/project/.github/workflows/ci.yml",
        "name: ci\non: [push]\njobs:\n  test:\n    runs-on: ubuntu-latest\n",
    );

    write(root, "templates/app/__init__.py", "");
    write(
        root,
        "templates/app/apps.py.jinja",
        "class {{ service_name | capitalize }}Config:\n    name = \"apps.{{ service_name }}\"\n",
    );
    write(root, "templates/app/views.py", "# views\n");
    write(
        root,
        "templates/app/service.yaml.jinja",
        "project:\n  dependencies: [\"{{ service_name }}-sdk\"]\ndocs:\n  summary: \"{{ service_name }} service\"\n",
    );
    tpl
}

pub fn source_of(tpl: &TempDir) -> SourceOptions {
    SourceOptions {
        template: Some(tpl.path().display().to_string()),
        vcs_ref: None,
    }
}

pub fn init_opts(tpl: &TempDir, services: &[&str]) -> InitOptions {
    InitOptions {
        services: services.iter().map(|s| s.parse().expect("service name")).collect(),
        source: source_of(tpl),
        ..Default::default()
    }
}

/// A project directory inside a temp workspace, not yet created.
pub fn project_root(work: &TempDir, name: &str) -> PathBuf {
    work.path().join(name)
}

/// Fetcher that serves a local directory for every URL and records calls.
pub struct MirrorFetcher {
    pub dir: PathBuf,
    pub calls: RefCell<Vec<(String, Option<String>)>>,
}

impl MirrorFetcher {
    pub fn new(dir: &Path) -> Self {
        MirrorFetcher {
            dir: dir.to_path_buf(),
            calls: RefCell::new(Vec::new()),
        }
    }
}

impl TemplateFetcher for MirrorFetcher {
    fn fetch(&self, url: &str, vcs_ref: Option<&str>) -> Result<PathBuf, FetchError> {
        self.calls
            .borrow_mut()
            .push((url.to_string(), vcs_ref.map(String::from)));
        Ok(self.dir.clone())
    }
}

/// Fetcher for tests that must never reach a remote.
pub struct OfflineFetcher;

impl TemplateFetcher for OfflineFetcher {
    fn fetch(&self, url: &str, _vcs_ref: Option<&str>) -> Result<PathBuf, FetchError> {
        Err(FetchError(format!("offline: {url}")))
    }
}

pub fn engine() -> Engine<OfflineFetcher> {
    Engine::with_fetcher(OfflineFetcher)
}
