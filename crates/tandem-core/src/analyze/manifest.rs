//! Project name and module root from each language's canonical manifest.

use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::models::Language;

static GO_MODULE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*module\s+(\S+)").expect("valid go.mod regex"));
static SETUP_PY_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"name\s*=\s*["']([^"']+)["']"#).expect("valid setup.py regex"));
static XML_PARENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<parent>.*?</parent>").expect("valid pom parent regex"));
static GRADLE_ROOT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"rootProject\.name\s*=\s*["']([^"']+)["']"#).expect("valid gradle regex")
});

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProjectManifest {
    /// Declared project name, or the directory base name.
    pub name: String,
    /// Import prefix that marks project-local code, when the manifest has one.
    pub module_root: Option<String>,
    /// Manifest file the name came from.
    pub source: Option<String>,
}

fn xml_tag(text: &str, tag: &str) -> Option<String> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = text.find(&open)? + open.len();
    let end = text[start..].find(&close)? + start;
    let value = text[start..end].trim();
    (!value.is_empty()).then(|| value.to_string())
}

fn read(root: &Path, name: &str) -> Option<String> {
    fs::read_to_string(root.join(name)).ok()
}

fn go_manifest(root: &Path) -> Option<ProjectManifest> {
    let text = read(root, "go.mod")?;
    let module = GO_MODULE.captures(&text)?.get(1)?.as_str().to_string();
    let name = module.rsplit('/').next().unwrap_or(&module).to_string();
    Some(ProjectManifest {
        name,
        module_root: Some(module),
        source: Some("go.mod".into()),
    })
}

fn cargo_manifest(root: &Path) -> Option<ProjectManifest> {
    let text = read(root, "Cargo.toml")?;
    let value: toml::Value = match toml::from_str(&text) {
        Ok(value) => value,
        Err(e) => {
            debug!("Unreadable Cargo.toml under {}: {e}", root.display());
            return None;
        }
    };
    let name = value.get("package")?.get("name")?.as_str()?.to_string();
    Some(ProjectManifest {
        module_root: Some(name.replace('-', "_")),
        name,
        source: Some("Cargo.toml".into()),
    })
}

fn npm_manifest(root: &Path) -> Option<ProjectManifest> {
    let text = read(root, "package.json")?;
    let value: serde_json::Value = serde_json::from_str(&text).ok()?;
    let name = value.get("name")?.as_str()?.to_string();
    Some(ProjectManifest {
        module_root: Some(name.clone()),
        name,
        source: Some("package.json".into()),
    })
}

fn python_manifest(root: &Path) -> Option<ProjectManifest> {
    if let Some(text) = read(root, "pyproject.toml") {
        if let Ok(value) = toml::from_str::<toml::Value>(&text) {
            let name = value
                .get("project")
                .and_then(|p| p.get("name"))
                .or_else(|| value.get("tool").and_then(|t| t.get("poetry")).and_then(|p| p.get("name")))
                .and_then(|n| n.as_str());
            if let Some(name) = name {
                return Some(ProjectManifest {
                    name: name.to_string(),
                    module_root: Some(name.replace('-', "_")),
                    source: Some("pyproject.toml".into()),
                });
            }
        }
    }
    let text = read(root, "setup.py")?;
    let name = SETUP_PY_NAME.captures(&text)?.get(1)?.as_str().to_string();
    Some(ProjectManifest {
        module_root: Some(name.replace('-', "_")),
        name,
        source: Some("setup.py".into()),
    })
}

fn java_manifest(root: &Path) -> Option<ProjectManifest> {
    if let Some(text) = read(root, "pom.xml") {
        let own = XML_PARENT.replace_all(&text, "");
        if let Some(name) = xml_tag(&own, "artifactId") {
            return Some(ProjectManifest {
                name,
                module_root: xml_tag(&own, "groupId").or_else(|| xml_tag(&text, "groupId")),
                source: Some("pom.xml".into()),
            });
        }
    }
    let text = read(root, "settings.gradle").or_else(|| read(root, "settings.gradle.kts"))?;
    let name = GRADLE_ROOT.captures(&text)?.get(1)?.as_str().to_string();
    Some(ProjectManifest {
        name,
        module_root: None,
        source: Some("settings.gradle".into()),
    })
}

fn csharp_manifest(root: &Path) -> Option<ProjectManifest> {
    let mut projects: Vec<_> = fs::read_dir(root)
        .ok()?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "csproj"))
        .collect();
    projects.sort();
    let path = projects.into_iter().next()?;
    let stem = path.file_stem()?.to_string_lossy().to_string();
    let text = fs::read_to_string(&path).unwrap_or_default();
    let name = xml_tag(&text, "AssemblyName").unwrap_or_else(|| stem.clone());
    let module_root = xml_tag(&text, "RootNamespace").unwrap_or(stem);
    Some(ProjectManifest {
        name,
        module_root: Some(module_root),
        source: path.file_name().map(|n| n.to_string_lossy().to_string()),
    })
}

fn dir_name(root: &Path) -> String {
    root.canonicalize()
        .ok()
        .as_deref()
        .unwrap_or(root)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "project".to_string())
}

/// Read the manifest for `language` under `root`, falling back to the
/// directory base name when there is none or it declares no name.
pub fn read_manifest(root: &Path, language: Language) -> ProjectManifest {
    let found = match language {
        Language::Go => go_manifest(root),
        Language::Rust => cargo_manifest(root),
        Language::TypeScript => npm_manifest(root),
        Language::Python => python_manifest(root),
        Language::Java => java_manifest(root),
        Language::CSharp => csharp_manifest(root),
    };
    match found {
        Some(manifest) => {
            debug!("Project name {} from {:?}", manifest.name, manifest.source);
            manifest
        }
        None => ProjectManifest {
            name: dir_name(root),
            module_root: None,
            source: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn project(files: &[(&str, &str)]) -> TempDir {
        let tmp = TempDir::new().unwrap();
        for (name, body) in files {
            fs::write(tmp.path().join(name), body).unwrap();
        }
        tmp
    }

    #[test]
    fn test_go_mod() {
        let tmp = project(&[("go.mod", "module github.com/acme/links\n\ngo 1.22\n")]);
        let manifest = read_manifest(tmp.path(), Language::Go);
        assert_eq!(manifest.name, "links");
        assert_eq!(manifest.module_root.as_deref(), Some("github.com/acme/links"));
    }

    #[test]
    fn test_cargo_and_npm() {
        let tmp = project(&[
            ("Cargo.toml", "[package]\nname = \"link-shortener\"\nversion = \"0.1.0\"\n"),
            ("package.json", r#"{"name": "@acme/links", "version": "1.0.0"}"#),
        ]);
        let cargo = read_manifest(tmp.path(), Language::Rust);
        assert_eq!(cargo.name, "link-shortener");
        assert_eq!(cargo.module_root.as_deref(), Some("link_shortener"));
        assert_eq!(read_manifest(tmp.path(), Language::TypeScript).name, "@acme/links");
    }

    #[test]
    fn test_python_pyproject_and_setup() {
        let tmp = project(&[("pyproject.toml", "[tool.poetry]\nname = \"link-svc\"\n")]);
        assert_eq!(read_manifest(tmp.path(), Language::Python).name, "link-svc");
        let tmp = project(&[("setup.py", "from setuptools import setup\nsetup(name='shorty', version='1')\n")]);
        assert_eq!(read_manifest(tmp.path(), Language::Python).name, "shorty");
    }

    #[test]
    fn test_pom_ignores_parent() {
        let pom = "<project><parent><groupId>org.parent</groupId><artifactId>parent</artifactId></parent>\
                   <groupId>com.acme</groupId><artifactId>links</artifactId></project>";
        let tmp = project(&[("pom.xml", pom)]);
        let manifest = read_manifest(tmp.path(), Language::Java);
        assert_eq!(manifest.name, "links");
        assert_eq!(manifest.module_root.as_deref(), Some("com.acme"));
    }

    #[test]
    fn test_csproj_root_namespace() {
        let tmp = project(&[(
            "Links.Api.csproj",
            "<Project><PropertyGroup><RootNamespace>Acme.Links</RootNamespace></PropertyGroup></Project>",
        )]);
        let manifest = read_manifest(tmp.path(), Language::CSharp);
        assert_eq!(manifest.name, "Links.Api");
        assert_eq!(manifest.module_root.as_deref(), Some("Acme.Links"));
    }

    #[test]
    fn test_fallback_to_directory_name() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("my-service");
        fs::create_dir(&dir).unwrap();
        let manifest = read_manifest(&dir, Language::Go);
        assert_eq!(manifest.name, "my-service");
        assert!(manifest.module_root.is_none());
        assert!(manifest.source.is_none());
    }
}
