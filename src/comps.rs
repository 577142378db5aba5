// src/comps.rs

//! Package group (comps) metadata
//!
//! Only what the transaction core needs is read from comps XML: group ids,
//! display names and member package names.

use crate::config::RepoConfig;
use crate::error::{Error, Result};
use quick_xml::Reader;
use quick_xml::events::Event;
use std::fs;
use tracing::{debug, info};

/// A named collection of packages installable as a unit
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Group {
    pub id: String,
    pub name: String,
    pub packages: Vec<String>,
}

/// Groups gathered from every repository that provides them
#[derive(Debug, Clone, Default)]
pub struct Comps {
    pub groups: Vec<Group>,
}

impl Comps {
    pub fn group_by_id(&self, id: &str) -> Option<&Group> {
        self.groups.iter().find(|g| g.id == id)
    }

    /// Add groups, later definitions of an id extending earlier ones
    fn merge(&mut self, groups: Vec<Group>) {
        for group in groups {
            match self.groups.iter_mut().find(|g| g.id == group.id) {
                Some(existing) => {
                    for package in group.packages {
                        if !existing.packages.contains(&package) {
                            existing.packages.push(package);
                        }
                    }
                }
                None => self.groups.push(group),
            }
        }
    }
}

/// Read comps from every enabled repository that allows groups
///
/// Fails with `GroupsError` when no repository offers group data or a comps
/// file cannot be read.
pub fn read_comps<'a>(repos: impl IntoIterator<Item = &'a RepoConfig>) -> Result<Comps> {
    let mut comps = Comps::default();
    let mut sources = 0;

    for repo in repos {
        if !repo.enabled || !repo.enablegroups {
            debug!("Groups disabled for repository {}", repo.id);
            continue;
        }
        let Some(ref path) = repo.comps_path else {
            debug!("Repository {} has no comps metadata", repo.id);
            continue;
        };

        let xml = fs::read_to_string(path).map_err(|e| {
            Error::GroupsError(format!(
                "Failed to read comps for {} from {}: {}",
                repo.id,
                path.display(),
                e
            ))
        })?;
        comps.merge(parse_groups(&xml)?);
        sources += 1;
    }

    if sources == 0 {
        return Err(Error::GroupsError(
            "No group data available for configured repositories".to_string(),
        ));
    }

    info!("Loaded {} groups from {} repositories", comps.groups.len(), sources);
    Ok(comps)
}

/// Parse the `<group>` elements of a comps document
pub fn parse_groups(xml: &str) -> Result<Vec<Group>> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut groups = Vec::new();
    let mut buf = Vec::new();
    let mut current: Option<Group> = None;
    let mut current_tag = String::new();
    // translated <name xml:lang=".."> elements are skipped
    let mut localized = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                current_tag = String::from_utf8_lossy(e.name().as_ref()).to_string();
                localized = e
                    .attributes()
                    .filter_map(|a| a.ok())
                    .any(|a| a.key.as_ref() == b"xml:lang");
                if current_tag == "group" {
                    current = Some(Group::default());
                }
            }
            Ok(Event::Text(e)) => {
                if let Some(ref mut group) = current {
                    let text = e
                        .unescape()
                        .map_err(|e| Error::ParseError(format!("Invalid comps text: {}", e)))?
                        .to_string();
                    match current_tag.as_str() {
                        "id" => group.id = text,
                        "name" if !localized => group.name = text,
                        "packagereq" => group.packages.push(text),
                        _ => {}
                    }
                }
            }
            Ok(Event::End(e)) => {
                if e.name().as_ref() == b"group" {
                    if let Some(group) = current.take() {
                        if group.id.is_empty() {
                            return Err(Error::ParseError("comps group without an id".to_string()));
                        }
                        groups.push(group);
                    }
                }
                current_tag.clear();
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(Error::ParseError(format!("Failed to parse comps: {}", e)));
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(groups)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const COMPS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<comps>
  <group>
    <id>base</id>
    <name>Base</name>
    <name xml:lang="de">Basis</name>
    <packagelist>
      <packagereq type="mandatory">pepper</packagereq>
      <packagereq type="default">trampoline</packagereq>
    </packagelist>
  </group>
  <group>
    <id>solid-ground</id>
    <name>Solid Ground</name>
    <packagelist>
      <packagereq>hole</packagereq>
    </packagelist>
  </group>
  <category>
    <id>everything</id>
  </category>
</comps>
"#;

    fn repo_with_comps(dir: &TempDir, id: &str) -> RepoConfig {
        let path = dir.path().join(format!("{}-comps.xml", id));
        fs::write(&path, COMPS).unwrap();
        RepoConfig {
            comps_path: Some(path),
            ..RepoConfig::new(id)
        }
    }

    #[test]
    fn test_parse_groups() {
        let groups = parse_groups(COMPS).unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].id, "base");
        assert_eq!(groups[0].name, "Base");
        assert_eq!(groups[0].packages, vec!["pepper", "trampoline"]);
        assert_eq!(groups[1].packages, vec!["hole"]);
    }

    #[test]
    fn test_read_comps() {
        let dir = TempDir::new().unwrap();
        let repos = vec![repo_with_comps(&dir, "main")];

        let comps = read_comps(&repos).unwrap();
        assert_eq!(comps.groups.len(), 2);
        assert!(comps.group_by_id("solid-ground").is_some());
    }

    #[test]
    fn test_read_comps_merges_repositories() {
        let dir = TempDir::new().unwrap();
        let repos = vec![repo_with_comps(&dir, "main"), repo_with_comps(&dir, "extras")];

        let comps = read_comps(&repos).unwrap();
        assert_eq!(comps.groups.len(), 2);
        assert_eq!(comps.group_by_id("base").unwrap().packages.len(), 2);
    }

    #[test]
    fn test_read_comps_disabled() {
        let dir = TempDir::new().unwrap();
        let mut repo = repo_with_comps(&dir, "main");
        repo.enablegroups = false;

        let result = read_comps(&[repo]);
        assert!(matches!(result, Err(Error::GroupsError(_))));
    }

    #[test]
    fn test_read_comps_unreadable() {
        let repo = RepoConfig {
            comps_path: Some("/nonexistent/comps.xml".into()),
            ..RepoConfig::new("main")
        };
        assert!(matches!(read_comps(&[repo]), Err(Error::GroupsError(_))));
    }

    #[test]
    fn test_group_without_id_is_rejected() {
        let xml = "<comps><group><name>Nameless</name></group></comps>";
        assert!(matches!(parse_groups(xml), Err(Error::ParseError(_))));
    }
}
