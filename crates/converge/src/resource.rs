//! Typed resource model - immutable desired-state declarations
//!
//! Attributes are kind-specific: a tagged [`ResourceSpec`] variant per kind
//! makes invalid attribute combinations unrepresentable instead of checked ad
//! hoc at apply time. Constructors validate; a malformed declaration fails
//! with [`Error::InvalidResource`] and never reaches a graph.

use crate::error::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Resource kind - polymorphic over the {probe, apply} capability set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    Package,
    File,
    Directory,
    Exec,
    Service,
}

impl Kind {
    pub fn as_str(self) -> &'static str {
        match self {
            Kind::Package => "package",
            Kind::File => "file",
            Kind::Directory => "directory",
            Kind::Exec => "exec",
            Kind::Service => "service",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unique identifier for a resource within a catalog: (kind, name)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceId {
    pub kind: Kind,
    pub name: String,
}

impl ResourceId {
    pub fn new(kind: Kind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.kind, self.name)
    }
}

/// Desired package state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageEnsure {
    Installed,
    Absent,
    Version(String),
}

/// Desired presence for a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Ensure {
    #[default]
    Present,
    Absent,
}

/// Desired service state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceEnsure {
    Running,
    Stopped,
}

/// Permission bits parsed from a string like "0440"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mode(u32);

impl Mode {
    /// Parse an octal permission string. Accepts 3 or 4 digits ("644", "0440").
    pub fn parse(s: &str) -> Option<Self> {
        if s.len() < 3 || s.len() > 4 || !s.bytes().all(|b| (b'0'..=b'7').contains(&b)) {
            return None;
        }
        u32::from_str_radix(s, 8).ok().map(Self)
    }

    pub fn bits(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04o}", self.0)
    }
}

/// Declared file content: an exact body to enforce, or a pattern the live
/// content must satisfy. Pattern matching is line-oriented containment - the
/// file matches when any line matches the regex.
#[derive(Debug, Clone)]
pub enum Content {
    Exact(String),
    Matches(Regex),
}

impl Content {
    pub fn is_satisfied_by(&self, body: &str) -> bool {
        match self {
            Content::Exact(want) => want == body,
            Content::Matches(re) => body.lines().any(|line| re.is_match(line)),
        }
    }
}

impl PartialEq for Content {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Content::Exact(a), Content::Exact(b)) => a == b,
            (Content::Matches(a), Content::Matches(b)) => a.as_str() == b.as_str(),
            _ => false,
        }
    }
}

/// Kind-specific attributes
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceSpec {
    Package {
        ensure: PackageEnsure,
    },
    File {
        path: PathBuf,
        ensure: Ensure,
        owner: Option<String>,
        group: Option<String>,
        mode: Option<Mode>,
        content: Option<Content>,
    },
    Directory {
        path: PathBuf,
        owner: Option<String>,
        group: Option<String>,
        mode: Option<Mode>,
        recurse: bool,
    },
    Exec {
        command: String,
        user: Option<String>,
        refresh_only: bool,
    },
    Service {
        ensure: ServiceEnsure,
        enable: bool,
    },
}

impl ResourceSpec {
    pub fn kind(&self) -> Kind {
        match self {
            ResourceSpec::Package { .. } => Kind::Package,
            ResourceSpec::File { .. } => Kind::File,
            ResourceSpec::Directory { .. } => Kind::Directory,
            ResourceSpec::Exec { .. } => Kind::Exec,
            ResourceSpec::Service { .. } => Kind::Service,
        }
    }
}

/// One declared unit of desired system state, plus the relationship edges
/// declared on it.
///
/// `requires` targets must reach a terminal status before this resource is
/// attempted; `notifies` targets receive a refresh signal when applying this
/// resource produced an actual change.
#[derive(Debug, Clone)]
pub struct Resource {
    id: ResourceId,
    spec: ResourceSpec,
    requires: Vec<ResourceId>,
    notifies: Vec<ResourceId>,
}

impl Resource {
    fn new(id: ResourceId, spec: ResourceSpec) -> Self {
        Self {
            id,
            spec,
            requires: Vec::new(),
            notifies: Vec::new(),
        }
    }

    /// A package resource. The name is the package manager's package name.
    pub fn package(name: impl Into<String>, ensure: PackageEnsure) -> Result<Self> {
        let name = name.into();
        let id = ResourceId::new(Kind::Package, name);
        if id.name.trim().is_empty() {
            return Err(Error::InvalidResource {
                id,
                reason: "package name must not be empty".into(),
            });
        }
        Ok(Self::new(id, ResourceSpec::Package { ensure }))
    }

    /// A service resource managed by the node's service manager.
    pub fn service(name: impl Into<String>, ensure: ServiceEnsure, enable: bool) -> Result<Self> {
        let id = ResourceId::new(Kind::Service, name.into());
        if id.name.trim().is_empty() {
            return Err(Error::InvalidResource {
                id,
                reason: "service name must not be empty".into(),
            });
        }
        Ok(Self::new(id, ResourceSpec::Service { ensure, enable }))
    }

    /// Start building a file resource. The path is the resource name.
    pub fn file(path: impl Into<String>) -> FileBuilder {
        FileBuilder {
            path: path.into(),
            ensure: Ensure::Present,
            owner: None,
            group: None,
            mode: None,
            content: None,
        }
    }

    /// Start building a directory resource. The path is the resource name.
    pub fn directory(path: impl Into<String>) -> DirBuilder {
        DirBuilder {
            path: path.into(),
            owner: None,
            group: None,
            mode: None,
            recurse: false,
        }
    }

    /// Start building an exec resource (a one-shot operational command).
    pub fn exec(name: impl Into<String>, command: impl Into<String>) -> ExecBuilder {
        ExecBuilder {
            name: name.into(),
            command: command.into(),
            user: None,
            refresh_only: false,
        }
    }

    pub fn id(&self) -> &ResourceId {
        &self.id
    }

    pub fn spec(&self) -> &ResourceSpec {
        &self.spec
    }

    /// Ordering constraints: targets applied before this resource.
    pub fn requires(&self) -> &[ResourceId] {
        &self.requires
    }

    /// Refresh targets: signalled when applying this resource changed state.
    pub fn notifies(&self) -> &[ResourceId] {
        &self.notifies
    }

    /// Declare that `target` must converge before this resource.
    ///
    /// Listing the same dependency twice does not alter ordering semantics;
    /// the edge set is idempotent.
    pub fn require(mut self, target: ResourceId) -> Self {
        if !self.requires.contains(&target) {
            self.requires.push(target);
        }
        self
    }

    /// Declare that `target` is refreshed when this resource changes.
    pub fn notify(mut self, target: ResourceId) -> Self {
        if !self.notifies.contains(&target) {
            self.notifies.push(target);
        }
        self
    }

    /// Whether this resource only runs in reaction to a refresh signal.
    pub fn is_refresh_only(&self) -> bool {
        matches!(
            self.spec,
            ResourceSpec::Exec {
                refresh_only: true,
                ..
            }
        )
    }
}

fn absolute_path(id: &ResourceId, raw: &str) -> Result<PathBuf> {
    let path = PathBuf::from(raw);
    if !path.is_absolute() {
        return Err(Error::InvalidResource {
            id: id.clone(),
            reason: format!("path must be absolute, got '{raw}'"),
        });
    }
    Ok(path)
}

fn parse_mode(id: &ResourceId, raw: Option<&str>) -> Result<Option<Mode>> {
    match raw {
        None => Ok(None),
        Some(s) => Mode::parse(s).map(Some).ok_or_else(|| Error::InvalidResource {
            id: id.clone(),
            reason: format!("'{s}' is not a valid permission string"),
        }),
    }
}

/// Builder for file resources
#[derive(Debug, Clone)]
pub struct FileBuilder {
    path: String,
    ensure: Ensure,
    owner: Option<String>,
    group: Option<String>,
    mode: Option<String>,
    content: Option<RawContent>,
}

#[derive(Debug, Clone)]
enum RawContent {
    Exact(String),
    Matches(String),
}

impl FileBuilder {
    pub fn ensure(mut self, ensure: Ensure) -> Self {
        self.ensure = ensure;
        self
    }

    pub fn owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn mode(mut self, mode: impl Into<String>) -> Self {
        self.mode = Some(mode.into());
        self
    }

    /// Exact body to enforce; rendered content is opaque to the engine.
    pub fn content_exact(mut self, body: impl Into<String>) -> Self {
        self.content = Some(RawContent::Exact(body.into()));
        self
    }

    /// Line pattern the live content must satisfy.
    pub fn content_matches(mut self, pattern: impl Into<String>) -> Self {
        self.content = Some(RawContent::Matches(pattern.into()));
        self
    }

    pub fn build(self) -> Result<Resource> {
        let id = ResourceId::new(Kind::File, self.path.clone());
        let path = absolute_path(&id, &self.path)?;
        let mode = parse_mode(&id, self.mode.as_deref())?;
        let content = match self.content {
            None => None,
            Some(RawContent::Exact(body)) => Some(Content::Exact(body)),
            Some(RawContent::Matches(pattern)) => {
                let re = Regex::new(&pattern).map_err(|e| Error::InvalidResource {
                    id: id.clone(),
                    reason: format!("invalid content pattern: {e}"),
                })?;
                Some(Content::Matches(re))
            }
        };
        Ok(Resource::new(
            id,
            ResourceSpec::File {
                path,
                ensure: self.ensure,
                owner: self.owner,
                group: self.group,
                mode,
                content,
            },
        ))
    }
}

/// Builder for directory resources
#[derive(Debug, Clone)]
pub struct DirBuilder {
    path: String,
    owner: Option<String>,
    group: Option<String>,
    mode: Option<String>,
    recurse: bool,
}

impl DirBuilder {
    pub fn owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn mode(mut self, mode: impl Into<String>) -> Self {
        self.mode = Some(mode.into());
        self
    }

    /// Enforce ownership recursively through the tree.
    pub fn recurse(mut self, recurse: bool) -> Self {
        self.recurse = recurse;
        self
    }

    pub fn build(self) -> Result<Resource> {
        let id = ResourceId::new(Kind::Directory, self.path.clone());
        let path = absolute_path(&id, &self.path)?;
        let mode = parse_mode(&id, self.mode.as_deref())?;
        Ok(Resource::new(
            id,
            ResourceSpec::Directory {
                path,
                owner: self.owner,
                group: self.group,
                mode,
                recurse: self.recurse,
            },
        ))
    }
}

/// Builder for exec resources
#[derive(Debug, Clone)]
pub struct ExecBuilder {
    name: String,
    command: String,
    user: Option<String>,
    refresh_only: bool,
}

impl ExecBuilder {
    /// Run the command as this user instead of the agent's own account.
    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Never run spontaneously - only in reaction to a refresh signal.
    pub fn refresh_only(mut self, refresh_only: bool) -> Self {
        self.refresh_only = refresh_only;
        self
    }

    pub fn build(self) -> Result<Resource> {
        let id = ResourceId::new(Kind::Exec, self.name);
        if id.name.trim().is_empty() {
            return Err(Error::InvalidResource {
                id,
                reason: "exec name must not be empty".into(),
            });
        }
        if self.command.trim().is_empty() {
            return Err(Error::InvalidResource {
                id,
                reason: "exec command must not be empty".into(),
            });
        }
        Ok(Resource::new(
            id,
            ResourceSpec::Exec {
                command: self.command,
                user: self.user,
                refresh_only: self.refresh_only,
            },
        ))
    }
}

/// The full set of resources for one run, in declaration order.
///
/// Declaration order is the deterministic tie-breaker for resources with no
/// ordering constraint between them.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    resources: Vec<Resource>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a resource, rejecting duplicate ids.
    pub fn add(&mut self, resource: Resource) -> Result<()> {
        if self.resources.iter().any(|r| r.id() == resource.id()) {
            return Err(Error::DuplicateResource(resource.id().clone()));
        }
        self.resources.push(resource);
        Ok(())
    }

    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    pub fn get(&self, id: &ResourceId) -> Option<&Resource> {
        self.resources.iter().find(|r| r.id() == id)
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn package_id_display() {
        let r = Resource::package("base-agent", PackageEnsure::Installed).unwrap();
        assert_eq!(r.id().to_string(), "package[base-agent]");
    }

    #[test]
    fn empty_package_name_rejected() {
        let err = Resource::package("  ", PackageEnsure::Installed).unwrap_err();
        assert!(matches!(err, Error::InvalidResource { .. }));
    }

    #[test]
    fn relative_file_path_rejected() {
        let err = Resource::file("etc/agent.conf").build().unwrap_err();
        assert!(matches!(err, Error::InvalidResource { .. }));
    }

    #[test]
    fn invalid_mode_rejected() {
        let err = Resource::file("/etc/agent.conf").mode("rw-r--r--").build().unwrap_err();
        assert!(err.to_string().contains("permission string"), "{err}");
    }

    #[test]
    fn invalid_pattern_rejected() {
        let err = Resource::file("/etc/agent.conf")
            .content_matches("([")
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidResource { .. }));
    }

    #[test]
    fn mode_parses_three_and_four_digits() {
        assert_eq!(Mode::parse("644").unwrap().bits(), 0o644);
        assert_eq!(Mode::parse("0440").unwrap().bits(), 0o440);
        assert_eq!(Mode::parse("0440").unwrap().to_string(), "0440");
        assert!(Mode::parse("999").is_none());
        assert!(Mode::parse("07777").is_none());
    }

    #[test]
    fn exact_content_compares_whole_body() {
        let c = Content::Exact("a=1\n".into());
        assert!(c.is_satisfied_by("a=1\n"));
        assert!(!c.is_satisfied_by("a=1\nb=2\n"));
    }

    #[test]
    fn pattern_content_matches_any_line() {
        let re = Regex::new(r"^landesk\s+ALL=\(ALL\)\s+NOPASSWD:\s+ALL$").unwrap();
        let c = Content::Matches(re);
        assert!(c.is_satisfied_by("# managed\nlandesk ALL=(ALL)  NOPASSWD: ALL\n"));
        assert!(!c.is_satisfied_by("# managed\nnobody ALL=(ALL) NOPASSWD: ALL\n"));
    }

    #[test]
    fn require_edges_deduplicate() {
        let dep = ResourceId::new(Kind::Package, "base-agent");
        let r = Resource::file("/etc/agent.conf")
            .build()
            .unwrap()
            .require(dep.clone())
            .require(dep.clone());
        assert_eq!(r.requires(), &[dep]);
    }

    #[test]
    fn duplicate_catalog_id_rejected() {
        let mut catalog = Catalog::new();
        catalog
            .add(Resource::package("pds2", PackageEnsure::Installed).unwrap())
            .unwrap();
        let err = catalog
            .add(Resource::package("pds2", PackageEnsure::Absent).unwrap())
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateResource(_)));
    }
}
