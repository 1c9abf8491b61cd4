//! Expansion of editable requirements into their nested requirement lists.
//!
//! An editable requirement hosted in a git repository
//! (`-e git+https://host/repo@branch#egg=repo`) or in a local directory
//! (`-e ./checkout`) carries its own `requirements.txt`. Expansion fetches that
//! file, expands every line the same way, and returns the nested requirements
//! followed by the root, so dependencies always precede the requirement that
//! asked for them.
//!
//! # Visited locations
//!
//! A [`ResolutionContext`] lives for one top-level resolution and remembers
//! every `(link, ref)` pair and local directory it has already expanded. A
//! location seen a second time contributes nothing, which bounds network
//! access in diamond-shaped graphs and terminates cycles:
//!
//! ```text
//! A -> B, C;  B -> D;  C -> D        expands to  [D.., D, B, C, A]   (D fetched once)
//! A -> B;     B -> A                 expands to  [B, A]
//! ```
//!
//! # Traversal
//!
//! The traversal keeps an explicit work stack instead of recursing, so a deep
//! chain of editable repositories cannot overflow the async call stack.

pub mod dedup;
pub mod repository;

pub use dedup::dedup;
pub use repository::RepositoryRef;

use crate::core::RobustusError;
use crate::requirement::{Requirement, filter_requirement_lines, parse, parser};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Name of the nested requirement list inside an editable source.
pub const REQUIREMENTS_FILE: &str = "requirements.txt";

/// Reads a file out of a remote repository.
///
/// Implementations return `Ok(None)` when the file does not exist at that
/// ref, and `Err` only for transport failures.
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    /// Fetches `path` from `link` at `reference` (default branch when `None`)
    /// as a list of lines.
    async fn fetch(&self, link: &str, reference: Option<&str>, path: &str) -> Result<Option<Vec<String>>>;
}

/// A location already expanded during this resolution.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Visited {
    Repository(RepositoryRef),
    Directory(PathBuf),
}

/// Pending work on the expansion stack.
enum Frame {
    Expand(Requirement),
    Emit(Requirement),
}

/// Outcome of inspecting one requirement.
enum Nested {
    /// Not expandable, emitted as is.
    Leaf,
    /// Location expanded earlier in this resolution.
    AlreadyVisited,
    Children(Vec<Requirement>),
}

/// State shared by every expansion of one top-level resolution.
pub struct ResolutionContext {
    fetcher: Arc<dyn ContentFetcher>,
    visited: HashSet<Visited>,
}

impl ResolutionContext {
    pub fn new(fetcher: Arc<dyn ContentFetcher>) -> Self {
        Self {
            fetcher,
            visited: HashSet::new(),
        }
    }

    /// Expands `root` depth-first, returning nested requirements before `root`.
    ///
    /// Non-editable requirements and requirements without an expandable
    /// location come back as `[root]`. A location visited earlier in this
    /// context yields `[]`.
    ///
    /// # Errors
    ///
    /// [`RobustusError::MissingEggFragment`], [`RobustusError::MissingRequirementsFile`],
    /// [`RobustusError::MalformedSpecifier`] for a bad nested line, or a
    /// fetcher failure. Any error aborts the whole expansion.
    pub async fn expand(&mut self, root: Requirement) -> Result<Vec<Requirement>> {
        let mut expanded = Vec::new();
        let mut stack = vec![Frame::Expand(root)];

        while let Some(frame) = stack.pop() {
            let requirement = match frame {
                Frame::Emit(requirement) => {
                    expanded.push(requirement);
                    continue;
                }
                Frame::Expand(requirement) => requirement,
            };

            match self.nested_requirements(&requirement).await? {
                Nested::Leaf => expanded.push(requirement),
                Nested::AlreadyVisited => {
                    debug!("Skipping already expanded {}", requirement.freeze());
                }
                Nested::Children(children) => {
                    stack.push(Frame::Emit(requirement));
                    stack.extend(children.into_iter().rev().map(Frame::Expand));
                }
            }
        }

        Ok(expanded)
    }

    /// Parses and expands command-line specifiers in order.
    pub async fn expand_all<S: AsRef<str>>(&mut self, specifiers: &[S]) -> Result<Vec<Requirement>> {
        let mut expanded = Vec::new();
        for specifier in specifiers {
            let requirement = parse(specifier.as_ref())?;
            expanded.extend(self.expand(requirement).await?);
        }
        Ok(expanded)
    }

    /// Reads a requirement file and expands every entry in order.
    pub async fn expand_file(&mut self, path: &Path) -> Result<Vec<Requirement>> {
        let requirements = parser::read_requirement_file(path).await?;
        let mut expanded = Vec::new();
        for requirement in requirements {
            expanded.extend(
                self.expand(requirement)
                    .await
                    .with_context(|| format!("while expanding {}", path.display()))?,
            );
        }
        Ok(expanded)
    }

    async fn nested_requirements(&mut self, requirement: &Requirement) -> Result<Nested> {
        if !requirement.is_editable() {
            return Ok(Nested::Leaf);
        }
        let Some(source) = requirement.source() else {
            return Ok(Nested::Leaf);
        };

        let (visit, lines) = if let Some(directory) = source.local_path() {
            let key = tokio::fs::canonicalize(&directory).await.unwrap_or_else(|_| directory.clone());
            let visit = Visited::Directory(key);
            if self.visited.contains(&visit) {
                return Ok(Nested::AlreadyVisited);
            }
            (visit, read_local_requirements(&directory).await?)
        } else if let Some(repository) = RepositoryRef::from_requirement(requirement)? {
            let visit = Visited::Repository(repository.clone());
            if self.visited.contains(&visit) {
                return Ok(Nested::AlreadyVisited);
            }
            debug!("Fetching {REQUIREMENTS_FILE} from {repository}");
            let lines = self
                .fetcher
                .fetch(&repository.link, repository.reference.as_deref(), REQUIREMENTS_FILE)
                .await
                .with_context(|| format!("while expanding {}", requirement.freeze()))?;
            (visit, lines)
        } else {
            return Ok(Nested::Leaf);
        };

        let lines = lines.ok_or_else(|| RobustusError::MissingRequirementsFile {
            specifier: requirement.freeze(),
        })?;
        self.visited.insert(visit);

        let children = filter_requirement_lines(lines)
            .iter()
            .map(|line| parse(line))
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| {
                format!("in {REQUIREMENTS_FILE} of {}", requirement.freeze())
            })?;
        Ok(Nested::Children(children))
    }
}

async fn read_local_requirements(directory: &Path) -> Result<Option<Vec<String>>> {
    let path = directory.join(REQUIREMENTS_FILE);
    match tokio::fs::read_to_string(&path).await {
        Ok(content) => Ok(Some(content.lines().map(str::to_string).collect())),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(error) => {
            Err(error).with_context(|| format!("Failed to read {}", path.display()))
        }
    }
}
