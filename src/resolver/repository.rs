//! Repository coordinates of an editable requirement.
//!
//! `-e git+https://github.com/company/my_package@branch_name#egg=my_package`
//! designates the repository `https://github.com/company/my_package` at ref
//! `branch_name`. The `@` that separates the ref is searched for after the
//! URL authority so a `user@host` part is never mistaken for it.

use crate::core::RobustusError;
use crate::requirement::Requirement;
use std::fmt;

/// URL prefix marking a git-hosted requirement.
pub const GIT_TRANSPORT_PREFIX: &str = "git+";

/// A `(link, ref)` pair; a missing ref means the default branch.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepositoryRef {
    pub link: String,
    pub reference: Option<String>,
}

impl RepositoryRef {
    /// Extracts the repository coordinates of `requirement`.
    ///
    /// Returns `Ok(None)` when the requirement is not hosted in a supported
    /// repository (no source, a plain archive URL, a local path).
    ///
    /// # Errors
    ///
    /// [`RobustusError::MissingEggFragment`] for a git location without
    /// `#egg=<name>`.
    pub fn from_requirement(requirement: &Requirement) -> Result<Option<Self>, RobustusError> {
        let Some(source) = requirement.source() else {
            return Ok(None);
        };
        let Some(location) = source.as_str().strip_prefix(GIT_TRANSPORT_PREFIX) else {
            return Ok(None);
        };

        if source.egg_name().is_none() {
            return Err(RobustusError::MissingEggFragment {
                specifier: requirement.freeze(),
            });
        }
        let location = location.split_once('#').map_or(location, |(head, _)| head);

        let path_start = location
            .find("://")
            .map(|scheme_end| scheme_end + 3)
            .and_then(|authority_start| {
                location[authority_start..].find('/').map(|slash| authority_start + slash)
            })
            .unwrap_or(0);

        Ok(Some(match location[path_start..].rfind('@') {
            Some(at) => {
                let at = path_start + at;
                Self {
                    link: location[..at].to_string(),
                    reference: Some(location[at + 1..].to_string()).filter(|r| !r.is_empty()),
                }
            }
            None => Self {
                link: location.to_string(),
                reference: None,
            },
        }))
    }
}

impl fmt::Display for RepositoryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reference {
            Some(reference) => write!(f, "{}@{reference}", self.link),
            None => f.write_str(&self.link),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repository(text: &str) -> Option<RepositoryRef> {
        RepositoryRef::from_requirement(&text.parse().unwrap()).unwrap()
    }

    #[test]
    fn test_https_with_branch() {
        let repo =
            repository("-e git+https://github.com/company/my_package@branch_name#egg=my_package")
                .unwrap();
        assert_eq!(repo.link, "https://github.com/company/my_package");
        assert_eq!(repo.reference.as_deref(), Some("branch_name"));
        assert_eq!(repo.to_string(), "https://github.com/company/my_package@branch_name");
    }

    #[test]
    fn test_ssh_user_is_not_a_ref() {
        let repo = repository(
            "-e git+ssh://git@github.com/company/my_package@another_branch#egg=my_package",
        )
        .unwrap();
        assert_eq!(repo.link, "ssh://git@github.com/company/my_package");
        assert_eq!(repo.reference.as_deref(), Some("another_branch"));

        let repo =
            repository("-e git+ssh://git@github.com/company/my_package#egg=my_package").unwrap();
        assert_eq!(repo.link, "ssh://git@github.com/company/my_package");
        assert_eq!(repo.reference, None);
    }

    #[test]
    fn test_not_a_repository() {
        assert_eq!(repository("numpy==1.7.2"), None);
        assert_eq!(repository("-e http://some_url/some_package.tar.gz"), None);
        assert_eq!(repository("-e /tmp/checkout"), None);
    }

    #[test]
    fn test_missing_egg_fragment() {
        let requirement: Requirement = "-e git+https://github.com/company/my_package@master"
            .parse()
            .unwrap();
        let error = RepositoryRef::from_requirement(&requirement).unwrap_err();
        match error {
            RobustusError::MissingEggFragment {
                specifier,
            } => assert_eq!(specifier, "-e git+https://github.com/company/my_package@master"),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
