use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{Labels, Pipeline, Project, RefKey};
use crate::error::ExporterError;

/// The kind of git reference a pipeline ran for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RefKind {
    Branch,
    Tag,
    MergeRequest,
}

impl RefKind {
    pub const ALL: [Self; 3] = [Self::Branch, Self::Tag, Self::MergeRequest];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Branch => "branch",
            Self::Tag => "tag",
            Self::MergeRequest => "merge-request",
        }
    }
}

impl fmt::Display for RefKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RefKind {
    type Err = ExporterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "branch" => Ok(Self::Branch),
            "tag" => Ok(Self::Tag),
            "merge-request" => Ok(Self::MergeRequest),
            other => Err(ExporterError::InvalidRefKind(other.to_string())),
        }
    }
}

/// A branch, tag or merge request of a project.
///
/// The project is a copy taken when the ref was registered, later changes to
/// the stored project are not reflected here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ref {
    pub project: Project,
    pub kind: RefKind,
    /// Branch or tag name, or the merge request IID
    pub name: String,
    /// Last pipeline observed for this ref
    #[serde(default)]
    pub latest_pipeline: Option<Pipeline>,
}

impl Ref {
    pub fn new(project: Project, kind: RefKind, name: impl Into<String>) -> Self {
        Self {
            project,
            kind,
            name: name.into(),
            latest_pipeline: None,
        }
    }

    pub fn key(&self) -> RefKey {
        RefKey(format!("{}:{}:{}", self.project.name, self.kind, self.name))
    }

    /// Labels shared by every series of this ref.
    pub fn default_labels(&self) -> Labels {
        Labels::from([
            ("project".to_string(), self.project.name.clone()),
            ("kind".to_string(), self.kind.to_string()),
            ("ref".to_string(), self.name.clone()),
        ])
    }
}
