mod commits;
mod core;
mod environments;
mod pipelines;
mod projects;

pub use self::core::GitLabClient;
