mod client;
mod fetcher;
mod types;

pub use client::GitLabClient;
