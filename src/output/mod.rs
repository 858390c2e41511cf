mod styling;
mod summary;
mod tables;

pub use styling::{dim, magenta_bold};
pub use summary::print_config_summary;

/// Prints the exporter banner to stderr.
///
/// Displays the tool name, version, and description at the start of execution.
pub fn print_banner() {
    eprintln!(
        r"
{} {}
  {}
",
        magenta_bold("📈 CILens Exporter"),
        dim(env!("CARGO_PKG_VERSION")),
        dim("GitLab CI/CD pipelines and deployments exporter")
    );
}
