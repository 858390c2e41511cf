//! Entities tracked by the exporter and the keys that address them in the store.
//!
//! Keys are derived from identity attributes only, so two values describing the
//! same project, ref, environment or metric always land in the same store slot
//! whichever code path built them.

mod environment;
mod metric;
mod pipeline;
mod project;
mod refs;

pub use environment::{Deployment, Environment};
pub use metric::{Labels, Metric, MetricKind};
pub use pipeline::Pipeline;
pub use project::Project;
pub use refs::{Ref, RefKind};

macro_rules! define_key {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

define_key!(
    /// `path/with/namespace`
    ProjectKey
);
define_key!(
    /// `project:kind:name`
    RefKey
);
define_key!(
    /// `project:environment-name`
    EnvironmentKey
);
define_key!(
    /// `metric_name{label="value",...}` with labels sorted by name
    MetricKey
);
