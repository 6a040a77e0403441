//! The fixed set of pipeline variants.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A variant of the pipeline, one per supported host build tool.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Flavor {
    Gradle,
    Maven,
}

impl Flavor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Flavor::Gradle => "gradle",
            Flavor::Maven => "maven",
        }
    }
}

impl fmt::Display for Flavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
