//! Common constants used throughout scriptpack.

/// Supported configuration file names, tried in order
pub const CONFIG_FILES: [&str; 3] = ["scriptpack.yml", "scriptpack.yaml", "scriptpack.json"];

/// Name of the version file inside every staging tree and archive
pub const VERSION_FILE: &str = "VERSION";

/// Name of the license file inside every staging tree and archive
pub const LICENSE_FILE: &str = "LICENSE";

/// Namespace for shared and generated scripts inside a staging tree
pub const LIB_DIR: &str = "lib";

/// Marker written into an unpacked generator installation
pub const INSTALL_MARKER: &str = ".scriptpack-install";

/// Environment variable consulted for the release token
pub const DEFAULT_TOKEN_ENV: &str = "GITHUB_ACCESS_TOKEN";

/// Fixed base names of the three lint reports
pub const REPORT_BASENAME: &str = "shellcheck";
