//! Config loader: assembles sources in precedence order and deserializes.

use crate::config::merge::merge_policy;
use crate::config::sources::{env, global_file, project_file};
use crate::config::StackConfig;
use crate::error::ApiError;
use config::File;
use std::path::Path;
use tracing::debug;

pub struct ConfigLoader;

impl ConfigLoader {
    /// Defaults, global file, project file, then environment.
    pub fn load(project_root: &Path) -> Result<StackConfig, ApiError> {
        let builder = merge_policy::builder_with_defaults()?;
        let builder = global_file::add_to_builder(builder)?;
        let builder = project_file::add_to_builder(builder, project_root)?;
        let builder = env::add_to_builder(builder);
        let config: StackConfig = builder.build()?.try_deserialize()?;
        debug!(project = %project_root.display(), "configuration loaded");
        config.validated()
    }

    /// Defaults, the given file, then environment. The file must exist.
    pub fn load_from_file(path: &Path) -> Result<StackConfig, ApiError> {
        if !path.exists() {
            return Err(ApiError::ConfigError(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        let builder = merge_policy::builder_with_defaults()?
            .add_source(File::from(path.to_path_buf()).required(true));
        let builder = env::add_to_builder(builder);
        let config: StackConfig = builder.build()?.try_deserialize()?;
        config.validated()
    }
}
