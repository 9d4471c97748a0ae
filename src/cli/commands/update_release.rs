//! Update-release command - bump one pin in Kilnfile.lock

use crate::cli::args::UpdateReleaseArgs;
use crate::config::ConfigManager;
use crate::error::KilnResult;
use crate::source;
use crate::ui::UiContext;
use crate::update::{ReleaseUpdater, UpdateRequest};

/// Execute the update-release command
pub async fn execute(args: UpdateReleaseArgs) -> KilnResult<()> {
    let ctx = UiContext::detect();

    let config = ConfigManager::new(args.paths.kilnfile.clone());
    let kilnfile = config.load_kilnfile().await?;
    let sources = source::release_sources(&kilnfile, args.allow_only_publishable_releases, &ctx)?;

    ConfigManager::ensure_releases_dir(&args.paths.releases_directory).await?;

    let request = UpdateRequest {
        name: args.name,
        version: args.version,
        releases_dir: args.paths.releases_directory,
        download_threads: 1,
    };
    ReleaseUpdater::new(ctx)
        .update(&config.lock_path(), &sources, &request)
        .await?;

    Ok(())
}
