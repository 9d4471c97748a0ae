//! Fetch command - make the releases directory match Kilnfile.lock

use crate::cli::args::FetchArgs;
use crate::config::ConfigManager;
use crate::error::KilnResult;
use crate::fetch::{FetchOptions, Fetcher};
use crate::source;
use crate::ui::{self, UiContext};

/// Execute the fetch command
pub async fn execute(args: FetchArgs) -> KilnResult<()> {
    let ctx = UiContext::detect();
    ui::intro(&ctx, "kiln fetch");

    let config = ConfigManager::new(args.paths.kilnfile.clone());
    let kilnfile = config.load_kilnfile().await?;
    let lock = config.load_lock().await?;

    if !args.allow_only_publishable_releases {
        ui::step_warn(
            &ctx,
            "Fetching from every release source; releases may be development builds. \
             Pass --allow-only-publishable-releases for a shippable tile.",
        );
    }
    let sources = source::release_sources(&kilnfile, args.allow_only_publishable_releases, &ctx)?;

    ConfigManager::ensure_releases_dir(&args.paths.releases_directory).await?;

    let options = FetchOptions {
        releases_dir: args.paths.releases_directory.clone(),
        download_threads: args.download_threads,
        no_confirm: args.no_confirm,
    };
    let resolved = Fetcher::new(ctx.clone()).fetch(&lock, &sources, &options).await?;

    ui::outro_success(
        &ctx,
        &format!(
            "{} release(s) ready in {}",
            resolved.len(),
            options.releases_dir.display()
        ),
    );
    Ok(())
}
