//! The two stages run by the CLI, each a complete unit of work.

use std::path::PathBuf;

use chrono::{DateTime, Offset, Utc};
use log::{info, warn};

use crate::{
    config::Config,
    error::{RenderError, StoreError},
    fetcher::{Fetcher, log_summary},
    history,
    model::Snapshot,
    provider::StationSource,
    render::{render_banner, write_outputs},
    store,
};

/// Fetch every configured station, overwrite the snapshot, and append to
/// the per-station history when enabled and `with_history` is set.
pub async fn fetch_stage(
    config: &Config,
    source: &dyn StationSource,
    with_history: bool,
) -> Result<Snapshot, StoreError> {
    info!("Fetching {} stations", config.stations.len());

    let snapshot = Fetcher::new(source, &config.source).run(&config.stations).await;
    store::save_snapshot(&config.paths.snapshot, &snapshot)?;

    if with_history && config.history.enabled {
        let offset = config.render.offset().unwrap_or_else(|| Utc.fix());
        let written = history::append_snapshot(
            &config.history.dir,
            &snapshot,
            offset,
            config.history.max_entries,
        );
        info!("History updated for {written} stations in {}", config.history.dir.display());
    }

    log_summary(&snapshot, &config.stations);
    Ok(snapshot)
}

/// Render the latest snapshot into the template and write both outputs.
///
/// A missing snapshot is fatal unless `allow_missing_snapshot` is set, in
/// which case the "no data" banner is rendered. A corrupt snapshot or any
/// template problem is always fatal, and nothing is written.
pub fn render_stage(
    config: &Config,
    allow_missing_snapshot: bool,
    now: DateTime<Utc>,
) -> Result<Vec<PathBuf>, RenderError> {
    let snapshot = match store::load_snapshot(&config.paths.snapshot) {
        Ok(snapshot) => Some(snapshot),
        Err(StoreError::NotFound(path)) if allow_missing_snapshot => {
            warn!("No snapshot at {}, rendering without data", path.display());
            None
        }
        Err(e) => return Err(e.into()),
    };

    let html = render_banner(config, snapshot.as_ref(), now)?;
    let written = write_outputs(&html, &config.paths)?;

    for path in &written {
        info!("Banner written to {}", path.display());
    }
    Ok(written)
}
