//! Latest-release selection per major version line.

use std::collections::HashMap;
use std::sync::Arc;

use semver::Version;
use tracing::warn;

use super::models::Transformer;

/// Picks the highest release of each `(slug, major)` line.
///
/// Pre-releases are skipped and `0.x` is bucketed with `1.x`. Versions
/// that are not valid semver are skipped with a warning. Output keeps the
/// order in which each bucket was first seen.
pub fn select_latest(items: &[Arc<Transformer>]) -> Vec<Arc<Transformer>> {
    let mut order: Vec<String> = Vec::new();
    let mut best: HashMap<String, (Version, Arc<Transformer>)> = HashMap::new();

    for item in items {
        let version = match Version::parse(&item.version) {
            Ok(version) => version,
            Err(e) => {
                warn!(slug = %item.slug, version = %item.version, error = %e, "Skipping transformer with invalid version");
                continue;
            }
        };

        if !version.pre.is_empty() {
            continue;
        }

        let major = if version.major == 0 { 1 } else { version.major };
        let bucket = format!("{}@{}", item.slug, major);

        match best.get(&bucket) {
            Some((current, _)) if *current >= version => {}
            Some(_) => {
                best.insert(bucket, (version, item.clone()));
            }
            None => {
                order.push(bucket.clone());
                best.insert(bucket, (version, item.clone()));
            }
        }
    }

    order
        .into_iter()
        .filter_map(|bucket| best.remove(&bucket).map(|(_, item)| item))
        .collect()
}
