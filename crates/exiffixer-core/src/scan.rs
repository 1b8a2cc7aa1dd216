use std::io;

use crate::control::{CancellationToken, CancelledError};
use crate::media::{Locator, MediaCandidate, Node};

/// Directory enumeration provided by the host.
pub trait DirectoryListing {
    /// Immediate children of a directory.
    fn list(&self, dir: &Locator) -> io::Result<Vec<Node>>;
}

/// Walk `root` depth-first and keep every file the classifier accepts.
///
/// Unreadable subdirectories are skipped; an unreadable root is an error.
pub fn collect_candidates(
    listing: &dyn DirectoryListing,
    root: &Locator,
    token: &CancellationToken,
) -> anyhow::Result<Vec<MediaCandidate>> {
    token.check()?;
    let nodes = listing
        .list(root)
        .map_err(|e| anyhow::anyhow!("cannot list {}: {}", root, e))?;

    let mut candidates = Vec::new();
    walk(listing, nodes, token, &mut candidates)?;
    tracing::info!("scan of {} found {} candidates", root, candidates.len());
    Ok(candidates)
}

fn walk(
    listing: &dyn DirectoryListing,
    nodes: Vec<Node>,
    token: &CancellationToken,
    candidates: &mut Vec<MediaCandidate>,
) -> Result<(), CancelledError> {
    for node in nodes {
        if node.is_directory {
            token.check()?;
            match listing.list(&node.locator) {
                Ok(children) => walk(listing, children, token, candidates)?,
                Err(e) => tracing::warn!("skipping {}: {}", node.locator, e),
            }
        } else if let Some(candidate) = MediaCandidate::from_node(&node) {
            candidates.push(candidate);
        }
    }
    Ok(())
}
