//! Document tree traversal
//!
//! The [`DocumentTreeWalker`] turns a [`Container`] into the flat list of
//! [`FileRecord`]s it holds, each tagged with its ancestry (container code
//! followed by the names of the enclosing folders).
//!
//! ## Traversal
//!
//! Folders are processed from an explicit worklist rather than by recursion.
//! Every pending entry carries its ancestry and depth, so the depth guard is
//! a simple comparison and no call stack grows with the tree. For each folder
//! taken off the worklist:
//!
//! 1. A non-downloadable folder (inactive, or an upload drop box) contributes
//!    no files. Its subtree is pruned as well unless
//!    `descend_into_non_downloadable` is set.
//! 2. If the folder reports sub-folders, they are listed and their whole
//!    subtrees are walked first, in server order.
//! 3. The folder's own files are listed and recorded with the folder's
//!    ancestry.
//!
//! Step 3 is queued as a [`Step::ListFiles`] entry underneath the children,
//! so a folder's files follow the files of all its descendants.
//!
//! Requests are issued one at a time and each one is raced against the
//! cancellation token, so a stalled request does not hold up a cancelled walk.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use lmsdrive_core::config::SyncConfig;
use lmsdrive_core::domain::{Container, DiscoveryError, FileRecord, FolderNode};
use lmsdrive_core::ports::IDocumentSource;

/// An entry on the traversal worklist
enum Step {
    /// List the folder's children and queue their subtrees
    Visit { node: FolderNode, depth: usize },
    /// List the folder's own files; queued beneath its children
    ListFiles(FolderNode),
}

/// Walks a container's folder tree through an [`IDocumentSource`]
#[derive(Clone)]
pub struct DocumentTreeWalker {
    source: Arc<dyn IDocumentSource>,
    max_depth: usize,
    descend_into_non_downloadable: bool,
}

impl DocumentTreeWalker {
    pub fn new(source: Arc<dyn IDocumentSource>, max_depth: usize) -> Self {
        Self {
            source,
            max_depth,
            descend_into_non_downloadable: false,
        }
    }

    /// Creates a walker using the traversal settings of the `sync` section
    pub fn from_config(source: Arc<dyn IDocumentSource>, config: &SyncConfig) -> Self {
        Self::new(source, config.max_depth)
            .descend_into_non_downloadable(config.descend_into_non_downloadable)
    }

    /// Visits the descendants of non-downloadable folders instead of pruning them
    pub fn descend_into_non_downloadable(mut self, descend: bool) -> Self {
        self.descend_into_non_downloadable = descend;
        self
    }

    /// Lists the visible child folders of `parent_id`, in server order
    ///
    /// Only records carrying an access attribute are kept. Each node's
    /// ancestry is `parent_ancestry` followed by its own name.
    pub async fn discover_folders(
        &self,
        parent_id: &str,
        parent_ancestry: &[String],
    ) -> Result<Vec<FolderNode>, DiscoveryError> {
        let folders = self.source.list_folders(parent_id).await?;

        Ok(folders
            .into_iter()
            .filter(|f| f.has_access)
            .map(|f| {
                FolderNode::new(
                    f.id,
                    f.name,
                    f.is_active,
                    f.allow_upload,
                    f.sub_folder_count > 0,
                )
                .under(parent_ancestry)
            })
            .collect())
    }

    /// Discovers every file under `container`
    ///
    /// Files come out in post-order: the files of a folder's descendants
    /// precede its own, and siblings keep server order.
    ///
    /// If `cancel` is raised the walk stops, abandoning any request in
    /// flight, and returns the files found so far.
    ///
    /// # Errors
    ///
    /// The first listing failure aborts the whole container, as does a
    /// folder nested deeper than the configured maximum
    /// ([`DiscoveryError::DepthExceeded`]).
    #[instrument(skip(self, container, cancel), fields(container = %container.code))]
    pub async fn discover_files(
        &self,
        container: &Container,
        cancel: &CancellationToken,
    ) -> Result<Vec<FileRecord>, DiscoveryError> {
        let mut files = Vec::new();
        let root_ancestry = vec![container.code.clone()];
        let Some(roots) =
            until_cancelled(cancel, self.discover_folders(&container.id, &root_ancestry)).await?
        else {
            info!("Discovery cancelled");
            return Ok(files);
        };

        let mut worklist: Vec<Step> = Vec::new();
        self.push_children(&mut worklist, roots, 1)?;

        let mut visited = 0usize;

        while let Some(step) = worklist.pop() {
            if cancel.is_cancelled() {
                info!(found = files.len(), "Discovery cancelled");
                break;
            }

            match step {
                Step::Visit { node, depth } => {
                    visited += 1;

                    if !node.downloadable && !self.descend_into_non_downloadable {
                        debug!(folder = %node.name, "Pruning non-downloadable folder");
                        continue;
                    }

                    let has_children = node.has_children;
                    let listing = until_cancelled(cancel, async {
                        if has_children {
                            self.discover_folders(&node.id, &node.ancestry).await
                        } else {
                            Ok(Vec::new())
                        }
                    })
                    .await?;
                    let Some(children) = listing else {
                        info!(found = files.len(), "Discovery cancelled");
                        break;
                    };

                    if node.downloadable {
                        worklist.push(Step::ListFiles(node));
                    }
                    self.push_children(&mut worklist, children, depth + 1)?;
                }
                Step::ListFiles(node) => {
                    let Some(listed) = until_cancelled(cancel, self.source.list_files(&node.id)).await?
                    else {
                        info!(found = files.len(), "Discovery cancelled");
                        break;
                    };
                    files.extend(listed.into_iter().map(|remote| FileRecord {
                        id: remote.id,
                        name: remote.name,
                        ancestry: node.ancestry.clone(),
                        last_updated: remote.last_updated,
                    }));
                }
            }
        }

        debug!(folders = visited, files = files.len(), "Discovery finished");
        Ok(files)
    }

    /// Queues `children` so that the first child is popped next
    fn push_children(
        &self,
        worklist: &mut Vec<Step>,
        children: Vec<FolderNode>,
        depth: usize,
    ) -> Result<(), DiscoveryError> {
        if !children.is_empty() && depth > self.max_depth {
            return Err(DiscoveryError::DepthExceeded {
                max_depth: self.max_depth,
            });
        }
        worklist.extend(
            children
                .into_iter()
                .rev()
                .map(|node| Step::Visit { node, depth }),
        );
        Ok(())
    }
}

/// Resolves to `None` if `cancel` is raised before `request` completes
async fn until_cancelled<T, F>(
    cancel: &CancellationToken,
    request: F,
) -> Result<Option<T>, DiscoveryError>
where
    F: std::future::Future<Output = Result<T, DiscoveryError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Ok(None),
        result = request => result.map(Some),
    }
}
