//! Node service
//!
//! The single serialization point. One task owns the volume registry, both
//! admission queues, the tag index, and the node identity; every request
//! funnels through its command channel and is handled to completion before
//! the next. Monitors and per-request tag readers run as separate tasks and
//! only ever talk to the service through the same channel.

use crate::common::layout::{self, ObjectKind, Timestamp};
use crate::common::{Error, NodeConfig, Result};
use crate::node::monitor;
use crate::node::queue::{Admission, ClientId, WorkQueue};
use crate::node::tags::{TagEntry, TagIndex};
use crate::node::volume::{self, Volume};
use std::collections::HashMap;
use std::fs;
use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// Where an admitted blob write should land: the local file path handed to
/// the put listener and the URL the client publishes.
#[derive(Debug, Clone)]
pub struct BlobTarget {
    pub local: PathBuf,
    pub url: String,
}

struct PendingPut {
    name: String,
    reply: oneshot::Sender<Result<BlobTarget>>,
}

struct PendingGet {
    reply: oneshot::Sender<Result<()>>,
}

pub(crate) enum Command {
    GetTags {
        reply: oneshot::Sender<Vec<String>>,
    },
    GetVolumes {
        reply: oneshot::Sender<(PathBuf, Vec<Volume>)>,
    },
    GetDiskspace {
        reply: oneshot::Sender<(u64, u64)>,
    },
    GetBlob {
        client: ClientId,
        reply: oneshot::Sender<Result<()>>,
    },
    PutBlob {
        name: String,
        client: ClientId,
        reply: oneshot::Sender<Result<BlobTarget>>,
    },
    GetTagTimestamp {
        name: String,
        reply: oneshot::Sender<Result<(Timestamp, String)>>,
    },
    GetTagData {
        objname: String,
        volume: String,
        reply: oneshot::Sender<Result<Vec<u8>>>,
    },
    PutTagData {
        objname: String,
        data: Vec<u8>,
        reply: oneshot::Sender<Result<String>>,
    },
    PutTagCommit {
        objname: String,
        destinations: HashMap<String, String>,
        reply: oneshot::Sender<Result<String>>,
    },
    UpdateVolumes(Vec<Volume>),
    UpdateTags(TagIndex),
    ClientGone(ClientId),
}

/// State owned exclusively by the service task
struct Core {
    node_name: String,
    root: PathBuf,
    volumes: Vec<Volume>,
    tags: TagIndex,
}

impl Core {
    fn start_put(&self, pending: PendingPut) {
        let _ = pending.reply.send(self.prepare_blob(&pending.name));
    }

    fn start_get(pending: PendingGet) {
        // admission is the whole handshake: the client now streams the blob
        // through the get listener
        let _ = pending.reply.send(Ok(()));
    }

    fn prepare_blob(&self, name: &str) -> Result<BlobTarget> {
        let vol = volume::choose_best(&self.volumes)
            .ok_or_else(|| Error::Internal("volume registry is empty".into()))?;
        let (local, url) =
            layout::hashdir(name, &self.node_name, ObjectKind::Blob, &self.root, &vol.name);
        layout::ensure_dir(&local).map_err(|e| Error::Prepare {
            local: local.clone(),
            reason: e.to_string(),
        })?;
        Ok(BlobTarget { local, url })
    }

    fn put_tag_data(&self, objname: &str, data: &[u8]) -> Result<String> {
        let vol = volume::choose_best(&self.volumes)
            .ok_or_else(|| Error::Internal("volume registry is empty".into()))?
            .name
            .clone();
        let (local, _) =
            layout::hashdir(objname, &self.node_name, ObjectKind::Tag, &self.root, &vol);
        layout::ensure_dir(&local)?;
        fs::write(layout::partial_path(&local), data)?;
        Ok(vol)
    }

    fn commit_tag(&mut self, objname: &str, destinations: &HashMap<String, String>) -> Result<String> {
        let volume = destinations
            .get(&self.node_name)
            .ok_or_else(|| Error::NoCommitTarget(self.node_name.clone()))?;
        // parse before renaming: a malformed name must not leave a committed
        // file the index never learns about
        let (tag_name, timestamp) = layout::unpack_objname(objname)?;
        let (local, url) =
            layout::hashdir(objname, &self.node_name, ObjectKind::Tag, &self.root, volume);
        layout::safe_rename(&layout::partial_path(&local), &local)?;
        self.tags.replace(
            tag_name,
            TagEntry {
                timestamp,
                volume: volume.clone(),
            },
        );
        Ok(url)
    }
}

/// The node service task
pub struct NodeService {
    core: Core,
    put_queue: WorkQueue<PendingPut>,
    get_queue: WorkQueue<PendingGet>,
    rx: mpsc::UnboundedReceiver<Command>,
}

impl NodeService {
    /// Discover volumes, build the initial tag index, start the service
    /// task and its monitors, and hand back the request surface.
    ///
    /// The whole init runs under the configured startup bound.
    pub async fn start(config: NodeConfig) -> Result<NodeHandle> {
        config.validate()?;

        tracing::info!("starting node service: {}", config.node_name);
        tracing::info!("  data root: {}", config.data_root.display());
        tracing::info!(
            "  admission: put {}/{}, get {}/{}",
            config.put_max,
            config.queue_length,
            config.get_max,
            config.queue_length
        );

        let root = config.data_root.clone();
        let init_root = root.clone();
        let init = tokio::task::spawn_blocking(move || -> Result<(Vec<Volume>, TagIndex)> {
            let discovered = volume::discover(&init_root)?;
            let measured = volume::refresh(&init_root, &discovered);
            let volumes = volume::merge(&discovered, &measured);
            let tags = TagIndex::scan(&init_root, &volumes);
            Ok((volumes, tags))
        });
        let (volumes, tags) = match tokio::time::timeout(config.startup_timeout(), init).await {
            Ok(join) => {
                join.map_err(|e| Error::Internal(format!("startup task failed: {}", e)))??
            }
            Err(_) => return Err(Error::Internal("node startup timed out".into())),
        };

        tracing::info!("  {} volumes, {} tags indexed", volumes.len(), tags.len());

        let (tx, rx) = mpsc::unbounded_channel();
        let service = NodeService {
            core: Core {
                node_name: config.node_name.clone(),
                root,
                volumes,
                tags,
            },
            put_queue: WorkQueue::new(config.put_max, config.queue_length),
            get_queue: WorkQueue::new(config.get_max, config.queue_length),
            rx,
        };

        monitor::spawn_monitors(
            MonitorLink { tx: tx.downgrade() },
            config.disk_interval(),
            config.tag_interval(),
        );
        tokio::spawn(service.run());

        Ok(NodeHandle {
            tx,
            next_client: Arc::new(AtomicU64::new(1)),
        })
    }

    async fn run(mut self) {
        while let Some(cmd) = self.rx.recv().await {
            self.handle(cmd);
        }
        tracing::debug!("node service stopped");
    }

    fn handle(&mut self, cmd: Command) {
        match cmd {
            Command::GetTags { reply } => {
                let _ = reply.send(self.core.tags.names());
            }
            Command::GetVolumes { reply } => {
                let _ = reply.send((self.core.root.clone(), self.core.volumes.clone()));
            }
            Command::GetDiskspace { reply } => {
                let _ = reply.send(volume::total_diskspace(&self.core.volumes));
            }
            Command::PutBlob { name, client, reply } => {
                match self.put_queue.add(client, PendingPut { name, reply }) {
                    Admission::Start(pending) => self.core.start_put(pending),
                    Admission::Wait => {}
                    Admission::Full(pending) => {
                        let _ = pending.reply.send(Err(Error::QueueFull));
                    }
                }
            }
            Command::GetBlob { client, reply } => {
                match self.get_queue.add(client, PendingGet { reply }) {
                    Admission::Start(pending) => Core::start_get(pending),
                    Admission::Wait => {}
                    Admission::Full(pending) => {
                        let _ = pending.reply.send(Err(Error::QueueFull));
                    }
                }
            }
            Command::GetTagTimestamp { name, reply } => {
                let found = match self.core.tags.lookup(&name) {
                    Some(entry) => Ok((entry.timestamp.clone(), entry.volume.clone())),
                    None => Err(Error::NotFound(name)),
                };
                let _ = reply.send(found);
            }
            Command::GetTagData {
                objname,
                volume,
                reply,
            } => {
                // reads stay off the service task so disk latency cannot
                // head-of-line block every other request
                let (local, _) = layout::hashdir(
                    &objname,
                    &self.core.node_name,
                    ObjectKind::Tag,
                    &self.core.root,
                    &volume,
                );
                tokio::spawn(async move {
                    let read = tokio::fs::read(&local).await.map_err(|e| {
                        tracing::warn!("tag read failed for {}: {}", local.display(), e);
                        Error::ReadFailed
                    });
                    let _ = reply.send(read);
                });
            }
            Command::PutTagData {
                objname,
                data,
                reply,
            } => {
                let _ = reply.send(self.core.put_tag_data(&objname, &data));
            }
            Command::PutTagCommit {
                objname,
                destinations,
                reply,
            } => {
                let _ = reply.send(self.core.commit_tag(&objname, &destinations));
            }
            Command::UpdateVolumes(new) => {
                self.core.volumes = volume::merge(&self.core.volumes, &new);
            }
            Command::UpdateTags(index) => {
                self.core.tags = index;
            }
            Command::ClientGone(client) => {
                for (_, pending) in self.put_queue.remove(client) {
                    self.core.start_put(pending);
                }
                for (_, pending) in self.get_queue.remove(client) {
                    Core::start_get(pending);
                }
            }
        }
    }
}

/// Weak channel link handed to the monitors. Upgrades fail once the service
/// is gone, which is the monitors' signal to stop.
#[derive(Clone)]
pub(crate) struct MonitorLink {
    tx: mpsc::WeakUnboundedSender<Command>,
}

impl MonitorLink {
    pub(crate) async fn volumes(&self) -> Option<(PathBuf, Vec<Volume>)> {
        let tx = self.tx.upgrade()?;
        let (reply, rx) = oneshot::channel();
        tx.send(Command::GetVolumes { reply }).ok()?;
        rx.await.ok()
    }

    pub(crate) fn update_volumes(&self, volumes: Vec<Volume>) -> bool {
        match self.tx.upgrade() {
            Some(tx) => tx.send(Command::UpdateVolumes(volumes)).is_ok(),
            None => false,
        }
    }

    pub(crate) fn update_tags(&self, tags: TagIndex) -> bool {
        match self.tx.upgrade() {
            Some(tx) => tx.send(Command::UpdateTags(tags)).is_ok(),
            None => false,
        }
    }
}

/// Cloneable handle to the node service: the full request surface.
#[derive(Clone, Debug)]
pub struct NodeHandle {
    tx: mpsc::UnboundedSender<Command>,
    next_client: Arc<AtomicU64>,
}

/// Per-request client handle.
///
/// Holding the token holds the admission slot; dropping it is the
/// handle-death signal, delivered exactly once, which releases the slot (or
/// abandons the queued request) and may promote a waiter.
pub struct ClientToken {
    id: ClientId,
    tx: mpsc::UnboundedSender<Command>,
}

impl Drop for ClientToken {
    fn drop(&mut self) {
        let _ = self.tx.send(Command::ClientGone(self.id));
    }
}

impl NodeHandle {
    async fn call<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(make(reply)).map_err(|_| Error::Unavailable)?;
        rx.await.map_err(|_| Error::Unavailable)
    }

    /// Mint a client handle for a blob request
    pub fn client(&self) -> ClientToken {
        ClientToken {
            id: self.next_client.fetch_add(1, Ordering::Relaxed),
            tx: self.tx.clone(),
        }
    }

    /// Names of all tags this node currently knows
    pub async fn tag_names(&self) -> Result<Vec<String>> {
        self.call(|reply| Command::GetTags { reply }).await
    }

    /// The storage root and current volume registry
    pub async fn volumes(&self) -> Result<(PathBuf, Vec<Volume>)> {
        self.call(|reply| Command::GetVolumes { reply }).await
    }

    /// Summed (free, used) bytes across all volumes
    pub async fn diskspace(&self) -> Result<(u64, u64)> {
        self.call(|reply| Command::GetDiskspace { reply }).await
    }

    /// Ask to read a blob through the get listener.
    ///
    /// The request is enqueued at call time; the future resolves `Ok(())`
    /// once a slot runs, or `QueueFull` immediately on refusal. The slot is
    /// held until `client` is dropped.
    pub fn request_get_blob(&self, client: &ClientToken) -> impl Future<Output = Result<()>> {
        let (reply, rx) = oneshot::channel();
        let sent = self
            .tx
            .send(Command::GetBlob {
                client: client.id,
                reply,
            })
            .map_err(|_| Error::Unavailable);
        async move {
            sent?;
            rx.await.map_err(|_| Error::Unavailable)?
        }
    }

    /// Ask to write a blob through the put listener.
    ///
    /// Same admission contract as [`request_get_blob`]; resolves with the
    /// `(local, url)` target the listener should write to.
    ///
    /// [`request_get_blob`]: NodeHandle::request_get_blob
    pub fn request_put_blob(
        &self,
        name: &str,
        client: &ClientToken,
    ) -> impl Future<Output = Result<BlobTarget>> {
        let (reply, rx) = oneshot::channel();
        let sent = self
            .tx
            .send(Command::PutBlob {
                name: name.to_string(),
                client: client.id,
                reply,
            })
            .map_err(|_| Error::Unavailable);
        async move {
            sent?;
            rx.await.map_err(|_| Error::Unavailable)?
        }
    }

    /// Freshest known (timestamp, volume) for a tag name
    pub async fn tag_timestamp(&self, tag_name: &str) -> Result<(Timestamp, String)> {
        let name = tag_name.to_string();
        self.call(|reply| Command::GetTagTimestamp { name, reply })
            .await?
    }

    /// Read a committed tag object from the given volume
    pub async fn tag_data(&self, objname: &str, volume: &str) -> Result<Vec<u8>> {
        let objname = objname.to_string();
        let volume = volume.to_string();
        self.call(|reply| Command::GetTagData {
            objname,
            volume,
            reply,
        })
        .await?
    }

    /// First phase of a tag write: land the bytes under the partial name on
    /// the best volume. Returns the chosen volume name. The index is not
    /// touched.
    pub async fn put_tag_data(&self, objname: &str, data: Vec<u8>) -> Result<String> {
        let objname = objname.to_string();
        self.call(|reply| Command::PutTagData {
            objname,
            data,
            reply,
        })
        .await?
    }

    /// Second phase: promote the partial file with an atomic rename and,
    /// only then, make the index entry authoritative. `destinations` maps
    /// node names to the volume each wrote in phase one.
    pub async fn commit_tag(
        &self,
        objname: &str,
        destinations: &HashMap<String, String>,
    ) -> Result<String> {
        let objname = objname.to_string();
        let destinations = destinations.clone();
        self.call(|reply| Command::PutTagCommit {
            objname,
            destinations,
            reply,
        })
        .await?
    }

    /// Apply a disk-space monitor snapshot (merged into the registry)
    pub fn update_volumes(&self, volumes: Vec<Volume>) {
        let _ = self.tx.send(Command::UpdateVolumes(volumes));
    }

    /// Replace the tag index with a freshly scanned one
    pub fn update_tags(&self, tags: TagIndex) {
        let _ = self.tx.send(Command::UpdateTags(tags));
    }
}
