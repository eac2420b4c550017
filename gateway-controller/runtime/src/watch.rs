use crate::{
    index::{SharedStore, Stored},
    k8s::{watcher, ResourceExt},
};
use futures::prelude::*;
use std::borrow::Cow;
use tokio::sync::mpsc;

/// Notifies the driver that the store has changed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Changed {
    pub kind: Cow<'static, str>,
}

/// Applies watch events to a shared store.
#[derive(Clone, Debug)]
pub struct Watches {
    store: SharedStore,
    changes: mpsc::Sender<Changed>,
}

impl Watches {
    pub fn new(store: SharedStore, changes: mpsc::Sender<Changed>) -> Self {
        Self { store, changes }
    }

    /// Registers a watch on the store so that the store does not report
    /// itself synced before the watch's initial list has been applied.
    pub fn expect<T: Stored>(&self, namespace: Option<&str>) {
        self.store.write().expect_sync::<T>(namespace);
    }

    /// Applies events until the stream ends or the driver goes away.
    ///
    /// The initial list (and every relist after a watch restart) replaces the
    /// objects of the watched scope in a single update.
    pub async fn run<T>(
        self,
        namespace: Option<String>,
        events: impl Stream<Item = watcher::Event<T>>,
    ) where
        T: Stored,
    {
        tokio::pin!(events);
        let kind = T::kind(&());
        let mut init = Vec::new();

        while let Some(event) = events.next().await {
            match event {
                watcher::Event::Init => {
                    init.clear();
                    continue;
                }
                watcher::Event::InitApply(obj) => {
                    init.push(obj);
                    continue;
                }
                watcher::Event::InitDone => {
                    let objs = std::mem::take(&mut init);
                    tracing::debug!(%kind, count = objs.len(), "Reset");
                    self.store.write().reset(namespace.as_deref(), objs);
                }
                watcher::Event::Apply(obj) => {
                    tracing::trace!(
                        %kind,
                        namespace = ?obj.namespace(),
                        name = %obj.name_any(),
                        "Applied"
                    );
                    self.store.write().apply(obj);
                }
                watcher::Event::Delete(obj) => {
                    tracing::trace!(
                        %kind,
                        namespace = ?obj.namespace(),
                        name = %obj.name_any(),
                        "Deleted"
                    );
                    self.store
                        .write()
                        .delete::<T>(obj.namespace().as_deref(), &obj.name_any());
                }
            }

            let changed = Changed { kind: kind.clone() };
            if self.changes.send(changed).await.is_err() {
                tracing::debug!(%kind, "Driver stopped");
                return;
            }
        }
        tracing::debug!(%kind, "Watch ended");
    }
}
