//! Debounced file watcher: reloads the Gateway config after a burst of filesystem events settles.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::load::load;
use crate::model::GatewayConfig;

const DEBOUNCE: Duration = Duration::from_secs(1);

/// Watches `path` for modifications and invokes `on_change` with the reparsed config once the
/// file stops changing for [`DEBOUNCE`]. A burst of events resets the timer rather than firing
/// once per event. Reload failures are logged and do not stop the watcher.
pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
    debounce_task: tokio::task::JoinHandle<()>,
}

impl ConfigWatcher {
    pub fn spawn<F>(path: PathBuf, on_change: F) -> notify::Result<Self>
    where
        F: Fn(GatewayConfig) + Send + Sync + 'static,
    {
        let (raw_tx, mut raw_rx) = mpsc::unbounded_channel::<()>();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            if res.is_ok() {
                let _ = raw_tx.send(());
            }
        })?;
        watcher.watch(&path, RecursiveMode::NonRecursive)?;

        let on_change = Arc::new(on_change);
        let watch_path = path.clone();
        let debounce_task = tokio::spawn(async move {
            loop {
                if raw_rx.recv().await.is_none() {
                    return;
                }
                loop {
                    match tokio::time::timeout(DEBOUNCE, raw_rx.recv()).await {
                        Ok(Some(())) => continue,
                        Ok(None) => return,
                        Err(_) => break,
                    }
                }
                match load(Some(&watch_path)) {
                    Ok(new_config) => {
                        tracing::info!(path = %watch_path.display(), "config reloaded");
                        on_change(new_config);
                    }
                    Err(err) => {
                        tracing::warn!(path = %watch_path.display(), error = %err, "config reload failed, keeping prior configuration");
                    }
                }
            }
        });

        Ok(Self {
            _watcher: watcher,
            debounce_task,
        })
    }
}

impl Drop for ConfigWatcher {
    fn drop(&mut self) {
        self.debounce_task.abort();
    }
}
