//! Root registry - the top of a registry tree

use crate::registry::{Registry, Upstream};
use crate::source::{ChangeSource, UnitChangeSource, UnitLoader, UnitWatcher, WalkEnumerator};
use livemeta_foundation::LivemetaConfig;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

pub const ROOT_REGISTRY_NAME: &str = "root";

/// Plain registry directly over a change source. Every other registry of a
/// process hangs below it.
pub type RootRegistry = Registry<()>;

impl Registry<()> {
    /// Root registry over `source`
    pub fn root(source: Arc<dyn ChangeSource>) -> Arc<Self> {
        Registry::new(ROOT_REGISTRY_NAME, Upstream::Source(source), ())
    }

    /// Root registry over the source units found under `base` by `config`
    pub fn from_config(
        base: impl Into<PathBuf>,
        loader: Arc<dyn UnitLoader>,
        watcher: Option<Arc<dyn UnitWatcher>>,
        config: &LivemetaConfig,
    ) -> Arc<Self> {
        let base = base.into();
        info!(base = %base.display(), roots = ?config.source.roots, "Creating root registry");

        let enumerator = Arc::new(WalkEnumerator::new(base, config.source.clone()));
        let source = UnitChangeSource::with_settings(
            "units",
            enumerator,
            loader,
            watcher,
            &config.registry,
        );

        Registry::with_settings(
            ROOT_REGISTRY_NAME,
            Upstream::Source(source),
            (),
            &config.registry,
        )
    }
}
