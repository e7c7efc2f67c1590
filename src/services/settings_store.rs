use parking_lot::RwLock;
use tracing::warn;

use crate::domain::data_set::DataSetName;
use crate::domain::settings::Settings;
use crate::domain::user::UserId;
use crate::repository::local_mirror::{ExternalChangeSubscription, LocalMirrorStore};

/// Device-local preferences stored in the local mirror.
pub struct SettingsStore {
    mirror: LocalMirrorStore,
    user: RwLock<Option<UserId>>,
}

impl SettingsStore {
    pub fn new(mirror: LocalMirrorStore, user: Option<UserId>) -> Self {
        Self {
            mirror,
            user: RwLock::new(user),
        }
    }

    pub fn set_user(&self, user: Option<UserId>) {
        *self.user.write() = user;
    }

    pub fn get(&self) -> Settings {
        self.mirror.read(
            self.user.read().as_ref(),
            &DataSetName::builtin(DataSetName::SETTINGS),
            Settings::default(),
        )
    }

    pub fn update(&self, change: impl FnOnce(&mut Settings)) -> Settings {
        let mut settings = self.get();
        change(&mut settings);
        self.mirror.write(
            self.user.read().as_ref(),
            &DataSetName::builtin(DataSetName::SETTINGS),
            &settings,
        );
        settings
    }

    /// Calls `on_change` whenever another window changes this user's
    /// settings. Bound to the user signed in at the time of the call;
    /// after [`Self::set_user`] drop it and subscribe again.
    pub fn on_external_change<F>(&self, mut on_change: F) -> ExternalChangeSubscription
    where
        F: FnMut(Settings) + Send + 'static,
    {
        self.mirror
            .subscribe_external_changes(self.user.read().as_ref(), move |name, value| {
                if name.as_str() != DataSetName::SETTINGS {
                    return;
                }
                let settings = match value.map(serde_json::from_value::<Settings>) {
                    None => Settings::default(),
                    Some(Ok(settings)) => settings,
                    Some(Err(e)) => {
                        warn!(data_set = %name, error = %e, "Malformed external settings, using defaults");
                        Settings::default()
                    }
                };
                on_change(settings);
            })
    }
}
