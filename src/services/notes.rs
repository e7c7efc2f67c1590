use chrono::NaiveDate;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use tracing::warn;

use crate::domain::data_set::DataSetName;
use crate::domain::user::UserId;
use crate::repository::local_mirror::{ExternalChangeSubscription, LocalMirrorStore};

pub type Notes = BTreeMap<NaiveDate, String>;

/// Per-day free-text notes, kept on this device only.
pub struct NotesBook {
    mirror: LocalMirrorStore,
    user: RwLock<Option<UserId>>,
}

impl NotesBook {
    pub fn new(mirror: LocalMirrorStore, user: Option<UserId>) -> Self {
        Self {
            mirror,
            user: RwLock::new(user),
        }
    }

    pub fn set_user(&self, user: Option<UserId>) {
        *self.user.write() = user;
    }

    fn name() -> DataSetName {
        DataSetName::builtin(DataSetName::NOTES)
    }

    pub fn all(&self) -> Notes {
        self.mirror.read(self.user.read().as_ref(), &Self::name(), Notes::new())
    }

    pub fn note_for(&self, date: NaiveDate) -> Option<String> {
        self.all().remove(&date)
    }

    /// Blank text deletes the day's note.
    pub fn set_note(&self, date: NaiveDate, text: impl Into<String>) {
        let text = text.into();
        let mut notes = self.all();
        if text.trim().is_empty() {
            if notes.remove(&date).is_none() {
                return;
            }
        } else {
            notes.insert(date, text);
        }
        self.mirror.write(self.user.read().as_ref(), &Self::name(), &notes);
    }

    /// Calls `on_change` with the full note set whenever another window
    /// edits this user's notes.
    ///
    /// The listener is bound to the user signed in at the time of the call;
    /// after [`Self::set_user`] drop it and subscribe again.
    pub fn on_external_change<F>(&self, mut on_change: F) -> ExternalChangeSubscription
    where
        F: FnMut(Notes) + Send + 'static,
    {
        self.mirror
            .subscribe_external_changes(self.user.read().as_ref(), move |name, value| {
                if name.as_str() != DataSetName::NOTES {
                    return;
                }
                let notes = match value.map(serde_json::from_value::<Notes>) {
                    None => Notes::default(),
                    Some(Ok(notes)) => notes,
                    Some(Err(e)) => {
                        warn!(data_set = %name, error = %e, "Malformed external notes, using defaults");
                        Notes::default()
                    }
                };
                on_change(notes);
            })
    }
}
