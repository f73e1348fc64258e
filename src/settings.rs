//! Persisted display settings: language and sidebar state.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::db::{self, DbState};
use crate::error::PosResult;
use crate::i18n::{self, Language};

const CATEGORY: &str = "ui";
const KEY_LANGUAGE: &str = "language";
const KEY_SIDEBAR_OPEN: &str = "sidebar_open";

pub struct SettingsStore {
    db: Arc<DbState>,
    language: Language,
    sidebar_open: bool,
}

impl SettingsStore {
    /// Load persisted values; missing or unreadable values use the defaults
    /// (Thai, sidebar open).
    pub fn load(db: Arc<DbState>) -> PosResult<Self> {
        let (language, sidebar_open) = {
            let conn = db.conn.lock()?;
            let language = match db::get_setting(&conn, CATEGORY, KEY_LANGUAGE) {
                Some(raw) => Language::parse(&raw).unwrap_or_else(|| {
                    warn!(value = %raw, "unknown stored language, using default");
                    Language::default()
                }),
                None => Language::default(),
            };
            let sidebar_open = db::get_setting(&conn, CATEGORY, KEY_SIDEBAR_OPEN)
                .map(|v| v != "false")
                .unwrap_or(true);
            (language, sidebar_open)
        };
        debug!(language = language.as_str(), sidebar_open, "settings loaded");
        Ok(Self {
            db,
            language,
            sidebar_open,
        })
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn sidebar_open(&self) -> bool {
        self.sidebar_open
    }

    pub fn set_language(&mut self, language: Language) -> PosResult<()> {
        let conn = self.db.conn.lock()?;
        db::set_setting(&conn, CATEGORY, KEY_LANGUAGE, language.as_str())?;
        self.language = language;
        Ok(())
    }

    pub fn set_sidebar_open(&mut self, open: bool) -> PosResult<()> {
        let conn = self.db.conn.lock()?;
        db::set_setting(&conn, CATEGORY, KEY_SIDEBAR_OPEN, if open { "true" } else { "false" })?;
        self.sidebar_open = open;
        Ok(())
    }

    /// Translate a key in the current language.
    pub fn t<'a>(&self, key: &'a str) -> &'a str {
        i18n::t(self.language, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_then_persists_across_reload() {
        let db = Arc::new(db::open_in_memory().unwrap());
        let mut store = SettingsStore::load(db.clone()).unwrap();
        assert_eq!(store.language(), Language::Th);
        assert!(store.sidebar_open());

        store.set_language(Language::En).unwrap();
        store.set_sidebar_open(false).unwrap();
        assert_eq!(store.t("nav.menu"), "Menu");

        let reloaded = SettingsStore::load(db).unwrap();
        assert_eq!(reloaded.language(), Language::En);
        assert!(!reloaded.sidebar_open());
    }

    #[test]
    fn unknown_stored_language_falls_back() {
        let db = Arc::new(db::open_in_memory().unwrap());
        {
            let conn = db.conn.lock().unwrap();
            db::set_setting(&conn, CATEGORY, KEY_LANGUAGE, "fr").unwrap();
        }
        assert_eq!(SettingsStore::load(db).unwrap().language(), Language::Th);
    }
}
