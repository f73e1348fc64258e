//! Shop settings page plus the display preferences.

use serde_json::{Map, Value};

use super::ScreenStatus;
use crate::app::Session;
use crate::error::{PosError, PosResult};
use crate::i18n::Language;
use crate::models::{ShopType, ShopUpdate};

#[derive(Debug, Default)]
pub struct SettingsScreen {
    pub name: String,
    pub shop_type: ShopType,
    pub phone: String,
    pub address: String,
    pub promptpay_id: String,
    /// Set after a successful save until the form is edited again.
    pub saved: bool,
    pub status: ScreenStatus,
}

impl SettingsScreen {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fill the form from the current shop. No shop leaves it blank.
    pub fn load(&mut self, session: &Session) {
        let Some(shop) = session.shops.current_shop() else {
            return;
        };
        self.name = shop.name.clone();
        self.shop_type = shop.shop_type;
        self.phone = shop.phone.clone().unwrap_or_default();
        self.address = shop.address.clone().unwrap_or_default();
        self.promptpay_id = shop.promptpay_id().unwrap_or_default().to_string();
        self.saved = false;
    }

    /// Profile fields are replaced; `promptpay_id` is merged into the shop's
    /// settings map so other keys survive.
    pub async fn save(&mut self, session: &mut Session) -> PosResult<()> {
        let shop_id = session
            .shops
            .current_shop()
            .map(|s| s.id.clone())
            .ok_or_else(|| PosError::validation("No shop selected"));
        let shop_id = self.status.reject(shop_id)?;

        let mut settings = Map::new();
        settings.insert(
            "promptpay_id".into(),
            Value::String(self.promptpay_id.trim().to_string()),
        );
        let update = ShopUpdate {
            name: self.name.clone(),
            shop_type: self.shop_type,
            phone: Some(self.phone.clone()),
            address: Some(self.address.clone()),
            settings,
        };

        self.saved = false;
        self.status.begin();
        self.status
            .finish(session.shops.update_shop(&shop_id, update).await)?;
        self.saved = true;
        Ok(())
    }

    pub fn set_language(session: &mut Session, language: Language) -> PosResult<()> {
        session.settings.set_language(language)
    }

    pub fn toggle_sidebar(session: &mut Session) -> PosResult<bool> {
        let open = !session.settings.sidebar_open();
        session.settings.set_sidebar_open(open)?;
        Ok(open)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewShop;
    use crate::testing;
    use serde_json::json;

    #[tokio::test]
    async fn save_merges_promptpay_into_settings() {
        let (_dir, app) = testing::app();
        let mut session = app.session().unwrap();
        session.auth.register("owner@shop.th", "secret1", "Owner").await.unwrap();
        session.sync_auth().await.unwrap();
        let shop = session
            .shops
            .create_shop(NewShop {
                name: "Baan".into(),
                slug: "baan".into(),
                shop_type: ShopType::Cafe,
            })
            .await
            .unwrap();
        let mut extra = Map::new();
        extra.insert("receipt_footer".into(), json!("ขอบคุณค่ะ"));
        session
            .shops
            .update_shop(
                &shop.id,
                ShopUpdate {
                    name: "Baan".into(),
                    shop_type: ShopType::Cafe,
                    settings: extra,
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let mut screen = SettingsScreen::new();
        screen.load(&session);
        assert_eq!(screen.name, "Baan");
        assert!(screen.promptpay_id.is_empty());

        screen.name = "Baan Cafe".into();
        screen.shop_type = ShopType::Retail;
        screen.phone = "02-123-4567".into();
        screen.promptpay_id = " 0812345678 ".into();
        screen.save(&mut session).await.unwrap();
        assert!(screen.saved);

        let current = session.shops.current_shop().unwrap();
        assert_eq!(current.name, "Baan Cafe");
        assert!(current.is_retail());
        assert_eq!(current.phone.as_deref(), Some("02-123-4567"));
        assert_eq!(current.address, None);
        assert_eq!(current.promptpay_id(), Some("0812345678"));
        assert_eq!(current.settings["receipt_footer"], json!("ขอบคุณค่ะ"));

        screen.name = " ".into();
        assert!(screen.save(&mut session).await.is_err());
        assert!(!screen.saved);
    }

    #[tokio::test]
    async fn preferences_persist() {
        let (_dir, app) = testing::app();
        let mut session = app.session().unwrap();
        SettingsScreen::set_language(&mut session, Language::En).unwrap();
        assert!(!SettingsScreen::toggle_sidebar(&mut session).unwrap());

        let again = app.session().unwrap();
        assert_eq!(again.settings.language(), Language::En);
        assert!(!again.settings.sidebar_open());
        assert_eq!(again.t("nav.settings"), "Settings");
    }
}
