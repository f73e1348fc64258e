//! Menu editor: categories, items and item images for the current shop.
//!
//! Images are uploaded as soon as they are picked. An upload that never gets
//! saved is removed when the form closes; the image an item used before an
//! edit is removed once the edit is saved.

use rust_decimal::Decimal;

use super::ScreenStatus;
use crate::app::Session;
use crate::error::{PosError, PosResult};
use crate::media::{discard_image, replace_image};
use crate::models::{Category, CategoryDraft, MenuItem, MenuItemDraft, Shop};
use crate::payments::parse_amount;
use crate::plan::ensure_within_limit;

/// Item form as typed. Numbers stay text until saved.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemForm {
    pub name: String,
    pub price: String,
    pub description: String,
    pub image_url: Option<String>,
    pub category_id: Option<String>,
    pub is_available: bool,
    pub barcode: String,
    pub track_stock: bool,
    pub stock_quantity: String,
}

impl ItemForm {
    /// New items land in the first category.
    pub fn blank(categories: &[Category]) -> Self {
        Self {
            category_id: categories.first().map(|c| c.id.clone()),
            is_available: true,
            ..Default::default()
        }
    }

    pub fn from_item(item: &MenuItem) -> Self {
        Self {
            name: item.name.clone(),
            price: item.price.to_string(),
            description: item.description.clone().unwrap_or_default(),
            image_url: item.image_url.clone(),
            category_id: item.category_id.clone(),
            is_available: item.is_available,
            barcode: item.barcode.clone().unwrap_or_default(),
            track_stock: item.track_stock,
            stock_quantity: item
                .stock_quantity
                .map(|q| q.to_string())
                .unwrap_or_default(),
        }
    }

    pub fn to_draft(&self) -> PosResult<MenuItemDraft> {
        let price = parse_amount(&self.price)?.unwrap_or(Decimal::ZERO);
        let stock_quantity = match self.stock_quantity.trim() {
            "" => None,
            s => Some(
                s.parse::<i64>()
                    .map_err(|_| PosError::validation(format!("Not a valid stock quantity: {s}")))?,
            ),
        };
        Ok(MenuItemDraft {
            category_id: self.category_id.clone().filter(|c| !c.is_empty()),
            name: self.name.clone(),
            description: Some(self.description.clone()),
            price,
            image_url: self.image_url.clone(),
            is_available: self.is_available,
            barcode: Some(self.barcode.clone()),
            track_stock: self.track_stock,
            stock_quantity,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingDelete {
    Item(String),
    Category(String),
}

#[derive(Debug, Default)]
pub struct MenuEditorScreen {
    /// Open item form, if any.
    pub item_form: Option<ItemForm>,
    /// Item being edited; `None` with an open form means a new item.
    pub editing: Option<MenuItem>,
    /// Image uploaded while the form was open and not saved yet.
    unsaved_upload: Option<String>,
    pub show_category_form: bool,
    pub category_name: String,
    pub pending_delete: Option<PendingDelete>,
    pub status: ScreenStatus,
}

fn current_shop(session: &Session) -> PosResult<Shop> {
    session
        .shops
        .current_shop()
        .cloned()
        .ok_or_else(|| PosError::validation("No shop selected"))
}

impl MenuEditorScreen {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn load(&mut self, session: &mut Session) -> PosResult<()> {
        let Some(shop_id) = session.shops.current_shop().map(|s| s.id.clone()) else {
            return Ok(());
        };
        self.status.begin();
        let result = session.menu.fetch_all(&shop_id).await;
        self.status.finish(result)
    }

    // -----------------------------------------------------------------------
    // Items
    // -----------------------------------------------------------------------

    pub async fn open_item(&mut self, session: &Session, item: Option<&MenuItem>) {
        self.close_item_form(session).await;
        self.item_form = Some(match item {
            Some(item) => ItemForm::from_item(item),
            None => ItemForm::blank(session.menu.categories()),
        });
        self.editing = item.cloned();
    }

    /// Close without saving, dropping any image uploaded meanwhile.
    pub async fn close_item_form(&mut self, session: &Session) {
        if let Some(url) = self.unsaved_upload.take() {
            discard_image(session.storage(), &url).await;
        }
        self.item_form = None;
        self.editing = None;
    }

    /// Upload a picked image and show it in the form.
    pub async fn attach_image(
        &mut self,
        session: &Session,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> PosResult<String> {
        let shop = self.status.reject(current_shop(session))?;
        if self.item_form.is_none() {
            return self
                .status
                .reject(Err(PosError::validation("No item form open")));
        }
        self.status.begin();
        let previous = self.unsaved_upload.take();
        let result = replace_image(
            session.storage(),
            &shop.id,
            previous.as_deref(),
            bytes,
            content_type,
        )
        .await;
        let url = match self.status.finish(result) {
            Ok(url) => url,
            Err(e) => {
                self.unsaved_upload = previous;
                return Err(e);
            }
        };
        self.unsaved_upload = Some(url.clone());
        if let Some(form) = self.item_form.as_mut() {
            form.image_url = Some(url.clone());
        }
        Ok(url)
    }

    pub fn remove_image(&mut self) {
        if let Some(form) = self.item_form.as_mut() {
            form.image_url = None;
        }
    }

    /// Create or update from the open form. New items are checked against
    /// the plan's item limit first.
    pub async fn save_item(&mut self, session: &mut Session) -> PosResult<()> {
        let prepared = self.prepare_item(session);
        let (shop, draft) = self.status.reject(prepared)?;
        self.status.begin();
        let result = match &self.editing {
            Some(item) => session.menu.update_item(&shop.id, &item.id, draft.clone()).await,
            None => session.menu.create_item(&shop.id, draft.clone()).await.map(|_| ()),
        };
        self.status.finish(result)?;

        let replaced = self
            .editing
            .as_ref()
            .and_then(|item| item.image_url.clone())
            .filter(|old| draft.image_url.as_deref() != Some(old.as_str()));
        if let Some(old) = replaced {
            discard_image(session.storage(), &old).await;
        }
        self.unsaved_upload = None;
        self.item_form = None;
        self.editing = None;
        Ok(())
    }

    fn prepare_item(&self, session: &Session) -> PosResult<(Shop, MenuItemDraft)> {
        let shop = current_shop(session)?;
        let form = self
            .item_form
            .as_ref()
            .ok_or_else(|| PosError::validation("No item form open"))?;
        if self.editing.is_none() {
            let allowed = session.plan.can_add_menu_item(session.menu.items().len());
            ensure_within_limit(allowed, "menu items")?;
        }
        Ok((shop, form.to_draft()?))
    }

    // -----------------------------------------------------------------------
    // Categories
    // -----------------------------------------------------------------------

    pub fn open_category_form(&mut self) {
        self.show_category_form = true;
        self.category_name.clear();
    }

    pub async fn save_category(&mut self, session: &mut Session) -> PosResult<Category> {
        let shop = self.status.reject(current_shop(session))?;
        let draft = CategoryDraft {
            name: self.category_name.clone(),
            sort_order: i32::try_from(session.menu.categories().len()).unwrap_or(i32::MAX),
            ..Default::default()
        };
        self.status.begin();
        let category = self
            .status
            .finish(session.menu.create_category(&shop.id, draft).await)?;
        self.show_category_form = false;
        self.category_name.clear();
        Ok(category)
    }

    // -----------------------------------------------------------------------
    // Deletes (two-step)
    // -----------------------------------------------------------------------

    pub fn request_delete(&mut self, target: PendingDelete) {
        self.pending_delete = Some(target);
    }

    pub fn cancel_delete(&mut self) {
        self.pending_delete = None;
    }

    /// Carry out the delete the owner confirmed. Nothing pending is a no-op.
    pub async fn confirm_delete(&mut self, session: &mut Session) -> PosResult<()> {
        let Some(target) = self.pending_delete.take() else {
            return Ok(());
        };
        let shop = self.status.reject(current_shop(session))?;
        self.status.begin();
        let result = match &target {
            PendingDelete::Item(id) => {
                let image = session.menu.item(id).and_then(|i| i.image_url.clone());
                let deleted = session.menu.delete_item(&shop.id, id).await;
                if let (Ok(()), Some(url)) = (&deleted, image) {
                    discard_image(session.storage(), &url).await;
                }
                deleted
            }
            PendingDelete::Category(id) => session.menu.delete_category(&shop.id, id).await,
        };
        self.status.finish(result)
    }
}
