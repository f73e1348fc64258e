//! Menu catalog for one shop: categories and items.
//!
//! Every create/update/delete re-fetches the whole list it touched. Deleting
//! a category leaves items pointing at it; those render as uncategorized.

use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

use crate::backend::{fetch_rows, insert_row, to_row, Backend, Query, Table};
use crate::error::{PosError, PosResult};
use crate::models::{Category, CategoryDraft, MenuItem, MenuItemDraft};

fn trimmed_or_null(value: &Option<String>) -> Value {
    match value.as_deref().map(str::trim) {
        Some(s) if !s.is_empty() => Value::String(s.to_string()),
        _ => Value::Null,
    }
}

fn category_row(draft: &CategoryDraft) -> PosResult<Value> {
    let name = draft.name.trim();
    if name.is_empty() {
        return Err(PosError::validation("Category name is required"));
    }
    let mut row = to_row(draft)?;
    row["name"] = Value::String(name.to_string());
    Ok(row)
}

fn item_row(draft: &MenuItemDraft) -> PosResult<Value> {
    let name = draft.name.trim();
    if name.is_empty() {
        return Err(PosError::validation("Item name is required"));
    }
    if draft.price.is_sign_negative() && !draft.price.is_zero() {
        return Err(PosError::validation("Price cannot be negative"));
    }
    if matches!(draft.stock_quantity, Some(q) if q < 0) {
        return Err(PosError::validation("Stock quantity cannot be negative"));
    }
    let mut row = to_row(draft)?;
    row["name"] = Value::String(name.to_string());
    row["description"] = trimmed_or_null(&draft.description);
    row["image_url"] = trimmed_or_null(&draft.image_url);
    row["barcode"] = trimmed_or_null(&draft.barcode);
    row["category_id"] = trimmed_or_null(&draft.category_id);
    Ok(row)
}

pub struct MenuCatalog {
    backend: Arc<dyn Backend>,
    categories: Vec<Category>,
    items: Vec<MenuItem>,
}

impl MenuCatalog {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            categories: Vec::new(),
            items: Vec::new(),
        }
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn items(&self) -> &[MenuItem] {
        &self.items
    }

    // -----------------------------------------------------------------------
    // Loading
    // -----------------------------------------------------------------------

    pub async fn fetch_categories(&mut self, shop_id: &str) -> PosResult<&[Category]> {
        self.categories = fetch_rows(
            self.backend.as_ref(),
            Table::Categories,
            &Query::new().eq("shop_id", shop_id).order_by("sort_order"),
        )
        .await?;
        debug!(shop_id, count = self.categories.len(), "categories loaded");
        Ok(&self.categories)
    }

    pub async fn fetch_items(&mut self, shop_id: &str) -> PosResult<&[MenuItem]> {
        self.items = fetch_rows(
            self.backend.as_ref(),
            Table::MenuItems,
            &Query::new().eq("shop_id", shop_id).order_by("sort_order"),
        )
        .await?;
        debug!(shop_id, count = self.items.len(), "menu items loaded");
        Ok(&self.items)
    }

    pub async fn fetch_all(&mut self, shop_id: &str) -> PosResult<()> {
        self.fetch_categories(shop_id).await?;
        self.fetch_items(shop_id).await?;
        Ok(())
    }

    /// What a customer sees: active categories and available items only.
    pub async fn fetch_public(&mut self, shop_id: &str) -> PosResult<()> {
        self.categories = fetch_rows(
            self.backend.as_ref(),
            Table::Categories,
            &Query::new()
                .eq("shop_id", shop_id)
                .eq("is_active", true)
                .order_by("sort_order"),
        )
        .await?;
        self.items = fetch_rows(
            self.backend.as_ref(),
            Table::MenuItems,
            &Query::new()
                .eq("shop_id", shop_id)
                .eq("is_available", true)
                .order_by("sort_order"),
        )
        .await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Categories
    // -----------------------------------------------------------------------

    pub async fn create_category(
        &mut self,
        shop_id: &str,
        draft: CategoryDraft,
    ) -> PosResult<Category> {
        let mut row = category_row(&draft)?;
        row["shop_id"] = Value::String(shop_id.to_string());
        let category: Category = insert_row(self.backend.as_ref(), Table::Categories, row).await?;
        info!(category_id = %category.id, shop_id, "category created");
        self.fetch_categories(shop_id).await?;
        Ok(category)
    }

    pub async fn update_category(
        &mut self,
        shop_id: &str,
        category_id: &str,
        draft: CategoryDraft,
    ) -> PosResult<()> {
        let row = category_row(&draft)?;
        let updated = self
            .backend
            .update(
                Table::Categories,
                &Query::new().eq("id", category_id).eq("shop_id", shop_id),
                row,
            )
            .await?;
        if updated.is_empty() {
            return Err(PosError::not_found(format!("Category {category_id} not found")));
        }
        self.fetch_categories(shop_id).await?;
        Ok(())
    }

    pub async fn delete_category(&mut self, shop_id: &str, category_id: &str) -> PosResult<()> {
        self.backend
            .delete(
                Table::Categories,
                &Query::new().eq("id", category_id).eq("shop_id", shop_id),
            )
            .await?;
        info!(category_id, shop_id, "category deleted");
        self.fetch_categories(shop_id).await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Items
    // -----------------------------------------------------------------------

    pub async fn create_item(&mut self, shop_id: &str, draft: MenuItemDraft) -> PosResult<MenuItem> {
        let mut row = item_row(&draft)?;
        row["shop_id"] = Value::String(shop_id.to_string());
        let item: MenuItem = insert_row(self.backend.as_ref(), Table::MenuItems, row).await?;
        info!(item_id = %item.id, shop_id, "menu item created");
        self.fetch_items(shop_id).await?;
        Ok(item)
    }

    pub async fn update_item(
        &mut self,
        shop_id: &str,
        item_id: &str,
        draft: MenuItemDraft,
    ) -> PosResult<()> {
        let row = item_row(&draft)?;
        let updated = self
            .backend
            .update(
                Table::MenuItems,
                &Query::new().eq("id", item_id).eq("shop_id", shop_id),
                row,
            )
            .await?;
        if updated.is_empty() {
            return Err(PosError::not_found(format!("Menu item {item_id} not found")));
        }
        self.fetch_items(shop_id).await?;
        Ok(())
    }

    pub async fn delete_item(&mut self, shop_id: &str, item_id: &str) -> PosResult<()> {
        self.backend
            .delete(
                Table::MenuItems,
                &Query::new().eq("id", item_id).eq("shop_id", shop_id),
            )
            .await?;
        info!(item_id, shop_id, "menu item deleted");
        self.fetch_items(shop_id).await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Lookups over the loaded lists
    // -----------------------------------------------------------------------

    pub fn item(&self, item_id: &str) -> Option<&MenuItem> {
        self.items.iter().find(|i| i.id == item_id)
    }

    /// Exact barcode match among available items.
    pub fn find_by_barcode(&self, code: &str) -> PosResult<&MenuItem> {
        let code = code.trim();
        if code.is_empty() {
            return Err(PosError::validation("Barcode is empty"));
        }
        self.items
            .iter()
            .find(|i| i.is_available && i.barcode.as_deref().map(str::trim) == Some(code))
            .ok_or_else(|| PosError::not_found(format!("No item with barcode {code}")))
    }

    /// Available items matching a case-insensitive name search and, when
    /// given, a category.
    pub fn filtered_items(&self, search: &str, category_id: Option<&str>) -> Vec<&MenuItem> {
        let needle = search.trim().to_lowercase();
        self.items
            .iter()
            .filter(|i| i.is_available)
            .filter(|i| category_id.map_or(true, |c| i.category_id.as_deref() == Some(c)))
            .filter(|i| needle.is_empty() || i.name.to_lowercase().contains(&needle))
            .collect()
    }

    /// Name of an item's category, or `None` when it has none or the
    /// category no longer exists.
    pub fn category_name(&self, item: &MenuItem) -> Option<&str> {
        let id = item.category_id.as_deref()?;
        self.categories
            .iter()
            .find(|c| c.id == id)
            .map(|c| c.name.as_str())
    }

    /// Items grouped under each loaded category, followed by a trailing
    /// group (`None`) for uncategorized and dangling items.
    pub fn grouped(&self) -> Vec<(Option<&Category>, Vec<&MenuItem>)> {
        let mut groups: Vec<(Option<&Category>, Vec<&MenuItem>)> = self
            .categories
            .iter()
            .map(|c| {
                let items = self
                    .items
                    .iter()
                    .filter(|i| i.category_id.as_deref() == Some(c.id.as_str()))
                    .collect();
                (Some(c), items)
            })
            .collect();
        let loose: Vec<&MenuItem> = self
            .items
            .iter()
            .filter(|i| self.category_name(i).is_none())
            .collect();
        if !loose.is_empty() {
            groups.push((None, loose));
        }
        groups
    }
}
