//! Customer ordering page reached from a table QR code.
//!
//! Runs without a signed-in owner: it gets the tabular backend and auth
//! service directly and keeps its own catalog, cart and order store.

use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::info;

use super::ScreenStatus;
use crate::auth::AuthService;
use crate::backend::{fetch_one, Backend, Query, Table};
use crate::cart::{Cart, CartItem, MergeRule};
use crate::error::{PosError, PosResult};
use crate::i18n::{self, Language};
use crate::menu::MenuCatalog;
use crate::models::{Branch, DiningTable, MenuItem, Order, OrderType, Shop};
use crate::orders::{NewOrder, OrderStore};

pub struct PublicMenuScreen {
    backend: Arc<dyn Backend>,
    language: Language,
    shop_slug: String,
    branch_id: String,
    /// From the `table` query parameter of the QR link.
    table_number: Option<String>,
    pub shop: Option<Shop>,
    pub menu: MenuCatalog,
    orders: OrderStore,
    pub category_id: Option<String>,
    pub cart: Cart,
    pub customer_name: String,
    pub placed: Option<Order>,
    pub status: ScreenStatus,
}

impl PublicMenuScreen {
    pub fn new(
        backend: Arc<dyn Backend>,
        auth: Arc<dyn AuthService>,
        language: Language,
        shop_slug: &str,
        branch_id: &str,
        table_number: Option<&str>,
    ) -> Self {
        Self {
            menu: MenuCatalog::new(backend.clone()),
            orders: OrderStore::new(backend.clone(), auth),
            backend,
            language,
            shop_slug: shop_slug.to_string(),
            branch_id: branch_id.to_string(),
            table_number: table_number
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string),
            shop: None,
            category_id: None,
            cart: Cart::with_rule(MergeRule::Item),
            customer_name: String::new(),
            placed: None,
            status: ScreenStatus::default(),
        }
    }

    pub fn table_number(&self) -> Option<&str> {
        self.table_number.as_deref()
    }

    /// Resolve the shop by slug, check the branch belongs to it, then load
    /// active categories and available items.
    pub async fn load(&mut self) -> PosResult<()> {
        self.status.begin();
        let result = self.load_inner().await;
        self.status.finish(result)
    }

    async fn load_inner(&mut self) -> PosResult<()> {
        let shop: Shop = fetch_one(
            self.backend.as_ref(),
            Table::Shops,
            Query::new().eq("slug", self.shop_slug.as_str()),
        )
        .await?
        .ok_or_else(|| PosError::not_found(i18n::t(self.language, "public.shopNotFound")))?;

        let branch: Option<Branch> = fetch_one(
            self.backend.as_ref(),
            Table::Branches,
            Query::new()
                .eq("id", self.branch_id.as_str())
                .eq("shop_id", shop.id.as_str()),
        )
        .await?;
        if branch.is_none() {
            return Err(PosError::not_found(format!(
                "Branch {} not found for {}",
                self.branch_id, shop.slug
            )));
        }

        self.menu.fetch_public(&shop.id).await?;
        self.shop = Some(shop);
        Ok(())
    }

    pub fn visible_items(&self) -> Vec<&MenuItem> {
        self.menu.filtered_items("", self.category_id.as_deref())
    }

    pub fn add_to_cart(&mut self, item: &MenuItem) {
        self.cart.add(CartItem::from_menu_item(item, 1, ""));
    }

    pub fn set_quantity(&mut self, index: usize, quantity: i64) {
        self.cart.set_quantity(index, quantity);
    }

    pub fn total(&self) -> Decimal {
        self.cart.subtotal()
    }

    /// Send the cart to the kitchen as a pending order. Dine-in when the link
    /// carried a table number, takeaway otherwise.
    pub async fn place_order(&mut self) -> PosResult<Order> {
        if self.cart.is_empty() {
            return self
                .status
                .reject(Err(PosError::validation(i18n::t(self.language, "pos.emptyCart"))));
        }
        let shop = self
            .shop
            .clone()
            .ok_or_else(|| PosError::validation("Menu is not loaded"));
        let shop = self.status.reject(shop)?;

        self.status.begin();
        let result = self.submit(&shop).await;
        let order = self.status.finish(result)?;
        info!(order_id = %order.id, shop = %shop.slug, "customer order placed");
        self.customer_name.clear();
        self.placed = Some(order.clone());
        Ok(order)
    }

    async fn submit(&mut self, shop: &Shop) -> PosResult<Order> {
        let table_id = match &self.table_number {
            Some(number) => fetch_one::<DiningTable>(
                self.backend.as_ref(),
                Table::Tables,
                Query::new()
                    .eq("branch_id", self.branch_id.as_str())
                    .eq("table_number", number.as_str()),
            )
            .await?
            .map(|t| t.id),
            None => None,
        };
        let draft = NewOrder {
            branch_id: self.branch_id.clone(),
            table_id,
            order_type: if self.table_number.is_some() {
                OrderType::DineIn
            } else {
                OrderType::Takeaway
            },
            discount: Decimal::ZERO,
            payment_method: None,
            note: None,
            customer_name: Some(self.customer_name.clone()),
        };
        self.orders.create_order(shop, &mut self.cart, draft).await
    }

    /// Back to the menu after the confirmation.
    pub fn order_again(&mut self) {
        self.placed = None;
    }
}
