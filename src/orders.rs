//! Order pipeline and order book.
//!
//! `create_order` turns a cart into an order header plus its item rows; the
//! money fields are computed once here and never re-derived. Afterwards an
//! order only moves forward through its status chain.
//!
//! Writes are not transactional across requests. If the item insert fails
//! after the header was written, the header is moved to `cancelled` (orders
//! are never deleted) and the original error is returned. Retail stock
//! decrements use a compare-and-set on the stored quantity.

use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::auth::AuthService;
use crate::backend::{decode_rows, fetch_one, fetch_rows, insert_row, Backend, Query, Table};
use crate::cart::Cart;
use crate::error::{PosError, PosResult};
use crate::models::{MenuItem, Order, OrderItem, OrderStatus, OrderType, PaymentMethod, Shop};

/// Attempts per line before a contended stock decrement is given up.
const STOCK_CAS_ATTEMPTS: usize = 3;

/// Everything about an order that does not come from the cart.
#[derive(Debug, Clone, Default)]
pub struct NewOrder {
    pub branch_id: String,
    pub table_id: Option<String>,
    pub order_type: OrderType,
    pub discount: Decimal,
    pub payment_method: Option<PaymentMethod>,
    pub note: Option<String>,
    pub customer_name: Option<String>,
}

fn blank_to_none(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub struct OrderStore {
    backend: Arc<dyn Backend>,
    auth: Arc<dyn AuthService>,
    orders: Vec<Order>,
    current_order_items: Vec<OrderItem>,
    branch_id: Option<String>,
    status_filter: Option<OrderStatus>,
}

impl OrderStore {
    pub fn new(backend: Arc<dyn Backend>, auth: Arc<dyn AuthService>) -> Self {
        Self {
            backend,
            auth,
            orders: Vec::new(),
            current_order_items: Vec::new(),
            branch_id: None,
            status_filter: None,
        }
    }

    pub fn orders(&self) -> &[Order] {
        &self.orders
    }

    pub fn current_order_items(&self) -> &[OrderItem] {
        &self.current_order_items
    }

    /// Branch of the last `fetch_orders`.
    pub fn branch_id(&self) -> Option<&str> {
        self.branch_id.as_deref()
    }

    pub fn status_filter(&self) -> Option<OrderStatus> {
        self.status_filter
    }

    // -----------------------------------------------------------------------
    // Pipeline
    // -----------------------------------------------------------------------

    /// Persist the cart as an order. The cart is cleared only on success.
    pub async fn create_order(
        &self,
        shop: &Shop,
        cart: &mut Cart,
        draft: NewOrder,
    ) -> PosResult<Order> {
        if cart.is_empty() {
            return Err(PosError::validation("Cart is empty"));
        }
        if draft.branch_id.trim().is_empty() {
            return Err(PosError::validation("No branch selected"));
        }
        let totals = cart.totals(draft.discount)?;
        let created_by = self.auth.current_identity().map(|u| u.id);
        let paid = draft.payment_method.is_some();
        let status = if paid {
            OrderStatus::Paid
        } else {
            OrderStatus::Pending
        };

        let paid_at = paid.then(|| Utc::now().to_rfc3339());

        let header = json!({
            "branch_id": draft.branch_id,
            "table_id": blank_to_none(draft.table_id),
            "order_type": draft.order_type,
            "status": status,
            "subtotal": totals.subtotal,
            "discount": totals.discount,
            "total": totals.total,
            "payment_method": draft.payment_method,
            "paid_at": paid_at,
            "note": blank_to_none(draft.note),
            "customer_name": blank_to_none(draft.customer_name),
            "created_by": created_by,
        });
        let order: Order = insert_row(self.backend.as_ref(), Table::Orders, header).await?;

        let rows: Vec<Value> = cart
            .items()
            .iter()
            .map(|line| {
                json!({
                    "order_id": order.id,
                    "menu_item_id": line.menu_item_id,
                    "item_name": line.name,
                    "quantity": line.quantity,
                    "unit_price": line.price,
                    "options": line.options,
                    "note": blank_to_none(Some(line.note.clone())),
                })
            })
            .collect();

        if let Err(e) = self.backend.insert(Table::OrderItems, rows).await {
            error!(order_id = %order.id, error = %e, "order items failed, cancelling header");
            self.cancel_orphan(&order).await;
            return Err(e);
        }

        if paid && shop.is_retail() {
            self.decrement_stock(cart).await;
        }

        info!(
            order_id = %order.id,
            order_number = order.order_number,
            total = %order.total,
            status = %order.status,
            "order created"
        );
        cart.clear();
        Ok(order)
    }

    async fn cancel_orphan(&self, order: &Order) {
        let result = self
            .backend
            .update(
                Table::Orders,
                &Query::new().eq("id", order.id.as_str()),
                json!({ "status": OrderStatus::Cancelled }),
            )
            .await;
        match result {
            Ok(rows) if !rows.is_empty() => {
                warn!(order_id = %order.id, "orphan order header cancelled")
            }
            Ok(_) => warn!(order_id = %order.id, "orphan order header not found"),
            Err(e) => error!(order_id = %order.id, error = %e, "could not cancel orphan order"),
        }
    }

    /// Best effort: failures are logged, never surfaced, since the order is
    /// already paid.
    async fn decrement_stock(&self, cart: &Cart) {
        let mut per_item: BTreeMap<&str, u32> = BTreeMap::new();
        for line in cart.items() {
            *per_item.entry(line.menu_item_id.as_str()).or_default() += line.quantity;
        }
        for (item_id, qty) in per_item {
            if let Err(e) = self.decrement_one(item_id, qty).await {
                warn!(menu_item_id = item_id, error = %e, "stock decrement failed");
            }
        }
    }

    async fn decrement_one(&self, item_id: &str, qty: u32) -> PosResult<()> {
        for attempt in 1..=STOCK_CAS_ATTEMPTS {
            let item: Option<MenuItem> = fetch_one(
                self.backend.as_ref(),
                Table::MenuItems,
                Query::new().eq("id", item_id),
            )
            .await?;
            let Some(item) = item else {
                return Ok(());
            };
            let (true, Some(current)) = (item.track_stock, item.stock_quantity) else {
                return Ok(());
            };
            let next = (current - i64::from(qty)).max(0);
            let updated = self
                .backend
                .update(
                    Table::MenuItems,
                    &Query::new().eq("id", item_id).eq("stock_quantity", current),
                    json!({ "stock_quantity": next }),
                )
                .await?;
            if !updated.is_empty() {
                debug!(menu_item_id = item_id, from = current, to = next, "stock decremented");
                return Ok(());
            }
            debug!(menu_item_id = item_id, attempt, "stock changed concurrently, retrying");
        }
        Err(PosError::Backend(format!(
            "stock for {item_id} kept changing; gave up after {STOCK_CAS_ATTEMPTS} attempts"
        )))
    }

    // -----------------------------------------------------------------------
    // Order book
    // -----------------------------------------------------------------------

    /// Orders of a branch, newest first, optionally filtered by status.
    pub async fn fetch_orders(
        &mut self,
        branch_id: &str,
        status: Option<OrderStatus>,
    ) -> PosResult<&[Order]> {
        let mut query = Query::new().eq("branch_id", branch_id);
        if let Some(status) = status {
            query = query.eq("status", status.as_str());
        }
        let query = query.order_by_desc("created_at");
        self.orders = fetch_rows(self.backend.as_ref(), Table::Orders, &query).await?;
        self.branch_id = Some(branch_id.to_string());
        self.status_filter = status;
        Ok(&self.orders)
    }

    pub async fn fetch_order_items(&mut self, order_id: &str) -> PosResult<&[OrderItem]> {
        self.current_order_items = fetch_rows(
            self.backend.as_ref(),
            Table::OrderItems,
            &Query::new().eq("order_id", order_id),
        )
        .await?;
        Ok(&self.current_order_items)
    }

    /// Move an order one step along its chain, then reload the list.
    ///
    /// The write only applies while the stored status still equals
    /// `order.status`, so two operators cannot advance the same order twice.
    pub async fn update_status(&mut self, order: &Order, target: OrderStatus) -> PosResult<Order> {
        if order.status.next() != Some(target) {
            return Err(PosError::InvalidTransition {
                from: order.status.to_string(),
                to: target.to_string(),
            });
        }
        let mut patch = json!({ "status": target });
        if target == OrderStatus::Paid {
            patch["paid_at"] = Value::String(Utc::now().to_rfc3339());
        }
        let rows = self
            .backend
            .update(
                Table::Orders,
                &Query::new()
                    .eq("id", order.id.as_str())
                    .eq("status", order.status.as_str()),
                patch,
            )
            .await?;
        let updated = decode_rows::<Order>(rows)?.into_iter().next().ok_or_else(|| {
            PosError::InvalidTransition {
                from: order.status.to_string(),
                to: target.to_string(),
            }
        })?;
        info!(order_id = %order.id, from = %order.status, to = %target, "order status updated");

        self.fetch_orders(&order.branch_id, self.status_filter).await?;
        Ok(updated)
    }

    /// Advance to the next status in the chain.
    pub async fn advance(&mut self, order: &Order) -> PosResult<Order> {
        let target = order.status.next().ok_or_else(|| PosError::InvalidTransition {
            from: order.status.to_string(),
            to: "-".to_string(),
        })?;
        self.update_status(order, target).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cart::CartItem;
    use crate::testing::{self, CountingBackend};
    use serde_json::Map;

    fn shop(shop_type: &str) -> Shop {
        serde_json::from_value(json!({
            "id": "s1", "owner_id": "u1", "name": "Baan", "slug": "baan",
            "shop_type": shop_type, "created_at": "2026-10-17T05:00:00Z"
        }))
        .unwrap()
    }

    fn line(id: &str, price: i64, qty: u32) -> CartItem {
        CartItem {
            menu_item_id: id.into(),
            name: format!("item {id}"),
            price: Decimal::from(price),
            quantity: qty,
            note: String::new(),
            options: Map::new(),
        }
    }

    fn draft(payment: Option<PaymentMethod>, discount: i64) -> NewOrder {
        NewOrder {
            branch_id: "b1".into(),
            discount: Decimal::from(discount),
            payment_method: payment,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn totals_and_items_are_persisted() {
        let (db, backend) = testing::local_backend();
        let auth = testing::local_auth(&db);
        let owner = testing::signed_in_owner(&auth).await;
        let mut store = OrderStore::new(backend.clone(), auth);

        let mut cart = Cart::new();
        cart.add(line("a", 100, 2));
        cart.add(line("b", 50, 1));
        let order = store
            .create_order(&shop("restaurant"), &mut cart, draft(None, 20))
            .await
            .expect("create order");

        assert_eq!(order.subtotal, Decimal::from(250));
        assert_eq!(order.total, Decimal::from(230));
        assert_eq!(order.status, OrderStatus::Pending);
        assert!(order.paid_at.is_none());
        assert_eq!(order.created_by.as_deref(), Some(owner.id.as_str()));
        assert_eq!(order.order_number, 1);
        assert!(cart.is_empty());

        let items = store.fetch_order_items(&order.id).await.unwrap();
        assert_eq!(items.len(), 2);
        let sum: Decimal = items.iter().map(OrderItem::line_total).sum();
        assert_eq!(sum, order.subtotal);
    }

    #[tokio::test]
    async fn payment_marks_order_paid() {
        let (db, backend) = testing::local_backend();
        let store = OrderStore::new(backend, testing::local_auth(&db));
        let mut cart = Cart::new();
        cart.add(line("a", 40, 1));
        let order = store
            .create_order(&shop("cafe"), &mut cart, draft(Some(PaymentMethod::Cash), 0))
            .await
            .unwrap();
        assert_eq!(order.status, OrderStatus::Paid);
        assert!(order.paid_at.is_some());
        assert_eq!(order.payment_method, Some(PaymentMethod::Cash));
        assert!(order.created_by.is_none());
    }

    #[tokio::test]
    async fn empty_cart_issues_no_request() {
        let (db, backend) = testing::local_backend();
        let counting = CountingBackend::new(backend);
        let store = OrderStore::new(counting.clone(), testing::local_auth(&db));
        let mut cart = Cart::new();
        let err = store
            .create_order(&shop("cafe"), &mut cart, draft(None, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, PosError::Validation(_)));
        assert_eq!(counting.calls(), 0);
    }

    #[tokio::test]
    async fn excessive_discount_issues_no_request() {
        let (db, backend) = testing::local_backend();
        let counting = CountingBackend::new(backend);
        let store = OrderStore::new(counting.clone(), testing::local_auth(&db));
        let mut cart = Cart::new();
        cart.add(line("a", 10, 1));
        let err = store
            .create_order(&shop("cafe"), &mut cart, draft(None, 11))
            .await
            .unwrap_err();
        assert!(matches!(err, PosError::Validation(_)));
        assert_eq!(counting.calls(), 0);
        assert_eq!(cart.len(), 1);
    }

    #[tokio::test]
    async fn failed_item_insert_cancels_header_and_keeps_cart() {
        let (db, backend) = testing::local_backend();
        let counting = CountingBackend::new(backend.clone());
        counting.fail_inserts_into(Some(Table::OrderItems));
        let mut store = OrderStore::new(counting.clone(), testing::local_auth(&db));

        let mut cart = Cart::new();
        cart.add(line("a", 10, 1));
        let err = store
            .create_order(&shop("cafe"), &mut cart, draft(None, 0))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("order_items"), "{err}");
        assert_eq!(cart.len(), 1);

        let orders = store.fetch_orders("b1", None).await.unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].status, OrderStatus::Cancelled);
    }

    async fn stocked_item(backend: &Arc<dyn Backend>, stock: i64) -> String {
        let rows = backend
            .insert(
                Table::MenuItems,
                vec![json!({
                    "shop_id": "s1", "name": "Soap", "price": 30,
                    "track_stock": true, "stock_quantity": stock, "barcode": "885000"
                })],
            )
            .await
            .unwrap();
        rows[0]["id"].as_str().unwrap().to_string()
    }

    async fn stock_of(backend: &Arc<dyn Backend>, id: &str) -> Option<i64> {
        let item: MenuItem = fetch_one(backend.as_ref(), Table::MenuItems, Query::new().eq("id", id))
            .await
            .unwrap()
            .unwrap();
        item.stock_quantity
    }

    #[tokio::test]
    async fn retail_payment_decrements_stock_with_floor() {
        let (db, backend) = testing::local_backend();
        let store = OrderStore::new(backend.clone(), testing::local_auth(&db));
        let id = stocked_item(&backend, 5).await;

        let mut cart = Cart::new();
        cart.add(line(&id, 30, 2));
        store
            .create_order(&shop("retail"), &mut cart, draft(Some(PaymentMethod::Card), 0))
            .await
            .unwrap();
        assert_eq!(stock_of(&backend, &id).await, Some(3));

        cart.add(line(&id, 30, 10));
        store
            .create_order(&shop("retail"), &mut cart, draft(Some(PaymentMethod::Cash), 0))
            .await
            .unwrap();
        assert_eq!(stock_of(&backend, &id).await, Some(0));
    }

    #[tokio::test]
    async fn contended_stock_retries_from_fresh_value() {
        let (db, inner) = testing::local_backend();
        let counting = CountingBackend::new(inner.clone());
        let store = OrderStore::new(counting.clone(), testing::local_auth(&db));
        let id = stocked_item(&inner, 10).await;

        // another till sells one unit between our read and our write
        counting.race_stock_updates(1);
        let mut cart = Cart::new();
        cart.add(line(&id, 30, 2));
        store
            .create_order(&shop("retail"), &mut cart, draft(Some(PaymentMethod::Cash), 0))
            .await
            .unwrap();
        assert_eq!(stock_of(&inner, &id).await, Some(7));
    }

    #[tokio::test]
    async fn stock_gives_up_without_failing_the_sale() {
        let (db, inner) = testing::local_backend();
        let counting = CountingBackend::new(inner.clone());
        let store = OrderStore::new(counting.clone(), testing::local_auth(&db));
        let id = stocked_item(&inner, 10).await;

        counting.race_stock_updates(STOCK_CAS_ATTEMPTS);
        let mut cart = Cart::new();
        cart.add(line(&id, 30, 2));
        let order = store
            .create_order(&shop("retail"), &mut cart, draft(Some(PaymentMethod::Card), 0))
            .await
            .unwrap();
        assert_eq!(order.status, OrderStatus::Paid);
        assert!(cart.is_empty());
        // only the competing sales landed
        assert_eq!(
            stock_of(&inner, &id).await,
            Some(10 - STOCK_CAS_ATTEMPTS as i64)
        );
    }

    #[tokio::test]
    async fn stock_untouched_when_unpaid_or_not_retail() {
        let (db, backend) = testing::local_backend();
        let store = OrderStore::new(backend.clone(), testing::local_auth(&db));
        let id = stocked_item(&backend, 5).await;

        let mut cart = Cart::new();
        cart.add(line(&id, 30, 1));
        store
            .create_order(&shop("retail"), &mut cart, draft(None, 0))
            .await
            .unwrap();
        cart.add(line(&id, 30, 1));
        store
            .create_order(&shop("cafe"), &mut cart, draft(Some(PaymentMethod::Cash), 0))
            .await
            .unwrap();
        assert_eq!(stock_of(&backend, &id).await, Some(5));
    }

    #[tokio::test]
    async fn status_moves_one_step_and_stamps_paid_at() {
        let (db, backend) = testing::local_backend();
        let mut store = OrderStore::new(backend, testing::local_auth(&db));
        let mut cart = Cart::new();
        cart.add(line("a", 10, 1));
        let mut order = store
            .create_order(&shop("cafe"), &mut cart, draft(None, 0))
            .await
            .unwrap();

        let skip = store.update_status(&order, OrderStatus::Ready).await;
        assert!(matches!(skip, Err(PosError::InvalidTransition { .. })));

        for expected in [
            OrderStatus::Preparing,
            OrderStatus::Ready,
            OrderStatus::Served,
            OrderStatus::Paid,
        ] {
            order = store.advance(&order).await.unwrap();
            assert_eq!(order.status, expected);
        }
        assert!(order.paid_at.is_some());
        assert_eq!(store.orders()[0].status, OrderStatus::Paid);

        assert!(matches!(
            store.advance(&order).await,
            Err(PosError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn stale_status_update_is_rejected() {
        let (db, backend) = testing::local_backend();
        let mut store = OrderStore::new(backend, testing::local_auth(&db));
        let mut cart = Cart::new();
        cart.add(line("a", 10, 1));
        let order = store
            .create_order(&shop("cafe"), &mut cart, draft(None, 0))
            .await
            .unwrap();

        store.advance(&order).await.unwrap();
        let stale = store.advance(&order).await;
        assert!(matches!(stale, Err(PosError::InvalidTransition { .. })));
    }

    #[tokio::test]
    async fn fetch_orders_newest_first_with_filter() {
        let (db, backend) = testing::local_backend();
        let mut store = OrderStore::new(backend, testing::local_auth(&db));
        let mut cart = Cart::new();
        for payment in [None, Some(PaymentMethod::Cash), None] {
            cart.add(line("a", 10, 1));
            store
                .create_order(&shop("cafe"), &mut cart, draft(payment, 0))
                .await
                .unwrap();
        }

        let all = store.fetch_orders("b1", None).await.unwrap();
        let numbers: Vec<i64> = all.iter().map(|o| o.order_number).collect();
        assert_eq!(numbers, vec![3, 2, 1]);

        let paid = store
            .fetch_orders("b1", Some(OrderStatus::Paid))
            .await
            .unwrap();
        assert_eq!(paid.len(), 1);
        assert_eq!(paid[0].order_number, 2);
        assert!(store.fetch_orders("other", None).await.unwrap().is_empty());
    }
}
