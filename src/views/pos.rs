//! Cashier checkout screen.
//!
//! Cash opens a tender step where the received amount is typed and checked
//! against the total; transfer and card complete immediately. Transfers show
//! the shop's PromptPay code for the exact total.

use rust_decimal::Decimal;
use tracing::{info, warn};

use super::ScreenStatus;
use crate::app::Session;
use crate::cart::{Cart, CartItem, Totals};
use crate::error::{PosError, PosResult};
use crate::models::{MenuItem, Order, OrderType, PaymentMethod, Shop};
use crate::orders::NewOrder;
use crate::payments::{self, cash_change, parse_amount};

/// Receipt of a completed checkout.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutResult {
    pub order: Order,
    /// Cash only.
    pub change: Option<Decimal>,
}

#[derive(Debug, Default)]
pub struct PosScreen {
    pub search: String,
    pub category_id: Option<String>,
    pub cart: Cart,
    pub order_type: OrderType,
    pub table_id: Option<String>,
    pub discount_input: String,
    pub note: String,
    /// `Some` while the cash tender step is open; holds the typed amount.
    pub cash_received: Option<String>,
    pub last_checkout: Option<CheckoutResult>,
    pub status: ScreenStatus,
}

fn current_shop(session: &Session) -> PosResult<Shop> {
    session
        .shops
        .current_shop()
        .cloned()
        .ok_or_else(|| PosError::validation("No shop selected"))
}

impl PosScreen {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the shop's catalog and the current branch's tables.
    pub async fn load(&mut self, session: &mut Session) -> PosResult<()> {
        self.status.begin();
        let result: PosResult<()> = async {
            let shop = current_shop(session)?;
            session.menu.fetch_all(&shop.id).await?;
            if let Some(branch_id) = session.shops.current_branch().map(|b| b.id.clone()) {
                session.shops.fetch_tables(&branch_id).await?;
            }
            Ok(())
        }
        .await;
        self.status.finish(result)
    }

    pub fn visible_items<'a>(&self, session: &'a Session) -> Vec<&'a MenuItem> {
        session
            .menu
            .filtered_items(&self.search, self.category_id.as_deref())
    }

    pub fn add_item(&mut self, item: &MenuItem, note: &str) {
        self.cart.add(CartItem::from_menu_item(item, 1, note));
    }

    /// Retail shops only. Unknown codes leave the cart untouched.
    pub fn scan_barcode(&mut self, session: &Session, code: &str) -> PosResult<()> {
        let result = (|| -> PosResult<MenuItem> {
            let shop = current_shop(session)?;
            if !shop.is_retail() {
                return Err(PosError::validation(
                    "Barcode scanning is only available for retail shops",
                ));
            }
            match session.menu.find_by_barcode(code) {
                Ok(item) => Ok(item.clone()),
                Err(PosError::NotFound(_)) => Err(PosError::not_found(
                    session.t("pos.barcodeNotFound").to_string(),
                )),
                Err(e) => Err(e),
            }
        })();
        let item = self.status.reject(result)?;
        self.status.error = None;
        self.add_item(&item, "");
        Ok(())
    }

    pub fn set_order_type(&mut self, order_type: OrderType) {
        self.order_type = order_type;
        if order_type == OrderType::Takeaway {
            self.table_id = None;
        }
    }

    pub fn discount(&self) -> PosResult<Decimal> {
        Ok(parse_amount(&self.discount_input)?.unwrap_or(Decimal::ZERO))
    }

    pub fn totals(&self) -> PosResult<Totals> {
        self.cart.totals(self.discount()?)
    }

    /// Change for the amount typed in the tender step, if it covers the total.
    pub fn cash_change(&self) -> Option<Decimal> {
        let received = parse_amount(self.cash_received.as_deref()?).ok()??;
        cash_change(self.totals().ok()?.total, received).ok()
    }

    /// PromptPay payload for the current total.
    pub fn promptpay_payload(&self, session: &Session) -> PosResult<String> {
        let shop = current_shop(session)?;
        let id = shop
            .promptpay_id()
            .ok_or_else(|| PosError::validation("Set a PromptPay ID in settings to accept transfers"))?;
        payments::promptpay_payload(id, Some(self.totals()?.total))
    }

    /// Payment button. Cash opens the tender step and returns `None`.
    pub async fn pay(
        &mut self,
        session: &mut Session,
        method: PaymentMethod,
    ) -> PosResult<Option<CheckoutResult>> {
        let ready = self.precheck(session);
        self.status.reject(ready)?;
        if method == PaymentMethod::Cash {
            self.cash_received = Some(String::new());
            return Ok(None);
        }
        self.checkout(session, method, None).await.map(Some)
    }

    /// Confirm the cash tender step.
    pub async fn confirm_cash(&mut self, session: &mut Session) -> PosResult<CheckoutResult> {
        let change = self.tendered_change();
        let change = self.status.reject(change)?;
        self.checkout(session, PaymentMethod::Cash, Some(change)).await
    }

    fn tendered_change(&self) -> PosResult<Decimal> {
        let typed = self
            .cash_received
            .as_deref()
            .ok_or_else(|| PosError::validation("Cash payment was not started"))?;
        let received =
            parse_amount(typed)?.ok_or_else(|| PosError::validation("Enter the amount received"))?;
        cash_change(self.totals()?.total, received)
    }

    pub fn cancel_cash(&mut self) {
        self.cash_received = None;
    }

    fn precheck(&self, session: &Session) -> PosResult<()> {
        if self.cart.is_empty() {
            return Err(PosError::validation(session.t("pos.emptyCart").to_string()));
        }
        if session.shops.current_branch().is_none() {
            return Err(PosError::validation("No branch selected"));
        }
        self.totals().map(|_| ())
    }

    async fn checkout(
        &mut self,
        session: &mut Session,
        method: PaymentMethod,
        change: Option<Decimal>,
    ) -> PosResult<CheckoutResult> {
        let ready = self.precheck(session);
        self.status.reject(ready)?;
        let shop = self.status.reject(current_shop(session))?;
        self.status.begin();
        let result: PosResult<Order> = async {
            let branch_id = session
                .shops
                .current_branch()
                .map(|b| b.id.clone())
                .ok_or_else(|| PosError::validation("No branch selected"))?;
            let draft = NewOrder {
                branch_id,
                table_id: match self.order_type {
                    OrderType::DineIn => self.table_id.clone(),
                    OrderType::Takeaway => None,
                },
                order_type: self.order_type,
                discount: self.discount()?,
                payment_method: Some(method),
                note: Some(self.note.clone()),
                customer_name: None,
            };
            session.orders.create_order(&shop, &mut self.cart, draft).await
        }
        .await;
        let order = self.status.finish(result)?;
        info!(order_id = %order.id, method = method.as_str(), "checkout complete");

        // The sale is saved; a stale stock figure is not a checkout failure.
        if shop.is_retail() {
            if let Err(e) = session.menu.fetch_items(&shop.id).await {
                warn!(shop_id = %shop.id, error = %e, "menu reload after checkout failed");
            }
        }

        self.cash_received = None;
        self.discount_input.clear();
        self.note.clear();
        self.table_id = None;
        let receipt = CheckoutResult { order, change };
        self.last_checkout = Some(receipt.clone());
        Ok(receipt)
    }
}
