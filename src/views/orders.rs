//! Order board for the current branch.

use super::ScreenStatus;
use crate::app::Session;
use crate::error::{PosError, PosResult};
use crate::models::{Order, OrderStatus};

/// Label for a status chip, e.g. `orders.pending`.
pub fn status_label(session: &Session, status: OrderStatus) -> &'static str {
    let key = match status {
        OrderStatus::Pending => "orders.pending",
        OrderStatus::Preparing => "orders.preparing",
        OrderStatus::Ready => "orders.ready",
        OrderStatus::Served => "orders.served",
        OrderStatus::Paid => "orders.paid",
        OrderStatus::Cancelled => "orders.cancelled",
    };
    session.t(key)
}

#[derive(Debug, Default)]
pub struct OrdersScreen {
    /// `None` shows every status.
    pub filter: Option<OrderStatus>,
    /// Order open in the detail view; its items are in the order store.
    pub selected: Option<Order>,
    pub status: ScreenStatus,
}

impl OrdersScreen {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn load(&mut self, session: &mut Session) -> PosResult<()> {
        let Some(branch_id) = session.shops.current_branch().map(|b| b.id.clone()) else {
            return Ok(());
        };
        self.status.begin();
        let result = session
            .orders
            .fetch_orders(&branch_id, self.filter)
            .await
            .map(|_| ());
        self.status.finish(result)
    }

    pub async fn set_filter(
        &mut self,
        session: &mut Session,
        filter: Option<OrderStatus>,
    ) -> PosResult<()> {
        self.filter = filter;
        self.load(session).await
    }

    pub async fn open_detail(&mut self, session: &mut Session, order: &Order) -> PosResult<()> {
        self.selected = Some(order.clone());
        self.status.begin();
        let result = session.orders.fetch_order_items(&order.id).await.map(|_| ());
        self.status.finish(result)
    }

    pub fn close_detail(&mut self) {
        self.selected = None;
    }

    /// Advance the open order one step and close the detail view.
    pub async fn advance(&mut self, session: &mut Session) -> PosResult<Order> {
        let order = self
            .selected
            .clone()
            .ok_or_else(|| PosError::validation("No order selected"));
        let order = self.status.reject(order)?;
        self.status.begin();
        let updated = self.status.finish(session.orders.advance(&order).await)?;
        self.selected = None;
        Ok(updated)
    }
}
