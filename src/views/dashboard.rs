//! Dashboard: today's figures for the current branch and shop creation.

use chrono::{DateTime, FixedOffset, Utc};
use rust_decimal::Decimal;

use super::ScreenStatus;
use crate::app::Session;
use crate::error::PosResult;
use crate::models::{NewShop, Order, OrderStatus, Shop, ShopType};
use crate::plan::ensure_within_limit;
use crate::shops::sanitize_slug;

const RECENT_ORDERS: usize = 10;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DashboardSummary {
    pub today_orders: usize,
    /// Sum of today's paid orders.
    pub today_sales: Decimal,
    pub pending_orders: usize,
    /// Today's newest orders.
    pub recent: Vec<Order>,
}

impl DashboardSummary {
    /// "Today" is the calendar day of `now` in the display offset.
    pub fn compute(orders: &[Order], now: DateTime<Utc>, offset: &FixedOffset) -> Self {
        let today = now.with_timezone(offset).date_naive();
        let todays: Vec<&Order> = orders
            .iter()
            .filter(|o| o.created_at.with_timezone(offset).date_naive() == today)
            .collect();
        let today_sales = todays
            .iter()
            .filter(|o| o.status == OrderStatus::Paid)
            .map(|o| o.total)
            .sum();
        let mut recent: Vec<Order> = todays.iter().map(|o| (*o).clone()).collect();
        recent.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        recent.truncate(RECENT_ORDERS);
        Self {
            today_orders: todays.len(),
            today_sales,
            pending_orders: orders
                .iter()
                .filter(|o| o.status == OrderStatus::Pending)
                .count(),
            recent,
        }
    }
}

#[derive(Debug, Default)]
pub struct DashboardScreen {
    pub summary: DashboardSummary,
    pub show_create_shop: bool,
    pub shop_name: String,
    pub shop_slug: String,
    pub shop_type: ShopType,
    pub status: ScreenStatus,
}

impl DashboardScreen {
    pub fn new() -> Self {
        Self::default()
    }

    /// The empty state prompting the owner to create a first shop.
    pub fn has_no_shop(session: &Session) -> bool {
        session.shops.current_shop().is_none() && session.shops.shops().is_empty()
    }

    pub async fn load(&mut self, session: &mut Session) -> PosResult<()> {
        self.status.begin();
        let result: PosResult<DashboardSummary> = async {
            session.shops.fetch_shops().await?;
            let branch_id = session.shops.current_branch().map(|b| b.id.clone());
            match branch_id {
                Some(id) => {
                    session.orders.fetch_orders(&id, None).await?;
                    Ok(DashboardSummary::compute(
                        session.orders.orders(),
                        Utc::now(),
                        &session.display_offset,
                    ))
                }
                None => Ok(DashboardSummary::default()),
            }
        }
        .await;
        self.summary = self.status.finish(result)?;
        Ok(())
    }

    /// Slug input keeps only `[a-z0-9-]` as the owner types.
    pub fn set_slug(&mut self, input: &str) {
        self.shop_slug = sanitize_slug(input);
    }

    pub async fn create_shop(&mut self, session: &mut Session) -> PosResult<Shop> {
        let allowed = session.plan.can_add_shop(session.shops.shops().len());
        self.status.reject(ensure_within_limit(allowed, "shops"))?;
        self.status.begin();
        let draft = NewShop {
            name: self.shop_name.clone(),
            slug: self.shop_slug.clone(),
            shop_type: self.shop_type,
        };
        let shop = self.status.finish(session.shops.create_shop(draft).await)?;
        self.show_create_shop = false;
        self.shop_name.clear();
        self.shop_slug.clear();
        self.shop_type = ShopType::default();
        Ok(shop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use chrono::TimeZone;
    use serde_json::json;

    fn order(number: i64, status: &str, total: i64, created_at: &str) -> Order {
        serde_json::from_value(json!({
            "id": format!("o{number}"), "branch_id": "b1", "order_number": number,
            "order_type": "dine_in", "status": status, "subtotal": total,
            "discount": 0, "total": total, "created_at": created_at
        }))
        .unwrap()
    }

    #[test]
    fn today_uses_display_offset() {
        let bangkok = FixedOffset::east_opt(7 * 3600).unwrap();
        // 2026-10-17 01:00 in Bangkok
        let now = Utc.with_ymd_and_hms(2026, 10, 16, 18, 0, 0).unwrap();
        let orders = vec![
            order(1, "paid", 100, "2026-10-16T17:30:00Z"),   // 00:30 local, today
            order(2, "pending", 40, "2026-10-16T17:45:00Z"), // today, unpaid
            order(3, "paid", 999, "2026-10-16T16:59:00Z"),   // 23:59 local, yesterday
        ];
        let summary = DashboardSummary::compute(&orders, now, &bangkok);
        assert_eq!(summary.today_orders, 2);
        assert_eq!(summary.today_sales, Decimal::from(100));
        assert_eq!(summary.pending_orders, 1);
        assert_eq!(summary.recent[0].order_number, 2);
    }

    #[test]
    fn recent_is_todays_newest_capped() {
        let utc = FixedOffset::east_opt(0).unwrap();
        let now = Utc.with_ymd_and_hms(2026, 10, 17, 23, 0, 0).unwrap();
        let mut orders: Vec<Order> = (1..=15)
            .map(|n| order(n, "paid", 10, &format!("2026-10-17T{:02}:00:00Z", n)))
            .collect();
        orders.push(order(16, "paid", 10, "2026-10-16T23:30:00Z"));

        let summary = DashboardSummary::compute(&orders, now, &utc);
        assert_eq!(summary.recent.len(), RECENT_ORDERS);
        assert_eq!(summary.recent[0].order_number, 15);
        assert!(summary.recent.iter().all(|o| o.order_number != 16));

        let tomorrow = now + chrono::Duration::days(1);
        assert!(DashboardSummary::compute(&orders, tomorrow, &utc).recent.is_empty());
    }

    #[tokio::test]
    async fn free_plan_allows_one_shop() {
        let (_dir, app) = testing::app();
        let mut session = app.session().unwrap();
        session.auth.register("owner@shop.th", "secret1", "Owner").await.unwrap();
        session.sync_auth().await.unwrap();

        let mut screen = DashboardScreen::new();
        assert!(DashboardScreen::has_no_shop(&session));
        screen.shop_name = "Baan".into();
        screen.set_slug("Baan Cafe!");
        assert_eq!(screen.shop_slug, "baancafe");
        let shop = screen.create_shop(&mut session).await.unwrap();
        assert_eq!(shop.slug, "baancafe");
        assert!(screen.shop_name.is_empty());
        assert!(!DashboardScreen::has_no_shop(&session));

        screen.shop_name = "Second".into();
        screen.set_slug("second");
        assert!(screen.create_shop(&mut session).await.is_err());
        assert!(screen.status.error.as_deref().unwrap_or("").contains("plan"));
        assert_eq!(session.shops.shops().len(), 1);

        screen.load(&mut session).await.unwrap();
        assert_eq!(screen.summary, DashboardSummary::default());
    }
}
