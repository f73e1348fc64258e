//! Subscription plan limits for the signed-in account.

use std::sync::Arc;
use tracing::debug;

use crate::auth::{AuthService, FREE_PLAN_MAX_BRANCHES, FREE_PLAN_MAX_MENU_ITEMS, FREE_PLAN_MAX_SHOPS};
use crate::backend::{fetch_one, Backend, Query, Table};
use crate::error::{PosError, PosResult};
use crate::models::UserPlan;

pub struct PlanStore {
    backend: Arc<dyn Backend>,
    auth: Arc<dyn AuthService>,
    plan: Option<UserPlan>,
}

impl PlanStore {
    pub fn new(backend: Arc<dyn Backend>, auth: Arc<dyn AuthService>) -> Self {
        Self {
            backend,
            auth,
            plan: None,
        }
    }

    pub fn plan(&self) -> Option<&UserPlan> {
        self.plan.as_ref()
    }

    pub async fn fetch_plan(&mut self) -> PosResult<Option<UserPlan>> {
        let user = self.auth.current_identity().ok_or(PosError::NotAuthenticated)?;
        self.plan = fetch_one(
            self.backend.as_ref(),
            Table::UserPlans,
            Query::new().eq("user_id", user.id.as_str()),
        )
        .await?;
        debug!(user_id = %user.id, plan = ?self.plan.as_ref().map(|p| p.plan.as_str()), "plan loaded");
        Ok(self.plan.clone())
    }

    fn limits(&self) -> (u32, u32, u32) {
        match &self.plan {
            Some(p) => (p.max_shops, p.max_branches, p.max_menu_items),
            None => (FREE_PLAN_MAX_SHOPS, FREE_PLAN_MAX_BRANCHES, FREE_PLAN_MAX_MENU_ITEMS),
        }
    }

    /// Without a loaded plan the free-tier limits apply.
    pub fn can_add_shop(&self, current: usize) -> bool {
        current < self.limits().0 as usize
    }

    pub fn can_add_branch(&self, current: usize) -> bool {
        current < self.limits().1 as usize
    }

    pub fn can_add_menu_item(&self, current: usize) -> bool {
        current < self.limits().2 as usize
    }
}

/// Turn a failed limit check into the validation error screens display.
pub fn ensure_within_limit(allowed: bool, what: &str) -> PosResult<()> {
    if allowed {
        Ok(())
    } else {
        Err(PosError::validation(format!(
            "Your plan does not allow more {what}. Upgrade to add more."
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthStore;
    use crate::testing;

    #[tokio::test]
    async fn limits_follow_loaded_plan() {
        let (db, backend) = testing::local_backend();
        let auth = testing::local_auth(&db);
        let mut store = AuthStore::new(backend.clone(), auth.clone());
        store.register("a@b.co", "secret1", "").await.unwrap();

        let mut plans = PlanStore::new(backend.clone(), auth);
        assert!(plans.can_add_shop(0));
        assert!(!plans.can_add_shop(1));

        let user_id = store.user().unwrap().id.clone();
        backend
            .update(
                Table::UserPlans,
                &Query::new().eq("user_id", user_id.as_str()),
                serde_json::json!({ "plan": "pro", "max_branches": 5, "max_menu_items": 500 }),
            )
            .await
            .unwrap();

        let plan = plans.fetch_plan().await.unwrap().expect("plan");
        assert_eq!(plan.plan, "pro");
        assert!(plans.can_add_branch(4));
        assert!(!plans.can_add_branch(5));
        assert!(plans.can_add_menu_item(499));
        assert!(!plans.can_add_shop(1));
    }

    #[tokio::test]
    async fn fetch_requires_sign_in() {
        let (db, backend) = testing::local_backend();
        let mut plans = PlanStore::new(backend, testing::local_auth(&db));
        assert!(matches!(plans.fetch_plan().await, Err(PosError::NotAuthenticated)));
    }

    #[test]
    fn limit_errors_are_validation_failures() {
        assert!(ensure_within_limit(true, "shops").is_ok());
        assert!(matches!(
            ensure_within_limit(false, "shops"),
            Err(PosError::Validation(_))
        ));
    }
}
