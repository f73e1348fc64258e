//! Branch and table editor with per-table QR links.

use super::ScreenStatus;
use crate::app::Session;
use crate::error::{PosError, PosResult};
use crate::models::{Branch, BranchDraft, Shop};
use crate::plan::ensure_within_limit;
use crate::shops::table_qr_url;

/// A table's number and the link its QR code encodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableQr {
    pub table_number: String,
    pub url: String,
}

#[derive(Debug, Default)]
pub struct BranchesScreen {
    pub form: Option<BranchDraft>,
    /// Branch id being edited; `None` with an open form means a new branch.
    pub editing_id: Option<String>,
    pub pending_delete: Option<String>,
    pub status: ScreenStatus,
}

fn current_shop(session: &Session) -> PosResult<Shop> {
    session
        .shops
        .current_shop()
        .cloned()
        .ok_or_else(|| PosError::validation("No shop selected"))
}

impl BranchesScreen {
    pub fn new() -> Self {
        Self::default()
    }

    /// Branches of the current shop and the tables of each.
    pub async fn load(&mut self, session: &mut Session) -> PosResult<()> {
        let Some(shop_id) = session.shops.current_shop().map(|s| s.id.clone()) else {
            return Ok(());
        };
        self.status.begin();
        let result: PosResult<()> = async {
            let ids: Vec<String> = session
                .shops
                .fetch_branches(&shop_id)
                .await?
                .iter()
                .map(|b| b.id.clone())
                .collect();
            for id in ids {
                session.shops.fetch_tables(&id).await?;
            }
            Ok(())
        }
        .await;
        self.status.finish(result)
    }

    pub fn open_form(&mut self, branch: Option<&Branch>) {
        self.form = Some(match branch {
            Some(b) => BranchDraft {
                name: b.name.clone(),
                address: b.address.clone(),
                phone: b.phone.clone(),
                table_count: b.table_count,
            },
            None => BranchDraft::default(),
        });
        self.editing_id = branch.map(|b| b.id.clone());
    }

    pub fn close_form(&mut self) {
        self.form = None;
        self.editing_id = None;
    }

    /// New branches are checked against the plan's branch limit first.
    pub async fn save(&mut self, session: &mut Session) -> PosResult<()> {
        let prepared = self.prepare(session);
        let (shop, draft) = self.status.reject(prepared)?;
        self.status.begin();
        let result = match &self.editing_id {
            Some(id) => session.shops.update_branch(id, draft).await,
            None => session.shops.create_branch(&shop.id, draft).await.map(|_| ()),
        };
        self.status.finish(result)?;
        self.close_form();
        Ok(())
    }

    fn prepare(&self, session: &Session) -> PosResult<(Shop, BranchDraft)> {
        let shop = current_shop(session)?;
        let draft = self
            .form
            .clone()
            .ok_or_else(|| PosError::validation("No branch form open"))?;
        if self.editing_id.is_none() {
            let allowed = session.plan.can_add_branch(session.shops.branches().len());
            ensure_within_limit(allowed, "branches")?;
        }
        Ok((shop, draft))
    }

    /// Create the tables a branch is missing. Returns how many were added.
    pub async fn generate_tables(&mut self, session: &mut Session, branch_id: &str) -> PosResult<usize> {
        let branch = session
            .shops
            .branches()
            .iter()
            .find(|b| b.id == branch_id)
            .cloned()
            .ok_or_else(|| PosError::not_found(format!("Branch {branch_id} not found")));
        let branch = self.status.reject(branch)?;
        self.status.begin();
        self.status.finish(session.shops.generate_tables(&branch).await)
    }

    /// QR links for every loaded table of a branch.
    pub fn qr_links(session: &Session, branch_id: &str) -> Vec<TableQr> {
        let Some(shop) = session.shops.current_shop() else {
            return Vec::new();
        };
        session
            .shops
            .tables(branch_id)
            .iter()
            .map(|t| TableQr {
                table_number: t.table_number.clone(),
                url: table_qr_url(&session.public_origin, &shop.slug, branch_id, &t.table_number),
            })
            .collect()
    }

    pub fn request_delete(&mut self, branch_id: &str) {
        self.pending_delete = Some(branch_id.to_string());
    }

    pub fn cancel_delete(&mut self) {
        self.pending_delete = None;
    }

    pub async fn confirm_delete(&mut self, session: &mut Session) -> PosResult<()> {
        let Some(id) = self.pending_delete.take() else {
            return Ok(());
        };
        self.status.begin();
        self.status.finish(session.shops.delete_branch(&id).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewShop, ShopType};
    use crate::testing;

    async fn owner_with_shop() -> (tempfile::TempDir, Session) {
        let (dir, app) = testing::app();
        let mut session = app.session().unwrap();
        session.auth.register("owner@shop.th", "secret1", "Owner").await.unwrap();
        session.sync_auth().await.unwrap();
        session
            .shops
            .create_shop(NewShop {
                name: "Baan".into(),
                slug: "baan".into(),
                shop_type: ShopType::Restaurant,
            })
            .await
            .unwrap();
        (dir, session)
    }

    #[tokio::test]
    async fn create_generate_and_link_tables() {
        let (_dir, mut session) = owner_with_shop().await;
        let mut screen = BranchesScreen::new();
        screen.open_form(None);
        let form = screen.form.as_mut().unwrap();
        assert_eq!(form.table_count, 10);
        form.name = "Siam".into();
        form.table_count = 3;
        screen.save(&mut session).await.unwrap();
        assert!(screen.form.is_none());

        let branch = session.shops.branches()[0].clone();
        assert_eq!(screen.generate_tables(&mut session, &branch.id).await.unwrap(), 3);
        assert_eq!(screen.generate_tables(&mut session, &branch.id).await.unwrap(), 0);

        let links = BranchesScreen::qr_links(&session, &branch.id);
        assert_eq!(links.len(), 3);
        assert_eq!(
            links[2].url,
            format!("https://pos.example.com/menu/baan/{}?table=3", branch.id)
        );
    }

    #[tokio::test]
    async fn free_plan_allows_one_branch_but_edits_pass() {
        let (_dir, mut session) = owner_with_shop().await;
        let mut screen = BranchesScreen::new();
        screen.open_form(None);
        screen.form.as_mut().unwrap().name = "Main".into();
        screen.save(&mut session).await.unwrap();

        screen.open_form(None);
        screen.form.as_mut().unwrap().name = "Second".into();
        assert!(matches!(screen.save(&mut session).await, Err(PosError::Validation(_))));
        assert!(screen.form.is_some());
        assert_eq!(session.shops.branches().len(), 1);

        let main = session.shops.branches()[0].clone();
        screen.open_form(Some(&main));
        screen.form.as_mut().unwrap().name = "Main Hall".into();
        screen.save(&mut session).await.unwrap();
        assert_eq!(session.shops.branches()[0].name, "Main Hall");
    }

    #[tokio::test]
    async fn delete_requires_confirmation() {
        let (_dir, mut session) = owner_with_shop().await;
        let mut screen = BranchesScreen::new();
        screen.open_form(None);
        screen.form.as_mut().unwrap().name = "Main".into();
        screen.save(&mut session).await.unwrap();
        let id = session.shops.branches()[0].id.clone();

        screen.request_delete(&id);
        screen.cancel_delete();
        screen.confirm_delete(&mut session).await.unwrap();
        assert_eq!(session.shops.branches().len(), 1);

        screen.request_delete(&id);
        screen.confirm_delete(&mut session).await.unwrap();
        assert!(session.shops.branches().is_empty());
        assert!(session.shops.current_branch().is_none());
        assert!(BranchesScreen::qr_links(&session, &id).is_empty());
    }

    #[tokio::test]
    async fn unknown_branch_cannot_generate_tables() {
        let (_dir, mut session) = owner_with_shop().await;
        let mut screen = BranchesScreen::new();
        assert!(matches!(
            screen.generate_tables(&mut session, "missing").await,
            Err(PosError::NotFound(_))
        ));
        assert!(!screen.status.busy);
    }
}
