//! Shop, branch and table directory.
//!
//! Tracks the shops the signed-in user owns, the branches of the selected
//! shop, and the tables of each loaded branch. Every mutation re-fetches the
//! affected list instead of patching it locally.

use serde_json::{json, Value};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, info};

use crate::auth::AuthService;
use crate::backend::{fetch_one, fetch_rows, insert_row, to_row, Backend, Query, Table};
use crate::error::{PosError, PosResult};
use crate::models::{Branch, BranchDraft, DiningTable, NewShop, Shop, ShopUpdate};

/// Seats assigned to generated tables.
const DEFAULT_SEATS: u32 = 4;

/// Lowercase and drop everything outside `[a-z0-9-]`.
pub fn sanitize_slug(input: &str) -> String {
    input
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-')
        .collect()
}

/// Link printed in a table's QR code.
pub fn table_qr_url(origin: &str, shop_slug: &str, branch_id: &str, table_number: &str) -> String {
    format!(
        "{}/menu/{}/{}?table={}",
        origin.trim_end_matches('/'),
        shop_slug,
        branch_id,
        table_number
    )
}

fn require_name(name: &str, what: &str) -> PosResult<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(PosError::validation(format!("{what} name is required")));
    }
    Ok(trimmed.to_string())
}

fn optional_text(value: &Option<String>) -> Value {
    match value.as_deref().map(str::trim) {
        Some(s) if !s.is_empty() => Value::String(s.to_string()),
        _ => Value::Null,
    }
}

/// Table numbers sort numerically when they are numbers.
fn sort_tables(tables: &mut [DiningTable]) {
    tables.sort_by(|a, b| {
        match (a.table_number.parse::<u64>(), b.table_number.parse::<u64>()) {
            (Ok(x), Ok(y)) => x.cmp(&y),
            _ => a.table_number.cmp(&b.table_number),
        }
    });
}

pub struct ShopDirectory {
    backend: Arc<dyn Backend>,
    auth: Arc<dyn AuthService>,
    shops: Vec<Shop>,
    branches: Vec<Branch>,
    tables: HashMap<String, Vec<DiningTable>>,
    current_shop: Option<Shop>,
    current_branch: Option<Branch>,
}

impl ShopDirectory {
    pub fn new(backend: Arc<dyn Backend>, auth: Arc<dyn AuthService>) -> Self {
        Self {
            backend,
            auth,
            shops: Vec::new(),
            branches: Vec::new(),
            tables: HashMap::new(),
            current_shop: None,
            current_branch: None,
        }
    }

    pub fn shops(&self) -> &[Shop] {
        &self.shops
    }

    pub fn branches(&self) -> &[Branch] {
        &self.branches
    }

    pub fn current_shop(&self) -> Option<&Shop> {
        self.current_shop.as_ref()
    }

    pub fn current_branch(&self) -> Option<&Branch> {
        self.current_branch.as_ref()
    }

    pub fn tables(&self, branch_id: &str) -> &[DiningTable] {
        self.tables.get(branch_id).map(Vec::as_slice).unwrap_or(&[])
    }

    // -----------------------------------------------------------------------
    // Shops
    // -----------------------------------------------------------------------

    /// Load the user's shops, oldest first. Selects the first shop when none
    /// is selected; keeps the selected shop's copy current otherwise.
    pub async fn fetch_shops(&mut self) -> PosResult<&[Shop]> {
        let user = self.auth.current_identity().ok_or(PosError::NotAuthenticated)?;
        self.shops = fetch_rows(
            self.backend.as_ref(),
            Table::Shops,
            &Query::new().eq("owner_id", user.id.as_str()).order_by("created_at"),
        )
        .await?;
        debug!(count = self.shops.len(), "shops loaded");

        match self.current_shop.as_ref().map(|s| s.id.clone()) {
            Some(id) => {
                self.current_shop = self.shops.iter().find(|s| s.id == id).cloned();
                if self.current_shop.is_none() {
                    self.current_branch = None;
                    self.branches.clear();
                }
            }
            None => {
                if let Some(first) = self.shops.first().cloned() {
                    let shop_id = first.id.clone();
                    self.current_shop = Some(first);
                    self.fetch_branches(&shop_id).await?;
                }
            }
        }
        Ok(&self.shops)
    }

    pub async fn create_shop(&mut self, draft: NewShop) -> PosResult<Shop> {
        let user = self.auth.current_identity().ok_or(PosError::NotAuthenticated)?;
        let name = require_name(&draft.name, "Shop")?;
        let slug = sanitize_slug(&draft.slug);
        if slug.is_empty() {
            return Err(PosError::validation("Shop link may only use a-z, 0-9 and -"));
        }
        let shop: Shop = insert_row(
            self.backend.as_ref(),
            Table::Shops,
            json!({
                "owner_id": user.id,
                "name": name,
                "slug": slug,
                "shop_type": draft.shop_type,
            }),
        )
        .await?;
        info!(shop_id = %shop.id, slug = %shop.slug, "shop created");
        self.fetch_shops().await?;
        Ok(shop)
    }

    /// Update profile fields. `update.settings` is merged over the stored map.
    pub async fn update_shop(&mut self, shop_id: &str, update: ShopUpdate) -> PosResult<()> {
        let name = require_name(&update.name, "Shop")?;
        let existing = match self.shops.iter().find(|s| s.id == shop_id) {
            Some(shop) => shop.clone(),
            None => fetch_one(
                self.backend.as_ref(),
                Table::Shops,
                Query::new().eq("id", shop_id),
            )
            .await?
            .ok_or_else(|| PosError::not_found(format!("Shop {shop_id} not found")))?,
        };
        let mut settings = existing.settings.clone();
        for (key, value) in update.settings {
            settings.insert(key, value);
        }

        self.backend
            .update(
                Table::Shops,
                &Query::new().eq("id", shop_id),
                json!({
                    "name": name,
                    "shop_type": update.shop_type,
                    "phone": optional_text(&update.phone),
                    "address": optional_text(&update.address),
                    "settings": settings,
                }),
            )
            .await?;
        info!(shop_id, "shop updated");
        self.fetch_shops().await?;
        Ok(())
    }

    /// Switch shops: clear branch state, then load the new shop's branches.
    pub async fn set_current_shop(&mut self, shop: Option<Shop>) -> PosResult<()> {
        self.current_shop = shop;
        self.current_branch = None;
        self.branches.clear();
        if let Some(shop_id) = self.current_shop.as_ref().map(|s| s.id.clone()) {
            self.fetch_branches(&shop_id).await?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Branches
    // -----------------------------------------------------------------------

    pub async fn fetch_branches(&mut self, shop_id: &str) -> PosResult<&[Branch]> {
        self.branches = fetch_rows(
            self.backend.as_ref(),
            Table::Branches,
            &Query::new().eq("shop_id", shop_id).order_by("created_at"),
        )
        .await?;
        match self.current_branch.as_ref().map(|b| b.id.clone()) {
            Some(id) => {
                self.current_branch = self.branches.iter().find(|b| b.id == id).cloned();
            }
            None => self.current_branch = self.branches.first().cloned(),
        }
        Ok(&self.branches)
    }

    pub fn set_current_branch(&mut self, branch: Option<Branch>) {
        self.current_branch = branch;
    }

    fn branch_row(draft: &BranchDraft) -> PosResult<Value> {
        let mut row = to_row(draft)?;
        row["name"] = Value::String(require_name(&draft.name, "Branch")?);
        row["address"] = optional_text(&draft.address);
        row["phone"] = optional_text(&draft.phone);
        Ok(row)
    }

    pub async fn create_branch(&mut self, shop_id: &str, draft: BranchDraft) -> PosResult<Branch> {
        let mut row = Self::branch_row(&draft)?;
        row["shop_id"] = Value::String(shop_id.to_string());
        let branch: Branch = insert_row(self.backend.as_ref(), Table::Branches, row).await?;
        info!(branch_id = %branch.id, shop_id, "branch created");
        self.fetch_branches(shop_id).await?;
        Ok(branch)
    }

    pub async fn update_branch(&mut self, branch_id: &str, draft: BranchDraft) -> PosResult<()> {
        let row = Self::branch_row(&draft)?;
        let updated = self
            .backend
            .update(Table::Branches, &Query::new().eq("id", branch_id), row)
            .await?;
        if updated.is_empty() {
            return Err(PosError::not_found(format!("Branch {branch_id} not found")));
        }
        self.refetch_current_branches().await
    }

    /// Tables and orders of the branch are left to the backend's rules.
    pub async fn delete_branch(&mut self, branch_id: &str) -> PosResult<()> {
        self.backend
            .delete(Table::Branches, &Query::new().eq("id", branch_id))
            .await?;
        info!(branch_id, "branch deleted");
        self.tables.remove(branch_id);
        if self.current_branch.as_ref().map(|b| b.id.as_str()) == Some(branch_id) {
            self.current_branch = None;
        }
        self.refetch_current_branches().await
    }

    async fn refetch_current_branches(&mut self) -> PosResult<()> {
        if let Some(shop_id) = self.current_shop.as_ref().map(|s| s.id.clone()) {
            self.fetch_branches(&shop_id).await?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Tables
    // -----------------------------------------------------------------------

    pub async fn fetch_tables(&mut self, branch_id: &str) -> PosResult<&[DiningTable]> {
        let mut tables: Vec<DiningTable> = fetch_rows(
            self.backend.as_ref(),
            Table::Tables,
            &Query::new().eq("branch_id", branch_id).order_by("table_number"),
        )
        .await?;
        sort_tables(&mut tables);
        self.tables.insert(branch_id.to_string(), tables);
        Ok(self.tables(branch_id))
    }

    /// Create only the shortfall between the branch's configured table count
    /// and the tables it already has. Never deletes. Returns how many were
    /// created.
    pub async fn generate_tables(&mut self, branch: &Branch) -> PosResult<usize> {
        let existing: Vec<String> = self
            .fetch_tables(&branch.id)
            .await?
            .iter()
            .map(|t| t.table_number.clone())
            .collect();
        let wanted = branch.table_count as usize;
        if existing.len() >= wanted {
            return Ok(0);
        }

        let taken: BTreeSet<&str> = existing.iter().map(String::as_str).collect();
        let shortfall = wanted - existing.len();
        let mut rows = Vec::with_capacity(shortfall);
        let mut candidate = existing.len() + 1;
        while rows.len() < shortfall {
            let number = candidate.to_string();
            if !taken.contains(number.as_str()) {
                rows.push(json!({
                    "branch_id": branch.id,
                    "table_number": number,
                    "seats": DEFAULT_SEATS,
                }));
            }
            candidate += 1;
        }

        let created = self.backend.insert(Table::Tables, rows).await?.len();
        info!(branch_id = %branch.id, created, "tables generated");
        self.fetch_tables(&branch.id).await?;
        Ok(created)
    }
}
