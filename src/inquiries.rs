//! Contact inquiries and the admin desk that reviews them.

use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

use crate::auth::{AuthService, Identity};
use crate::backend::{fetch_rows, insert_row, Backend, Query, Table};
use crate::error::{PosError, PosResult};
use crate::models::ContactInquiry;

/// Contact form as submitted by a visitor.
#[derive(Debug, Clone, Default, Serialize)]
pub struct InquiryForm {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub message: String,
}

fn required(value: &str, field: &str) -> PosResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(PosError::validation(format!("{field} is required")));
    }
    Ok(trimmed.to_string())
}

/// Store a public contact inquiry. Phone is optional.
pub async fn submit_inquiry(backend: &dyn Backend, form: &InquiryForm) -> PosResult<ContactInquiry> {
    let name = required(&form.name, "Name")?;
    let email = required(&form.email, "Email")?;
    if !email.contains('@') {
        return Err(PosError::validation("Email address is not valid"));
    }
    let message = required(&form.message, "Message")?;
    let phone = match form.phone.trim() {
        "" => Value::Null,
        p => Value::String(p.to_string()),
    };
    let inquiry: ContactInquiry = insert_row(
        backend,
        Table::ContactInquiries,
        json!({
            "name": name,
            "email": email,
            "phone": phone,
            "message": message,
        }),
    )
    .await?;
    info!(inquiry_id = %inquiry.id, "contact inquiry received");
    Ok(inquiry)
}

/// Platform-wide counters for the admin overview.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdminStats {
    pub total_users: usize,
    pub total_shops: usize,
    pub total_orders: usize,
}

pub struct InquiryDesk {
    backend: Arc<dyn Backend>,
    auth: Arc<dyn AuthService>,
    inquiries: Vec<ContactInquiry>,
}

impl InquiryDesk {
    pub fn new(backend: Arc<dyn Backend>, auth: Arc<dyn AuthService>) -> Self {
        Self {
            backend,
            auth,
            inquiries: Vec::new(),
        }
    }

    pub fn inquiries(&self) -> &[ContactInquiry] {
        &self.inquiries
    }

    pub fn unread_count(&self) -> usize {
        self.inquiries.iter().filter(|i| !i.is_read).count()
    }

    fn require_admin(&self) -> PosResult<Identity> {
        let user = self.auth.current_identity().ok_or(PosError::NotAuthenticated)?;
        if !user.is_admin() {
            return Err(PosError::Forbidden("admin role required".into()));
        }
        Ok(user)
    }

    /// Newest first.
    pub async fn fetch_inquiries(&mut self) -> PosResult<&[ContactInquiry]> {
        self.require_admin()?;
        self.inquiries = fetch_rows(
            self.backend.as_ref(),
            Table::ContactInquiries,
            &Query::new().order_by_desc("created_at"),
        )
        .await?;
        Ok(&self.inquiries)
    }

    pub async fn mark_read(&mut self, inquiry_id: &str) -> PosResult<()> {
        let admin = self.require_admin()?;
        let updated = self
            .backend
            .update(
                Table::ContactInquiries,
                &Query::new().eq("id", inquiry_id),
                json!({ "is_read": true }),
            )
            .await?;
        if updated.is_empty() {
            return Err(PosError::not_found(format!("Inquiry {inquiry_id} not found")));
        }
        info!(inquiry_id, admin = %admin.id, "inquiry marked read");
        self.fetch_inquiries().await?;
        Ok(())
    }

    pub async fn fetch_stats(&self) -> PosResult<AdminStats> {
        self.require_admin()?;
        Ok(AdminStats {
            total_users: self.count(Table::Profiles).await?,
            total_shops: self.count(Table::Shops).await?,
            total_orders: self.count(Table::Orders).await?,
        })
    }

    async fn count(&self, table: Table) -> PosResult<usize> {
        Ok(self.backend.select(table, &Query::new()).await?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthService, UserRole};
    use crate::testing;

    fn form(name: &str, email: &str, message: &str) -> InquiryForm {
        InquiryForm {
            name: name.into(),
            email: email.into(),
            phone: String::new(),
            message: message.into(),
        }
    }

    #[tokio::test]
    async fn submission_requires_name_email_message() {
        let (_db, backend) = testing::local_backend();
        assert!(submit_inquiry(backend.as_ref(), &form("", "a@b.th", "hi")).await.is_err());
        assert!(submit_inquiry(backend.as_ref(), &form("A", "nope", "hi")).await.is_err());
        assert!(submit_inquiry(backend.as_ref(), &form("A", "a@b.th", " ")).await.is_err());

        let saved = submit_inquiry(backend.as_ref(), &form(" Somchai ", "s@b.th", "Pricing?"))
            .await
            .unwrap();
        assert_eq!(saved.name, "Somchai");
        assert!(saved.phone.is_none());
        assert!(!saved.is_read);
    }

    #[tokio::test]
    async fn desk_is_admin_only() {
        let (db, backend) = testing::local_backend();
        let auth = testing::local_auth(&db);
        let mut desk = InquiryDesk::new(backend.clone(), auth.clone());
        assert!(matches!(desk.fetch_inquiries().await, Err(PosError::NotAuthenticated)));

        testing::signed_in_owner(&auth).await;
        assert!(matches!(desk.fetch_inquiries().await, Err(PosError::Forbidden(_))));
        assert!(matches!(desk.fetch_stats().await, Err(PosError::Forbidden(_))));
    }

    #[tokio::test]
    async fn admin_lists_newest_first_and_marks_read() {
        let (db, backend) = testing::local_backend();
        let auth = testing::local_auth(&db);
        let owner = testing::signed_in_owner(&auth).await;
        auth.grant_role(&owner.id, UserRole::Admin).unwrap();
        auth.sign_in("owner@shop.th", "secret1").await.unwrap();

        for (name, at) in [("Old", "2026-10-01T00:00:00Z"), ("New", "2026-10-16T00:00:00Z")] {
            backend
                .insert(
                    Table::ContactInquiries,
                    vec![json!({"name": name, "email": "x@y.th", "message": "m", "created_at": at})],
                )
                .await
                .unwrap();
        }

        let mut desk = InquiryDesk::new(backend, auth);
        let names: Vec<String> = desk
            .fetch_inquiries()
            .await
            .unwrap()
            .iter()
            .map(|i| i.name.clone())
            .collect();
        assert_eq!(names, vec!["New", "Old"]);
        assert_eq!(desk.unread_count(), 2);

        let old_id = desk.inquiries()[1].id.clone();
        desk.mark_read(&old_id).await.unwrap();
        assert_eq!(desk.unread_count(), 1);
        assert!(desk.inquiries()[1].is_read);
        assert!(matches!(desk.mark_read("missing").await, Err(PosError::NotFound(_))));

        let stats = desk.fetch_stats().await.unwrap();
        assert_eq!(stats.total_shops, 0);
        assert_eq!(stats.total_orders, 0);
    }
}
