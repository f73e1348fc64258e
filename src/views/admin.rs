//! Platform admin page: counters and the contact inquiry inbox.

use super::ScreenStatus;
use crate::app::Session;
use crate::error::{PosError, PosResult};
use crate::inquiries::{AdminStats, InquiryDesk};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AdminTab {
    #[default]
    Stats,
    Inquiries,
}

pub struct AdminScreen {
    pub tab: AdminTab,
    pub desk: InquiryDesk,
    pub stats: Option<AdminStats>,
    pub status: ScreenStatus,
}

impl AdminScreen {
    pub fn new(session: &Session) -> Self {
        Self {
            tab: AdminTab::default(),
            desk: InquiryDesk::new(session.backend(), session.auth_service()),
            stats: None,
            status: ScreenStatus::default(),
        }
    }

    /// Whether the signed-in user may open this page at all.
    pub fn allowed(session: &Session) -> bool {
        session.auth.is_admin()
    }

    pub async fn load(&mut self, session: &Session) -> PosResult<()> {
        if !Self::allowed(session) {
            return self
                .status
                .reject(Err(PosError::Forbidden("admin role required".into())));
        }
        self.status.begin();
        let result: PosResult<AdminStats> = async {
            let stats = self.desk.fetch_stats().await?;
            self.desk.fetch_inquiries().await?;
            Ok(stats)
        }
        .await;
        self.stats = Some(self.status.finish(result)?);
        Ok(())
    }

    pub fn switch_tab(&mut self, tab: AdminTab) {
        self.tab = tab;
    }

    pub async fn mark_read(&mut self, inquiry_id: &str) -> PosResult<()> {
        self.status.begin();
        let result = self.desk.mark_read(inquiry_id).await;
        self.status.finish(result)
    }
}
