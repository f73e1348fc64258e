//! Public contact form.

use std::sync::Arc;

use super::ScreenStatus;
use crate::backend::Backend;
use crate::error::{PosError, PosResult};
use crate::i18n::{self, Language};
use crate::inquiries::{submit_inquiry, InquiryForm};

pub struct ContactScreen {
    backend: Arc<dyn Backend>,
    language: Language,
    pub form: InquiryForm,
    pub success: bool,
    pub status: ScreenStatus,
}

impl ContactScreen {
    pub fn new(backend: Arc<dyn Backend>, language: Language) -> Self {
        Self {
            backend,
            language,
            form: InquiryForm::default(),
            success: false,
            status: ScreenStatus::default(),
        }
    }

    /// Missing fields are reported as typed; backend failures get the
    /// generic retry message. The form clears on success.
    pub async fn submit(&mut self) -> PosResult<()> {
        self.success = false;
        self.status.begin();
        let result = submit_inquiry(self.backend.as_ref(), &self.form)
            .await
            .map(|_| ())
            .map_err(|e| match e {
                PosError::Validation(_) => e,
                _ => PosError::Backend(i18n::t(self.language, "contact.form.error").to_string()),
            });
        self.status.finish(result)?;
        self.form = InquiryForm::default();
        self.success = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Query, Table};
    use crate::testing::{self, CountingBackend};

    #[tokio::test]
    async fn submit_clears_form() {
        let (_db, backend) = testing::local_backend();
        let mut screen = ContactScreen::new(backend.clone(), Language::En);
        screen.form = InquiryForm {
            name: "Nok".into(),
            email: "nok@mail.th".into(),
            phone: String::new(),
            message: "Hello".into(),
        };
        screen.submit().await.unwrap();
        assert!(screen.success);
        assert!(screen.form.name.is_empty());

        let rows = backend
            .select(Table::ContactInquiries, &Query::new())
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn backend_failure_shows_retry_message() {
        let (_db, inner) = testing::local_backend();
        let counting = CountingBackend::new(inner);
        counting.fail_inserts_into(Some(Table::ContactInquiries));
        let mut screen = ContactScreen::new(counting, Language::En);
        screen.form = InquiryForm {
            name: "Nok".into(),
            email: "nok@mail.th".into(),
            message: "Hello".into(),
            ..Default::default()
        };
        assert!(screen.submit().await.is_err());
        assert!(!screen.success);
        assert_eq!(
            screen.status.error.as_deref(),
            Some("Could not send your message. Please try again.")
        );
        assert_eq!(screen.form.name, "Nok");

        screen.form.message = "  ".into();
        assert!(matches!(screen.submit().await, Err(PosError::Validation(_))));
    }
}
