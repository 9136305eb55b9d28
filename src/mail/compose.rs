//! Message composition for (recipient, event) pairs.

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Utc};

use super::templates::{TemplateFields, TemplateId, TemplateRenderer};
use super::{EmailMessage, Mailbox};
use crate::config::MailConfig;
use crate::constants::formats;
use crate::error::{NotifierError, NotifierResult};
use crate::events::{EventKind, LifecycleEvent, Recipient};

pub struct MessageComposer {
    mail: MailConfig,
    offset: FixedOffset,
    renderer: Arc<dyn TemplateRenderer>,
}

impl MessageComposer {
    pub fn new(mail: MailConfig, renderer: Arc<dyn TemplateRenderer>) -> NotifierResult<Self> {
        let offset = mail.display_offset()?;
        Ok(Self {
            mail,
            offset,
            renderer,
        })
    }

    /// Render and address the notification `recipient` gets for `event`
    pub fn compose(
        &self,
        event: &LifecycleEvent,
        recipient: Recipient,
    ) -> NotifierResult<EmailMessage> {
        let template = TemplateId::for_notification(recipient, event.kind()).ok_or_else(|| {
            NotifierError::configuration(format!(
                "no {recipient} notification exists for {} events",
                event.kind()
            ))
        })?;

        let html_body = self.renderer.render(template, &self.fields(event))?;

        Ok(EmailMessage {
            from: Mailbox::new(self.sender(event.kind())),
            to: self.address(event, recipient),
            subject: self.subject(recipient, event.kind()).to_string(),
            html_body,
        })
    }

    pub fn sender(&self, kind: EventKind) -> &str {
        match kind {
            EventKind::Booked => &self.mail.booking_sender,
            EventKind::Cancelled => &self.mail.cancellation_sender,
            EventKind::Inquiry => &self.mail.inquiry_sender,
        }
    }

    pub fn subject(&self, recipient: Recipient, kind: EventKind) -> &str {
        let subjects = &self.mail.subjects;
        match (recipient, kind) {
            (Recipient::User, EventKind::Booked) => &subjects.user_booked,
            (Recipient::Admin, EventKind::Booked) => &subjects.admin_booked,
            (Recipient::User, EventKind::Cancelled) => &subjects.user_cancelled,
            (Recipient::Admin, EventKind::Cancelled) => &subjects.admin_cancelled,
            (_, EventKind::Inquiry) => &subjects.admin_inquiry,
        }
    }

    fn address(&self, event: &LifecycleEvent, recipient: Recipient) -> Mailbox {
        match (recipient, event) {
            (Recipient::Admin, _) => Mailbox::new(self.mail.admin_email.clone()),
            (Recipient::User, LifecycleEvent::Booked(booked)) => {
                Mailbox::named(booked.email.clone(), booked.name.clone())
            }
            (Recipient::User, LifecycleEvent::Cancelled(cancelled)) => {
                Mailbox::named(cancelled.email.clone(), cancelled.name.clone())
            }
            (Recipient::User, LifecycleEvent::Inquiry(inquiry)) => {
                Mailbox::named(inquiry.email.clone(), inquiry.name.clone())
            }
        }
    }

    fn fields(&self, event: &LifecycleEvent) -> TemplateFields {
        let mut fields = TemplateFields::new();
        let mut set = |key: &str, value: String| {
            fields.insert(key.to_string(), value);
        };

        match event {
            LifecycleEvent::Booked(booked) => {
                set("id", booked.event_id.clone());
                set("name", booked.name.clone());
                set("email", booked.email.clone());
                set("phone", booked.phone.clone());
                set("service", booked.service.clone());
                set("date", self.format_date(booked.start_time));
                set("time", self.format_time(booked.start_time));
                set("end_time", self.format_time(booked.end_time));
                set("notes", booked.notes.clone().unwrap_or_else(|| "-".to_string()));
            }
            LifecycleEvent::Cancelled(cancelled) => {
                set("id", cancelled.event_id.clone());
                set("name", cancelled.name.clone());
                set("email", cancelled.email.clone());
                set("phone", cancelled.phone.clone());
                set("service", cancelled.service.clone());
                set("date", self.format_date(cancelled.start_time));
                set("time", self.format_time(cancelled.start_time));
                set("reason", cancelled.reason.clone());
            }
            LifecycleEvent::Inquiry(inquiry) => {
                set("id", inquiry.identity().to_string());
                set("name", inquiry.name.clone());
                set("email", inquiry.email.clone());
                set("phone", inquiry.phone.clone());
                set("message", inquiry.message.clone());
            }
        }

        fields
    }

    fn format_date(&self, at: DateTime<Utc>) -> String {
        at.with_timezone(&self.offset).format(formats::DATE).to_string()
    }

    fn format_time(&self, at: DateTime<Utc>) -> String {
        at.with_timezone(&self.offset).format(formats::TIME).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{BookedAppointment, CancelledAppointment, ServiceInquiry};
    use crate::mail::BuiltinTemplateRenderer;
    use chrono::TimeZone;

    fn composer() -> MessageComposer {
        let mail = MailConfig {
            admin_email: "admin@hoivailo.fi".to_string(),
            ..MailConfig::default()
        };
        MessageComposer::new(mail, Arc::new(BuiltinTemplateRenderer::new())).unwrap()
    }

    fn booked() -> LifecycleEvent {
        BookedAppointment {
            event_id: "apt-1".to_string(),
            name: "Aino Virtanen".to_string(),
            email: "aino@example.fi".to_string(),
            phone: "+358401234567".to_string(),
            service: "Kotisiivous".to_string(),
            start_time: Utc.with_ymd_and_hms(2025, 3, 14, 8, 0, 0).unwrap(),
            end_time: Utc.with_ymd_and_hms(2025, 3, 14, 10, 0, 0).unwrap(),
            notes: None,
        }
        .into()
    }

    #[test]
    fn test_user_booking_confirmation() {
        let message = composer().compose(&booked(), Recipient::User).unwrap();

        assert_eq!(message.from.email, "hello@hoivailo.fi");
        assert_eq!(message.to.email, "aino@example.fi");
        assert_eq!(message.subject, "Ajanvaraus varattu");
        // 08:00 UTC shown at +02:00
        assert!(message.html_body.contains("14.03.2025"));
        assert!(message.html_body.contains("10:00"));
    }

    #[test]
    fn test_admin_cancellation_goes_to_admin() {
        let event: LifecycleEvent = CancelledAppointment {
            event_id: "apt-2".to_string(),
            name: "Aino".to_string(),
            email: "aino@example.fi".to_string(),
            phone: "+358401234567".to_string(),
            service: "Kotiapu".to_string(),
            start_time: Utc.with_ymd_and_hms(2025, 3, 14, 8, 0, 0).unwrap(),
            reason: "Sairastuin".to_string(),
        }
        .into();

        let message = composer().compose(&event, Recipient::Admin).unwrap();
        assert_eq!(message.from.email, "noreply@hoivailo.fi");
        assert_eq!(message.to.email, "admin@hoivailo.fi");
        assert_eq!(message.subject, "Aika peruutettu");
        assert!(message.html_body.contains("Sairastuin"));
    }

    #[test]
    fn test_inquiry_is_admin_only() {
        let event: LifecycleEvent =
            ServiceInquiry::new("Aino", "aino@example.fi", "+358", "Onko lauantaina aikoja?").into();

        let message = composer().compose(&event, Recipient::Admin).unwrap();
        assert_eq!(message.from.email, "contact@hoivailo.fi");
        assert_eq!(message.subject, "Uusi viesti");

        let err = composer().compose(&event, Recipient::User).unwrap_err();
        assert!(matches!(err, NotifierError::Configuration(_)));
    }
}
