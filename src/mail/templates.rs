//! # Notification Templates
//!
//! Askama template structs for the five notification mails. Each struct's
//! fields become template variables, verified at compile time, and askama
//! HTML-escapes every value. A field missing from the supplied
//! [`TemplateFields`] is a [`NotifierError::RenderFailed`].

use std::collections::BTreeMap;
use std::fmt;

use askama::Template;

use crate::error::{NotifierError, NotifierResult};
use crate::events::{EventKind, Recipient};

/// Field name -> display value
pub type TemplateFields = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemplateId {
    UserBookingConfirmation,
    AdminBookingNotification,
    UserCancellationNotification,
    AdminCancellationNotification,
    AdminInquiryNotification,
}

impl TemplateId {
    pub const ALL: [TemplateId; 5] = [
        Self::UserBookingConfirmation,
        Self::AdminBookingNotification,
        Self::UserCancellationNotification,
        Self::AdminCancellationNotification,
        Self::AdminInquiryNotification,
    ];

    /// Template for a (recipient, kind) pair; customers get no inquiry mail
    pub fn for_notification(recipient: Recipient, kind: EventKind) -> Option<Self> {
        match (recipient, kind) {
            (Recipient::User, EventKind::Booked) => Some(Self::UserBookingConfirmation),
            (Recipient::Admin, EventKind::Booked) => Some(Self::AdminBookingNotification),
            (Recipient::User, EventKind::Cancelled) => Some(Self::UserCancellationNotification),
            (Recipient::Admin, EventKind::Cancelled) => Some(Self::AdminCancellationNotification),
            (Recipient::Admin, EventKind::Inquiry) => Some(Self::AdminInquiryNotification),
            (Recipient::User, EventKind::Inquiry) => None,
        }
    }

    /// Fields the template reads
    pub fn fields(&self) -> &'static [&'static str] {
        match self {
            Self::UserBookingConfirmation => &["id", "name", "service", "date", "time"],
            Self::AdminBookingNotification => {
                &["id", "name", "email", "phone", "service", "date", "time", "notes"]
            }
            Self::UserCancellationNotification => &["name", "service", "date", "time", "reason"],
            Self::AdminCancellationNotification => {
                &["id", "name", "email", "phone", "service", "date", "time", "reason"]
            }
            Self::AdminInquiryNotification => &["name", "email", "phone", "message"],
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::UserBookingConfirmation => "user_booking_confirmation",
            Self::AdminBookingNotification => "admin_booking_notification",
            Self::UserCancellationNotification => "user_cancellation_notification",
            Self::AdminCancellationNotification => "admin_cancellation_notification",
            Self::AdminInquiryNotification => "admin_inquiry_notification",
        }
    }
}

impl fmt::Display for TemplateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub trait TemplateRenderer: Send + Sync + 'static {
    fn render(&self, template: TemplateId, fields: &TemplateFields) -> NotifierResult<String>;
}

#[derive(Template, Debug)]
#[template(path = "user_booking_confirmation.html")]
pub struct UserBookingConfirmation<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub service: &'a str,
    pub date: &'a str,
    pub time: &'a str,
}

#[derive(Template, Debug)]
#[template(path = "admin_booking_notification.html")]
pub struct AdminBookingNotification<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub email: &'a str,
    pub phone: &'a str,
    pub service: &'a str,
    pub date: &'a str,
    pub time: &'a str,
    pub notes: &'a str,
}

#[derive(Template, Debug)]
#[template(path = "user_cancellation_notification.html")]
pub struct UserCancellationNotification<'a> {
    pub name: &'a str,
    pub service: &'a str,
    pub date: &'a str,
    pub time: &'a str,
    pub reason: &'a str,
}

#[derive(Template, Debug)]
#[template(path = "admin_cancellation_notification.html")]
pub struct AdminCancellationNotification<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub email: &'a str,
    pub phone: &'a str,
    pub service: &'a str,
    pub date: &'a str,
    pub time: &'a str,
    pub reason: &'a str,
}

#[derive(Template, Debug)]
#[template(path = "admin_inquiry_notification.html")]
pub struct AdminInquiryNotification<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub phone: &'a str,
    pub message: &'a str,
}

/// Renderer for the askama templates under `templates/`
///
/// Templates are checked against their structs at compile time; the only
/// runtime failure left is a field missing from the supplied map.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinTemplateRenderer;

impl BuiltinTemplateRenderer {
    pub fn new() -> Self {
        Self
    }
}

impl TemplateRenderer for BuiltinTemplateRenderer {
    fn render(&self, template: TemplateId, fields: &TemplateFields) -> NotifierResult<String> {
        let field = |name: &'static str| required(fields, template, name);

        let rendered = match template {
            TemplateId::UserBookingConfirmation => UserBookingConfirmation {
                id: field("id")?,
                name: field("name")?,
                service: field("service")?,
                date: field("date")?,
                time: field("time")?,
            }
            .render(),
            TemplateId::AdminBookingNotification => AdminBookingNotification {
                id: field("id")?,
                name: field("name")?,
                email: field("email")?,
                phone: field("phone")?,
                service: field("service")?,
                date: field("date")?,
                time: field("time")?,
                notes: field("notes")?,
            }
            .render(),
            TemplateId::UserCancellationNotification => UserCancellationNotification {
                name: field("name")?,
                service: field("service")?,
                date: field("date")?,
                time: field("time")?,
                reason: field("reason")?,
            }
            .render(),
            TemplateId::AdminCancellationNotification => AdminCancellationNotification {
                id: field("id")?,
                name: field("name")?,
                email: field("email")?,
                phone: field("phone")?,
                service: field("service")?,
                date: field("date")?,
                time: field("time")?,
                reason: field("reason")?,
            }
            .render(),
            TemplateId::AdminInquiryNotification => AdminInquiryNotification {
                name: field("name")?,
                email: field("email")?,
                phone: field("phone")?,
                message: field("message")?,
            }
            .render(),
        };

        rendered.map_err(|e| NotifierError::render(template.name(), e.to_string()))
    }
}

fn required<'a>(
    fields: &'a TemplateFields,
    template: TemplateId,
    name: &str,
) -> NotifierResult<&'a str> {
    fields
        .get(name)
        .map(String::as_str)
        .ok_or_else(|| NotifierError::render(template.name(), format!("missing field '{name}'")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields_for(template: TemplateId) -> TemplateFields {
        template
            .fields()
            .iter()
            .map(|name| (name.to_string(), format!("<{name}>")))
            .collect()
    }

    #[test]
    fn test_every_template_renders_every_field() {
        let renderer = BuiltinTemplateRenderer::new();
        for template in TemplateId::ALL {
            let fields = fields_for(template);
            assert!(!fields.is_empty());

            let html = renderer.render(template, &fields).unwrap();
            assert!(!html.contains("{{"), "{template} left a placeholder");
            for name in fields.keys() {
                assert!(
                    html.contains(&format!("&lt;{name}&gt;")),
                    "{template} did not escape {name}"
                );
                assert!(!html.contains(&format!("<{name}>")));
            }
        }
    }

    #[test]
    fn test_missing_field_is_render_error() {
        let renderer = BuiltinTemplateRenderer::new();
        let mut fields = fields_for(TemplateId::UserCancellationNotification);
        fields.remove("reason");

        let err = renderer
            .render(TemplateId::UserCancellationNotification, &fields)
            .unwrap_err();
        assert!(matches!(err, NotifierError::RenderFailed { .. }));
        assert!(err.to_string().contains("reason"));
    }

    #[test]
    fn test_extra_fields_are_ignored() {
        let mut fields = fields_for(TemplateId::AdminInquiryNotification);
        fields.insert("end_time".to_string(), "12:00".to_string());

        let html = BuiltinTemplateRenderer::new()
            .render(TemplateId::AdminInquiryNotification, &fields)
            .unwrap();
        assert!(!html.contains("12:00"));
    }

    #[test]
    fn test_template_selection() {
        assert_eq!(
            TemplateId::for_notification(Recipient::Admin, EventKind::Inquiry),
            Some(TemplateId::AdminInquiryNotification)
        );
        assert_eq!(
            TemplateId::for_notification(Recipient::User, EventKind::Inquiry),
            None
        );
    }
}
