use booking_notifier::events::{EventKind, Recipient};
use booking_notifier::state_machine::DeliveryStatus;
use proptest::prelude::*;

/// Strategy for generating appointment ids as the booking service issues them
pub fn event_id_strategy() -> impl Strategy<Value = String> {
    "[a-z0-9]{8}-[a-z0-9]{4}"
}

pub fn recipient_strategy() -> impl Strategy<Value = Recipient> {
    prop_oneof![Just(Recipient::User), Just(Recipient::Admin)]
}

pub fn event_kind_strategy() -> impl Strategy<Value = EventKind> {
    prop_oneof![
        Just(EventKind::Booked),
        Just(EventKind::Cancelled),
        Just(EventKind::Inquiry),
    ]
}

pub fn delivery_status_strategy() -> impl Strategy<Value = DeliveryStatus> {
    prop_oneof![
        Just(DeliveryStatus::Pending),
        Just(DeliveryStatus::Sending),
        Just(DeliveryStatus::Sent),
        Just(DeliveryStatus::Failed),
    ]
}

/// Template field values, including characters that must be escaped
pub fn field_value_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 äöå<>&\"'.,!?-]{0,64}"
}
