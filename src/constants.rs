//! # System Constants
//!
//! Queue names and the composition defaults of the notification pipeline.
//! Everything here is a default; deployments override it through configuration.

/// Default queue names for every pipeline stage
pub mod queues {
    pub const APPOINTMENT_BOOKED: &str = "appointment_booked";
    pub const APPOINTMENT_CANCELLED: &str = "appointment_cancelled";
    pub const SERVICE_INQUIRY: &str = "service_inquiry";

    // Booking confirmation chain
    pub const USER_CONFIRMATION_EMAIL: &str = "user_confirmation_email";
    pub const CONFIRM_USER_EMAIL: &str = "confirm_user_email";
    pub const ADMIN_CONFIRMATION_EMAIL: &str = "admin_confirmation_email";

    /// Suffix of the durable queue a stage publishes its completion signals to
    pub const COMPLETION_SUFFIX: &str = "_completed";

    /// `appointment_booked` -> `appointment_booked_completed`
    pub fn completion_queue(queue_name: &str) -> String {
        format!("{queue_name}{COMPLETION_SUFFIX}")
    }
}

/// Default sender addresses
pub mod senders {
    pub const BOOKING: &str = "hello@hoivailo.fi";
    pub const CANCELLATION: &str = "noreply@hoivailo.fi";
    pub const INQUIRY: &str = "contact@hoivailo.fi";
}

/// Default subject lines
pub mod subjects {
    pub const USER_BOOKED: &str = "Ajanvaraus varattu";
    pub const ADMIN_BOOKED: &str = "uusi aika";
    pub const USER_CANCELLED: &str = "Ajanvarauksesi peruuttanut";
    pub const ADMIN_CANCELLED: &str = "Aika peruutettu";
    pub const ADMIN_INQUIRY: &str = "Uusi viesti";
}

/// Display formats for appointment times
pub mod formats {
    pub const DATE: &str = "%d.%m.%Y";
    pub const TIME: &str = "%H:%M";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completion_queue_name() {
        assert_eq!(
            queues::completion_queue(queues::CONFIRM_USER_EMAIL),
            "confirm_user_email_completed"
        );
    }

    #[test]
    fn test_completion_queues_fit_pgmq_limits() {
        for name in [
            queues::APPOINTMENT_BOOKED,
            queues::APPOINTMENT_CANCELLED,
            queues::SERVICE_INQUIRY,
            queues::USER_CONFIRMATION_EMAIL,
            queues::CONFIRM_USER_EMAIL,
            queues::ADMIN_CONFIRMATION_EMAIL,
        ] {
            assert!(crate::messaging::validate_queue_name(&queues::completion_queue(name)).is_ok());
        }
    }
}
