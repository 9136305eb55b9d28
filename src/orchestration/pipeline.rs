//! The default notification pipeline.
//!
//! | queue                      | worker                  | listens to                 |
//! |----------------------------|-------------------------|----------------------------|
//! | `appointment_booked`       | notify user + admin     |                            |
//! | `appointment_cancelled`    | notify user + admin     |                            |
//! | `service_inquiry`          | notify admin            |                            |
//! | `user_confirmation_email`  | notify user (booked)    |                            |
//! | `confirm_user_email`       | mark `email_sent`       | `user_confirmation_email`  |
//! | `admin_confirmation_email` | notify admin (booked)   | `confirm_user_email`       |

use std::sync::Arc;

use super::handlers::{ConfirmEmailHandler, NotifyHandler};
use crate::appointments::AppointmentStore;
use crate::config::QueuesConfig;
use crate::error::NotifierResult;
use crate::events::{EventKind, Recipient};
use crate::executor::NotificationExecutor;
use crate::registry::{QueueOptions, QueueRegistry, StageLink};

pub fn register_default_pipeline(
    registry: &QueueRegistry,
    queues: &QueuesConfig,
    executor: Arc<NotificationExecutor>,
    store: Arc<dyn AppointmentStore>,
) -> NotifierResult<()> {
    for name in [
        &queues.appointment_booked,
        &queues.appointment_cancelled,
        &queues.service_inquiry,
    ] {
        registry.register(
            name,
            QueueOptions::new().worker(Arc::new(NotifyHandler::all_recipients(
                name.as_str(),
                executor.clone(),
            ))),
        )?;
    }

    registry.register(
        &queues.user_confirmation_email,
        QueueOptions::new().worker(Arc::new(NotifyHandler::only(
            queues.user_confirmation_email.as_str(),
            executor.clone(),
            EventKind::Booked,
            vec![Recipient::User],
        ))),
    )?;

    registry.register(
        &queues.confirm_user_email,
        QueueOptions::new()
            .worker(Arc::new(ConfirmEmailHandler::new(store)))
            .listens_to(StageLink::forward(queues.user_confirmation_email.as_str())),
    )?;

    registry.register(
        &queues.admin_confirmation_email,
        QueueOptions::new()
            .worker(Arc::new(NotifyHandler::only(
                queues.admin_confirmation_email.as_str(),
                executor,
                EventKind::Booked,
                vec![Recipient::Admin],
            )))
            .listens_to(StageLink::forward(queues.confirm_user_email.as_str())),
    )?;

    Ok(())
}
