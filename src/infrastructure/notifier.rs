use crate::domain::events::EnrollmentEvent;
use crate::domain::ports::Notifier;
use crate::domain::reminder::ReminderPayload;
use async_trait::async_trait;
use tracing::info;

/// Notifier that only logs. Stands in for the mail/SMS collaborator.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn send_reminder(&self, reminder: &ReminderPayload) {
        info!(
            enrollment_id = reminder.enrollment_id,
            learner_id = reminder.learner_id,
            overdue = reminder.is_overdue,
            days = reminder.days_until_due,
            amount = %reminder.amount,
            currency = %reminder.currency,
            due = %reminder.next_payment_due,
            "Payment reminder"
        );
    }

    async fn publish(&self, event: &EnrollmentEvent) {
        info!(enrollment_id = event.enrollment_id(), event = ?event, "Enrollment event");
    }
}
