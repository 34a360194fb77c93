use crate::domain::reminder::ReminderPayload;
use crate::error::Result;
use std::io::Write;

/// Writes reminders as CSV:
/// `enrollment,learner,course_name,overdue,days,amount,currency,next_payment_due,outstanding`.
pub struct ReminderWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> ReminderWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_reminders<'a, I>(&mut self, reminders: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a ReminderPayload>,
    {
        let mut wrote_any = false;
        for reminder in reminders {
            self.writer.serialize(reminder)?;
            wrote_any = true;
        }
        if !wrote_any {
            // serialize() only emits the header alongside the first record.
            self.writer.write_record([
                "enrollment",
                "learner",
                "course_name",
                "overdue",
                "days",
                "amount",
                "currency",
                "next_payment_due",
                "outstanding",
            ])?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
