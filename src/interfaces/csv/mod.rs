pub mod enrollment_reader;
pub mod payment_reader;
pub mod reminder_writer;
