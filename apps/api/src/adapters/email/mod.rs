mod resend;

pub use resend::ResendEmailSender;
