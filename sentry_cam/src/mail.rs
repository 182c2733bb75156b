//! Mails the incident snapshot as a JPEG attachment over SMTP with STARTTLS.

use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use sentry_vision::sink::encode_jpeg;
use sentry_vision::{EmailSettings, Frame, Notifier, SinkError};
use std::fmt::Display;

pub const SUBJECT: &str = "Front Door Visitor";

pub struct SmtpNotifier {
    from: Mailbox,
    to: Mailbox,
    transport: SmtpTransport,
}

impl SmtpNotifier {
    /// Prepares the transport. Nothing is sent and no connection is made
    /// until the first notification.
    pub fn new(settings: &EmailSettings) -> Result<Self, SinkError> {
        let from: Mailbox = settings.from_addr.parse().map_err(notification)?;
        let to: Mailbox = settings.to_addr.parse().map_err(notification)?;
        let transport = SmtpTransport::starttls_relay(&settings.host)
            .map_err(notification)?
            .port(settings.port)
            .credentials(Credentials::new(
                settings.from_addr.clone(),
                settings.password.clone(),
            ))
            .build();
        Ok(Self { from, to, transport })
    }
}

impl Notifier for SmtpNotifier {
    fn notify(&mut self, snapshot: &Frame) -> Result<(), SinkError> {
        let message = compose(&self.from, &self.to, snapshot)?;
        self.transport.send(&message).map_err(notification)?;
        log::info!("[E-MAIL SENT] {}", snapshot.timestamp());
        Ok(())
    }
}

/// The notification mail: a blank text part and the snapshot as a JPEG.
pub fn compose(from: &Mailbox, to: &Mailbox, snapshot: &Frame) -> Result<Message, SinkError> {
    let jpeg = encode_jpeg(snapshot)?;
    let filename = snapshot
        .timestamp()
        .format("snapshot-%Y%m%d-%H%M%S.jpg")
        .to_string();
    let content_type = ContentType::parse("image/jpeg").map_err(notification)?;

    Message::builder()
        .from(from.clone())
        .to(to.clone())
        .subject(SUBJECT)
        .multipart(
            MultiPart::mixed()
                .singlepart(SinglePart::plain(" ".to_string()))
                .singlepart(Attachment::new(filename).body(jpeg, content_type)),
        )
        .map_err(notification)
}

fn notification<E: Display>(error: E) -> SinkError {
    SinkError::Notification(error.to_string())
}
