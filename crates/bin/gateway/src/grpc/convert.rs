//! Conversions between the wire protocol and the domain model.

use mail_domain::{Email, EmailAddress, MailAccount, Protocol, ServiceProvider};
use subscribe_session::SubscribeEvent;
use tonic::Status;

use crate::grpc::proto;

/// Turn a wire `MailInfo` into a domain account.
pub(crate) fn account_from_proto(info: proto::MailInfo) -> Result<MailAccount, Status> {
    let protocol = match proto::ProtocolType::try_from(info.protocol_type) {
        Ok(proto::ProtocolType::Imap) => Protocol::Imap,
        Ok(proto::ProtocolType::Graph) => Protocol::Graph,
        _ => Protocol::Unknown,
    };

    let service_provider = match proto::ServiceProvider::try_from(info.service_provider) {
        Ok(proto::ServiceProvider::Microsoft) => ServiceProvider::Microsoft,
        Ok(proto::ServiceProvider::Google) => ServiceProvider::Google,
        _ => return Err(Status::invalid_argument("serviceProvider must be set")),
    };

    Ok(MailAccount {
        email: info.email,
        client_id: info.client_id,
        refresh_token: info.refresh_token,
        protocol,
        service_provider,
    })
}

/// Turn a domain protocol into its wire value.
pub(crate) fn protocol_to_proto(protocol: Option<Protocol>) -> proto::ProtocolType {
    match protocol {
        Some(Protocol::Imap) => proto::ProtocolType::Imap,
        Some(Protocol::Graph) => proto::ProtocolType::Graph,
        Some(Protocol::Unknown) | None => proto::ProtocolType::Unknown,
    }
}

/// Turn a canonical email record into its wire form.
pub(crate) fn email_to_proto(email: Email) -> proto::Email {
    proto::Email {
        id: email.id,
        subject: email.subject,
        from: email.from.map(address_to_proto),
        to: email.to.map(address_to_proto),
        date: email.date,
        text: email.text,
        html: email.html,
    }
}

fn address_to_proto(address: EmailAddress) -> proto::EmailAddress {
    proto::EmailAddress {
        name: address.name,
        address: address.address,
    }
}

/// Turn a session event into a stream message.
pub(crate) fn event_to_proto(event: SubscribeEvent) -> proto::SubscribeMailEvent {
    use proto::subscribe_mail_event::Event;

    let event = match event {
        SubscribeEvent::Subscription {
            message,
            refresh_token,
        } => Event::Subscription(proto::SubscriptionEvent {
            message,
            refresh_token,
        }),
        SubscribeEvent::Heartbeat {
            timestamp,
            protocol,
        } => Event::Heartbeat(proto::HeartbeatEvent {
            timestamp,
            protocol: protocol.as_str().to_lowercase(),
        }),
        SubscribeEvent::Email(email) => Event::Email(email_to_proto(email)),
        SubscribeEvent::Complete { message } => Event::Complete(proto::CompleteEvent { message }),
        // Timeouts surface as a DEADLINE_EXCEEDED status on this
        // transport; a stray timeout event degrades to an error event.
        SubscribeEvent::Timeout { message } | SubscribeEvent::Error { message } => {
            Event::Error(proto::ErrorEvent { message })
        }
    };

    proto::SubscribeMailEvent { event: Some(event) }
}
