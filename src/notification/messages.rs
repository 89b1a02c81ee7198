//! Event to message rendering.
//!
//! Pure functions: an event either maps to a message for a channel or it does
//! not, in which case that channel is skipped for the event. Texts are in
//! Brazilian Portuguese, the language of the case workers receiving them.

use chrono::{DateTime, Utc};

use super::types::{EventKind, PublishedEvent};

/// Subject and body of a rendered email
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub subject: String,
    pub body: String,
}

/// Display name for a beneficiary, falling back to the id when no name is known
pub fn beneficiary_label(name: Option<&str>, id: &str) -> String {
    match name.map(str::trim).filter(|n| !n.is_empty()) {
        Some(name) => name.to_string(),
        None => format!("Beneficiário {}", id),
    }
}

fn days(n: u32) -> String {
    if n == 1 {
        "1 dia".to_string()
    } else {
        format!("{} dias", n)
    }
}

fn date(at: &DateTime<Utc>) -> String {
    at.format("%d/%m/%Y").to_string()
}

pub fn email_message(event: &PublishedEvent) -> Option<EmailMessage> {
    let (subject, body) = match &event.kind {
        EventKind::BeneficiaryCreated(data) => {
            let label = beneficiary_label(data.beneficiary_name.as_deref(), &data.beneficiary_id);
            (
                "Novo beneficiário cadastrado".to_string(),
                format!("{} foi cadastrado(a) no sistema.", label),
            )
        }
        EventKind::EnrollmentCreated(data) => {
            let label = beneficiary_label(data.beneficiary_name.as_deref(), &data.beneficiary_id);
            (
                format!("Nova inscrição em {}", data.program_name),
                format!(
                    "{} foi inscrito(a) no programa {}.",
                    label, data.program_name
                ),
            )
        }
        EventKind::EnrollmentStatusChanged(data) => {
            let label = beneficiary_label(data.beneficiary_name.as_deref(), &data.beneficiary_id);
            (
                format!("Inscrição atualizada: {}", data.program_name),
                format!(
                    "A inscrição de {} no programa {} mudou de \"{}\" para \"{}\".",
                    label, data.program_name, data.previous_status, data.new_status
                ),
            )
        }
        EventKind::ConsentUpdated(data) => {
            let label = beneficiary_label(data.beneficiary_name.as_deref(), &data.beneficiary_id);
            let verb = if data.granted { "concedeu" } else { "revogou" };
            (
                "Consentimento atualizado".to_string(),
                format!(
                    "{} {} o consentimento \"{}\".",
                    label, verb, data.consent_type
                ),
            )
        }
        EventKind::ActionItemDueSoon(data) => {
            let label = beneficiary_label(data.beneficiary_name.as_deref(), &data.beneficiary_id);
            (
                format!("Ação próxima do vencimento: {}", data.title),
                format!(
                    "A ação \"{}\" de {} vence em {}.",
                    data.title,
                    label,
                    date(&data.due_at)
                ),
            )
        }
        EventKind::ActionItemOverdue(data) => {
            let label = beneficiary_label(data.beneficiary_name.as_deref(), &data.beneficiary_id);
            (
                format!("Ação atrasada: {}", data.title),
                format!(
                    "A ação \"{}\" de {} está atrasada há {} (vencimento em {}).",
                    data.title,
                    label,
                    days(data.overdue_by_days),
                    date(&data.due_at)
                ),
            )
        }
        EventKind::PasswordResetRequested(data) => {
            let mut body = format!(
                "Recebemos uma solicitação para redefinir sua senha.\n\nAcesse o link para continuar: {}",
                data.reset_url
            );
            if let Some(expires_at) = &data.expires_at {
                body.push_str(&format!(
                    "\n\nO link expira em {}.",
                    expires_at.format("%d/%m/%Y %H:%M UTC")
                ));
            }
            body.push_str("\n\nSe você não fez esta solicitação, ignore este e-mail.");
            ("Redefinição de senha".to_string(), body)
        }
        EventKind::FormSubmissionCreated(_) => return None,
    };

    Some(EmailMessage { subject, body })
}

pub fn chat_message(event: &PublishedEvent) -> Option<String> {
    match &event.kind {
        EventKind::EnrollmentCreated(data) => {
            let label = beneficiary_label(data.beneficiary_name.as_deref(), &data.beneficiary_id);
            Some(format!(
                "Nova inscrição: {} no programa {}.",
                label, data.program_name
            ))
        }
        EventKind::EnrollmentStatusChanged(data) => {
            let label = beneficiary_label(data.beneficiary_name.as_deref(), &data.beneficiary_id);
            Some(format!(
                "Inscrição de {} em {}: {} → {}.",
                label, data.program_name, data.previous_status, data.new_status
            ))
        }
        EventKind::ActionItemDueSoon(data) => {
            let label = beneficiary_label(data.beneficiary_name.as_deref(), &data.beneficiary_id);
            Some(format!(
                "Lembrete: a ação \"{}\" de {} vence em {}.",
                data.title,
                label,
                date(&data.due_at)
            ))
        }
        EventKind::ActionItemOverdue(data) => {
            let label = beneficiary_label(data.beneficiary_name.as_deref(), &data.beneficiary_id);
            Some(format!(
                "Atenção: a ação \"{}\" de {} está atrasada há {}.",
                data.title,
                label,
                days(data.overdue_by_days)
            ))
        }
        EventKind::BeneficiaryCreated(_)
        | EventKind::ConsentUpdated(_)
        | EventKind::PasswordResetRequested(_)
        | EventKind::FormSubmissionCreated(_) => None,
    }
}

/// Email recipients for an event.
///
/// Events addressed to a single person carry their own address and never go
/// to the broadcast list.
pub fn email_recipients(event: &PublishedEvent, defaults: &[String]) -> Vec<String> {
    match &event.kind {
        EventKind::PasswordResetRequested(data) => {
            let email = data.email.trim();
            if email.is_empty() {
                Vec::new()
            } else {
                vec![email.to_string()]
            }
        }
        _ => defaults.to_vec(),
    }
}
