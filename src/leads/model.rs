//! Lead records and the public contact form.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::chatbot::{Interest, Lead};
use crate::error::ValidationError;

/// Where a lead came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadSource {
    Chatbot,
    ContactForm,
}

impl std::fmt::Display for LeadSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Chatbot => write!(f, "chatbot"),
            Self::ContactForm => write!(f, "contact_form"),
        }
    }
}

impl std::str::FromStr for LeadSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "chatbot" => Ok(Self::Chatbot),
            "contact_form" => Ok(Self::ContactForm),
            other => Err(format!("unknown lead source: {other}")),
        }
    }
}

/// A persisted lead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadRecord {
    pub id: Uuid,
    pub source: LeadSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interest: Option<Interest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl LeadRecord {
    pub fn from_chat(lead: Lead) -> Self {
        Self {
            id: Uuid::new_v4(),
            source: LeadSource::Chatbot,
            interest: lead.interest,
            name: lead.name,
            email: lead.email,
            phone: lead.phone,
            message: None,
            created_at: Utc::now(),
        }
    }
}

/// Body of the public "Entre em Contato" form.
#[derive(Debug, Clone, Deserialize)]
pub struct ContactForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub insurance_type: Option<Interest>,
    #[serde(default)]
    pub message: String,
}

impl ContactForm {
    /// Validate and convert into a lead record.
    pub fn into_lead(self) -> Result<LeadRecord, ValidationError> {
        let mut errors = ValidationError::new();
        let name = self.name.trim().to_string();
        let email = self.email.trim().to_string();
        let phone = self.phone.trim().to_string();
        let message = self.message.trim().to_string();

        if name.is_empty() {
            errors.add("name", "Nome é obrigatório");
        }
        if email.is_empty() {
            errors.add("email", "E-mail é obrigatório");
        } else if !email_pattern().is_match(&email) {
            errors.add("email", "Digite um e-mail válido");
        }
        if phone.is_empty() {
            errors.add("phone", "Telefone é obrigatório");
        }
        if self.insurance_type.is_none() {
            errors.add("insurance_type", "Selecione uma opção");
        }
        errors.into_result()?;

        Ok(LeadRecord {
            id: Uuid::new_v4(),
            source: LeadSource::ContactForm,
            interest: self.insurance_type,
            name: Some(name),
            email: Some(email),
            phone: Some(phone),
            message: (!message.is_empty()).then_some(message),
            created_at: Utc::now(),
        })
    }
}

/// `local@domain.tld` with no whitespace.
pub fn email_pattern() -> &'static Regex {
    static PATTERN: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("static email regex"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form() -> ContactForm {
        ContactForm {
            name: "Carlos".into(),
            email: "carlos@example.com".into(),
            phone: "(11) 91234-5678".into(),
            insurance_type: Some(Interest::Empresarial),
            message: "  ".into(),
        }
    }

    #[test]
    fn valid_form_becomes_lead() {
        let lead = form().into_lead().unwrap();
        assert_eq!(lead.source, LeadSource::ContactForm);
        assert_eq!(lead.interest, Some(Interest::Empresarial));
        assert_eq!(lead.name.as_deref(), Some("Carlos"));
        assert!(lead.message.is_none(), "blank message is dropped");
    }

    #[test]
    fn invalid_form_reports_every_field() {
        let err = ContactForm {
            name: "".into(),
            email: "carlos@".into(),
            phone: "".into(),
            insurance_type: None,
            message: "".into(),
        }
        .into_lead()
        .unwrap_err();
        assert_eq!(err.fields.len(), 4);
        assert_eq!(err.fields["email"], "Digite um e-mail válido");
    }

    #[test]
    fn chat_lead_conversion() {
        let lead = Lead {
            interest: Some(Interest::Saude),
            name: Some("Maria".into()),
            email: Some("maria@example.com".into()),
            phone: Some("11999999999".into()),
        };
        let record = LeadRecord::from_chat(lead);
        assert_eq!(record.source, LeadSource::Chatbot);
        assert_eq!(record.interest, Some(Interest::Saude));
        assert!(record.message.is_none());
    }

    #[test]
    fn email_pattern_cases() {
        assert!(email_pattern().is_match("a@b.co"));
        assert!(!email_pattern().is_match("a@b"));
        assert!(!email_pattern().is_match("a b@c.com"));
    }

    #[test]
    fn contact_form_deserializes_insurance_type() {
        let form: ContactForm = serde_json::from_value(serde_json::json!({
            "name": "Ana", "email": "ana@x.com", "phone": "1", "insurance_type": "vida"
        }))
        .unwrap();
        assert_eq!(form.insurance_type, Some(Interest::Vida));
    }
}
