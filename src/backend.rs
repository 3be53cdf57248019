//! The backend the session talks to: the hosted store, or nothing at all.

use chrono::{DateTime, Duration, Utc};

use crate::config::Config;
use crate::errors::AppError;
use crate::models::{Case, CaseUpdate, Message, NewMessage, Sender};
use crate::supabase::SupabaseClient;

#[derive(Clone)]
pub enum Backend {
    Online(SupabaseClient),
    /// No credentials: reads come back empty, writes are refused.
    Offline,
}

impl Backend {
    pub fn from_config(config: &Config) -> Result<Self, AppError> {
        match config.supabase {
            Some(ref creds) => Ok(Backend::Online(SupabaseClient::new(
                creds,
                config.backend_timeout(),
            )?)),
            None => Ok(Backend::Offline),
        }
    }

    pub fn is_offline(&self) -> bool {
        matches!(self, Backend::Offline)
    }

    /// Refuses locally when offline, before any network call.
    pub fn ensure_writable(&self) -> Result<&SupabaseClient, AppError> {
        match self {
            Backend::Online(client) => Ok(client),
            Backend::Offline => Err(AppError::OfflineMode),
        }
    }

    pub async fn fetch_cases_page(&self, offset: u64, limit: u32) -> Result<Vec<Case>, AppError> {
        match self {
            Backend::Online(client) => client.fetch_cases_page(offset, limit).await,
            Backend::Offline => Ok(Vec::new()),
        }
    }

    pub async fn list_messages(&self, case_id: &str) -> Result<Vec<Message>, AppError> {
        match self {
            Backend::Online(client) => client.list_messages(case_id).await,
            Backend::Offline => Ok(demo_messages(case_id, Utc::now())),
        }
    }

    pub async fn list_messages_since(
        &self,
        case_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<Message>, AppError> {
        match self {
            Backend::Online(client) => client.list_messages_since(case_id, since).await,
            Backend::Offline => Ok(Vec::new()),
        }
    }

    pub async fn update_case(&self, id: &str, update: &CaseUpdate) -> Result<Case, AppError> {
        self.ensure_writable()?.update_case(id, update).await
    }

    pub async fn insert_message(&self, message: &NewMessage) -> Result<(), AppError> {
        self.ensure_writable()?.insert_message(message).await
    }
}

/// Sample conversation shown in offline mode so the chat panel is not empty.
pub fn demo_messages(case_id: &str, now: DateTime<Utc>) -> Vec<Message> {
    let script = [
        (
            60 * 24 * 2,
            Sender::Family,
            "Olá, bom dia! Precisamos de ajuda com transporte para as consultas.",
        ),
        (
            60 * 24 * 2 - 15,
            Sender::Volunteer,
            "Claro! Vou verificar disponibilidade para esta semana.",
        ),
        (60 * 24, Sender::Family, "Muito obrigado! Segunda ou terça seria ótimo."),
        (
            60 * 24 - 30,
            Sender::Volunteer,
            "Perfeito, posso na terça às 14h. Combinado?",
        ),
    ];

    script
        .iter()
        .enumerate()
        .map(|(i, (minutes_ago, sender, content))| Message {
            id: format!("demo-{}-{}", case_id, i + 1),
            created_at: now - Duration::minutes(*minutes_ago),
            demand_id: case_id.to_string(),
            sender: *sender,
            content: content.to_string(),
        })
        .collect()
}
