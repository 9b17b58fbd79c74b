// SPDX-FileCopyrightText: 2026 Leadbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Lead creation and funnel auto-advance driven by conversation activity.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use leadbridge_config::model::LeadsConfig;
use leadbridge_core::types::{Lead, NewLead};
use leadbridge_core::{BridgeError, Direction, LeadStore, Message, MessageStore};
use tracing::{debug, info, warn};

use crate::phone::PhoneMatcher;

/// Origin recorded on leads created by the bridge.
pub const LEAD_ORIGIN: &str = "whatsapp";

/// Metadata key holding a display sub-status that no longer applies once a lead advances.
pub const SUB_STATUS_KEY: &str = "sub_status";

/// What happened when an inbound message was matched against the user's leads.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkOutcome {
    /// Another message for the same contact is still being linked.
    InFlight,
    Matched(String),
    Renamed(String),
    /// The phone is on the company's blocklist.
    Blocked,
    Created(Lead),
}

/// A funnel stage change applied to a lead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunnelChange {
    pub lead_id: String,
    pub from: Option<String>,
    pub to: String,
}

/// Removes the in-flight entry when linking finishes, however it finishes.
struct InFlightGuard<'a> {
    map: &'a DashMap<(String, String), Instant>,
    key: (String, String),
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.map.remove(&self.key);
    }
}

pub struct LeadLinker {
    leads: Arc<dyn LeadStore>,
    messages: Arc<dyn MessageStore>,
    matcher: PhoneMatcher,
    config: LeadsConfig,
    inflight: DashMap<(String, String), Instant>,
}

impl LeadLinker {
    pub fn new(
        leads: Arc<dyn LeadStore>,
        messages: Arc<dyn MessageStore>,
        matcher: PhoneMatcher,
        config: LeadsConfig,
    ) -> Self {
        Self {
            leads,
            messages,
            matcher,
            config,
            inflight: DashMap::new(),
        }
    }

    fn inflight_ttl(&self) -> Duration {
        Duration::from_secs(self.config.inflight_ttl_secs)
    }

    /// Run both link steps for a persisted message. Failures are logged.
    pub async fn on_message(&self, message: &Message, display_name: Option<&str>) {
        if message.direction == Direction::In {
            match self.reconcile(&message.user_id, &message.phone, display_name).await {
                Ok(LinkOutcome::Created(lead)) => {
                    info!(user_id = %message.user_id, lead_id = %lead.id, "lead created from WhatsApp");
                }
                Ok(outcome) => debug!(user_id = %message.user_id, ?outcome, "lead linked"),
                Err(e) => warn!(user_id = %message.user_id, error = %e, "lead linking failed"),
            }
        }
        if let Err(e) = self.advance_funnel(&message.user_id, &message.phone).await {
            warn!(user_id = %message.user_id, error = %e, "funnel update failed");
        }
    }

    fn find_lead<'a>(&self, leads: &'a [Lead], phone: &str) -> Option<&'a Lead> {
        leads.iter().find(|lead| {
            lead.phone
                .as_deref()
                .is_some_and(|p| self.matcher.same_contact(p, phone))
        })
    }

    /// Empty, or exactly the auto-created form: the prefix followed by digits.
    fn is_placeholder_name(&self, name: Option<&str>) -> bool {
        match name.map(str::trim) {
            None | Some("") => true,
            Some(name) => name
                .strip_prefix(self.config.placeholder_prefix.trim())
                .map(str::trim_start)
                .is_some_and(|rest| !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit())),
        }
    }

    /// Find or create the lead for an inbound contact.
    pub async fn reconcile(
        &self,
        user_id: &str,
        phone: &str,
        display_name: Option<&str>,
    ) -> Result<LinkOutcome, BridgeError> {
        let key = (user_id.to_string(), phone.to_string());
        match self.inflight.entry(key.clone()) {
            Entry::Occupied(entry) if entry.get().elapsed() < self.inflight_ttl() => {
                debug!(user_id, phone, "lead linking already in flight");
                return Ok(LinkOutcome::InFlight);
            }
            Entry::Occupied(mut entry) => {
                entry.insert(Instant::now());
            }
            Entry::Vacant(entry) => {
                entry.insert(Instant::now());
            }
        }
        let _guard = InFlightGuard {
            map: &self.inflight,
            key,
        };

        let display_name = display_name.map(str::trim).filter(|n| !n.is_empty());
        let leads = self.leads.active_leads(user_id).await?;

        if let Some(lead) = self.find_lead(&leads, phone) {
            if let Some(name) = display_name
                && self.is_placeholder_name(lead.name.as_deref())
                && !self.is_placeholder_name(Some(name))
            {
                self.leads.rename_lead(&lead.id, name).await?;
                debug!(lead_id = %lead.id, name, "lead renamed from contact name");
                return Ok(LinkOutcome::Renamed(lead.id.clone()));
            }
            return Ok(LinkOutcome::Matched(lead.id.clone()));
        }

        let company_id = self.leads.company_for_user(user_id).await?;
        if let Some(company) = company_id.as_deref() {
            let variants: Vec<String> = self.matcher.variants(phone).into_iter().collect();
            if self.leads.is_blocked(company, &variants).await? {
                debug!(user_id, phone, company, "lead creation suppressed by blocklist");
                return Ok(LinkOutcome::Blocked);
            }
        }

        let name = display_name
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}{phone}", self.config.placeholder_prefix));
        let lead = self
            .leads
            .create_lead(&NewLead {
                name,
                phone: phone.to_string(),
                status: self.config.initial_stage.clone(),
                company_id,
                user_id: user_id.to_string(),
                origin: LEAD_ORIGIN.to_string(),
            })
            .await?;
        self.leads
            .append_history(&lead.id, "auto_created", &format!("created from WhatsApp message by {phone}"))
            .await?;
        Ok(LinkOutcome::Created(lead))
    }

    /// The stage a lead should move to, if any. Only forward moves are returned.
    fn next_stage(&self, current: Option<&str>, has_inbound: bool, has_outbound: bool) -> Option<String> {
        let current = current.map(str::trim).filter(|s| !s.is_empty());
        if current.is_some_and(|c| self.config.terminal_stages.iter().any(|t| t == c)) {
            return None;
        }
        let inferred = match (has_inbound, has_outbound) {
            (true, true) => &self.config.contact_stage,
            (true, false) => &self.config.initial_stage,
            _ => return None,
        };
        match current {
            None => Some(inferred.clone()),
            Some(c) if c == self.config.initial_stage && *inferred == self.config.contact_stage => {
                Some(inferred.clone())
            }
            _ => None,
        }
    }

    /// Re-derive the lead's stage from which directions the conversation has seen.
    pub async fn advance_funnel(&self, user_id: &str, phone: &str) -> Result<Option<FunnelChange>, BridgeError> {
        let leads = self.leads.active_leads(user_id).await?;
        let Some(lead) = self.find_lead(&leads, phone) else {
            return Ok(None);
        };

        let variants: Vec<String> = self.matcher.variants(phone).into_iter().collect();
        let summary = self.messages.direction_summary(user_id, &variants).await?;
        let Some(next) = self.next_stage(lead.status.as_deref(), summary.has_inbound, summary.has_outbound)
        else {
            return Ok(None);
        };

        let metadata = strip_sub_status(lead.metadata.as_deref());
        self.leads
            .update_lead_status(&lead.id, &next, metadata.as_deref())
            .await?;
        let from = lead.status.clone().filter(|s| !s.trim().is_empty());
        self.leads
            .append_history(
                &lead.id,
                "status_changed",
                &format!("{} -> {next}", from.as_deref().unwrap_or("-")),
            )
            .await?;
        info!(lead_id = %lead.id, from = ?from, to = %next, "lead stage advanced");
        Ok(Some(FunnelChange {
            lead_id: lead.id.clone(),
            from,
            to: next,
        }))
    }
}

/// Metadata with the sub-status key removed. Unparseable documents are kept as they are.
fn strip_sub_status(metadata: Option<&str>) -> Option<String> {
    let raw = metadata?;
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(serde_json::Value::Object(mut map)) => {
            map.remove(SUB_STATUS_KEY);
            serde_json::to_string(&map).ok()
        }
        _ => Some(raw.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use leadbridge_storage::SqliteStorage;

    struct Fixture {
        store: Arc<SqliteStorage>,
        linker: LeadLinker,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(SqliteStorage::in_memory().await.unwrap());
        let linker = LeadLinker::new(
            store.clone(),
            store.clone(),
            PhoneMatcher::default(),
            LeadsConfig::default(),
        );
        Fixture { store, linker }
    }

    async fn exec(store: &SqliteStorage, sql: &'static str) {
        store
            .database()
            .unwrap()
            .connection()
            .call(move |conn| -> Result<(), rusqlite::Error> { conn.execute_batch(sql) })
            .await
            .unwrap();
    }

    async fn record(store: &SqliteStorage, id: &str, phone: &str, direction: Direction) {
        store
            .insert_message(&Message {
                id: id.into(),
                user_id: "u1".into(),
                phone: phone.into(),
                text: "x".into(),
                media_url: None,
                media_type: None,
                direction,
                occurred_at: Utc::now(),
                is_read: direction == Direction::Out,
            })
            .await
            .unwrap();
    }

    async fn only_lead(store: &SqliteStorage) -> Lead {
        let leads = store.active_leads("u1").await.unwrap();
        assert_eq!(leads.len(), 1);
        leads.into_iter().next().unwrap()
    }

    #[tokio::test]
    async fn creates_placeholder_lead_with_history() {
        let f = fixture().await;
        let outcome = f.linker.reconcile("u1", "5511987654321", None).await.unwrap();
        let LinkOutcome::Created(lead) = outcome else {
            panic!("expected creation, got {outcome:?}");
        };
        assert_eq!(lead.name.as_deref(), Some("WhatsApp 5511987654321"));
        assert_eq!(lead.status.as_deref(), Some("novo"));
        assert_eq!(lead.origin.as_deref(), Some(LEAD_ORIGIN));

        let history = leadbridge_storage::queries::leads::history_for_lead(
            f.store.database().unwrap(),
            &lead.id,
        )
        .await
        .unwrap();
        assert_eq!(history[0].0, "auto_created");
    }

    #[tokio::test]
    async fn second_message_matches_existing_lead() {
        let f = fixture().await;
        f.linker.reconcile("u1", "5511987654321", Some("Maria")).await.unwrap();
        let outcome = f.linker.reconcile("u1", "11987654321", Some("Maria")).await.unwrap();
        assert!(matches!(outcome, LinkOutcome::Matched(_)));
        assert_eq!(only_lead(&f.store).await.name.as_deref(), Some("Maria"));
    }

    #[tokio::test]
    async fn placeholder_name_is_upgraded() {
        let f = fixture().await;
        f.linker.reconcile("u1", "5511987654321", None).await.unwrap();
        let outcome = f.linker.reconcile("u1", "5511987654321", Some("  João ")).await.unwrap();
        assert!(matches!(outcome, LinkOutcome::Renamed(_)));
        assert_eq!(only_lead(&f.store).await.name.as_deref(), Some("João"));
    }

    #[tokio::test]
    async fn real_name_is_kept() {
        let f = fixture().await;
        f.linker.reconcile("u1", "5511987654321", Some("Maria")).await.unwrap();
        f.linker.reconcile("u1", "5511987654321", Some("Someone Else")).await.unwrap();
        assert_eq!(only_lead(&f.store).await.name.as_deref(), Some("Maria"));
    }

    #[tokio::test]
    async fn prefixed_real_name_is_kept() {
        let f = fixture().await;
        f.linker
            .reconcile("u1", "5511987654321", Some("WhatsApp Suporte"))
            .await
            .unwrap();
        let outcome = f.linker.reconcile("u1", "5511987654321", Some("Maria")).await.unwrap();
        assert!(matches!(outcome, LinkOutcome::Matched(_)));
        assert_eq!(only_lead(&f.store).await.name.as_deref(), Some("WhatsApp Suporte"));
    }

    #[tokio::test]
    async fn placeholder_names_are_prefix_and_digits_only() {
        let f = fixture().await;
        let linker = &f.linker;
        assert!(linker.is_placeholder_name(None));
        assert!(linker.is_placeholder_name(Some("  ")));
        assert!(linker.is_placeholder_name(Some("WhatsApp 5511987654321")));
        assert!(!linker.is_placeholder_name(Some("WhatsApp")));
        assert!(!linker.is_placeholder_name(Some("WhatsApp Suporte")));
        assert!(!linker.is_placeholder_name(Some("WhatsApp 55 Loja")));
        assert!(!linker.is_placeholder_name(Some("WhatsAppers 123")));
        assert!(!linker.is_placeholder_name(Some("Maria")));
    }

    #[tokio::test]
    async fn blocklisted_phone_is_not_created() {
        let f = fixture().await;
        exec(
            &f.store,
            "INSERT INTO users (id, company_id) VALUES ('u1', 'c1');
             INSERT INTO lead_blocklist (company_id, phone) VALUES ('c1', '11987654321');",
        )
        .await;
        let outcome = f.linker.reconcile("u1", "5511987654321", None).await.unwrap();
        assert_eq!(outcome, LinkOutcome::Blocked);
        assert!(f.store.active_leads("u1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn concurrent_burst_creates_one_lead() {
        let f = fixture().await;
        let (a, b, c) = tokio::join!(
            f.linker.reconcile("u1", "5511987654321", None),
            f.linker.reconcile("u1", "5511987654321", None),
            f.linker.reconcile("u1", "5511987654321", None),
        );
        let created = [a, b, c]
            .into_iter()
            .filter(|o| matches!(o, Ok(LinkOutcome::Created(_))))
            .count();
        assert_eq!(created, 1);
        only_lead(&f.store).await;
        // The guard is gone once linking completes.
        assert!(f.linker.inflight.is_empty());
    }

    #[tokio::test]
    async fn stale_guard_does_not_block() {
        let f = fixture().await;
        let key = ("u1".to_string(), "5511987654321".to_string());
        f.linker
            .inflight
            .insert(key, Instant::now() - Duration::from_secs(31));
        let outcome = f.linker.reconcile("u1", "5511987654321", None).await.unwrap();
        assert!(matches!(outcome, LinkOutcome::Created(_)));
    }

    #[tokio::test]
    async fn inbound_only_stays_initial() {
        let f = fixture().await;
        f.linker.reconcile("u1", "5511987654321", None).await.unwrap();
        record(&f.store, "m1", "5511987654321", Direction::In).await;
        assert_eq!(f.linker.advance_funnel("u1", "5511987654321").await.unwrap(), None);
        assert_eq!(only_lead(&f.store).await.status.as_deref(), Some("novo"));
    }

    #[tokio::test]
    async fn both_directions_advance_to_contact_and_clear_sub_status() {
        let f = fixture().await;
        exec(
            &f.store,
            r#"INSERT INTO leads (id, name, phone, status, user_id, metadata)
               VALUES ('l1', 'Maria', '5511987654321', 'novo', 'u1', '{"sub_status":"aguardando","score":3}');"#,
        )
        .await;
        record(&f.store, "m1", "5511987654321", Direction::In).await;
        record(&f.store, "m2", "5511987654321", Direction::Out).await;

        let change = f.linker.advance_funnel("u1", "5511987654321").await.unwrap().unwrap();
        assert_eq!(change.from.as_deref(), Some("novo"));
        assert_eq!(change.to, "em_contato");

        let lead = only_lead(&f.store).await;
        assert_eq!(lead.status.as_deref(), Some("em_contato"));
        let metadata: serde_json::Value = serde_json::from_str(lead.metadata.as_deref().unwrap()).unwrap();
        assert!(metadata.get(SUB_STATUS_KEY).is_none());
        assert_eq!(metadata["score"], 3);
    }

    #[tokio::test]
    async fn terminal_stage_never_changes() {
        let f = fixture().await;
        exec(
            &f.store,
            "INSERT INTO leads (id, name, phone, status, user_id)
             VALUES ('l1', 'Maria', '5511987654321', 'ganho', 'u1');",
        )
        .await;
        record(&f.store, "m1", "5511987654321", Direction::In).await;
        assert_eq!(f.linker.advance_funnel("u1", "5511987654321").await.unwrap(), None);
        record(&f.store, "m2", "5511987654321", Direction::Out).await;
        assert_eq!(f.linker.advance_funnel("u1", "5511987654321").await.unwrap(), None);
        assert_eq!(only_lead(&f.store).await.status.as_deref(), Some("ganho"));
    }

    #[tokio::test]
    async fn empty_status_gets_inferred_stage() {
        let f = fixture().await;
        exec(
            &f.store,
            "INSERT INTO leads (id, name, phone, status, user_id)
             VALUES ('l1', 'Maria', '5511987654321', NULL, 'u1');",
        )
        .await;
        record(&f.store, "m1", "5511987654321", Direction::In).await;
        let change = f.linker.advance_funnel("u1", "5511987654321").await.unwrap().unwrap();
        assert_eq!(change.from, None);
        assert_eq!(change.to, "novo");
    }

    #[test]
    fn sub_status_stripping() {
        assert_eq!(strip_sub_status(None), None);
        assert_eq!(
            strip_sub_status(Some(r#"{"sub_status":"x"}"#)).as_deref(),
            Some("{}")
        );
        assert_eq!(strip_sub_status(Some("not json")).as_deref(), Some("not json"));
    }
}
