// SPDX-FileCopyrightText: 2026 Leadbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Linked-identifier (LID) resolution.
//!
//! Some message sources address a contact by an opaque `<id>@lid` instead
//! of a dialable `<phone>@s.whatsapp.net`. Mappings are learned from
//! contact sync records and from messages that carry both forms. The cache
//! is best-effort: a miss never fails message processing.

use dashmap::DashMap;
use leadbridge_core::envelope::{ContactRecord, MessageKey};
use tracing::{debug, warn};

use crate::phone::{PhoneMatcher, normalize};
use crate::recording;

const LID_SUFFIX: &str = "@lid";
const PHONE_SUFFIX: &str = "@s.whatsapp.net";

/// The user part of an address: everything before `@`, minus any `:device` tag.
pub fn address_user(address: &str) -> &str {
    let user = address.split('@').next().unwrap_or(address);
    user.split(':').next().unwrap_or(user)
}

pub fn is_lid(address: &str) -> bool {
    address.ends_with(LID_SUFFIX)
}

/// Group chats, status broadcasts and channels never produce messages.
pub fn is_non_direct(address: &str) -> bool {
    address.ends_with("@g.us") || address.ends_with("@broadcast") || address.ends_with("@newsletter")
}

/// The dialable address for canonical phone digits.
pub fn phone_address(digits: &str) -> String {
    format!("{digits}{PHONE_SUFFIX}")
}

/// Where a resolved phone came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveStrategy {
    /// Previously learned mapping.
    Cache,
    /// Phone-bearing alternate address attached to the message key.
    AltAddress,
    /// The `participant` field, reduced to digits.
    Participant,
    /// The remote address itself, reduced to digits.
    RemoteDigits,
}

/// LID resolution order; the first strategy that yields a phone wins.
pub const LID_CHAIN: [ResolveStrategy; 4] = [
    ResolveStrategy::Cache,
    ResolveStrategy::AltAddress,
    ResolveStrategy::Participant,
    ResolveStrategy::RemoteDigits,
];

/// Outcome of resolving a message's remote address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Phone digits, or the raw LID digits when resolution failed.
    pub digits: String,
    pub lid: bool,
    /// `None` for plain phone addresses and for unresolved LIDs.
    pub via: Option<ResolveStrategy>,
}

impl Resolution {
    pub fn is_unresolved(&self) -> bool {
        self.lid && self.via.is_none()
    }
}

#[derive(Debug, Clone)]
struct Mapping {
    phone: String,
    address: String,
}

/// Process-lifetime LID cache. Misses are counted on
/// `leadbridge_unresolved_lids_total`.
#[derive(Debug, Default)]
pub struct IdentityResolver {
    by_lid: DashMap<String, Mapping>,
}

impl IdentityResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Learn mappings from contact records that expose a LID and a phone address together.
    pub fn learn(&self, records: &[ContactRecord]) -> usize {
        let mut learned = 0;
        for record in records {
            let lid = record
                .lid
                .as_deref()
                .or_else(|| is_lid(&record.id).then_some(record.id.as_str()));
            let address = record
                .phone_number
                .as_deref()
                .or_else(|| (!is_lid(&record.id)).then_some(record.id.as_str()))
                .filter(|a| a.ends_with(PHONE_SUFFIX));
            if let (Some(lid), Some(address)) = (lid, address) {
                self.remember(lid, address);
                learned += 1;
            }
        }
        if learned > 0 {
            debug!(learned, cached = self.by_lid.len(), "learned LID mappings");
        }
        learned
    }

    fn remember(&self, lid: &str, address: &str) {
        let phone = normalize(address_user(address));
        if phone.is_empty() {
            return;
        }
        self.by_lid.insert(
            address_user(lid).to_string(),
            Mapping {
                phone,
                address: address.to_string(),
            },
        );
    }

    /// Cached phone digits for a LID.
    pub fn phone_for(&self, lid: &str) -> Option<String> {
        self.by_lid.get(address_user(lid)).map(|m| m.phone.clone())
    }

    /// Cached dialable address for a LID.
    pub fn address_for(&self, lid: &str) -> Option<String> {
        self.by_lid.get(address_user(lid)).map(|m| m.address.clone())
    }

    /// Resolve the remote address of a message key to phone digits.
    pub fn resolve(&self, key: &MessageKey, matcher: &PhoneMatcher) -> Resolution {
        let remote = key.remote_jid.as_str();
        if !is_lid(remote) {
            return Resolution {
                digits: normalize(address_user(remote)),
                lid: false,
                via: None,
            };
        }

        for strategy in LID_CHAIN {
            if let Some(digits) = self.attempt(strategy, key, matcher) {
                if strategy != ResolveStrategy::Cache {
                    self.by_lid.insert(
                        address_user(remote).to_string(),
                        Mapping {
                            address: phone_address(&digits),
                            phone: digits.clone(),
                        },
                    );
                }
                return Resolution {
                    digits,
                    lid: true,
                    via: Some(strategy),
                };
            }
        }

        recording::record_unresolved_lid();
        warn!(remote, "unresolved LID, processing with raw identifier");
        Resolution {
            digits: normalize(address_user(remote)),
            lid: true,
            via: None,
        }
    }

    fn attempt(
        &self,
        strategy: ResolveStrategy,
        key: &MessageKey,
        matcher: &PhoneMatcher,
    ) -> Option<String> {
        let phone_shaped = |address: &str| {
            let digits = normalize(address_user(address));
            matcher.is_phone_shaped(&digits).then_some(digits)
        };
        match strategy {
            ResolveStrategy::Cache => self.phone_for(&key.remote_jid),
            ResolveStrategy::AltAddress => key
                .remote_jid_alt
                .as_deref()
                .filter(|a| !is_lid(a))
                .and_then(phone_shaped),
            ResolveStrategy::Participant => key
                .participant
                .as_deref()
                .filter(|a| !is_lid(a))
                .and_then(phone_shaped),
            ResolveStrategy::RemoteDigits => phone_shaped(&key.remote_jid),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::tests::{rendered, sample};

    fn lid_key(remote: &str) -> MessageKey {
        MessageKey {
            remote_jid: remote.to_string(),
            ..MessageKey::default()
        }
    }

    #[test]
    fn address_helpers() {
        assert_eq!(address_user("5511987654321:12@s.whatsapp.net"), "5511987654321");
        assert_eq!(address_user("plain"), "plain");
        assert!(is_lid("203040506070809@lid"));
        assert!(is_non_direct("120363@g.us"));
        assert!(is_non_direct("status@broadcast"));
        assert!(is_non_direct("1203@newsletter"));
        assert!(!is_non_direct("5511987654321@s.whatsapp.net"));
    }

    #[test]
    fn plain_address_resolves_directly() {
        let resolver = IdentityResolver::new();
        let r = resolver.resolve(
            &lid_key("5511987654321@s.whatsapp.net"),
            &PhoneMatcher::default(),
        );
        assert_eq!(r.digits, "5511987654321");
        assert!(!r.lid);
        assert!(!r.is_unresolved());
    }

    #[test]
    fn learned_mapping_wins() {
        let resolver = IdentityResolver::new();
        let learned = resolver.learn(&[
            ContactRecord {
                id: "203040506070809@lid".into(),
                phone_number: Some("5511987654321@s.whatsapp.net".into()),
                ..ContactRecord::default()
            },
            ContactRecord {
                id: "5521912345678@s.whatsapp.net".into(),
                lid: Some("999888777666555@lid".into()),
                ..ContactRecord::default()
            },
            // Nothing to pair.
            ContactRecord {
                id: "111222333444555@lid".into(),
                ..ContactRecord::default()
            },
        ]);
        assert_eq!(learned, 2);
        assert_eq!(
            resolver.address_for("999888777666555@lid").as_deref(),
            Some("5521912345678@s.whatsapp.net")
        );

        let r = resolver.resolve(&lid_key("203040506070809@lid"), &PhoneMatcher::default());
        assert_eq!(r.digits, "5511987654321");
        assert_eq!(r.via, Some(ResolveStrategy::Cache));
    }

    #[test]
    fn alt_address_then_participant() {
        let resolver = IdentityResolver::new();
        let matcher = PhoneMatcher::default();

        let mut key = lid_key("203040506070809@lid");
        key.remote_jid_alt = Some("5511987654321@s.whatsapp.net".into());
        key.participant = Some("5521912345678@s.whatsapp.net".into());
        let r = resolver.resolve(&key, &matcher);
        assert_eq!(r.via, Some(ResolveStrategy::AltAddress));
        assert_eq!(r.digits, "5511987654321");
        // Learned for next time.
        assert_eq!(resolver.phone_for("203040506070809@lid").as_deref(), Some("5511987654321"));

        let mut key = lid_key("111222333444555@lid");
        key.participant = Some("5521912345678:3@s.whatsapp.net".into());
        let r = resolver.resolve(&key, &matcher);
        assert_eq!(r.via, Some(ResolveStrategy::Participant));
        assert_eq!(r.digits, "5521912345678");
    }

    #[test]
    fn phone_shaped_lid_digits_are_accepted() {
        let resolver = IdentityResolver::new();
        let r = resolver.resolve(&lid_key("5511987654321@lid"), &PhoneMatcher::default());
        assert_eq!(r.via, Some(ResolveStrategy::RemoteDigits));
    }

    #[test]
    #[tracing_test::traced_test]
    fn miss_is_counted_and_keeps_raw_digits() {
        let resolver = IdentityResolver::new();
        let mut r = None;
        let text = rendered(|| {
            r = Some(resolver.resolve(&lid_key("203040506070809@lid"), &PhoneMatcher::default()));
            // Resolvable; not counted.
            resolver.resolve(&lid_key("5511987654321@lid"), &PhoneMatcher::default());
        });
        let r = r.unwrap();
        assert!(r.is_unresolved());
        assert_eq!(r.digits, "203040506070809");
        assert_eq!(sample(&text, recording::UNRESOLVED_LIDS, ""), Some(1.0));
        assert!(logs_contain("unresolved LID"));
    }
}
