// SPDX-FileCopyrightText: 2026 Leadbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reads and narrow writes against the CRM's lead tables.

use leadbridge_core::BridgeError;
use leadbridge_core::types::{Lead, NewLead};
use rusqlite::{OptionalExtension, Row, params, params_from_iter};
use rusqlite::types::Value;

use super::{now_timestamp, placeholders};
use crate::database::{Database, map_tr_err};

pub async fn company_for_user(db: &Database, user_id: &str) -> Result<Option<String>, BridgeError> {
    let user_id = user_id.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<String>, rusqlite::Error> {
            let company = conn
                .query_row(
                    "SELECT company_id FROM users WHERE id = ?1",
                    params![user_id],
                    |row| row.get::<_, Option<String>>(0),
                )
                .optional()?;
            Ok(company.flatten())
        })
        .await
        .map_err(map_tr_err)
}

/// The user's leads, excluding soft-deleted rows, oldest first.
pub async fn active_leads(db: &Database, user_id: &str) -> Result<Vec<Lead>, BridgeError> {
    let user_id = user_id.to_string();
    db.connection()
        .call(move |conn| -> Result<Vec<Lead>, rusqlite::Error> {
            let mut stmt = conn.prepare(
                "SELECT id, name, phone, status, company_id, user_id, origin, metadata
                 FROM leads WHERE user_id = ?1 AND deleted_at IS NULL
                 ORDER BY created_at ASC",
            )?;
            let rows = stmt.query_map(params![user_id], row_to_lead)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn create_lead(db: &Database, lead: &NewLead) -> Result<Lead, BridgeError> {
    let created = Lead {
        id: uuid::Uuid::new_v4().to_string(),
        name: Some(lead.name.clone()),
        phone: Some(lead.phone.clone()),
        status: Some(lead.status.clone()),
        company_id: lead.company_id.clone(),
        user_id: lead.user_id.clone(),
        origin: Some(lead.origin.clone()),
        metadata: None,
    };
    let row = created.clone();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "INSERT INTO leads (id, name, phone, status, company_id, user_id, origin)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    row.id,
                    row.name,
                    row.phone,
                    row.status,
                    row.company_id,
                    row.user_id,
                    row.origin,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;
    Ok(created)
}

pub async fn rename_lead(db: &Database, lead_id: &str, name: &str) -> Result<(), BridgeError> {
    let lead_id = lead_id.to_string();
    let name = name.to_string();
    let changed = db
        .connection()
        .call({
            let lead_id = lead_id.clone();
            move |conn| -> Result<usize, rusqlite::Error> {
                conn.execute(
                    "UPDATE leads SET name = ?1, updated_at = ?2 WHERE id = ?3",
                    params![name, now_timestamp(), lead_id],
                )
            }
        })
        .await
        .map_err(map_tr_err)?;
    if changed == 0 {
        return Err(BridgeError::NotFound(format!("lead {lead_id}")));
    }
    Ok(())
}

pub async fn update_lead_status(
    db: &Database,
    lead_id: &str,
    status: &str,
    metadata: Option<&str>,
) -> Result<(), BridgeError> {
    let lead_id = lead_id.to_string();
    let status = status.to_string();
    let metadata = metadata.map(str::to_string);
    let changed = db
        .connection()
        .call({
            let lead_id = lead_id.clone();
            move |conn| -> Result<usize, rusqlite::Error> {
                conn.execute(
                    "UPDATE leads SET status = ?1, metadata = ?2, updated_at = ?3 WHERE id = ?4",
                    params![status, metadata, now_timestamp(), lead_id],
                )
            }
        })
        .await
        .map_err(map_tr_err)?;
    if changed == 0 {
        return Err(BridgeError::NotFound(format!("lead {lead_id}")));
    }
    Ok(())
}

pub async fn append_history(
    db: &Database,
    lead_id: &str,
    action: &str,
    detail: &str,
) -> Result<(), BridgeError> {
    let lead_id = lead_id.to_string();
    let action = action.to_string();
    let detail = detail.to_string();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "INSERT INTO lead_history (lead_id, action, detail, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![lead_id, action, detail, now_timestamp()],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// `(action, detail)` pairs for a lead, oldest first.
pub async fn history_for_lead(
    db: &Database,
    lead_id: &str,
) -> Result<Vec<(String, Option<String>)>, BridgeError> {
    let lead_id = lead_id.to_string();
    db.connection()
        .call(move |conn| -> Result<Vec<(String, Option<String>)>, rusqlite::Error> {
            let mut stmt = conn.prepare(
                "SELECT action, detail FROM lead_history WHERE lead_id = ?1 ORDER BY id ASC",
            )?;
            let rows = stmt.query_map(params![lead_id], |row| Ok((row.get(0)?, row.get(1)?)))?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn is_blocked(db: &Database, company_id: &str, phones: &[String]) -> Result<bool, BridgeError> {
    if phones.is_empty() {
        return Ok(false);
    }
    let sql = format!(
        "SELECT EXISTS(SELECT 1 FROM lead_blocklist WHERE company_id = ? AND phone IN ({}))",
        placeholders(phones.len())
    );
    let values: Vec<Value> = std::iter::once(company_id)
        .chain(phones.iter().map(String::as_str))
        .map(|s| Value::Text(s.to_string()))
        .collect();
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            conn.query_row(&sql, params_from_iter(values.iter()), |row| row.get(0))
        })
        .await
        .map_err(map_tr_err)
}

fn row_to_lead(row: &Row<'_>) -> rusqlite::Result<Lead> {
    Ok(Lead {
        id: row.get(0)?,
        name: row.get(1)?,
        phone: row.get(2)?,
        status: row.get(3)?,
        company_id: row.get(4)?,
        user_id: row.get(5)?,
        origin: row.get(6)?,
        metadata: row.get(7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_lead(phone: &str) -> NewLead {
        NewLead {
            name: format!("WhatsApp {phone}"),
            phone: phone.to_string(),
            status: "novo".to_string(),
            company_id: Some("c1".to_string()),
            user_id: "u1".to_string(),
            origin: "whatsapp".to_string(),
        }
    }

    async fn seed(db: &Database, sql: &'static str) {
        db.connection()
            .call(move |conn| -> Result<(), rusqlite::Error> { conn.execute_batch(sql) })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn create_then_list_active() {
        let db = Database::open_in_memory().await.unwrap();
        let lead = create_lead(&db, &new_lead("5511987654321")).await.unwrap();
        assert_eq!(lead.origin.as_deref(), Some("whatsapp"));

        let leads = active_leads(&db, "u1").await.unwrap();
        assert_eq!(leads.len(), 1);
        assert_eq!(leads[0].id, lead.id);
        assert!(active_leads(&db, "u2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn soft_deleted_leads_are_hidden() {
        let db = Database::open_in_memory().await.unwrap();
        seed(
            &db,
            "INSERT INTO leads (id, name, phone, status, user_id, deleted_at)
             VALUES ('gone', 'Old', '5511987654321', 'novo', 'u1', '2026-01-01T00:00:00.000Z');",
        )
        .await;
        assert!(active_leads(&db, "u1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn rename_and_status_update() {
        let db = Database::open_in_memory().await.unwrap();
        let lead = create_lead(&db, &new_lead("5511987654321")).await.unwrap();
        rename_lead(&db, &lead.id, "Maria").await.unwrap();
        update_lead_status(&db, &lead.id, "em_contato", Some("{}")).await.unwrap();

        let stored = &active_leads(&db, "u1").await.unwrap()[0];
        assert_eq!(stored.name.as_deref(), Some("Maria"));
        assert_eq!(stored.status.as_deref(), Some("em_contato"));
        assert_eq!(stored.metadata.as_deref(), Some("{}"));
    }

    #[tokio::test]
    async fn rename_missing_lead_is_not_found() {
        let db = Database::open_in_memory().await.unwrap();
        let err = rename_lead(&db, "nope", "x").await.unwrap_err();
        assert!(matches!(err, BridgeError::NotFound(_)));
    }

    #[tokio::test]
    async fn history_entries_are_ordered() {
        let db = Database::open_in_memory().await.unwrap();
        let lead = create_lead(&db, &new_lead("5511987654321")).await.unwrap();
        append_history(&db, &lead.id, "auto_created", "whatsapp").await.unwrap();
        append_history(&db, &lead.id, "status_changed", "novo -> em_contato").await.unwrap();

        let history = history_for_lead(&db, &lead.id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].0, "auto_created");
        assert_eq!(history[1].1.as_deref(), Some("novo -> em_contato"));
    }

    #[tokio::test]
    async fn company_and_blocklist_lookup() {
        let db = Database::open_in_memory().await.unwrap();
        seed(
            &db,
            "INSERT INTO users (id, company_id) VALUES ('u1', 'c1'), ('u2', NULL);
             INSERT INTO lead_blocklist (company_id, phone) VALUES ('c1', '11987654321');",
        )
        .await;

        assert_eq!(company_for_user(&db, "u1").await.unwrap().as_deref(), Some("c1"));
        assert_eq!(company_for_user(&db, "u2").await.unwrap(), None);
        assert_eq!(company_for_user(&db, "u3").await.unwrap(), None);

        let variants = vec!["5511987654321".to_string(), "11987654321".to_string()];
        assert!(is_blocked(&db, "c1", &variants).await.unwrap());
        assert!(!is_blocked(&db, "c2", &variants).await.unwrap());
        assert!(!is_blocked(&db, "c1", &[]).await.unwrap());
    }
}
