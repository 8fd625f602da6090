//! Group sender-key bookkeeping, LID/phone mappings, base keys and device lists.

use async_trait::async_trait;
use wacore::store::error::{db_err, StoreError};
use wacore::store::traits::{DeviceListRecord, LidPnMappingEntry, ProtocolStore};

use super::{Result, SessionStore};

type MappingRow = (String, String, i64, i64, String);

fn mapping(row: MappingRow) -> LidPnMappingEntry {
    let (lid, phone_number, created_at, updated_at, learning_source) = row;
    LidPnMappingEntry {
        lid,
        phone_number,
        created_at,
        updated_at,
        learning_source,
    }
}

const MAPPING_COLUMNS: &str = "SELECT lid, phone_number, created_at, updated_at, learning_source \
                               FROM lid_mappings";

#[async_trait]
impl ProtocolStore for SessionStore {
    async fn get_skdm_recipients(&self, group_jid: &str) -> Result<Vec<String>> {
        self.strings_by_key(
            "SELECT device_jid FROM skdm_recipients WHERE group_jid = ?",
            group_jid,
        )
        .await
    }

    async fn add_skdm_recipients(&self, group_jid: &str, device_jids: &[String]) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        for device in device_jids {
            sqlx::query("INSERT OR IGNORE INTO skdm_recipients (group_jid, device_jid) VALUES (?, ?)")
                .bind(group_jid)
                .bind(device)
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
        }
        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn clear_skdm_recipients(&self, group_jid: &str) -> Result<()> {
        self.delete_by_key("DELETE FROM skdm_recipients WHERE group_jid = ?", group_jid)
            .await
    }

    async fn get_lid_mapping(&self, lid: &str) -> Result<Option<LidPnMappingEntry>> {
        let row: Option<MappingRow> = sqlx::query_as(&format!("{MAPPING_COLUMNS} WHERE lid = ?"))
            .bind(lid)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(row.map(mapping))
    }

    async fn get_pn_mapping(&self, phone: &str) -> Result<Option<LidPnMappingEntry>> {
        let row: Option<MappingRow> =
            sqlx::query_as(&format!("{MAPPING_COLUMNS} WHERE phone_number = ?"))
                .bind(phone)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?;
        Ok(row.map(mapping))
    }

    async fn put_lid_mapping(&self, entry: &LidPnMappingEntry) -> Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO lid_mappings \
             (lid, phone_number, created_at, updated_at, learning_source) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&entry.lid)
        .bind(&entry.phone_number)
        .bind(entry.created_at)
        .bind(entry.updated_at)
        .bind(&entry.learning_source)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn get_all_lid_mappings(&self) -> Result<Vec<LidPnMappingEntry>> {
        let rows: Vec<MappingRow> = sqlx::query_as(MAPPING_COLUMNS)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(rows.into_iter().map(mapping).collect())
    }

    async fn save_base_key(&self, address: &str, message_id: &str, base_key: &[u8]) -> Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO base_keys (address, message_id, base_key) VALUES (?, ?, ?)",
        )
        .bind(address)
        .bind(message_id)
        .bind(base_key)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn has_same_base_key(
        &self,
        address: &str,
        message_id: &str,
        current_base_key: &[u8],
    ) -> Result<bool> {
        let row: Option<(Vec<u8>,)> =
            sqlx::query_as("SELECT base_key FROM base_keys WHERE address = ? AND message_id = ?")
                .bind(address)
                .bind(message_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?;
        Ok(matches!(row, Some((stored,)) if stored == current_base_key))
    }

    async fn delete_base_key(&self, address: &str, message_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM base_keys WHERE address = ? AND message_id = ?")
            .bind(address)
            .bind(message_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn update_device_list(&self, record: DeviceListRecord) -> Result<()> {
        let data =
            serde_json::to_string(&record).map_err(|e| StoreError::Serialization(e.to_string()))?;
        sqlx::query("INSERT OR REPLACE INTO device_lists (user, data) VALUES (?, ?)")
            .bind(&record.user)
            .bind(data)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn get_devices(&self, user: &str) -> Result<Option<DeviceListRecord>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT data FROM device_lists WHERE user = ?")
            .bind(user)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.map(|(data,)| {
            serde_json::from_str(&data).map_err(|e| StoreError::Serialization(e.to_string()))
        })
        .transpose()
    }

    async fn mark_forget_sender_key(&self, group_jid: &str, participant: &str) -> Result<()> {
        sqlx::query(
            "INSERT OR IGNORE INTO forget_sender_keys (group_jid, participant) VALUES (?, ?)",
        )
        .bind(group_jid)
        .bind(participant)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    /// Return and clear the participants marked for `group_jid`.
    async fn consume_forget_marks(&self, group_jid: &str) -> Result<Vec<String>> {
        let marks = self
            .strings_by_key(
                "SELECT participant FROM forget_sender_keys WHERE group_jid = ?",
                group_jid,
            )
            .await?;
        self.delete_by_key("DELETE FROM forget_sender_keys WHERE group_jid = ?", group_jid)
            .await?;
        Ok(marks)
    }
}
