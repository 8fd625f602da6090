//! The linked device record (single row).

use async_trait::async_trait;
use wacore::store::error::{db_err, StoreError};
use wacore::store::traits::DeviceStore;
use wacore::store::Device;

use super::{Result, SessionStore};

/// Only one device is ever linked per store.
const DEVICE_ID: i32 = 1;

#[async_trait]
impl DeviceStore for SessionStore {
    async fn save(&self, device: &Device) -> Result<()> {
        // Device keys use serde_bytes/BigArray; JSON cannot round-trip them.
        let data =
            bincode::serialize(device).map_err(|e| StoreError::Serialization(e.to_string()))?;
        sqlx::query("INSERT OR REPLACE INTO device (id, data) VALUES (?, ?)")
            .bind(DEVICE_ID)
            .bind(data)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn load(&self) -> Result<Option<Device>> {
        let row: Option<(Vec<u8>,)> = sqlx::query_as("SELECT data FROM device WHERE id = ?")
            .bind(DEVICE_ID)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.map(|(data,)| {
            bincode::deserialize(&data).map_err(|e| StoreError::Serialization(e.to_string()))
        })
        .transpose()
    }

    async fn exists(&self) -> Result<bool> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM device WHERE id = ?")
            .bind(DEVICE_ID)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(row.is_some())
    }

    async fn create(&self) -> Result<i32> {
        // Keys are generated by the client and persisted through save().
        Ok(DEVICE_ID)
    }
}
